//! Cipherfolio FHE capability
//!
//! Pluggable encryption for confidential ledger values.
//! Values stay encrypted end-to-end; arithmetic happens on ciphertexts.
//!
//! # Key Features:
//! - Encrypt u64 values bound to an owner/purpose context
//! - Checked homomorphic addition and subtraction (no wraparound)
//! - Comparisons producing encrypted booleans
//! - Decryption split off into a separate capability
//!
//! # Architecture:
//! - HomomorphicBackend: encrypt + combine (held by the ledger)
//! - Decryptor: private decryption primitive (held by the decryption authority)
//! - SealedKeys: key material producing both halves of the sealed scheme
//! - PlaintextBackend: test double that keeps values readable

pub mod errors;
mod ciphertext;
mod keys;
mod operations;
mod plaintext;
mod sealed;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use ciphertext::{Ciphertext, EncryptionContext, ValueKind};
pub use errors::FHEError;
pub use keys::{SealedKeys, SEALED_KEY_SIZE};
pub use operations::{Decryptor, HomomorphicBackend, HomomorphicOp};
pub use plaintext::PlaintextBackend;
pub use sealed::{SealedBackend, SealedDecryptor};

/// Result type for FHE operations
pub type FHEResult<T> = Result<T, FHEError>;

/// Encryption scheme selector
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeKind {
    /// ChaCha20-Poly1305 key-holder scheme
    Sealed,
    /// Test double, no confidentiality
    Plaintext,
}

impl std::fmt::Display for SchemeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SchemeKind::Sealed => write!(f, "sealed"),
            SchemeKind::Plaintext => write!(f, "plaintext"),
        }
    }
}

impl std::str::FromStr for SchemeKind {
    type Err = FHEError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sealed" => Ok(SchemeKind::Sealed),
            "plaintext" => Ok(SchemeKind::Plaintext),
            other => Err(FHEError::ConfigError(format!("unknown scheme: {}", other))),
        }
    }
}

/// FHE Configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FHEConfig {
    /// Scheme used for new ciphertexts
    pub scheme: SchemeKind,
    /// Operation count above which a ciphertext is reported as noisy
    pub max_op_count: u32,
}

impl Default for FHEConfig {
    fn default() -> Self {
        Self {
            scheme: SchemeKind::Sealed,
            max_op_count: 1024,
        }
    }
}

/// Evaluation and decryption halves built from one configuration
pub struct BackendPair {
    /// Held by the ledger
    pub backend: Arc<dyn HomomorphicBackend>,
    /// Held by the decryption authority
    pub decryptor: Arc<dyn Decryptor>,
}

impl BackendPair {
    /// Build both halves for the configured scheme.
    ///
    /// `keys` is required for the sealed scheme and ignored otherwise.
    pub fn from_config(config: &FHEConfig, keys: Option<&SealedKeys>) -> FHEResult<Self> {
        match config.scheme {
            SchemeKind::Sealed => {
                let keys = keys.ok_or_else(|| {
                    FHEError::ConfigError("sealed scheme requires key material".into())
                })?;
                Ok(Self {
                    backend: Arc::new(keys.backend(config)),
                    decryptor: Arc::new(keys.decryptor()),
                })
            }
            SchemeKind::Plaintext => {
                let backend = Arc::new(PlaintextBackend::new());
                Ok(Self {
                    backend: backend.clone(),
                    decryptor: backend,
                })
            }
        }
    }
}
