//! Sealed scheme key management
//!
//! One 256-bit secret backs both halves of the sealed scheme:
//! - SealedBackend: evaluation (held by the ledger's coprocessor)
//! - SealedDecryptor: decryption (held by the decryption authority)

use std::sync::Arc;

use rand::RngCore;
use zeroize::{Zeroize, Zeroizing};

use crate::sealed::{SealedBackend, SealedDecryptor};
use crate::{FHEConfig, FHEError, FHEResult};

/// Secret key size (256 bits for ChaCha20)
pub const SEALED_KEY_SIZE: usize = 32;

/// Domain string for key identifiers
const KEY_ID_DOMAIN: &str = "cipherfolio-fhe 2024-06 sealed key id";

/// Raw secret, wiped on drop
pub(crate) struct SealedKey {
    bytes: [u8; SEALED_KEY_SIZE],
}

impl SealedKey {
    pub(crate) fn as_bytes(&self) -> &[u8; SEALED_KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for SealedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Key material for the sealed scheme
#[derive(Clone)]
pub struct SealedKeys {
    key: Arc<SealedKey>,
    key_id: [u8; 32],
}

impl SealedKeys {
    /// Generate a fresh secret from the OS RNG
    pub fn generate() -> FHEResult<Self> {
        let mut bytes = [0u8; SEALED_KEY_SIZE];
        rand::rngs::OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| FHEError::KeyGenerationFailed(e.to_string()))?;
        let keys = Self::from_array(bytes);
        bytes.zeroize();
        Ok(keys)
    }

    /// Load from raw secret bytes
    pub fn from_bytes(bytes: &[u8]) -> FHEResult<Self> {
        let arr: [u8; SEALED_KEY_SIZE] = bytes.try_into().map_err(|_| {
            FHEError::InvalidKey(format!(
                "expected {} bytes, got {}",
                SEALED_KEY_SIZE,
                bytes.len()
            ))
        })?;
        Ok(Self::from_array(arr))
    }

    fn from_array(bytes: [u8; SEALED_KEY_SIZE]) -> Self {
        let key_id = blake3::derive_key(KEY_ID_DOMAIN, &bytes);
        Self {
            key: Arc::new(SealedKey { bytes }),
            key_id,
        }
    }

    /// Export the secret (wiped when the returned buffer drops)
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.key.as_bytes().to_vec())
    }

    /// Public identifier of this key
    pub fn key_id(&self) -> [u8; 32] {
        self.key_id
    }

    /// Evaluation half
    pub fn backend(&self, config: &FHEConfig) -> SealedBackend {
        SealedBackend::new(self.key.clone(), config.clone())
    }

    /// Decryption half
    pub fn decryptor(&self) -> SealedDecryptor {
        SealedDecryptor::new(self.key.clone())
    }
}

impl std::fmt::Debug for SealedKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedKeys")
            .field("key_id", &hex::encode(&self.key_id[..8]))
            .finish()
    }
}
