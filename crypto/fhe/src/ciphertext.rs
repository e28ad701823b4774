//! Ciphertext types
//!
//! A `Ciphertext` is the opaque, serializable form every backend produces.
//! Nothing in this module can recover a plaintext; that is the job of a
//! [`Decryptor`](crate::Decryptor).

use serde::{Deserialize, Serialize};

use crate::{FHEError, FHEResult};

/// Domain string for context tags of freshly encrypted values
const CONTEXT_TAG_DOMAIN: &str = "cipherfolio-fhe 2024-06 encryption context";

/// What an encrypted value decodes to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    /// Unsigned 64-bit integer
    Uint64,
    /// Boolean (result of a comparison), decrypts to 0 or 1
    Bool,
}

impl ValueKind {
    /// Number of plaintext bits
    pub fn bits(&self) -> u8 {
        match self {
            ValueKind::Uint64 => 64,
            ValueKind::Bool => 1,
        }
    }

    pub(crate) fn as_byte(&self) -> u8 {
        match self {
            ValueKind::Uint64 => 0,
            ValueKind::Bool => 1,
        }
    }
}

/// Where a fresh ciphertext belongs: its owner and the purpose of the value.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EncryptionContext {
    /// Owner identity bytes
    pub owner: [u8; 32],
    /// Purpose label (e.g. "amount", "value", "total")
    pub label: String,
}

impl EncryptionContext {
    /// Create a new context
    pub fn new(owner: [u8; 32], label: impl Into<String>) -> Self {
        Self {
            owner,
            label: label.into(),
        }
    }

    /// Derive the 32-byte tag bound into ciphertexts made under this context
    pub fn tag(&self) -> [u8; 32] {
        let mut material = Vec::with_capacity(32 + self.label.len());
        material.extend_from_slice(&self.owner);
        material.extend_from_slice(self.label.as_bytes());
        blake3::derive_key(CONTEXT_TAG_DOMAIN, &material)
    }
}

/// Opaque encrypted value
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ciphertext {
    /// What the value decodes to
    kind: ValueKind,
    /// Context tag (authenticated by sealing backends)
    context_tag: [u8; 32],
    /// Backend-specific ciphertext bytes
    payload: Vec<u8>,
    /// Operation count (noise proxy)
    op_count: u32,
}

impl Ciphertext {
    /// Create a new ciphertext from backend output
    pub fn new(kind: ValueKind, context_tag: [u8; 32], payload: Vec<u8>, op_count: u32) -> Self {
        Self {
            kind,
            context_tag,
            payload,
            op_count,
        }
    }

    /// Value kind
    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    /// Context tag
    pub fn context_tag(&self) -> &[u8; 32] {
        &self.context_tag
    }

    /// Raw backend payload
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Number of homomorphic operations folded into this value
    pub fn op_count(&self) -> u32 {
        self.op_count
    }

    /// Approximate noise based on operation count
    pub fn noise_level(&self) -> u8 {
        self.op_count.min(255) as u8
    }

    /// Serialize for storage/transmission
    pub fn to_bytes(&self) -> FHEResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> FHEResult<Self> {
        let ct: Self = bincode::deserialize(bytes)?;
        if ct.payload.is_empty() {
            return Err(FHEError::InvalidCiphertext("empty payload".into()));
        }
        Ok(ct)
    }
}

impl std::fmt::Debug for Ciphertext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ciphertext")
            .field("kind", &self.kind)
            .field("tag", &hex::encode(&self.context_tag[..8]))
            .field("size", &self.payload.len())
            .field("ops", &self.op_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_tag_depends_on_owner_and_label() {
        let a = EncryptionContext::new([1u8; 32], "value");
        let b = EncryptionContext::new([2u8; 32], "value");
        let c = EncryptionContext::new([1u8; 32], "amount");

        assert_eq!(a.tag(), EncryptionContext::new([1u8; 32], "value").tag());
        assert_ne!(a.tag(), b.tag());
        assert_ne!(a.tag(), c.tag());
    }

    #[test]
    fn test_ciphertext_bytes_roundtrip() {
        let ct = Ciphertext::new(ValueKind::Bool, [7u8; 32], vec![1, 2, 3], 4);
        let bytes = ct.to_bytes().unwrap();
        let back = Ciphertext::from_bytes(&bytes).unwrap();

        assert_eq!(ct, back);
        assert_eq!(back.kind().bits(), 1);
        assert_eq!(back.noise_level(), 4);
    }

    #[test]
    fn test_empty_payload_rejected() {
        let ct = Ciphertext::new(ValueKind::Uint64, [0u8; 32], vec![], 0);
        let bytes = ct.to_bytes().unwrap();
        assert!(matches!(
            Ciphertext::from_bytes(&bytes),
            Err(FHEError::InvalidCiphertext(_))
        ));
    }

    #[test]
    fn test_debug_hides_payload() {
        let ct = Ciphertext::new(ValueKind::Uint64, [0u8; 32], vec![0xAB; 40], 0);
        let shown = format!("{:?}", ct);
        assert!(shown.contains("size: 40"));
        assert!(!shown.contains("171"));
    }
}
