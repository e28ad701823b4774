//! Plaintext test double
//!
//! Offers no confidentiality. The payload carries a serial number (so equal
//! values still get distinct ciphertexts) followed by the value, which lets
//! tests assert on encrypted state without going through the decryption
//! authority.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::ciphertext::{Ciphertext, EncryptionContext, ValueKind};
use crate::operations::{Decryptor, HomomorphicBackend, HomomorphicOp};
use crate::{FHEError, FHEResult, SchemeKind};

/// Backend that keeps values readable for assertions
#[derive(Debug, Default)]
pub struct PlaintextBackend {
    serial: AtomicU64,
}

impl PlaintextBackend {
    /// Create a new backend
    pub fn new() -> Self {
        Self::default()
    }

    fn wrap(&self, kind: ValueKind, tag: [u8; 32], value: u64, op_count: u32) -> Ciphertext {
        let serial = self.serial.fetch_add(1, Ordering::Relaxed);
        let mut payload = Vec::with_capacity(16);
        payload.extend_from_slice(&serial.to_le_bytes());
        payload.extend_from_slice(&value.to_le_bytes());
        Ciphertext::new(kind, tag, payload, op_count)
    }

    /// Read the value held by a ciphertext made by this backend
    pub fn plaintext_of(ciphertext: &Ciphertext) -> FHEResult<u64> {
        let payload = ciphertext.payload();
        if payload.len() != 16 {
            return Err(FHEError::InvalidCiphertext(format!(
                "plaintext payload must be 16 bytes, got {}",
                payload.len()
            )));
        }
        let mut value = [0u8; 8];
        value.copy_from_slice(&payload[8..]);
        Ok(u64::from_le_bytes(value))
    }
}

impl HomomorphicBackend for PlaintextBackend {
    fn scheme(&self) -> SchemeKind {
        SchemeKind::Plaintext
    }

    fn encrypt(&self, value: u64, context: &EncryptionContext) -> FHEResult<Ciphertext> {
        Ok(self.wrap(ValueKind::Uint64, context.tag(), value, 0))
    }

    fn combine(&self, op: HomomorphicOp, a: &Ciphertext, b: &Ciphertext) -> FHEResult<Ciphertext> {
        op.check_operands(a, b)?;
        let result = op.evaluate(Self::plaintext_of(a)?, Self::plaintext_of(b)?)?;
        Ok(self.wrap(
            op.output_kind(),
            op.derive_tag(a, b),
            result,
            op.result_op_count(a, b),
        ))
    }
}

impl Decryptor for PlaintextBackend {
    fn scheme(&self) -> SchemeKind {
        SchemeKind::Plaintext
    }

    fn decrypt(&self, ciphertext: &Ciphertext) -> FHEResult<u64> {
        Self::plaintext_of(ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_values_get_distinct_ciphertexts() {
        let backend = PlaintextBackend::new();
        let ctx = EncryptionContext::new([0u8; 32], "value");
        let a = backend.encrypt(5, &ctx).unwrap();
        let b = backend.encrypt(5, &ctx).unwrap();

        assert_ne!(a, b);
        assert_eq!(PlaintextBackend::plaintext_of(&a).unwrap(), 5);
        assert_eq!(backend.decrypt(&b).unwrap(), 5);
    }

    #[test]
    fn test_combine_matches_checked_arithmetic() {
        let backend = PlaintextBackend::new();
        let ctx = EncryptionContext::new([0u8; 32], "value");
        let a = backend.encrypt(10, &ctx).unwrap();
        let b = backend.encrypt(4, &ctx).unwrap();

        let sum = backend.combine(HomomorphicOp::Add, &a, &b).unwrap();
        assert_eq!(PlaintextBackend::plaintext_of(&sum).unwrap(), 14);

        let eq = backend.combine(HomomorphicOp::Eq, &a, &a).unwrap();
        assert_eq!(PlaintextBackend::plaintext_of(&eq).unwrap(), 1);

        assert_eq!(
            backend.combine(HomomorphicOp::Sub, &b, &a).unwrap_err(),
            FHEError::Underflow
        );
    }
}
