//! Sealed key-holder scheme
//!
//! Values are sealed with ChaCha20-Poly1305 under a secret shared by the
//! evaluation coprocessor and the decryption authority:
//!
//! 1. Generate a random 96-bit nonce
//! 2. AAD = scheme version || value kind || context tag
//! 3. payload = nonce || ChaCha20-Poly1305(le_bytes(value), AAD)
//!
//! Combining opens both inputs inside the backend, applies the checked
//! operation and reseals the result under a derived context tag. Plaintexts
//! are never returned from [`SealedBackend`].

use std::sync::Arc;

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use tracing::warn;

use crate::ciphertext::{Ciphertext, EncryptionContext, ValueKind};
use crate::keys::SealedKey;
use crate::operations::{Decryptor, HomomorphicBackend, HomomorphicOp};
use crate::{FHEConfig, FHEError, FHEResult, SchemeKind};

/// Sealed payload format version
const SCHEME_VERSION: u8 = 1;

/// Nonce size for ChaCha20-Poly1305
const NONCE_SIZE: usize = 12;

/// Poly1305 tag size
const TAG_SIZE: usize = 16;

fn aad(kind: ValueKind, context_tag: &[u8; 32]) -> [u8; 34] {
    let mut out = [0u8; 34];
    out[0] = SCHEME_VERSION;
    out[1] = kind.as_byte();
    out[2..].copy_from_slice(context_tag);
    out
}

fn seal(key: &SealedKey, kind: ValueKind, context_tag: &[u8; 32], value: u64) -> FHEResult<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| FHEError::EncryptionFailed(format!("Cipher init failed: {:?}", e)))?;

    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let aad = aad(kind, context_tag);
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: &value.to_le_bytes(),
                aad: &aad,
            },
        )
        .map_err(|e| FHEError::EncryptionFailed(format!("Encryption failed: {:?}", e)))?;

    let mut payload = Vec::with_capacity(NONCE_SIZE + sealed.len());
    payload.extend_from_slice(&nonce);
    payload.extend_from_slice(&sealed);
    Ok(payload)
}

fn open(key: &SealedKey, ciphertext: &Ciphertext) -> FHEResult<u64> {
    let payload = ciphertext.payload();
    if payload.len() != NONCE_SIZE + 8 + TAG_SIZE {
        return Err(FHEError::InvalidCiphertext(format!(
            "sealed payload must be {} bytes, got {}",
            NONCE_SIZE + 8 + TAG_SIZE,
            payload.len()
        )));
    }

    let cipher = ChaCha20Poly1305::new_from_slice(key.as_bytes())
        .map_err(|e| FHEError::DecryptionFailed(format!("Cipher init failed: {:?}", e)))?;

    let (nonce, sealed) = payload.split_at(NONCE_SIZE);
    let aad = aad(ciphertext.kind(), ciphertext.context_tag());
    let plain = cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: sealed, aad: &aad })
        .map_err(|_| FHEError::DecryptionFailed("authentication failed".into()))?;

    let arr: [u8; 8] = plain
        .as_slice()
        .try_into()
        .map_err(|_| FHEError::DecryptionFailed("bad plaintext length".into()))?;
    Ok(u64::from_le_bytes(arr))
}

/// Evaluation half of the sealed scheme
pub struct SealedBackend {
    key: Arc<SealedKey>,
    config: FHEConfig,
}

impl SealedBackend {
    pub(crate) fn new(key: Arc<SealedKey>, config: FHEConfig) -> Self {
        Self { key, config }
    }
}

impl HomomorphicBackend for SealedBackend {
    fn scheme(&self) -> SchemeKind {
        SchemeKind::Sealed
    }

    fn encrypt(&self, value: u64, context: &EncryptionContext) -> FHEResult<Ciphertext> {
        let tag = context.tag();
        let payload = seal(&self.key, ValueKind::Uint64, &tag, value)?;
        Ok(Ciphertext::new(ValueKind::Uint64, tag, payload, 0))
    }

    fn combine(&self, op: HomomorphicOp, a: &Ciphertext, b: &Ciphertext) -> FHEResult<Ciphertext> {
        op.check_operands(a, b)?;

        let result = op.evaluate(open(&self.key, a)?, open(&self.key, b)?)?;

        let kind = op.output_kind();
        let tag = op.derive_tag(a, b);
        let op_count = op.result_op_count(a, b);
        if op_count > self.config.max_op_count {
            warn!(
                "Ciphertext op count {} exceeds budget {}",
                op_count, self.config.max_op_count
            );
        }

        let payload = seal(&self.key, kind, &tag, result)?;
        Ok(Ciphertext::new(kind, tag, payload, op_count))
    }
}

impl std::fmt::Debug for SealedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedBackend")
            .field("max_op_count", &self.config.max_op_count)
            .finish()
    }
}

/// Decryption half of the sealed scheme
pub struct SealedDecryptor {
    key: Arc<SealedKey>,
}

impl SealedDecryptor {
    pub(crate) fn new(key: Arc<SealedKey>) -> Self {
        Self { key }
    }
}

impl Decryptor for SealedDecryptor {
    fn scheme(&self) -> SchemeKind {
        SchemeKind::Sealed
    }

    fn decrypt(&self, ciphertext: &Ciphertext) -> FHEResult<u64> {
        open(&self.key, ciphertext)
    }
}

impl std::fmt::Debug for SealedDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SealedDecryptor").finish()
    }
}
