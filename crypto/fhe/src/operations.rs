//! Homomorphic operations and the backend capability traits
//!
//! A backend is split in two halves the same way TFHE splits server and
//! client keys: [`HomomorphicBackend`] evaluates (encrypt + combine) and is
//! what the ledger holds; [`Decryptor`] recovers plaintexts and is held only
//! by the decryption authority.

use serde::{Deserialize, Serialize};

use crate::ciphertext::{Ciphertext, EncryptionContext, ValueKind};
use crate::{FHEError, FHEResult, SchemeKind};

/// Domain string for context tags of combined values
const DERIVED_TAG_DOMAIN: &str = "cipherfolio-fhe 2024-06 derived context";

/// Binary operation evaluated on two ciphertexts
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HomomorphicOp {
    /// Checked addition
    Add,
    /// Checked subtraction
    Sub,
    /// Encrypted `a > b`
    Gt,
    /// Encrypted `a < b`
    Lt,
    /// Encrypted `a == b`
    Eq,
}

impl HomomorphicOp {
    /// Kind of the value the operation produces
    pub fn output_kind(&self) -> ValueKind {
        match self {
            HomomorphicOp::Add | HomomorphicOp::Sub => ValueKind::Uint64,
            HomomorphicOp::Gt | HomomorphicOp::Lt | HomomorphicOp::Eq => ValueKind::Bool,
        }
    }

    /// Noise cost added to the result's operation count
    pub fn cost(&self) -> u32 {
        match self {
            HomomorphicOp::Add | HomomorphicOp::Sub => 1,
            // Comparisons are more expensive
            HomomorphicOp::Gt | HomomorphicOp::Lt | HomomorphicOp::Eq => 3,
        }
    }

    fn as_byte(&self) -> u8 {
        match self {
            HomomorphicOp::Add => 0,
            HomomorphicOp::Sub => 1,
            HomomorphicOp::Gt => 2,
            HomomorphicOp::Lt => 3,
            HomomorphicOp::Eq => 4,
        }
    }

    /// Reject operand kinds the operation is not defined for
    pub fn check_operands(&self, a: &Ciphertext, b: &Ciphertext) -> FHEResult<()> {
        if a.kind() != ValueKind::Uint64 || b.kind() != ValueKind::Uint64 {
            return Err(FHEError::InvalidCiphertext(format!(
                "{:?} requires Uint64 operands, got {:?} and {:?}",
                self,
                a.kind(),
                b.kind()
            )));
        }
        Ok(())
    }

    /// Plaintext semantics of the operation.
    ///
    /// Used inside key-holder backends; out-of-range results are errors,
    /// never wrapped.
    pub fn evaluate(&self, a: u64, b: u64) -> FHEResult<u64> {
        match self {
            HomomorphicOp::Add => a.checked_add(b).ok_or(FHEError::Overflow),
            HomomorphicOp::Sub => a.checked_sub(b).ok_or(FHEError::Underflow),
            HomomorphicOp::Gt => Ok((a > b) as u64),
            HomomorphicOp::Lt => Ok((a < b) as u64),
            HomomorphicOp::Eq => Ok((a == b) as u64),
        }
    }

    /// Context tag of the result, bound to the operation and both inputs
    pub fn derive_tag(&self, a: &Ciphertext, b: &Ciphertext) -> [u8; 32] {
        let mut material = Vec::with_capacity(65);
        material.push(self.as_byte());
        material.extend_from_slice(a.context_tag());
        material.extend_from_slice(b.context_tag());
        blake3::derive_key(DERIVED_TAG_DOMAIN, &material)
    }

    /// Operation count of the result
    pub fn result_op_count(&self, a: &Ciphertext, b: &Ciphertext) -> u32 {
        a.op_count()
            .saturating_add(b.op_count())
            .saturating_add(self.cost())
    }
}

/// Evaluation capability: encrypt fresh values and combine ciphertexts.
pub trait HomomorphicBackend: Send + Sync {
    /// Scheme implemented by this backend
    fn scheme(&self) -> SchemeKind;

    /// Encrypt a u64 under the given context
    fn encrypt(&self, value: u64, context: &EncryptionContext) -> FHEResult<Ciphertext>;

    /// Compute `op(a, b)` without exposing either operand
    fn combine(&self, op: HomomorphicOp, a: &Ciphertext, b: &Ciphertext) -> FHEResult<Ciphertext>;
}

/// Private decryption primitive
pub trait Decryptor: Send + Sync {
    /// Scheme this decryptor understands
    fn scheme(&self) -> SchemeKind;

    /// Recover the plaintext; booleans decrypt to 0 or 1
    fn decrypt(&self, ciphertext: &Ciphertext) -> FHEResult<u64>;
}
