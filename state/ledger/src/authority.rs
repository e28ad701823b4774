//! External decryption authority
//!
//! The only holder of a [`Decryptor`]. It answers pending requests with the
//! plaintext plus an Ed25519 signature binding the plaintext to the request
//! id and handle. The ledger never holds the signing key; it only verifies.

use std::sync::Arc;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::info;
use zeroize::Zeroizing;

use cipherfolio_fhe::{Ciphertext, Decryptor};

use crate::decryption::{DecryptionRequest, RequestId};
use crate::errors::{LedgerError, LedgerResult};
use crate::types::CiphertextHandle;

const FULFIL_DOMAIN: &[u8] = b"cipherfolio/decryption/fulfil/v1";
const REJECT_DOMAIN: &[u8] = b"cipherfolio/decryption/reject/v1";

fn fulfil_message(request_id: RequestId, handle: &CiphertextHandle, plaintext: u64) -> Vec<u8> {
    let mut msg = Vec::with_capacity(FULFIL_DOMAIN.len() + 8 + 32 + 8);
    msg.extend_from_slice(FULFIL_DOMAIN);
    msg.extend_from_slice(&request_id.to_le_bytes());
    msg.extend_from_slice(handle.as_bytes());
    msg.extend_from_slice(&plaintext.to_le_bytes());
    msg
}

fn reject_message(request_id: RequestId, handle: &CiphertextHandle) -> Vec<u8> {
    let mut msg = Vec::with_capacity(REJECT_DOMAIN.len() + 8 + 32);
    msg.extend_from_slice(REJECT_DOMAIN);
    msg.extend_from_slice(&request_id.to_le_bytes());
    msg.extend_from_slice(handle.as_bytes());
    msg
}

/// Parse an authority verifying key from its 32-byte encoding
pub fn verifying_key_from_bytes(bytes: &[u8]) -> LedgerResult<VerifyingKey> {
    let arr: [u8; 32] = bytes
        .try_into()
        .map_err(|_| LedgerError::Malformed(format!("verifying key must be 32 bytes, got {}", bytes.len())))?;
    VerifyingKey::from_bytes(&arr).map_err(|e| LedgerError::Malformed(e.to_string()))
}

/// Signature from the decryption authority
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityProof(Vec<u8>);

impl AuthorityProof {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> LedgerResult<Self> {
        hex::decode(s.strip_prefix("0x").unwrap_or(s))
            .map(Self)
            .map_err(|e| LedgerError::Malformed(e.to_string()))
    }

    /// Check a fulfilment signature
    pub fn verify_fulfilment(
        &self,
        key: &VerifyingKey,
        request_id: RequestId,
        handle: &CiphertextHandle,
        plaintext: u64,
    ) -> bool {
        self.verify(key, &fulfil_message(request_id, handle, plaintext))
    }

    /// Check a rejection signature
    pub fn verify_rejection(&self, key: &VerifyingKey, request_id: RequestId, handle: &CiphertextHandle) -> bool {
        self.verify(key, &reject_message(request_id, handle))
    }

    fn verify(&self, key: &VerifyingKey, msg: &[u8]) -> bool {
        match Signature::from_slice(&self.0) {
            Ok(sig) => key.verify(msg, &sig).is_ok(),
            Err(_) => false,
        }
    }
}

impl std::fmt::Debug for AuthorityProof {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix = &self.0[..self.0.len().min(8)];
        write!(f, "AuthorityProof({}..)", hex::encode(prefix))
    }
}

/// Answer to a decryption request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fulfillment {
    pub request_id: RequestId,
    pub plaintext: u64,
    pub proof: AuthorityProof,
}

/// Party holding the decryption capability and the signing key
pub struct DecryptionAuthority {
    decryptor: Arc<dyn Decryptor>,
    signing_key: SigningKey,
}

impl DecryptionAuthority {
    pub fn new(decryptor: Arc<dyn Decryptor>, signing_key: SigningKey) -> Self {
        Self {
            decryptor,
            signing_key,
        }
    }

    /// Authority with a fresh random signing key
    pub fn generate(decryptor: Arc<dyn Decryptor>) -> Self {
        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *seed);
        Self::new(decryptor, SigningKey::from_bytes(&seed))
    }

    /// Authority from a stored 32-byte signing key
    pub fn from_key_bytes(decryptor: Arc<dyn Decryptor>, bytes: &[u8]) -> LedgerResult<Self> {
        let seed: Zeroizing<[u8; 32]> = Zeroizing::new(bytes.try_into().map_err(|_| {
            LedgerError::Malformed(format!("signing key must be 32 bytes, got {}", bytes.len()))
        })?);
        Ok(Self::new(decryptor, SigningKey::from_bytes(&seed)))
    }

    pub fn key_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.signing_key.to_bytes())
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Decrypt the requested ciphertext and sign the answer
    pub fn process(&self, request: &DecryptionRequest, ciphertext: &Ciphertext) -> LedgerResult<Fulfillment> {
        let actual = CiphertextHandle::of(ciphertext)?;
        if actual != request.handle {
            return Err(LedgerError::Malformed(format!(
                "request {} names {} but ciphertext is {}",
                request.id, request.handle, actual
            )));
        }

        let plaintext = self.decryptor.decrypt(ciphertext)?;
        let signature = self
            .signing_key
            .sign(&fulfil_message(request.id, &request.handle, plaintext));
        info!("Authority answered decryption request {}", request.id);

        Ok(Fulfillment {
            request_id: request.id,
            plaintext,
            proof: AuthorityProof(signature.to_bytes().to_vec()),
        })
    }

    /// Signed refusal for a request the authority will not answer
    pub fn reject(&self, request: &DecryptionRequest) -> AuthorityProof {
        let signature = self
            .signing_key
            .sign(&reject_message(request.id, &request.handle));
        AuthorityProof(signature.to_bytes().to_vec())
    }
}

impl std::fmt::Debug for DecryptionAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionAuthority")
            .field("verifying_key", &hex::encode(self.verifying_key().to_bytes()))
            .finish()
    }
}
