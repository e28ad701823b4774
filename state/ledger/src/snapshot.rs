//! Point-in-time export of the whole ledger

use serde::{Deserialize, Serialize};

use cipherfolio_fhe::{Ciphertext, SchemeKind};

use crate::decryption::DecryptionState;
use crate::errors::{LedgerError, LedgerResult};
use crate::portfolio::Portfolio;
use crate::types::{AccessGrant, CiphertextHandle, Timestamp};

/// Snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub version: u32,
    /// Scheme the ciphertexts were produced under
    pub scheme: SchemeKind,
    pub portfolios: Vec<Portfolio>,
    pub ciphertexts: Vec<(CiphertextHandle, Ciphertext)>,
    pub grants: Vec<AccessGrant>,
    pub decryption: DecryptionState,
    pub last_timestamp: Timestamp,
}

impl LedgerSnapshot {
    pub fn to_bytes(&self) -> LedgerResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> LedgerResult<Self> {
        let snapshot: Self = bincode::deserialize(bytes)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }

    /// BLAKE3 digest of the encoded snapshot
    pub fn digest(&self) -> LedgerResult<[u8; 32]> {
        Ok(*blake3::hash(&self.to_bytes()?).as_bytes())
    }

    pub(crate) fn check_version(&self) -> LedgerResult<()> {
        if self.version != SNAPSHOT_VERSION {
            return Err(LedgerError::Malformed(format!(
                "unsupported snapshot version {} (expected {})",
                self.version, SNAPSHOT_VERSION
            )));
        }
        Ok(())
    }
}
