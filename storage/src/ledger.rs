//! Ledger snapshot storage
//!
//! One table per ledger component so the database stays inspectable. A save
//! replaces every table inside a single write transaction; a load verifies
//! the reassembled snapshot against the digest recorded at save time.

use std::sync::Arc;

use redb::{Database, ReadableTable, TableDefinition};
use tracing::{debug, info};

use cipherfolio_fhe::{Ciphertext, SchemeKind};
use cipherfolio_ledger::{
    AccessGrant, Capability, CiphertextHandle, DecryptionRequest, DecryptionState, LedgerSnapshot,
    Portfolio, Principal, SNAPSHOT_VERSION,
};

use crate::{StorageError, StorageResult};

/// Portfolios by owner
const PORTFOLIOS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("portfolios");

/// Ciphertexts by handle
const CIPHERTEXTS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("ciphertexts");

/// Grants keyed by handle || principal || capability
const ACL: TableDefinition<&[u8], u8> = TableDefinition::new("acl");

/// Decryption requests by id
const DECRYPTION_REQUESTS: TableDefinition<u64, &[u8]> = TableDefinition::new("decryption_requests");

/// Unread decryption results by request id
const DECRYPTION_RESULTS: TableDefinition<u64, u64> = TableDefinition::new("decryption_results");

/// Snapshot metadata
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

const META_VERSION: &str = "version";
const META_SCHEME: &str = "scheme";
const META_NEXT_REQUEST: &str = "next_request_id";
const META_LAST_TIMESTAMP: &str = "last_timestamp";
const META_DIGEST: &str = "digest";

const ACL_KEY_LEN: usize = 65;

fn acl_key(grant: &AccessGrant) -> [u8; ACL_KEY_LEN] {
    let mut key = [0u8; ACL_KEY_LEN];
    key[..32].copy_from_slice(grant.handle.as_bytes());
    key[32..64].copy_from_slice(grant.principal.as_bytes());
    key[64] = match grant.capability {
        Capability::UseInComputation => 0,
        Capability::Decrypt => 1,
    };
    key
}

fn parse_acl_key(key: &[u8]) -> StorageResult<AccessGrant> {
    if key.len() != ACL_KEY_LEN {
        return Err(StorageError::Corruption(format!("acl key of {} bytes", key.len())));
    }
    let capability = match key[64] {
        0 => Capability::UseInComputation,
        1 => Capability::Decrypt,
        other => {
            return Err(StorageError::Corruption(format!("unknown capability byte {}", other)))
        }
    };
    Ok(AccessGrant {
        handle: CiphertextHandle::from_bytes(to_array(&key[..32])?),
        principal: Principal::from_bytes(to_array(&key[32..64])?),
        capability,
    })
}

fn to_array<const N: usize>(bytes: &[u8]) -> StorageResult<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| StorageError::Corruption(format!("expected {} bytes, got {}", N, bytes.len())))
}

fn read_u64(bytes: &[u8]) -> StorageResult<u64> {
    Ok(u64::from_le_bytes(to_array(bytes)?))
}

/// Summary of what is stored
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStoreStats {
    pub portfolios: u64,
    pub ciphertexts: u64,
    pub grants: u64,
    pub decryption_requests: u64,
}

/// Ledger snapshot storage interface
pub struct LedgerStore {
    db: Arc<Database>,
}

impl LedgerStore {
    /// Create new ledger store
    pub fn new(db: Arc<Database>) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(PORTFOLIOS)?;
            let _ = write_txn.open_table(CIPHERTEXTS)?;
            let _ = write_txn.open_table(ACL)?;
            let _ = write_txn.open_table(DECRYPTION_REQUESTS)?;
            let _ = write_txn.open_table(DECRYPTION_RESULTS)?;
            let _ = write_txn.open_table(META)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Replace the stored ledger with `snapshot`
    pub fn save_snapshot(&self, snapshot: &LedgerSnapshot) -> StorageResult<()> {
        let digest = snapshot
            .digest()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let write_txn = self.db.begin_write()?;
        {
            write_txn.delete_table(PORTFOLIOS)?;
            write_txn.delete_table(CIPHERTEXTS)?;
            write_txn.delete_table(ACL)?;
            write_txn.delete_table(DECRYPTION_REQUESTS)?;
            write_txn.delete_table(DECRYPTION_RESULTS)?;

            let mut portfolios = write_txn.open_table(PORTFOLIOS)?;
            for portfolio in &snapshot.portfolios {
                let encoded = bincode::serialize(portfolio)?;
                portfolios.insert(portfolio.principal.as_bytes().as_slice(), encoded.as_slice())?;
            }

            let mut ciphertexts = write_txn.open_table(CIPHERTEXTS)?;
            for (handle, ciphertext) in &snapshot.ciphertexts {
                let encoded = bincode::serialize(ciphertext)?;
                ciphertexts.insert(handle.as_bytes().as_slice(), encoded.as_slice())?;
            }

            let mut acl = write_txn.open_table(ACL)?;
            for grant in &snapshot.grants {
                acl.insert(acl_key(grant).as_slice(), 1u8)?;
            }

            let mut requests = write_txn.open_table(DECRYPTION_REQUESTS)?;
            for request in &snapshot.decryption.requests {
                let encoded = bincode::serialize(request)?;
                requests.insert(request.id, encoded.as_slice())?;
            }

            let mut results = write_txn.open_table(DECRYPTION_RESULTS)?;
            for (id, plaintext) in &snapshot.decryption.results {
                results.insert(*id, *plaintext)?;
            }

            let scheme = bincode::serialize(&snapshot.scheme)?;
            let mut meta = write_txn.open_table(META)?;
            meta.insert(META_VERSION, &snapshot.version.to_le_bytes()[..])?;
            meta.insert(META_SCHEME, scheme.as_slice())?;
            meta.insert(META_NEXT_REQUEST, &snapshot.decryption.next_id.to_le_bytes()[..])?;
            meta.insert(META_LAST_TIMESTAMP, &snapshot.last_timestamp.to_le_bytes()[..])?;
            meta.insert(META_DIGEST, digest.as_slice())?;
        }
        write_txn.commit()?;

        info!(
            "Saved ledger snapshot: {} portfolios, {} ciphertexts, {} grants",
            snapshot.portfolios.len(),
            snapshot.ciphertexts.len(),
            snapshot.grants.len()
        );
        Ok(())
    }

    /// Load the stored ledger, or `None` if nothing was saved yet
    pub fn load_snapshot(&self) -> StorageResult<Option<LedgerSnapshot>> {
        let read_txn = self.db.begin_read()?;

        let meta = read_txn.open_table(META)?;
        let version = match meta.get(META_VERSION)? {
            Some(v) => u32::from_le_bytes(to_array(v.value())?),
            None => return Ok(None),
        };
        if version != SNAPSHOT_VERSION {
            return Err(StorageError::UnsupportedVersion(version));
        }
        let scheme: SchemeKind = match meta.get(META_SCHEME)? {
            Some(v) => bincode::deserialize(v.value())?,
            None => return Err(StorageError::Corruption("missing scheme".into())),
        };
        let next_id = match meta.get(META_NEXT_REQUEST)? {
            Some(v) => read_u64(v.value())?,
            None => return Err(StorageError::Corruption("missing next request id".into())),
        };
        let last_timestamp = match meta.get(META_LAST_TIMESTAMP)? {
            Some(v) => read_u64(v.value())?,
            None => return Err(StorageError::Corruption("missing last timestamp".into())),
        };
        let digest: [u8; 32] = match meta.get(META_DIGEST)? {
            Some(v) => to_array(v.value())?,
            None => return Err(StorageError::Corruption("missing digest".into())),
        };

        let mut portfolios = Vec::new();
        for item in read_txn.open_table(PORTFOLIOS)?.iter()? {
            let (_, value) = item?;
            let portfolio: Portfolio = bincode::deserialize(value.value())?;
            portfolios.push(portfolio);
        }

        let mut ciphertexts = Vec::new();
        for item in read_txn.open_table(CIPHERTEXTS)?.iter()? {
            let (key, value) = item?;
            let ciphertext: Ciphertext = bincode::deserialize(value.value())?;
            ciphertexts.push((CiphertextHandle::from_bytes(to_array(key.value())?), ciphertext));
        }

        let mut grants = Vec::new();
        for item in read_txn.open_table(ACL)?.iter()? {
            let (key, _) = item?;
            grants.push(parse_acl_key(key.value())?);
        }
        grants.sort();

        let mut requests = Vec::new();
        for item in read_txn.open_table(DECRYPTION_REQUESTS)?.iter()? {
            let (_, value) = item?;
            let request: DecryptionRequest = bincode::deserialize(value.value())?;
            requests.push(request);
        }

        let mut results = Vec::new();
        for item in read_txn.open_table(DECRYPTION_RESULTS)?.iter()? {
            let (key, value) = item?;
            results.push((key.value(), value.value()));
        }

        let snapshot = LedgerSnapshot {
            version,
            scheme,
            portfolios,
            ciphertexts,
            grants,
            decryption: DecryptionState {
                requests,
                results,
                next_id,
            },
            last_timestamp,
        };

        let actual = snapshot
            .digest()
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        if actual != digest {
            return Err(StorageError::Corruption("snapshot digest mismatch".into()));
        }

        debug!("Loaded ledger snapshot ({} portfolios)", snapshot.portfolios.len());
        Ok(Some(snapshot))
    }

    /// Whether a snapshot has been saved
    pub fn has_snapshot(&self) -> StorageResult<bool> {
        let read_txn = self.db.begin_read()?;
        let meta = read_txn.open_table(META)?;
        let found = meta.get(META_VERSION)?.is_some();
        Ok(found)
    }

    /// Row counts per table
    pub fn stats(&self) -> StorageResult<LedgerStoreStats> {
        let read_txn = self.db.begin_read()?;
        let stats = LedgerStoreStats {
            portfolios: read_txn.open_table(PORTFOLIOS)?.len()?,
            ciphertexts: read_txn.open_table(CIPHERTEXTS)?.len()?,
            grants: read_txn.open_table(ACL)?.len()?,
            decryption_requests: read_txn.open_table(DECRYPTION_REQUESTS)?.len()?,
        };
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use cipherfolio_fhe::PlaintextBackend;
    use cipherfolio_ledger::{Command, DecryptionAuthority, LedgerConfig, LedgerCore, ManualClock};
    use tempfile::tempdir;

    fn store() -> (tempfile::TempDir, LedgerStore) {
        let dir = tempdir().unwrap();
        let db = Database::create(dir.path().join("ledger.db")).unwrap();
        let store = LedgerStore::new(Arc::new(db)).unwrap();
        (dir, store)
    }

    fn populated() -> LedgerSnapshot {
        let backend = Arc::new(PlaintextBackend::new());
        let authority = DecryptionAuthority::generate(backend.clone());
        let core = LedgerCore::with_clock(
            LedgerConfig::default(),
            backend,
            authority.verifying_key(),
            Arc::new(ManualClock::new(1_000)),
        )
        .unwrap();

        let alice = Principal::from_label("alice");
        let bob = Principal::from_label("bob");
        core.execute(Command::CreatePortfolio { principal: alice }).unwrap();
        core.execute(Command::AddAsset {
            principal: alice,
            symbol: "BTC".into(),
            amount: 3,
            value: 90,
        })
        .unwrap();
        core.execute(Command::AuthorizeManager {
            principal: alice,
            manager: bob,
        })
        .unwrap();

        let handle = core.portfolios().encrypted_total_value(&alice).unwrap();
        core.execute(Command::RequestDecryption {
            handle,
            requester: alice,
        })
        .unwrap();
        core.snapshot()
    }

    #[test]
    fn test_empty_store_has_no_snapshot() {
        let (_dir, store) = store();
        assert!(!store.has_snapshot().unwrap());
        assert!(store.load_snapshot().unwrap().is_none());
        assert_eq!(store.stats().unwrap(), LedgerStoreStats::default());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let (_dir, store) = store();
        let snapshot = populated();

        store.save_snapshot(&snapshot).unwrap();
        assert_eq!(store.load_snapshot().unwrap(), Some(snapshot.clone()));

        let stats = store.stats().unwrap();
        assert_eq!(stats.portfolios, 1);
        assert_eq!(stats.ciphertexts, snapshot.ciphertexts.len() as u64);
        assert_eq!(stats.grants, snapshot.grants.len() as u64);
        assert_eq!(stats.decryption_requests, 1);
    }

    #[test]
    fn test_save_replaces_previous() {
        let (_dir, store) = store();
        store.save_snapshot(&populated()).unwrap();

        let mut smaller = populated();
        smaller.portfolios.clear();
        smaller.decryption.requests.clear();
        store.save_snapshot(&smaller).unwrap();

        assert_eq!(store.load_snapshot().unwrap(), Some(smaller));
        assert_eq!(store.stats().unwrap().portfolios, 0);
    }

    #[test]
    fn test_acl_key_roundtrip() {
        let grant = AccessGrant {
            handle: CiphertextHandle::from_bytes([4u8; 32]),
            principal: Principal::from_label("carol"),
            capability: Capability::Decrypt,
        };
        assert_eq!(parse_acl_key(&acl_key(&grant)).unwrap(), grant);
        assert!(parse_acl_key(&[0u8; 10]).is_err());
    }
}
