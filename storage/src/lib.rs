//! Cipherfolio Storage Layer
//!
//! Durable persistence for the confidential ledger.
//!
//! # Architecture
//!
//! The storage layer uses redb (an embedded database) for:
//! - Portfolios (encrypted handles only, never plaintexts)
//! - Content-addressed ciphertexts
//! - Access-control grants
//! - Decryption requests and unread results
//! - Snapshot metadata and integrity digest

mod error;
pub mod ledger;

pub use error::{StorageError, StorageResult};
pub use ledger::{LedgerStore, LedgerStoreStats};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use redb::Database;

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Database path
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./cipherfolio_data/ledger.db"),
        }
    }
}

/// Main storage interface
pub struct Storage {
    config: StorageConfig,
    pub ledger: LedgerStore,
}

impl Storage {
    /// Open or create storage at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> StorageResult<Self> {
        Self::with_config(StorageConfig {
            path: path.as_ref().to_path_buf(),
        })
    }

    /// Open storage with custom configuration
    pub fn with_config(config: StorageConfig) -> StorageResult<Self> {
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Arc::new(Database::create(&config.path)?);
        let ledger = LedgerStore::new(db)?;

        Ok(Self { config, ledger })
    }

    /// Get storage configuration
    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    /// Get database statistics
    pub fn stats(&self) -> StorageResult<StorageStats> {
        Ok(StorageStats {
            path: self.config.path.clone(),
            ledger: self.ledger.stats()?,
        })
    }
}

/// Storage statistics
#[derive(Debug, Clone)]
pub struct StorageStats {
    pub path: PathBuf,
    pub ledger: LedgerStoreStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_storage_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("test.db");

        let storage = Storage::open(&path).unwrap();
        let stats = storage.stats().unwrap();

        assert_eq!(stats.path, path);
        assert_eq!(stats.ledger.portfolios, 0);
    }

    #[test]
    fn test_reopen_keeps_tables() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        drop(Storage::open(&path).unwrap());
        let storage = Storage::open(&path).unwrap();
        assert!(!storage.ledger.has_snapshot().unwrap());
    }
}
