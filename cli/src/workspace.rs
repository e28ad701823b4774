//! On-disk ledger workspace shared by the commands

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::debug;
use zeroize::Zeroizing;

use cipherfolio_fhe::{BackendPair, SchemeKind, SealedKeys};
use cipherfolio_ledger::{DecryptionAuthority, LedgerCore, Principal, SystemClock};
use cipherfolio_storage::Storage;

use crate::config::{default_config_path, default_data_dir, CipherfolioConfig};

/// Resolve the data directory and config file from the global flags
pub fn resolve_paths(config: Option<PathBuf>, data_dir: Option<PathBuf>) -> (PathBuf, PathBuf) {
    let data_dir = data_dir.unwrap_or_else(default_data_dir);
    let config = config.unwrap_or_else(|| default_config_path(&data_dir));
    (data_dir, config)
}

/// Parse a principal given as `0x`-prefixed hex or as a label
pub fn parse_principal(s: &str) -> anyhow::Result<Principal> {
    if s.starts_with("0x") && s.len() == 66 {
        Ok(Principal::from_hex(s)?)
    } else if s.is_empty() {
        anyhow::bail!("Principal must not be empty")
    } else {
        Ok(Principal::from_label(s))
    }
}

/// A loaded ledger with its storage and local decryption authority
pub struct Workspace {
    pub data_dir: PathBuf,
    pub config: CipherfolioConfig,
    pub core: LedgerCore,
    pub authority: DecryptionAuthority,
    storage: Storage,
}

impl Workspace {
    /// Open an initialized data directory and restore the saved ledger
    pub fn open(config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let (data_dir, config_path) = resolve_paths(config_path, data_dir);
        if !config_path.exists() {
            anyhow::bail!(
                "No ledger at {}. Run `cipherfolio init` first.",
                data_dir.display()
            );
        }
        let config = CipherfolioConfig::load(&config_path)?;

        let keys = match config.fhe.scheme {
            SchemeKind::Sealed => {
                let path = data_dir.join(&config.fhe.key_file);
                let bytes = Zeroizing::new(
                    fs::read(&path).with_context(|| format!("reading {}", path.display()))?,
                );
                Some(SealedKeys::from_bytes(&bytes)?)
            }
            SchemeKind::Plaintext => None,
        };
        let pair = BackendPair::from_config(&config.fhe_config(), keys.as_ref())?;

        let authority_path = data_dir.join(&config.decryption.authority_key_file);
        let authority_key = Zeroizing::new(
            fs::read(&authority_path).with_context(|| format!("reading {}", authority_path.display()))?,
        );
        let authority = DecryptionAuthority::from_key_bytes(pair.decryptor, &authority_key)?;

        let storage = Storage::open(data_dir.join(&config.storage.db_file))?;
        let core = match storage.ledger.load_snapshot()? {
            Some(snapshot) => LedgerCore::restore(
                snapshot,
                config.ledger_config(),
                pair.backend,
                authority.verifying_key(),
                Arc::new(SystemClock),
            )?,
            None => LedgerCore::new(config.ledger_config(), pair.backend, authority.verifying_key())?,
        };
        debug!("Opened workspace at {}", data_dir.display());

        Ok(Self {
            data_dir,
            config,
            core,
            authority,
            storage,
        })
    }

    /// Persist the current ledger state
    pub fn commit(&self) -> anyhow::Result<()> {
        self.storage.ledger.save_snapshot(&self.core.snapshot())?;
        Ok(())
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn db_path(&self) -> &Path {
        &self.storage.config().path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_principal() {
        let alice = Principal::from_label("alice");
        assert_eq!(parse_principal("alice").unwrap(), alice);
        assert_eq!(parse_principal(&format!("0x{}", alice.to_hex())).unwrap(), alice);
        assert!(parse_principal("").is_err());
    }
}
