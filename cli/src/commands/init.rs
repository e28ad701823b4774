//! Init Command - Initialize a new ledger data directory

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Args;
use tracing::info;

use cipherfolio_fhe::{PlaintextBackend, SchemeKind, SealedKeys};
use cipherfolio_ledger::DecryptionAuthority;
use cipherfolio_storage::Storage;

use crate::config::CipherfolioConfig;
use crate::workspace::resolve_paths;

/// Initialize a new ledger
#[derive(Args)]
pub struct InitCommand {
    /// Encryption scheme (sealed, plaintext)
    #[arg(short, long, default_value = "sealed")]
    scheme: SchemeKind,

    /// Force overwrite existing configuration and keys
    #[arg(short, long)]
    force: bool,
}

#[cfg(unix)]
fn write_secret(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;
    use std::io::Write;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(bytes)
}

#[cfg(not(unix))]
fn write_secret(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    fs::write(path, bytes)
}

impl InitCommand {
    pub fn execute(self, config_path: Option<PathBuf>, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
        let (data_dir, config_path) = resolve_paths(config_path, data_dir);

        info!("Initializing cipherfolio ledger ({} scheme)", self.scheme);
        info!("Data directory: {}", data_dir.display());

        if config_path.exists() && !self.force {
            anyhow::bail!(
                "Ledger already initialized at {}. Use --force to overwrite.",
                data_dir.display()
            );
        }

        let config = CipherfolioConfig::with_scheme(self.scheme);
        let key_path = data_dir.join(&config.fhe.key_file);
        let authority_path = data_dir.join(&config.decryption.authority_key_file);
        let db_path = data_dir.join(&config.storage.db_file);

        fs::create_dir_all(&data_dir)?;
        for path in [&key_path, &authority_path] {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
        }

        if self.force && db_path.exists() {
            fs::remove_file(&db_path)?;
        }

        if self.scheme == SchemeKind::Sealed {
            let keys = SealedKeys::generate()?;
            write_secret(&key_path, &keys.to_bytes())?;
            info!("Sealed key {} written", hex::encode(&keys.key_id()[..8]));
        }

        // The signing key does not depend on the scheme's decryptor
        let authority = DecryptionAuthority::generate(Arc::new(PlaintextBackend::new()));
        write_secret(&authority_path, authority.key_bytes().as_slice())?;

        config.save(&config_path)?;
        Storage::open(&db_path)?;

        info!("Configuration saved to {}", config_path.display());

        println!();
        println!("✅ cipherfolio ledger initialized");
        println!();
        println!("Configuration:  {}", config_path.display());
        println!("Database:       {}", db_path.display());
        println!("Scheme:         {}", self.scheme);
        println!(
            "Authority key:  0x{}",
            hex::encode(authority.verifying_key().to_bytes())
        );
        println!();
        println!("Create a portfolio with:");
        println!(
            "  cipherfolio --data-dir {} portfolio create --principal alice",
            data_dir.display()
        );

        Ok(())
    }
}
