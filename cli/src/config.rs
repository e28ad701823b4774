//! Ledger Configuration
//!
//! Handles loading and saving ledger configuration from TOML files.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cipherfolio_fhe::{FHEConfig, SchemeKind};
use cipherfolio_ledger::LedgerConfig;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Config not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Full ledger configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CipherfolioConfig {
    /// Portfolio ledger settings
    #[serde(default)]
    pub ledger: LedgerSettings,

    /// Encryption backend settings
    #[serde(default)]
    pub fhe: FheSettings,

    /// Decryption authority settings
    #[serde(default)]
    pub decryption: DecryptionSettings,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

impl CipherfolioConfig {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    /// Configuration using the given encryption scheme
    pub fn with_scheme(scheme: SchemeKind) -> Self {
        Self {
            fhe: FheSettings {
                scheme,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Ledger core configuration
    pub fn ledger_config(&self) -> LedgerConfig {
        LedgerConfig {
            max_symbol_len: self.ledger.max_symbol_len,
            decryption_ttl_ms: self.decryption.request_ttl_secs.saturating_mul(1000),
            event_capacity: self.ledger.event_capacity,
        }
    }

    /// Encryption backend configuration
    pub fn fhe_config(&self) -> FHEConfig {
        FHEConfig {
            scheme: self.fhe.scheme,
            max_op_count: self.fhe.max_op_count,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.ledger_config()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.fhe.max_op_count == 0 {
            return Err(ConfigError::Invalid(
                "max_op_count must be greater than 0".to_string(),
            ));
        }

        if !matches!(self.logging.format.as_str(), "text" | "json") {
            return Err(ConfigError::Invalid(format!(
                "Unknown log format: {}",
                self.logging.format
            )));
        }

        Ok(())
    }
}

/// Portfolio ledger settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSettings {
    /// Longest accepted asset symbol
    pub max_symbol_len: usize,

    /// Events buffered per subscriber
    pub event_capacity: usize,
}

impl Default for LedgerSettings {
    fn default() -> Self {
        let defaults = LedgerConfig::default();
        Self {
            max_symbol_len: defaults.max_symbol_len,
            event_capacity: defaults.event_capacity,
        }
    }
}

/// Encryption backend settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FheSettings {
    /// Scheme (sealed, plaintext)
    pub scheme: SchemeKind,

    /// Operation count above which ciphertexts are reported noisy
    pub max_op_count: u32,

    /// Sealed key file, relative to the data directory
    pub key_file: PathBuf,
}

impl Default for FheSettings {
    fn default() -> Self {
        let defaults = FHEConfig::default();
        Self {
            scheme: defaults.scheme,
            max_op_count: defaults.max_op_count,
            key_file: PathBuf::from("keys/sealed.key"),
        }
    }
}

/// Decryption authority settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionSettings {
    /// Authority signing key file, relative to the data directory
    pub authority_key_file: PathBuf,

    /// Age after which pending requests are pruned
    pub request_ttl_secs: u64,
}

impl Default for DecryptionSettings {
    fn default() -> Self {
        Self {
            authority_key_file: PathBuf::from("keys/authority.key"),
            request_ttl_secs: LedgerConfig::default().decryption_ttl_ms / 1000,
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Database file, relative to the data directory
    pub db_file: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_file: PathBuf::from("ledger.db"),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level
    pub level: String,

    /// Output format (text, json)
    pub format: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

/// Get default data directory
pub fn default_data_dir() -> PathBuf {
    directories::ProjectDirs::from("io", "cipherfolio", "cipherfolio")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".cipherfolio"))
}

/// Get default config file path
pub fn default_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("config.toml")
}
