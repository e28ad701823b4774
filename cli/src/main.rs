//! Cipherfolio CLI
//!
//! Command-line interface for a local confidential portfolio ledger.
//!
//! # Usage
//!
//! ```bash
//! # Initialize a ledger with the sealed scheme
//! cipherfolio init
//!
//! # Create a portfolio and add an asset
//! cipherfolio portfolio create --principal alice
//! cipherfolio portfolio add --principal alice --symbol BTC --amount 100000000 --value 5000000
//!
//! # Reveal the total through the decryption authority
//! cipherfolio decrypt request --requester alice --total-of alice
//! cipherfolio decrypt fulfill
//! cipherfolio decrypt read --id 1 --requester alice
//!
//! # Show ledger status
//! cipherfolio status
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod config;
mod logging;
mod workspace;

use commands::{DecryptCommand, InitCommand, PortfolioCommand, StatusCommand};
use config::CipherfolioConfig;

/// Cipherfolio confidential portfolio ledger
#[derive(Parser)]
#[command(name = "cipherfolio")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Confidential portfolio ledger over encrypted values", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(short, long, global = true, env = "CIPHERFOLIO_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new ledger
    Init(InitCommand),

    /// Portfolio operations
    Portfolio(PortfolioCommand),

    /// Decryption requests
    Decrypt(DecryptCommand),

    /// Show ledger status
    Status(StatusCommand),

    /// Show version information
    Version,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Logging settings from the config file, if one is readable
    let (_, config_path) = workspace::resolve_paths(cli.config.clone(), cli.data_dir.clone());
    let logging = CipherfolioConfig::load(&config_path)
        .map(|c| c.logging)
        .unwrap_or_default();
    let level = cli.log_level.clone().unwrap_or(logging.level);
    logging::init(&level, cli.json_logs || logging.format == "json")?;

    match cli.command {
        Commands::Init(cmd) => cmd.execute(cli.config, cli.data_dir),
        Commands::Portfolio(cmd) => cmd.execute(cli.config, cli.data_dir),
        Commands::Decrypt(cmd) => cmd.execute(cli.config, cli.data_dir),
        Commands::Status(cmd) => cmd.execute(cli.config, cli.data_dir),
        Commands::Version => {
            println!("cipherfolio {}", env!("CARGO_PKG_VERSION"));
            println!("Snapshot format: v{}", cipherfolio_ledger::SNAPSHOT_VERSION);
            Ok(())
        }
    }
}
