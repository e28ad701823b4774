//! Status Command - Show ledger status

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use crate::workspace::Workspace;

/// Show ledger status
#[derive(Args)]
pub struct StatusCommand {
    /// Also list pending decryption requests
    #[arg(short, long)]
    verbose: bool,

    /// Print as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct StatusReport {
    data_dir: String,
    database: String,
    scheme: String,
    authority_key: String,
    portfolios: usize,
    ciphertexts: usize,
    grants: usize,
    requests: usize,
    pending: Vec<PendingEntry>,
}

#[derive(Serialize)]
struct PendingEntry {
    id: u64,
    handle: String,
    requester: String,
    age_ms: u64,
}

impl StatusCommand {
    pub fn execute(self, config: Option<PathBuf>, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
        let ws = Workspace::open(config, data_dir)?;
        let stats = ws.storage().stats()?;

        let report = StatusReport {
            data_dir: ws.data_dir.display().to_string(),
            database: ws.db_path().display().to_string(),
            scheme: ws.config.fhe.scheme.to_string(),
            authority_key: hex::encode(ws.authority.verifying_key().to_bytes()),
            portfolios: ws.core.portfolios().len(),
            ciphertexts: ws.core.store().len(),
            grants: ws.core.acl().len(),
            requests: ws.core.decryption().len(),
            pending: ws
                .core
                .pending_decryptions()
                .into_iter()
                .map(|p| PendingEntry {
                    id: p.request.id,
                    handle: p.request.handle.to_hex(),
                    requester: p.request.requester.to_hex(),
                    age_ms: p.age_ms,
                })
                .collect(),
        };

        if self.json {
            println!("{}", serde_json::to_string_pretty(&report)?);
            return Ok(());
        }

        println!("Data directory: {}", report.data_dir);
        println!("Database:       {}", report.database);
        println!("Scheme:         {}", report.scheme);
        println!("Authority key:  0x{}", report.authority_key);
        println!();
        println!("Portfolios:     {}", report.portfolios);
        println!("Ciphertexts:    {}", report.ciphertexts);
        println!("Grants:         {}", report.grants);
        println!("Requests:       {} ({} pending)", report.requests, report.pending.len());
        println!(
            "Stored:         {} portfolios, {} ciphertexts, {} grants",
            stats.ledger.portfolios, stats.ledger.ciphertexts, stats.ledger.grants
        );

        if self.verbose {
            for p in &report.pending {
                println!("  #{} for 0x{} ({}s old)", p.id, p.requester, p.age_ms / 1000);
            }
        }

        Ok(())
    }
}
