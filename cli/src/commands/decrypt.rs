//! Decrypt Commands - request, answer and read decryptions
//!
//! `fulfill` and `reject` play the external decryption authority using the
//! key material in the data directory.

use std::path::PathBuf;

use clap::{Args, Subcommand};
use tracing::warn;

use cipherfolio_ledger::{CiphertextHandle, Command, LedgerEvent, RequestId};

use crate::workspace::{parse_principal, Workspace};

/// Decryption operations
#[derive(Args)]
pub struct DecryptCommand {
    #[command(subcommand)]
    action: DecryptAction,
}

#[derive(Subcommand)]
enum DecryptAction {
    /// Ask for a handle to be decrypted
    Request {
        /// Requesting principal (needs Decrypt on the handle)
        #[arg(short, long)]
        requester: String,

        /// Handle to decrypt (hex)
        #[arg(long, conflicts_with = "total_of", required_unless_present = "total_of")]
        handle: Option<String>,

        /// Decrypt this principal's total value instead
        #[arg(long)]
        total_of: Option<String>,
    },

    /// Answer pending requests as the decryption authority
    Fulfill {
        /// Only this request (default: all pending)
        #[arg(long)]
        id: Option<RequestId>,
    },

    /// Refuse a pending request as the decryption authority
    Reject {
        #[arg(long)]
        id: RequestId,
    },

    /// Read (and consume) a fulfilled result
    Read {
        #[arg(long)]
        id: RequestId,

        #[arg(short, long)]
        requester: String,
    },

    /// List pending requests
    Pending,

    /// Drop pending requests older than the configured TTL
    Prune,
}

impl DecryptCommand {
    pub fn execute(self, config: Option<PathBuf>, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
        let ws = Workspace::open(config, data_dir)?;

        match self.action {
            DecryptAction::Request {
                requester,
                handle,
                total_of,
            } => {
                let requester = parse_principal(&requester)?;
                let handle = match (handle, total_of) {
                    (Some(h), _) => CiphertextHandle::from_hex(&h)?,
                    (None, Some(owner)) => ws
                        .core
                        .portfolios()
                        .encrypted_total_value(&parse_principal(&owner)?)?,
                    (None, None) => anyhow::bail!("Either --handle or --total-of is required"),
                };

                let event = ws.core.execute(Command::RequestDecryption { handle, requester })?;
                ws.commit()?;
                if let LedgerEvent::DecryptionRequested { request_id, .. } = event {
                    println!("✅ Decryption request {} pending", request_id);
                }
            }
            DecryptAction::Fulfill { id } => {
                let ids: Vec<RequestId> = match id {
                    Some(id) => vec![id],
                    None => ws
                        .core
                        .pending_decryptions()
                        .into_iter()
                        .map(|p| p.request.id)
                        .collect(),
                };

                let mut answered = 0;
                for id in ids {
                    let request = ws.core.decryption_request(id)?;
                    let ciphertext = ws.core.ciphertext(&request.handle)?;
                    match ws.authority.process(&request, &ciphertext) {
                        Ok(answer) => {
                            ws.core.execute(Command::FulfillDecryption {
                                request_id: answer.request_id,
                                plaintext: answer.plaintext,
                                proof: answer.proof,
                            })?;
                            answered += 1;
                        }
                        Err(e) => warn!("Could not answer request {}: {}", id, e),
                    }
                }
                ws.commit()?;
                println!("✅ Fulfilled {} request(s)", answered);
            }
            DecryptAction::Reject { id } => {
                let request = ws.core.decryption_request(id)?;
                let proof = ws.authority.reject(&request);
                ws.core.execute(Command::RejectDecryption { request_id: id, proof })?;
                ws.commit()?;
                println!("✅ Request {} rejected", id);
            }
            DecryptAction::Read { id, requester } => {
                let requester = parse_principal(&requester)?;
                let plaintext = ws.core.take_decryption_result(id, &requester)?;
                ws.commit()?;
                println!("{}", plaintext);
            }
            DecryptAction::Pending => {
                let pending = ws.core.pending_decryptions();
                if pending.is_empty() {
                    println!("No pending requests");
                }
                for p in pending {
                    println!(
                        "#{:<6} handle={} requester=0x{} age={}s",
                        p.request.id,
                        p.request.handle.to_hex(),
                        p.request.requester.to_hex(),
                        p.age_ms / 1000
                    );
                }
            }
            DecryptAction::Prune => {
                let pruned = ws.core.prune_stale_decryptions();
                ws.commit()?;
                println!("✅ Pruned {} stale request(s)", pruned.len());
            }
        }

        Ok(())
    }
}
