//! Portfolio Commands - create, mutate and inspect encrypted portfolios

use std::path::PathBuf;

use clap::{Args, Subcommand};

use cipherfolio_ledger::{Command, LedgerEvent, Principal};

use crate::workspace::{parse_principal, Workspace};

/// Portfolio operations
#[derive(Args)]
pub struct PortfolioCommand {
    #[command(subcommand)]
    action: PortfolioAction,
}

/// Target portfolio and optional acting manager
#[derive(Args)]
struct Target {
    /// Portfolio owner (label or 0x-prefixed hex)
    #[arg(short, long)]
    principal: String,

    /// Act as this manager instead of the owner
    #[arg(long = "as")]
    acting: Option<String>,
}

impl Target {
    fn resolve(&self) -> anyhow::Result<(Principal, Principal)> {
        let owner = parse_principal(&self.principal)?;
        let caller = match &self.acting {
            Some(a) => parse_principal(a)?,
            None => owner,
        };
        Ok((owner, caller))
    }
}

#[derive(Subcommand)]
enum PortfolioAction {
    /// Create an empty portfolio
    Create {
        #[arg(short, long)]
        principal: String,
    },

    /// Add a new asset
    Add {
        #[command(flatten)]
        target: Target,
        #[arg(short, long)]
        symbol: String,
        #[arg(long)]
        amount: u64,
        #[arg(long)]
        value: u64,
    },

    /// Replace an asset's amount and value
    Update {
        #[command(flatten)]
        target: Target,
        #[arg(short, long)]
        symbol: String,
        #[arg(long)]
        amount: u64,
        #[arg(long)]
        value: u64,
    },

    /// Remove an asset
    Remove {
        #[command(flatten)]
        target: Target,
        #[arg(short, long)]
        symbol: String,
    },

    /// List all portfolio owners
    List,

    /// Show a portfolio's encrypted handles
    Show {
        #[arg(short, long)]
        principal: String,
    },

    /// Authorize a manager
    Authorize {
        #[arg(short, long)]
        principal: String,
        #[arg(short, long)]
        manager: String,
    },

    /// Revoke a manager
    Revoke {
        #[arg(short, long)]
        principal: String,
        #[arg(short, long)]
        manager: String,
    },

    /// Encrypted comparison: is value(first) > value(second)?
    Compare {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        first: String,
        #[arg(long)]
        second: String,
    },

    /// Encrypted comparison: is the total above a threshold?
    Threshold {
        #[command(flatten)]
        target: Target,
        #[arg(long)]
        threshold: u64,
    },
}

impl PortfolioCommand {
    pub fn execute(self, config: Option<PathBuf>, data_dir: Option<PathBuf>) -> anyhow::Result<()> {
        let ws = Workspace::open(config, data_dir)?;

        let (caller, command) = match self.action {
            PortfolioAction::List => return list(&ws),
            PortfolioAction::Show { principal } => return show(&ws, parse_principal(&principal)?),
            PortfolioAction::Create { principal } => {
                let principal = parse_principal(&principal)?;
                (principal, Command::CreatePortfolio { principal })
            }
            PortfolioAction::Add {
                target,
                symbol,
                amount,
                value,
            } => {
                let (principal, caller) = target.resolve()?;
                (
                    caller,
                    Command::AddAsset {
                        principal,
                        symbol,
                        amount,
                        value,
                    },
                )
            }
            PortfolioAction::Update {
                target,
                symbol,
                amount,
                value,
            } => {
                let (principal, caller) = target.resolve()?;
                (
                    caller,
                    Command::UpdateAsset {
                        principal,
                        symbol,
                        amount,
                        value,
                    },
                )
            }
            PortfolioAction::Remove { target, symbol } => {
                let (principal, caller) = target.resolve()?;
                (caller, Command::RemoveAsset { principal, symbol })
            }
            PortfolioAction::Authorize { principal, manager } => {
                let principal = parse_principal(&principal)?;
                let manager = parse_principal(&manager)?;
                (principal, Command::AuthorizeManager { principal, manager })
            }
            PortfolioAction::Revoke { principal, manager } => {
                let principal = parse_principal(&principal)?;
                let manager = parse_principal(&manager)?;
                (principal, Command::RevokeManager { principal, manager })
            }
            PortfolioAction::Compare {
                target,
                first,
                second,
            } => {
                let (principal, caller) = target.resolve()?;
                (
                    caller,
                    Command::CompareAssetValues {
                        principal,
                        first,
                        second,
                    },
                )
            }
            PortfolioAction::Threshold { target, threshold } => {
                let (principal, caller) = target.resolve()?;
                (
                    caller,
                    Command::CompareTotalAgainst {
                        principal,
                        threshold,
                    },
                )
            }
        };

        let event = ws.core.execute_as(caller, command)?;
        ws.commit()?;
        report(&event);
        Ok(())
    }
}

fn report(event: &LedgerEvent) {
    match event {
        LedgerEvent::PortfolioCreated { principal, ts } => {
            println!("✅ Portfolio created for 0x{} at {}", principal.to_hex(), ts)
        }
        LedgerEvent::AssetAdded { symbol, ts, .. } => println!("✅ Added {} at {}", symbol, ts),
        LedgerEvent::AssetUpdated { symbol, ts, .. } => println!("✅ Updated {} at {}", symbol, ts),
        LedgerEvent::AssetRemoved { symbol, ts, .. } => println!("✅ Removed {} at {}", symbol, ts),
        LedgerEvent::ManagerAuthorized { manager, .. } => {
            println!("✅ Manager 0x{} authorized", manager.to_hex())
        }
        LedgerEvent::ManagerRevoked { manager, .. } => {
            println!("✅ Manager 0x{} revoked", manager.to_hex())
        }
        LedgerEvent::ComparisonComputed { result, .. } => {
            println!("✅ Encrypted result: {}", result.to_hex());
            println!(
                "   Decrypt with: cipherfolio decrypt request --requester <owner> --handle {}",
                result.to_hex()
            );
        }
        other => println!("✅ {}", other.name()),
    }
}

fn list(ws: &Workspace) -> anyhow::Result<()> {
    let owners = ws.core.portfolios().list_portfolios();
    if owners.is_empty() {
        println!("No portfolios");
        return Ok(());
    }
    for owner in owners {
        let portfolio = ws.core.portfolios().portfolio(&owner)?;
        println!("0x{}  assets={}", owner.to_hex(), portfolio.asset_count());
    }
    Ok(())
}

fn show(ws: &Workspace, principal: Principal) -> anyhow::Result<()> {
    let portfolio = ws.core.portfolios().portfolio(&principal)?;

    println!("Owner:        0x{}", principal.to_hex());
    println!("Created:      {}", portfolio.created_at);
    println!("Total value:  {} (encrypted)", portfolio.total_value.to_hex());
    for manager in &portfolio.managers {
        println!("Manager:      0x{}", manager.to_hex());
    }
    println!();

    if portfolio.assets.is_empty() {
        println!("No assets");
        return Ok(());
    }
    for record in portfolio.assets.values() {
        println!("{}  (updated {})", record.symbol, record.last_update);
        println!("  amount:  {}", record.encrypted_amount.to_hex());
        println!("  value:   {}", record.encrypted_value.to_hex());
    }
    println!();
    println!("Amounts and values are encrypted; use `cipherfolio decrypt request` to reveal one.");
    Ok(())
}
