//! Ledger core: composition of all components behind one command interface

use std::sync::Arc;

use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use cipherfolio_fhe::{Ciphertext, FHEError, HomomorphicBackend};

use crate::acl::AccessControlList;
use crate::arithmetic::HomomorphicArithmeticEngine;
use crate::clock::{Clock, SystemClock, TimestampIssuer};
use crate::commands::{Command, Query, QueryResponse};
use crate::decryption::{DecryptionRequest, DecryptionRequestCoordinator, PendingRequest, RequestId};
use crate::errors::{LedgerError, LedgerResult};
use crate::events::LedgerEvent;
use crate::portfolio::PortfolioLedger;
use crate::snapshot::{LedgerSnapshot, SNAPSHOT_VERSION};
use crate::store::CiphertextStore;
use crate::types::{CiphertextHandle, Principal};

/// Ledger configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Longest accepted asset symbol, in characters
    pub max_symbol_len: usize,
    /// Age after which pending decryption requests may be pruned
    pub decryption_ttl_ms: u64,
    /// Buffered events per subscriber
    pub event_capacity: usize,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            max_symbol_len: 10,
            decryption_ttl_ms: 24 * 60 * 60 * 1000,
            event_capacity: 1024,
        }
    }
}

impl LedgerConfig {
    pub fn validate(&self) -> LedgerResult<()> {
        if self.max_symbol_len == 0 || self.max_symbol_len > 10 {
            return Err(LedgerError::Config(format!(
                "max_symbol_len must be in 1..=10, got {}",
                self.max_symbol_len
            )));
        }
        if self.event_capacity == 0 {
            return Err(LedgerError::Config("event_capacity must be non-zero".into()));
        }
        Ok(())
    }
}

/// The confidential portfolio ledger
pub struct LedgerCore {
    config: LedgerConfig,
    store: Arc<CiphertextStore>,
    acl: Arc<AccessControlList>,
    engine: Arc<HomomorphicArithmeticEngine>,
    portfolios: PortfolioLedger,
    decryption: DecryptionRequestCoordinator,
    timestamps: Arc<TimestampIssuer>,
    events: broadcast::Sender<LedgerEvent>,
}

impl LedgerCore {
    /// Create an empty ledger on the system clock
    pub fn new(
        config: LedgerConfig,
        backend: Arc<dyn HomomorphicBackend>,
        authority_key: VerifyingKey,
    ) -> LedgerResult<Self> {
        Self::with_clock(config, backend, authority_key, Arc::new(SystemClock))
    }

    /// Create an empty ledger on a given clock
    pub fn with_clock(
        config: LedgerConfig,
        backend: Arc<dyn HomomorphicBackend>,
        authority_key: VerifyingKey,
        clock: Arc<dyn Clock>,
    ) -> LedgerResult<Self> {
        config.validate()?;

        let store = Arc::new(CiphertextStore::new(backend));
        let acl = Arc::new(AccessControlList::new());
        let engine = Arc::new(HomomorphicArithmeticEngine::new(store.clone(), acl.clone()));
        let timestamps = Arc::new(TimestampIssuer::new(clock));
        let (events, _) = broadcast::channel(config.event_capacity);
        let portfolios = PortfolioLedger::new(engine.clone(), timestamps.clone(), config.max_symbol_len)
            .with_events(events.clone());
        let decryption = DecryptionRequestCoordinator::new(acl.clone(), authority_key, timestamps.clone());

        info!("Ledger core ready (scheme={})", store.scheme());

        Ok(Self {
            config,
            store,
            acl,
            engine,
            portfolios,
            decryption,
            timestamps,
            events,
        })
    }

    /// Rebuild a ledger from a snapshot
    pub fn restore(
        snapshot: LedgerSnapshot,
        config: LedgerConfig,
        backend: Arc<dyn HomomorphicBackend>,
        authority_key: VerifyingKey,
        clock: Arc<dyn Clock>,
    ) -> LedgerResult<Self> {
        snapshot.check_version()?;
        if snapshot.scheme != backend.scheme() {
            return Err(FHEError::SchemeMismatch {
                expected: backend.scheme().to_string(),
                got: snapshot.scheme.to_string(),
            }
            .into());
        }

        let core = Self::with_clock(config, backend, authority_key, clock)?;
        core.store.import(snapshot.ciphertexts)?;
        core.acl.import(snapshot.grants);
        core.portfolios.import(snapshot.portfolios);
        core.decryption.import(snapshot.decryption);
        core.timestamps.observe(snapshot.last_timestamp);

        info!(
            "Restored ledger: {} portfolios, {} ciphertexts, {} grants",
            core.portfolios.len(),
            core.store.len(),
            core.acl.len()
        );
        Ok(core)
    }

    /// Export the committed state
    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            version: SNAPSHOT_VERSION,
            scheme: self.store.scheme(),
            portfolios: self.portfolios.export(),
            ciphertexts: self.store.export(),
            grants: self.acl.export(),
            decryption: self.decryption.export(),
            last_timestamp: self.timestamps.last_issued(),
        }
    }

    /// Run a command as its default caller
    pub fn execute(&self, command: Command) -> LedgerResult<LedgerEvent> {
        let caller = command.default_caller();
        self.dispatch(caller, command)
    }

    /// Run a command on behalf of `caller`
    pub fn execute_as(&self, caller: Principal, command: Command) -> LedgerResult<LedgerEvent> {
        self.dispatch(Some(caller), command)
    }

    fn dispatch(&self, caller: Option<Principal>, command: Command) -> LedgerResult<LedgerEvent> {
        let event = self.apply(caller, command)?;
        debug!("Committed {}", event.name());
        // Slot transitions were already published under the slot's writer lock
        if !event.is_slot_transition() {
            // No subscribers is not an error
            let _ = self.events.send(event.clone());
        }
        Ok(event)
    }

    fn apply(&self, caller: Option<Principal>, command: Command) -> LedgerResult<LedgerEvent> {
        let acting = |fallback: Principal| caller.unwrap_or(fallback);

        match command {
            Command::CreatePortfolio { principal } => {
                let caller = acting(principal);
                if caller != principal {
                    return Err(LedgerError::not_authorized(
                        caller,
                        format_args!("creation of portfolio for {}", principal),
                    ));
                }
                let ts = self.portfolios.create_portfolio(principal)?;
                Ok(LedgerEvent::PortfolioCreated { principal, ts })
            }
            Command::AddAsset {
                principal,
                symbol,
                amount,
                value,
            } => {
                let ts = self
                    .portfolios
                    .add_asset(&acting(principal), principal, &symbol, amount, value)?;
                Ok(LedgerEvent::AssetAdded { principal, symbol, ts })
            }
            Command::UpdateAsset {
                principal,
                symbol,
                amount,
                value,
            } => {
                let ts = self
                    .portfolios
                    .update_asset(&acting(principal), principal, &symbol, amount, value)?;
                Ok(LedgerEvent::AssetUpdated { principal, symbol, ts })
            }
            Command::RemoveAsset { principal, symbol } => {
                let ts = self
                    .portfolios
                    .remove_asset(&acting(principal), principal, &symbol)?;
                Ok(LedgerEvent::AssetRemoved { principal, symbol, ts })
            }
            Command::AuthorizeManager { principal, manager } => {
                self.portfolios
                    .authorize_manager(&acting(principal), principal, manager)?;
                Ok(LedgerEvent::ManagerAuthorized { principal, manager })
            }
            Command::RevokeManager { principal, manager } => {
                self.portfolios
                    .revoke_manager(&acting(principal), principal, manager)?;
                Ok(LedgerEvent::ManagerRevoked { principal, manager })
            }
            Command::CompareAssetValues {
                principal,
                first,
                second,
            } => {
                let result = self.portfolios.compare_asset_values(
                    &acting(principal),
                    principal,
                    &first,
                    &second,
                )?;
                Ok(LedgerEvent::ComparisonComputed { principal, result })
            }
            Command::CompareTotalAgainst {
                principal,
                threshold,
            } => {
                let result = self
                    .portfolios
                    .compare_total_against(&acting(principal), principal, threshold)?;
                Ok(LedgerEvent::ComparisonComputed { principal, result })
            }
            Command::RequestDecryption { handle, requester } => {
                let caller = acting(requester);
                if caller != requester {
                    return Err(LedgerError::not_authorized(
                        caller,
                        format_args!("decryption on behalf of {}", requester),
                    ));
                }
                let request = self.decryption.request_decryption(handle, requester)?;
                Ok(LedgerEvent::DecryptionRequested {
                    request_id: request.id,
                    handle,
                })
            }
            Command::FulfillDecryption {
                request_id,
                plaintext,
                proof,
            } => {
                self.decryption.fulfill(request_id, plaintext, &proof)?;
                Ok(LedgerEvent::DecryptionFulfilled { request_id })
            }
            Command::RejectDecryption { request_id, proof } => {
                self.decryption.reject(request_id, &proof)?;
                Ok(LedgerEvent::DecryptionRejected { request_id })
            }
        }
    }

    /// Answer a read-only query
    pub fn query(&self, query: Query) -> LedgerResult<QueryResponse> {
        let p = &self.portfolios;
        Ok(match query {
            Query::PortfolioExists(principal) => QueryResponse::Exists(p.portfolio_exists(&principal)),
            Query::GetAssetSymbols(principal) => QueryResponse::Symbols(p.asset_symbols(&principal)?),
            Query::GetEncryptedAssetAmount { principal, symbol } => {
                QueryResponse::Handle(p.encrypted_asset_amount(&principal, &symbol)?)
            }
            Query::GetEncryptedAssetValue { principal, symbol } => {
                QueryResponse::Handle(p.encrypted_asset_value(&principal, &symbol)?)
            }
            Query::GetEncryptedTotalValue(principal) => {
                QueryResponse::Handle(p.encrypted_total_value(&principal)?)
            }
            Query::GetAssetLastUpdate { principal, symbol } => {
                QueryResponse::Timestamp(p.asset_last_update(&principal, &symbol)?)
            }
            Query::GetAssetCount(principal) => QueryResponse::Count(p.asset_count(&principal)?),
            Query::GetPortfolioCreatedAt(principal) => QueryResponse::Timestamp(p.created_at(&principal)?),
            Query::GetManagers(principal) => QueryResponse::Principals(p.managers(&principal)?),
            Query::ListPortfolios => QueryResponse::Principals(p.list_portfolios()),
            Query::GetOpaqueCiphertext(handle) => QueryResponse::Ciphertext(self.store.get_opaque(&handle)?),
            Query::GetRequestStatus(id) => QueryResponse::Status(self.decryption.status(id)?),
        })
    }

    /// Receive every event committed from now on. Events of one portfolio
    /// arrive in the order their transitions committed.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Read a fulfilled decryption result once
    pub fn take_decryption_result(&self, request_id: RequestId, requester: &Principal) -> LedgerResult<u64> {
        self.decryption.take_result(request_id, requester)
    }

    pub fn decryption_request(&self, request_id: RequestId) -> LedgerResult<DecryptionRequest> {
        self.decryption.get_request(request_id)
    }

    pub fn pending_decryptions(&self) -> Vec<PendingRequest> {
        self.decryption.pending()
    }

    /// Drop pending requests older than the configured TTL
    pub fn prune_stale_decryptions(&self) -> Vec<RequestId> {
        self.decryption.prune_stale(self.config.decryption_ttl_ms)
    }

    /// Ciphertext transport for the decryption authority
    pub fn ciphertext(&self, handle: &CiphertextHandle) -> LedgerResult<Ciphertext> {
        self.store.ciphertext(handle)
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn portfolios(&self) -> &PortfolioLedger {
        &self.portfolios
    }

    pub fn store(&self) -> &Arc<CiphertextStore> {
        &self.store
    }

    pub fn acl(&self) -> &Arc<AccessControlList> {
        &self.acl
    }

    pub fn engine(&self) -> &Arc<HomomorphicArithmeticEngine> {
        &self.engine
    }

    pub fn decryption(&self) -> &DecryptionRequestCoordinator {
        &self.decryption
    }
}

impl std::fmt::Debug for LedgerCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerCore")
            .field("portfolios", &self.portfolios.len())
            .field("ciphertexts", &self.store.len())
            .field("grants", &self.acl.len())
            .field("decryption_requests", &self.decryption.len())
            .finish()
    }
}
