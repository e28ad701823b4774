//! Per-principal confidential portfolios
//!
//! Each principal owns one slot. Writers on a slot are serialized by a mutex
//! and work on a private copy of the portfolio; the copy replaces the shared
//! `Arc` only after every step of the transition has succeeded. Readers
//! clone the `Arc`, so they see either the state before a transition or the
//! state after it, never an intermediate total. Ciphertexts and grants made
//! by a failed transition are rolled back, and the event of a committed one
//! is published before the slot's writer lock is released.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::arithmetic::{ComputeScope, HomomorphicArithmeticEngine};
use crate::clock::TimestampIssuer;
use crate::errors::{LedgerError, LedgerResult};
use crate::events::LedgerEvent;
use crate::types::{Capability, CiphertextHandle, Principal, Timestamp};

/// One encrypted holding
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRecord {
    pub symbol: String,
    pub encrypted_amount: CiphertextHandle,
    pub encrypted_value: CiphertextHandle,
    pub last_update: Timestamp,
}

/// A principal's holdings and their encrypted running total
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Portfolio {
    pub principal: Principal,
    pub created_at: Timestamp,
    /// Keyed by symbol, so enumeration is lexicographic
    pub assets: BTreeMap<String, AssetRecord>,
    /// Homomorphic sum of every asset's `encrypted_value`
    pub total_value: CiphertextHandle,
    pub managers: BTreeSet<Principal>,
}

impl Portfolio {
    pub fn asset(&self, symbol: &str) -> LedgerResult<&AssetRecord> {
        self.assets.get(symbol).ok_or_else(|| LedgerError::AssetNotFound {
            principal: self.principal,
            symbol: symbol.to_string(),
        })
    }

    pub fn symbols(&self) -> Vec<String> {
        self.assets.keys().cloned().collect()
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Principals that may decrypt this portfolio's handles
    pub fn readers(&self) -> Vec<Principal> {
        std::iter::once(self.principal)
            .chain(self.managers.iter().copied())
            .collect()
    }

    /// Whether `caller` may submit transitions for this portfolio
    pub fn can_act(&self, caller: &Principal) -> bool {
        *caller == self.principal || self.managers.contains(caller)
    }

    /// Every handle currently reachable from this portfolio
    pub fn live_handles(&self) -> Vec<CiphertextHandle> {
        let mut out = Vec::with_capacity(1 + self.assets.len() * 2);
        out.push(self.total_value);
        for record in self.assets.values() {
            out.push(record.encrypted_amount);
            out.push(record.encrypted_value);
        }
        out
    }

    fn authorize(&self, caller: &Principal) -> LedgerResult<()> {
        if self.can_act(caller) {
            Ok(())
        } else {
            Err(LedgerError::not_authorized(
                *caller,
                format_args!("portfolio of {}", self.principal),
            ))
        }
    }
}

struct PortfolioSlot {
    writer: Mutex<()>,
    current: RwLock<Arc<Portfolio>>,
}

impl PortfolioSlot {
    fn new(portfolio: Portfolio) -> Self {
        Self {
            writer: Mutex::new(()),
            current: RwLock::new(Arc::new(portfolio)),
        }
    }

    fn read(&self) -> Arc<Portfolio> {
        self.current.read().clone()
    }
}

/// All portfolios, with the create/add/update/remove state machine
pub struct PortfolioLedger {
    engine: Arc<HomomorphicArithmeticEngine>,
    timestamps: Arc<TimestampIssuer>,
    slots: DashMap<Principal, Arc<PortfolioSlot>>,
    max_symbol_len: usize,
    events: Option<broadcast::Sender<LedgerEvent>>,
}

impl PortfolioLedger {
    pub fn new(
        engine: Arc<HomomorphicArithmeticEngine>,
        timestamps: Arc<TimestampIssuer>,
        max_symbol_len: usize,
    ) -> Self {
        Self {
            engine,
            timestamps,
            slots: DashMap::new(),
            max_symbol_len,
            events: None,
        }
    }

    /// Publish committed transitions on `events`
    pub fn with_events(mut self, events: broadcast::Sender<LedgerEvent>) -> Self {
        self.events = Some(events);
        self
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    /// `NoPortfolio -> Active` with an encrypted zero total
    pub fn create_portfolio(&self, principal: Principal) -> LedgerResult<Timestamp> {
        if principal.is_core() {
            return Err(LedgerError::not_authorized(principal, "portfolio ownership"));
        }

        match self.slots.entry(principal) {
            Entry::Occupied(_) => Err(LedgerError::AlreadyExists { principal }),
            Entry::Vacant(vacant) => {
                let total_value = self.engine.encrypt(0, &principal, "total", &[principal])?;
                let created_at = self.timestamps.issue();
                let _slot = vacant.insert(Arc::new(PortfolioSlot::new(Portfolio {
                    principal,
                    created_at,
                    assets: BTreeMap::new(),
                    total_value,
                    managers: BTreeSet::new(),
                })));
                info!("Created portfolio for {}", principal);
                self.publish(LedgerEvent::PortfolioCreated {
                    principal,
                    ts: created_at,
                });
                Ok(created_at)
            }
        }
    }

    /// Insert a new holding and add its value into the total
    pub fn add_asset(
        &self,
        caller: &Principal,
        principal: Principal,
        symbol: &str,
        amount: u64,
        value: u64,
    ) -> LedgerResult<Timestamp> {
        self.transact(
            principal,
            |draft, scope| {
                draft.authorize(caller)?;
                self.validate_symbol(symbol)?;
                if draft.assets.contains_key(symbol) {
                    return Err(LedgerError::DuplicateAsset {
                        principal,
                        symbol: symbol.to_string(),
                    });
                }

                let core = Principal::core();
                let readers = draft.readers();
                let encrypted_amount = scope.encrypt(amount, &principal, "amount", &readers)?;
                let encrypted_value = scope.encrypt(value, &principal, "value", &readers)?;
                let total = scope.add(&core, &draft.total_value, &encrypted_value, &readers)?;

                let ts = self.timestamps.issue();
                draft.total_value = total;
                draft.assets.insert(
                    symbol.to_string(),
                    AssetRecord {
                        symbol: symbol.to_string(),
                        encrypted_amount,
                        encrypted_value,
                        last_update: ts,
                    },
                );
                debug!("Added {} to portfolio of {}", symbol, principal);
                Ok(ts)
            },
            |ts| LedgerEvent::AssetAdded {
                principal,
                symbol: symbol.to_string(),
                ts: *ts,
            },
        )
    }

    /// Replace a holding: subtract the old value, then add the new one
    pub fn update_asset(
        &self,
        caller: &Principal,
        principal: Principal,
        symbol: &str,
        amount: u64,
        value: u64,
    ) -> LedgerResult<Timestamp> {
        self.transact(
            principal,
            |draft, scope| {
                draft.authorize(caller)?;
                let old_value = draft.asset(symbol)?.encrypted_value;

                let core = Principal::core();
                let readers = draft.readers();
                let without_old = scope.sub(&core, &draft.total_value, &old_value, &readers)?;
                let encrypted_amount = scope.encrypt(amount, &principal, "amount", &readers)?;
                let encrypted_value = scope.encrypt(value, &principal, "value", &readers)?;
                let total = scope.add(&core, &without_old, &encrypted_value, &readers)?;

                let ts = self.timestamps.issue();
                draft.total_value = total;
                if let Some(record) = draft.assets.get_mut(symbol) {
                    record.encrypted_amount = encrypted_amount;
                    record.encrypted_value = encrypted_value;
                    record.last_update = ts;
                }
                debug!("Updated {} in portfolio of {}", symbol, principal);
                Ok(ts)
            },
            |ts| LedgerEvent::AssetUpdated {
                principal,
                symbol: symbol.to_string(),
                ts: *ts,
            },
        )
    }

    /// Erase a holding and subtract its value from the total
    pub fn remove_asset(
        &self,
        caller: &Principal,
        principal: Principal,
        symbol: &str,
    ) -> LedgerResult<Timestamp> {
        self.transact(
            principal,
            |draft, scope| {
                draft.authorize(caller)?;
                let old_value = draft.asset(symbol)?.encrypted_value;

                let readers = draft.readers();
                let total = scope.sub(&Principal::core(), &draft.total_value, &old_value, &readers)?;

                let ts = self.timestamps.issue();
                draft.total_value = total;
                draft.assets.remove(symbol);
                debug!("Removed {} from portfolio of {}", symbol, principal);
                Ok(ts)
            },
            |ts| LedgerEvent::AssetRemoved {
                principal,
                symbol: symbol.to_string(),
                ts: *ts,
            },
        )
    }

    /// Let `manager` act on the owner's portfolio and read its handles.
    /// Returns false if `manager` was already authorized.
    pub fn authorize_manager(
        &self,
        caller: &Principal,
        owner: Principal,
        manager: Principal,
    ) -> LedgerResult<bool> {
        self.transact(
            owner,
            |draft, _| {
                if *caller != owner {
                    return Err(LedgerError::not_authorized(
                        *caller,
                        format_args!("managers of {}", owner),
                    ));
                }
                if manager == owner || manager.is_core() {
                    return Err(LedgerError::InvalidManager {
                        principal: owner,
                        manager,
                    });
                }
                if !draft.managers.insert(manager) {
                    return Ok(false);
                }

                let acl = self.engine.acl();
                for handle in draft.live_handles() {
                    acl.grant(handle, manager, Capability::UseInComputation);
                    acl.grant(handle, manager, Capability::Decrypt);
                }
                info!("Authorized manager {} for {}", manager, owner);
                Ok(true)
            },
            |_| LedgerEvent::ManagerAuthorized {
                principal: owner,
                manager,
            },
        )
    }

    /// Withdraw a manager and its grants on the live handles.
    /// Returns false if `manager` was not authorized.
    pub fn revoke_manager(
        &self,
        caller: &Principal,
        owner: Principal,
        manager: Principal,
    ) -> LedgerResult<bool> {
        self.transact(
            owner,
            |draft, _| {
                if *caller != owner {
                    return Err(LedgerError::not_authorized(
                        *caller,
                        format_args!("managers of {}", owner),
                    ));
                }
                if !draft.managers.remove(&manager) {
                    return Ok(false);
                }

                let acl = self.engine.acl();
                for handle in draft.live_handles() {
                    acl.revoke(handle, manager, Capability::UseInComputation);
                    acl.revoke(handle, manager, Capability::Decrypt);
                }
                info!("Revoked manager {} for {}", manager, owner);
                Ok(true)
            },
            |_| LedgerEvent::ManagerRevoked {
                principal: owner,
                manager,
            },
        )
    }

    // ------------------------------------------------------------------
    // Encrypted comparisons
    // ------------------------------------------------------------------

    /// Encrypted `value(first) > value(second)`
    pub fn compare_asset_values(
        &self,
        caller: &Principal,
        principal: Principal,
        first: &str,
        second: &str,
    ) -> LedgerResult<CiphertextHandle> {
        let portfolio = self.portfolio(&principal)?;
        portfolio.authorize(caller)?;
        let a = portfolio.asset(first)?.encrypted_value;
        let b = portfolio.asset(second)?.encrypted_value;
        self.engine
            .compare_greater(&Principal::core(), &a, &b, &portfolio.readers())
    }

    /// Encrypted `total > threshold`
    pub fn compare_total_against(
        &self,
        caller: &Principal,
        principal: Principal,
        threshold: u64,
    ) -> LedgerResult<CiphertextHandle> {
        let portfolio = self.portfolio(&principal)?;
        portfolio.authorize(caller)?;
        let readers = portfolio.readers();
        let mut scope = self.engine.scope();
        let bound = scope.encrypt(threshold, &principal, "threshold", &readers)?;
        let result =
            scope.compare_greater(&Principal::core(), &portfolio.total_value, &bound, &readers)?;
        scope.commit();
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn portfolio_exists(&self, principal: &Principal) -> bool {
        self.slots.contains_key(principal)
    }

    /// Committed state of a portfolio
    pub fn portfolio(&self, principal: &Principal) -> LedgerResult<Arc<Portfolio>> {
        self.slots
            .get(principal)
            .map(|slot| slot.read())
            .ok_or(LedgerError::PortfolioNotFound {
                principal: *principal,
            })
    }

    pub fn asset_symbols(&self, principal: &Principal) -> LedgerResult<Vec<String>> {
        Ok(self.portfolio(principal)?.symbols())
    }

    pub fn encrypted_asset_amount(
        &self,
        principal: &Principal,
        symbol: &str,
    ) -> LedgerResult<CiphertextHandle> {
        Ok(self.portfolio(principal)?.asset(symbol)?.encrypted_amount)
    }

    pub fn encrypted_asset_value(
        &self,
        principal: &Principal,
        symbol: &str,
    ) -> LedgerResult<CiphertextHandle> {
        Ok(self.portfolio(principal)?.asset(symbol)?.encrypted_value)
    }

    pub fn encrypted_total_value(&self, principal: &Principal) -> LedgerResult<CiphertextHandle> {
        Ok(self.portfolio(principal)?.total_value)
    }

    pub fn asset_last_update(&self, principal: &Principal, symbol: &str) -> LedgerResult<Timestamp> {
        Ok(self.portfolio(principal)?.asset(symbol)?.last_update)
    }

    pub fn asset_count(&self, principal: &Principal) -> LedgerResult<usize> {
        Ok(self.portfolio(principal)?.asset_count())
    }

    pub fn created_at(&self, principal: &Principal) -> LedgerResult<Timestamp> {
        Ok(self.portfolio(principal)?.created_at)
    }

    pub fn managers(&self, principal: &Principal) -> LedgerResult<Vec<Principal>> {
        Ok(self.portfolio(principal)?.managers.iter().copied().collect())
    }

    /// Owners of every portfolio, sorted
    pub fn list_portfolios(&self) -> Vec<Principal> {
        let mut out: Vec<Principal> = self.slots.iter().map(|e| *e.key()).collect();
        out.sort();
        out
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // ------------------------------------------------------------------
    // Snapshot support
    // ------------------------------------------------------------------

    /// Committed state of every portfolio, sorted by owner
    pub fn export(&self) -> Vec<Portfolio> {
        let mut out: Vec<Portfolio> = self
            .slots
            .iter()
            .map(|slot| (*slot.read()).clone())
            .collect();
        out.sort_by(|a, b| a.principal.cmp(&b.principal));
        out
    }

    pub fn import(&self, portfolios: impl IntoIterator<Item = Portfolio>) {
        for portfolio in portfolios {
            self.timestamps.observe(portfolio.created_at);
            for record in portfolio.assets.values() {
                self.timestamps.observe(record.last_update);
            }
            self.slots
                .insert(portfolio.principal, Arc::new(PortfolioSlot::new(portfolio)));
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn validate_symbol(&self, symbol: &str) -> LedgerResult<()> {
        let len = symbol.chars().count();
        let reason = if len == 0 {
            "empty".to_string()
        } else if len > self.max_symbol_len {
            format!("longer than {} characters", self.max_symbol_len)
        } else {
            return Ok(());
        };
        Err(LedgerError::InvalidSymbol {
            symbol: symbol.to_string(),
            reason,
        })
    }

    fn publish(&self, event: LedgerEvent) {
        if let Some(events) = &self.events {
            // No subscribers is not an error
            let _ = events.send(event);
        }
    }

    /// Run `f` on a private copy of the portfolio and swap it in on success.
    /// The scope handed to `f` is committed only when `f` returns `Ok`.
    fn transact<T>(
        &self,
        principal: Principal,
        f: impl FnOnce(&mut Portfolio, &mut ComputeScope<'_>) -> LedgerResult<T>,
        event: impl FnOnce(&T) -> LedgerEvent,
    ) -> LedgerResult<T> {
        let slot = self
            .slots
            .get(&principal)
            .map(|slot| slot.value().clone())
            .ok_or(LedgerError::PortfolioNotFound { principal })?;

        let _writer = slot.writer.lock();
        let mut draft = (*slot.read()).clone();
        let mut scope = self.engine.scope();
        let out = f(&mut draft, &mut scope)?;
        scope.commit();
        *slot.current.write() = Arc::new(draft);
        self.publish(event(&out));
        Ok(out)
    }
}

impl std::fmt::Debug for PortfolioLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioLedger")
            .field("portfolios", &self.slots.len())
            .field("max_symbol_len", &self.max_symbol_len)
            .finish()
    }
}
