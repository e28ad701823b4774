//! Access control over ciphertext handles
//!
//! Default deny: a principal holds a capability on a handle only after an
//! explicit grant. Grants and revocations are idempotent.

use std::collections::BTreeMap;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::errors::{LedgerError, LedgerResult};
use crate::types::{AccessGrant, Capability, CapabilitySet, CiphertextHandle, Principal};

/// Capability table keyed by handle
#[derive(Debug, Default)]
pub struct AccessControlList {
    entries: DashMap<CiphertextHandle, BTreeMap<Principal, CapabilitySet>>,
}

impl AccessControlList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a grant; returns true if it was not already held
    pub fn grant(&self, handle: CiphertextHandle, principal: Principal, capability: Capability) -> bool {
        let added = self
            .entries
            .entry(handle)
            .or_default()
            .entry(principal)
            .or_default()
            .insert(capability);
        if added {
            trace!("Granted {} on {} to {}", capability, handle, principal);
        }
        added
    }

    /// Remove a grant; returns true if it was held
    pub fn revoke(&self, handle: CiphertextHandle, principal: Principal, capability: Capability) -> bool {
        let (removed, now_empty) = match self.entries.get_mut(&handle) {
            Some(mut holders) => {
                let removed = match holders.get_mut(&principal) {
                    Some(set) => {
                        let removed = set.remove(capability);
                        if set.is_empty() {
                            holders.remove(&principal);
                        }
                        removed
                    }
                    None => false,
                };
                (removed, holders.is_empty())
            }
            None => return false,
        };

        if now_empty {
            self.entries.remove_if(&handle, |_, holders| holders.is_empty());
        }
        if removed {
            debug!("Revoked {} on {} from {}", capability, handle, principal);
        }
        removed
    }

    /// Whether `principal` holds `capability` on `handle`
    pub fn check(&self, handle: &CiphertextHandle, principal: &Principal, capability: Capability) -> bool {
        self.entries
            .get(handle)
            .and_then(|holders| holders.get(principal).map(|set| set.contains(capability)))
            .unwrap_or(false)
    }

    /// Fail with `NotAuthorized` unless the grant exists
    pub fn require(
        &self,
        handle: &CiphertextHandle,
        principal: &Principal,
        capability: Capability,
    ) -> LedgerResult<()> {
        if self.check(handle, principal, capability) {
            Ok(())
        } else {
            Err(LedgerError::not_authorized(
                *principal,
                format_args!("{} on {}", capability, handle),
            ))
        }
    }

    /// Capabilities held on a handle, grouped by principal
    pub fn holders(&self, handle: &CiphertextHandle) -> BTreeMap<Principal, CapabilitySet> {
        self.entries
            .get(handle)
            .map(|h| h.value().clone())
            .unwrap_or_default()
    }

    /// Every grant on a handle
    pub fn grants_for(&self, handle: &CiphertextHandle) -> Vec<AccessGrant> {
        let mut out = Vec::new();
        if let Some(holders) = self.entries.get(handle) {
            for (principal, set) in holders.iter() {
                out.extend(set.iter().map(|capability| AccessGrant {
                    handle: *handle,
                    principal: *principal,
                    capability,
                }));
            }
        }
        out
    }

    /// Total number of grants
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .map(|h| h.values().map(CapabilitySet::len).sum::<usize>())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All grants, sorted
    pub fn export(&self) -> Vec<AccessGrant> {
        let mut out = Vec::new();
        for entry in self.entries.iter() {
            let handle = *entry.key();
            for (principal, set) in entry.value() {
                out.extend(set.iter().map(|capability| AccessGrant {
                    handle,
                    principal: *principal,
                    capability,
                }));
            }
        }
        out.sort();
        out
    }

    pub fn import(&self, grants: impl IntoIterator<Item = AccessGrant>) {
        for g in grants {
            self.grant(g.handle, g.principal, g.capability);
        }
    }
}
