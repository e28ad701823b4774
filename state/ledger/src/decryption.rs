//! Asynchronous decryption requests
//!
//! A request moves `Pending -> Fulfilled` when the authority answers with a
//! valid proof, or `Pending -> Failed` when it signs a refusal. Results are
//! readable once, by the requester, and are purged on that read.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ed25519_dalek::VerifyingKey;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::acl::AccessControlList;
use crate::authority::{AuthorityProof, Fulfillment};
use crate::clock::TimestampIssuer;
use crate::errors::{LedgerError, LedgerResult};
use crate::types::{Capability, CiphertextHandle, Principal, Timestamp};

/// Monotonically assigned request identifier
pub type RequestId = u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    Pending,
    Fulfilled,
    Failed,
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestStatus::Pending => write!(f, "pending"),
            RequestStatus::Fulfilled => write!(f, "fulfilled"),
            RequestStatus::Failed => write!(f, "failed"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionRequest {
    pub id: RequestId,
    pub handle: CiphertextHandle,
    pub requester: Principal,
    pub timestamp: Timestamp,
    pub status: RequestStatus,
}

/// A pending request and how long it has been waiting
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingRequest {
    pub request: DecryptionRequest,
    pub age_ms: u64,
}

/// Serializable state of the coordinator
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionState {
    pub requests: Vec<DecryptionRequest>,
    /// Fulfilled results not yet read
    pub results: Vec<(RequestId, u64)>,
    pub next_id: RequestId,
}

/// Tracks requests between the ledger and the decryption authority
pub struct DecryptionRequestCoordinator {
    acl: Arc<AccessControlList>,
    authority_key: VerifyingKey,
    timestamps: Arc<TimestampIssuer>,
    requests: RwLock<BTreeMap<RequestId, DecryptionRequest>>,
    results: Mutex<HashMap<RequestId, u64>>,
    next_id: AtomicU64,
}

impl DecryptionRequestCoordinator {
    pub fn new(
        acl: Arc<AccessControlList>,
        authority_key: VerifyingKey,
        timestamps: Arc<TimestampIssuer>,
    ) -> Self {
        Self {
            acl,
            authority_key,
            timestamps,
            requests: RwLock::new(BTreeMap::new()),
            results: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn authority_key(&self) -> &VerifyingKey {
        &self.authority_key
    }

    /// Open a request; the requester must hold `Decrypt` on the handle
    pub fn request_decryption(
        &self,
        handle: CiphertextHandle,
        requester: Principal,
    ) -> LedgerResult<DecryptionRequest> {
        self.acl.require(&handle, &requester, Capability::Decrypt)?;

        let request = DecryptionRequest {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            handle,
            requester,
            timestamp: self.timestamps.issue(),
            status: RequestStatus::Pending,
        };
        self.requests.write().insert(request.id, request.clone());
        info!("Decryption request {} opened by {} for {}", request.id, requester, handle);
        Ok(request)
    }

    /// Accept the authority's answer if its proof checks out
    pub fn fulfill(&self, request_id: RequestId, plaintext: u64, proof: &AuthorityProof) -> LedgerResult<()> {
        let mut requests = self.requests.write();
        let request = Self::pending_mut(&mut requests, request_id)?;

        if !proof.verify_fulfilment(&self.authority_key, request_id, &request.handle, plaintext) {
            warn!("Rejected fulfilment of request {}: bad proof", request_id);
            return Err(LedgerError::InvalidProof { request_id });
        }

        request.status = RequestStatus::Fulfilled;
        self.results.lock().insert(request_id, plaintext);
        info!("Decryption request {} fulfilled", request_id);
        Ok(())
    }

    /// Convenience for [`Self::fulfill`]
    pub fn apply(&self, fulfillment: &Fulfillment) -> LedgerResult<()> {
        self.fulfill(fulfillment.request_id, fulfillment.plaintext, &fulfillment.proof)
    }

    /// Mark a request failed on a signed refusal from the authority
    pub fn reject(&self, request_id: RequestId, proof: &AuthorityProof) -> LedgerResult<()> {
        let mut requests = self.requests.write();
        let request = Self::pending_mut(&mut requests, request_id)?;

        if !proof.verify_rejection(&self.authority_key, request_id, &request.handle) {
            warn!("Rejected refusal of request {}: bad proof", request_id);
            return Err(LedgerError::InvalidProof { request_id });
        }

        request.status = RequestStatus::Failed;
        info!("Decryption request {} failed", request_id);
        Ok(())
    }

    /// Hand the plaintext to its requester and forget it
    pub fn take_result(&self, request_id: RequestId, requester: &Principal) -> LedgerResult<u64> {
        let requests = self.requests.read();
        let request = requests
            .get(&request_id)
            .ok_or(LedgerError::UnknownRequest(request_id))?;
        if request.requester != *requester {
            return Err(LedgerError::not_authorized(
                *requester,
                format_args!("result of request {}", request_id),
            ));
        }

        self.results
            .lock()
            .remove(&request_id)
            .ok_or(LedgerError::ResultUnavailable(request_id))
    }

    pub fn status(&self, request_id: RequestId) -> LedgerResult<RequestStatus> {
        self.get_request(request_id).map(|r| r.status)
    }

    pub fn get_request(&self, request_id: RequestId) -> LedgerResult<DecryptionRequest> {
        self.requests
            .read()
            .get(&request_id)
            .cloned()
            .ok_or(LedgerError::UnknownRequest(request_id))
    }

    /// Pending requests in id order, with their age
    pub fn pending(&self) -> Vec<PendingRequest> {
        let now = self.timestamps.now();
        self.requests
            .read()
            .values()
            .filter(|r| r.status == RequestStatus::Pending)
            .map(|r| PendingRequest {
                request: r.clone(),
                age_ms: now.saturating_sub(r.timestamp),
            })
            .collect()
    }

    /// Drop pending requests older than `max_age_ms`; returns their ids
    pub fn prune_stale(&self, max_age_ms: u64) -> Vec<RequestId> {
        let now = self.timestamps.now();
        let mut requests = self.requests.write();
        let stale: Vec<RequestId> = requests
            .values()
            .filter(|r| r.status == RequestStatus::Pending && now.saturating_sub(r.timestamp) > max_age_ms)
            .map(|r| r.id)
            .collect();
        for id in &stale {
            requests.remove(id);
        }
        if !stale.is_empty() {
            debug!("Pruned {} stale decryption requests", stale.len());
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.requests.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.read().is_empty()
    }

    pub fn export(&self) -> DecryptionState {
        let requests = self.requests.read();
        let mut results: Vec<(RequestId, u64)> =
            self.results.lock().iter().map(|(k, v)| (*k, *v)).collect();
        results.sort_unstable();
        DecryptionState {
            requests: requests.values().cloned().collect(),
            results,
            next_id: self.next_id.load(Ordering::SeqCst),
        }
    }

    pub fn import(&self, state: DecryptionState) {
        let mut requests = self.requests.write();
        for request in state.requests {
            self.timestamps.observe(request.timestamp);
            requests.insert(request.id, request);
        }
        self.results.lock().extend(state.results);
        self.next_id.fetch_max(state.next_id, Ordering::SeqCst);
    }

    fn pending_mut(
        requests: &mut BTreeMap<RequestId, DecryptionRequest>,
        request_id: RequestId,
    ) -> LedgerResult<&mut DecryptionRequest> {
        let request = requests
            .get_mut(&request_id)
            .ok_or(LedgerError::UnknownRequest(request_id))?;
        if request.status != RequestStatus::Pending {
            return Err(LedgerError::RequestNotPending {
                request_id,
                status: request.status,
            });
        }
        Ok(request)
    }
}

impl std::fmt::Debug for DecryptionRequestCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionRequestCoordinator")
            .field("requests", &self.len())
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .finish()
    }
}
