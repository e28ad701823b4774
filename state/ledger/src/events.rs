//! Events emitted by committed transitions

use serde::{Deserialize, Serialize};

use crate::decryption::RequestId;
use crate::types::{CiphertextHandle, Principal, Timestamp};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    PortfolioCreated {
        principal: Principal,
        ts: Timestamp,
    },
    AssetAdded {
        principal: Principal,
        symbol: String,
        ts: Timestamp,
    },
    AssetUpdated {
        principal: Principal,
        symbol: String,
        ts: Timestamp,
    },
    AssetRemoved {
        principal: Principal,
        symbol: String,
        ts: Timestamp,
    },
    ManagerAuthorized {
        principal: Principal,
        manager: Principal,
    },
    ManagerRevoked {
        principal: Principal,
        manager: Principal,
    },
    /// An encrypted comparison result is ready for decryption
    ComparisonComputed {
        principal: Principal,
        result: CiphertextHandle,
    },
    DecryptionRequested {
        request_id: RequestId,
        handle: CiphertextHandle,
    },
    DecryptionFulfilled {
        request_id: RequestId,
    },
    DecryptionRejected {
        request_id: RequestId,
    },
}

impl LedgerEvent {
    /// Portfolio the event concerns, if any
    pub fn principal(&self) -> Option<Principal> {
        match self {
            LedgerEvent::PortfolioCreated { principal, .. }
            | LedgerEvent::AssetAdded { principal, .. }
            | LedgerEvent::AssetUpdated { principal, .. }
            | LedgerEvent::AssetRemoved { principal, .. }
            | LedgerEvent::ManagerAuthorized { principal, .. }
            | LedgerEvent::ManagerRevoked { principal, .. }
            | LedgerEvent::ComparisonComputed { principal, .. } => Some(*principal),
            LedgerEvent::DecryptionRequested { .. }
            | LedgerEvent::DecryptionFulfilled { .. }
            | LedgerEvent::DecryptionRejected { .. } => None,
        }
    }

    /// Transitions of a single portfolio, published while its writer lock is held
    pub(crate) fn is_slot_transition(&self) -> bool {
        matches!(
            self,
            LedgerEvent::PortfolioCreated { .. }
                | LedgerEvent::AssetAdded { .. }
                | LedgerEvent::AssetUpdated { .. }
                | LedgerEvent::AssetRemoved { .. }
                | LedgerEvent::ManagerAuthorized { .. }
                | LedgerEvent::ManagerRevoked { .. }
        )
    }

    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::PortfolioCreated { .. } => "PortfolioCreated",
            LedgerEvent::AssetAdded { .. } => "AssetAdded",
            LedgerEvent::AssetUpdated { .. } => "AssetUpdated",
            LedgerEvent::AssetRemoved { .. } => "AssetRemoved",
            LedgerEvent::ManagerAuthorized { .. } => "ManagerAuthorized",
            LedgerEvent::ManagerRevoked { .. } => "ManagerRevoked",
            LedgerEvent::ComparisonComputed { .. } => "ComparisonComputed",
            LedgerEvent::DecryptionRequested { .. } => "DecryptionRequested",
            LedgerEvent::DecryptionFulfilled { .. } => "DecryptionFulfilled",
            LedgerEvent::DecryptionRejected { .. } => "DecryptionRejected",
        }
    }
}
