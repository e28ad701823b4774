//! Command and query interface of the ledger core

use serde::{Deserialize, Serialize};

use crate::authority::AuthorityProof;
use crate::decryption::{RequestId, RequestStatus};
use crate::store::OpaqueCiphertext;
use crate::types::{CiphertextHandle, Principal, Timestamp};

/// State-changing operations
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    CreatePortfolio {
        principal: Principal,
    },
    AddAsset {
        principal: Principal,
        symbol: String,
        amount: u64,
        value: u64,
    },
    UpdateAsset {
        principal: Principal,
        symbol: String,
        amount: u64,
        value: u64,
    },
    RemoveAsset {
        principal: Principal,
        symbol: String,
    },
    AuthorizeManager {
        principal: Principal,
        manager: Principal,
    },
    RevokeManager {
        principal: Principal,
        manager: Principal,
    },
    CompareAssetValues {
        principal: Principal,
        first: String,
        second: String,
    },
    CompareTotalAgainst {
        principal: Principal,
        threshold: u64,
    },
    RequestDecryption {
        handle: CiphertextHandle,
        requester: Principal,
    },
    FulfillDecryption {
        request_id: RequestId,
        plaintext: u64,
        proof: AuthorityProof,
    },
    RejectDecryption {
        request_id: RequestId,
        proof: AuthorityProof,
    },
}

impl Command {
    /// Principal a command acts as when no caller is given.
    ///
    /// Authority answers carry their own proof and act as nobody.
    pub fn default_caller(&self) -> Option<Principal> {
        match self {
            Command::CreatePortfolio { principal }
            | Command::AddAsset { principal, .. }
            | Command::UpdateAsset { principal, .. }
            | Command::RemoveAsset { principal, .. }
            | Command::AuthorizeManager { principal, .. }
            | Command::RevokeManager { principal, .. }
            | Command::CompareAssetValues { principal, .. }
            | Command::CompareTotalAgainst { principal, .. } => Some(*principal),
            Command::RequestDecryption { requester, .. } => Some(*requester),
            Command::FulfillDecryption { .. } | Command::RejectDecryption { .. } => None,
        }
    }
}

/// Read-only lookups
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Query {
    PortfolioExists(Principal),
    GetAssetSymbols(Principal),
    GetEncryptedAssetAmount { principal: Principal, symbol: String },
    GetEncryptedAssetValue { principal: Principal, symbol: String },
    GetEncryptedTotalValue(Principal),
    GetAssetLastUpdate { principal: Principal, symbol: String },
    GetAssetCount(Principal),
    GetPortfolioCreatedAt(Principal),
    GetManagers(Principal),
    ListPortfolios,
    GetOpaqueCiphertext(CiphertextHandle),
    GetRequestStatus(RequestId),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryResponse {
    Exists(bool),
    Symbols(Vec<String>),
    Handle(CiphertextHandle),
    Timestamp(Timestamp),
    Count(usize),
    Principals(Vec<Principal>),
    Ciphertext(OpaqueCiphertext),
    Status(RequestStatus),
}
