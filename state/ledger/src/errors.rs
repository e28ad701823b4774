//! Error types for the confidential ledger

use serde::{Deserialize, Serialize};
use thiserror::Error;

use cipherfolio_fhe::FHEError;

use crate::decryption::{RequestId, RequestStatus};
use crate::types::{CiphertextHandle, Principal};

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Errors that can occur during ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Portfolio already exists for {principal}")]
    AlreadyExists { principal: Principal },

    #[error("No portfolio for {principal}")]
    PortfolioNotFound { principal: Principal },

    #[error("Asset {symbol} not held by {principal}")]
    AssetNotFound { principal: Principal, symbol: String },

    #[error("Asset {symbol} already held by {principal}")]
    DuplicateAsset { principal: Principal, symbol: String },

    #[error("Invalid symbol {symbol:?}: {reason}")]
    InvalidSymbol { symbol: String, reason: String },

    #[error("{principal} is not authorized for {resource}")]
    NotAuthorized { principal: Principal, resource: String },

    #[error("Unknown ciphertext handle {0}")]
    UnknownHandle(CiphertextHandle),

    #[error("Arithmetic overflow in encrypted computation")]
    ArithmeticOverflow,

    #[error("Invalid authority proof for request {request_id}")]
    InvalidProof { request_id: RequestId },

    #[error("Unknown decryption request {0}")]
    UnknownRequest(RequestId),

    #[error("Decryption request {request_id} is {status:?}, not pending")]
    RequestNotPending {
        request_id: RequestId,
        status: RequestStatus,
    },

    #[error("No result available for decryption request {0}")]
    ResultUnavailable(RequestId),

    #[error("{manager} cannot manage the portfolio of {principal}")]
    InvalidManager {
        principal: Principal,
        manager: Principal,
    },

    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("FHE backend error: {0}")]
    Backend(FHEError),
}

/// Coarse classification of [`LedgerError`] for callers that branch on outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    AlreadyExists,
    PortfolioNotFound,
    AssetNotFound,
    DuplicateAsset,
    InvalidSymbol,
    NotAuthorized,
    UnknownHandle,
    ArithmeticOverflow,
    InvalidProof,
    UnknownRequest,
    RequestNotPending,
    ResultUnavailable,
    InvalidManager,
    Malformed,
    Config,
    Backend,
}

impl LedgerError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            LedgerError::PortfolioNotFound { .. } => ErrorKind::PortfolioNotFound,
            LedgerError::AssetNotFound { .. } => ErrorKind::AssetNotFound,
            LedgerError::DuplicateAsset { .. } => ErrorKind::DuplicateAsset,
            LedgerError::InvalidSymbol { .. } => ErrorKind::InvalidSymbol,
            LedgerError::NotAuthorized { .. } => ErrorKind::NotAuthorized,
            LedgerError::UnknownHandle(_) => ErrorKind::UnknownHandle,
            LedgerError::ArithmeticOverflow => ErrorKind::ArithmeticOverflow,
            LedgerError::InvalidProof { .. } => ErrorKind::InvalidProof,
            LedgerError::UnknownRequest(_) => ErrorKind::UnknownRequest,
            LedgerError::RequestNotPending { .. } => ErrorKind::RequestNotPending,
            LedgerError::ResultUnavailable(_) => ErrorKind::ResultUnavailable,
            LedgerError::InvalidManager { .. } => ErrorKind::InvalidManager,
            LedgerError::Malformed(_) => ErrorKind::Malformed,
            LedgerError::Config(_) => ErrorKind::Config,
            LedgerError::Backend(_) => ErrorKind::Backend,
        }
    }

    pub(crate) fn not_authorized(principal: Principal, resource: impl std::fmt::Display) -> Self {
        LedgerError::NotAuthorized {
            principal,
            resource: resource.to_string(),
        }
    }
}

impl From<FHEError> for LedgerError {
    fn from(e: FHEError) -> Self {
        match e {
            // Unsigned underflow is the same failure as overflow for callers
            FHEError::Overflow | FHEError::Underflow => LedgerError::ArithmeticOverflow,
            other => LedgerError::Backend(other),
        }
    }
}

impl From<bincode::Error> for LedgerError {
    fn from(e: bincode::Error) -> Self {
        LedgerError::Malformed(e.to_string())
    }
}
