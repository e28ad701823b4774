//! Cipherfolio confidential ledger core
//!
//! Tracks per-principal asset portfolios whose amounts, values and totals
//! exist only as ciphertexts. The core can compute on those ciphertexts but
//! never decrypt them; plaintexts come back only through an external
//! decryption authority whose answers are signed and verified.
//!
//! # Components
//! ```text
//!   Command ──► LedgerCore ──► PortfolioLedger ──► HomomorphicArithmeticEngine
//!                   │                                   │            │
//!                   │                           CiphertextStore  AccessControlList
//!                   │                                                │
//!                   └──► DecryptionRequestCoordinator ◄──────────────┘
//!                                 ▲
//!                      Fulfillment│(Ed25519 proof)
//!                        DecryptionAuthority (holds the Decryptor)
//! ```

pub mod acl;
pub mod arithmetic;
pub mod authority;
pub mod clock;
pub mod commands;
pub mod decryption;
pub mod errors;
pub mod events;
pub mod ledger;
pub mod portfolio;
pub mod snapshot;
pub mod store;
pub mod types;

pub use acl::AccessControlList;
pub use arithmetic::{ComputeScope, HomomorphicArithmeticEngine};
pub use authority::{verifying_key_from_bytes, AuthorityProof, DecryptionAuthority, Fulfillment};
pub use clock::{Clock, ManualClock, SystemClock, TimestampIssuer};
pub use commands::{Command, Query, QueryResponse};
pub use decryption::{
    DecryptionRequest, DecryptionRequestCoordinator, DecryptionState, PendingRequest, RequestId,
    RequestStatus,
};
pub use errors::{ErrorKind, LedgerError, LedgerResult};
pub use events::LedgerEvent;
pub use ledger::{LedgerConfig, LedgerCore};
pub use portfolio::{AssetRecord, Portfolio, PortfolioLedger};
pub use snapshot::{LedgerSnapshot, SNAPSHOT_VERSION};
pub use store::{CiphertextStore, OpaqueCiphertext};
pub use types::{AccessGrant, Capability, CapabilitySet, CiphertextHandle, Principal, Timestamp};

pub use ed25519_dalek::VerifyingKey;
