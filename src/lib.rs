//! Cipherfolio: confidential portfolio ledger
//!
//! This is the root crate that re-exports the cipherfolio components for
//! integration testing and embedding.
//!
//! ## Architecture Overview
//!
//! Portfolio amounts and values never exist in plaintext inside the ledger.
//! They live as ciphertexts behind opaque handles, every handle carries an
//! access list, and arithmetic happens homomorphically. Plaintext only
//! leaves through the decryption coordinator, which accepts answers signed
//! by an external decryption authority.
//!
//! ## Crate Organization
//!
//! - `cipherfolio-fhe`: Pluggable homomorphic backends (sealed, plaintext)
//! - `cipherfolio-ledger`: Ciphertext store, ACL, arithmetic engine,
//!   portfolio ledger, decryption coordination and the command façade
//! - `cipherfolio-storage`: redb persistence of ledger snapshots
//! - `cipherfolio-cli`: The `cipherfolio` binary

pub use cipherfolio_fhe as fhe;
pub use cipherfolio_ledger as ledger;
pub use cipherfolio_storage as storage;

/// Cipherfolio version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    pub use cipherfolio_fhe::{
        BackendPair, Ciphertext, FHEConfig, FHEError, HomomorphicBackend, PlaintextBackend, SchemeKind,
        SealedKeys,
    };
    pub use cipherfolio_ledger::{
        AccessControlList, Capability, CiphertextHandle, Command, DecryptionAuthority, LedgerConfig,
        LedgerCore, LedgerError, LedgerEvent, LedgerSnapshot, ManualClock, Principal, Query,
        QueryResponse, RequestStatus,
    };
    pub use cipherfolio_storage::{Storage, StorageConfig};
}
