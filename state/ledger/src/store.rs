//! Content-addressed ciphertext store
//!
//! Holds every ciphertext the ledger has produced. The store can encrypt and
//! combine through the injected backend but has no way to decrypt.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use cipherfolio_fhe::{Ciphertext, EncryptionContext, HomomorphicBackend, HomomorphicOp, SchemeKind};

use crate::errors::{LedgerError, LedgerResult};
use crate::types::CiphertextHandle;

/// Serialized ciphertext handed out to readers; meaningless without the key
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaqueCiphertext(Vec<u8>);

impl OpaqueCiphertext {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for OpaqueCiphertext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OpaqueCiphertext({} bytes)", self.0.len())
    }
}

/// Ciphertexts keyed by content address
pub struct CiphertextStore {
    backend: Arc<dyn HomomorphicBackend>,
    entries: DashMap<CiphertextHandle, Ciphertext>,
}

impl CiphertextStore {
    pub fn new(backend: Arc<dyn HomomorphicBackend>) -> Self {
        Self {
            backend,
            entries: DashMap::new(),
        }
    }

    /// Scheme of the injected backend
    pub fn scheme(&self) -> SchemeKind {
        self.backend.scheme()
    }

    /// Encrypt a value and store the result
    pub fn put(&self, value: u64, context: &EncryptionContext) -> LedgerResult<CiphertextHandle> {
        self.put_entry(value, context).map(|(handle, _)| handle)
    }

    /// Like `put`, also reporting whether the handle is new to the store
    pub(crate) fn put_entry(
        &self,
        value: u64,
        context: &EncryptionContext,
    ) -> LedgerResult<(CiphertextHandle, bool)> {
        let ciphertext = self.backend.encrypt(value, context)?;
        self.insert(ciphertext)
    }

    /// Apply a homomorphic operation to two stored ciphertexts
    pub fn combine(
        &self,
        op: HomomorphicOp,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
    ) -> LedgerResult<CiphertextHandle> {
        self.combine_entry(op, a, b).map(|(handle, _)| handle)
    }

    /// Like `combine`, also reporting whether the handle is new to the store
    pub(crate) fn combine_entry(
        &self,
        op: HomomorphicOp,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
    ) -> LedgerResult<(CiphertextHandle, bool)> {
        let lhs = self.ciphertext(a)?;
        let rhs = self.ciphertext(b)?;
        let result = self.backend.combine(op, &lhs, &rhs)?;
        self.insert(result)
    }

    /// Serialized form of a stored ciphertext
    pub fn get_opaque(&self, handle: &CiphertextHandle) -> LedgerResult<OpaqueCiphertext> {
        let entry = self
            .entries
            .get(handle)
            .ok_or(LedgerError::UnknownHandle(*handle))?;
        Ok(OpaqueCiphertext(entry.to_bytes()?))
    }

    /// Clone of a stored ciphertext
    pub fn ciphertext(&self, handle: &CiphertextHandle) -> LedgerResult<Ciphertext> {
        self.entries
            .get(handle)
            .map(|e| e.value().clone())
            .ok_or(LedgerError::UnknownHandle(*handle))
    }

    pub fn contains(&self, handle: &CiphertextHandle) -> bool {
        self.entries.contains_key(handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, ordered by handle
    pub fn export(&self) -> Vec<(CiphertextHandle, Ciphertext)> {
        let mut out: Vec<_> = self
            .entries
            .iter()
            .map(|e| (*e.key(), e.value().clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// Load entries, checking each one against its content address
    pub fn import(
        &self,
        entries: impl IntoIterator<Item = (CiphertextHandle, Ciphertext)>,
    ) -> LedgerResult<usize> {
        let mut count = 0;
        for (handle, ciphertext) in entries {
            let actual = CiphertextHandle::of(&ciphertext)?;
            if actual != handle {
                return Err(LedgerError::Malformed(format!(
                    "ciphertext stored under {} hashes to {}",
                    handle, actual
                )));
            }
            self.entries.insert(handle, ciphertext);
            count += 1;
        }
        Ok(count)
    }

    /// Drop a ciphertext that was never committed
    pub(crate) fn discard(&self, handle: &CiphertextHandle) -> bool {
        let removed = self.entries.remove(handle).is_some();
        if removed {
            debug!("Discarded ciphertext {}", handle);
        }
        removed
    }

    fn insert(&self, ciphertext: Ciphertext) -> LedgerResult<(CiphertextHandle, bool)> {
        let handle = CiphertextHandle::of(&ciphertext)?;
        match self.entries.entry(handle) {
            Entry::Occupied(_) => Ok((handle, false)),
            Entry::Vacant(vacant) => {
                debug!(
                    "Stored {:?} ciphertext {} (ops={})",
                    ciphertext.kind(),
                    handle,
                    ciphertext.op_count()
                );
                vacant.insert(ciphertext);
                Ok((handle, true))
            }
        }
    }
}

impl std::fmt::Debug for CiphertextStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CiphertextStore")
            .field("scheme", &self.scheme())
            .field("entries", &self.entries.len())
            .finish()
    }
}
