//! ACL-gated homomorphic arithmetic
//!
//! Every operation checks `UseInComputation` for the acting principal on
//! both inputs before touching the backend, and grants the configured
//! readers on the result. Nothing here ever sees a plaintext.
//!
//! A [`ComputeScope`] journals the ciphertexts and grants it creates. Unless
//! it is committed, dropping it removes them again, so a transition that
//! fails halfway leaves the store and the ACL as they were.

use std::sync::Arc;

use cipherfolio_fhe::{EncryptionContext, HomomorphicOp};
use tracing::debug;

use crate::acl::AccessControlList;
use crate::errors::LedgerResult;
use crate::store::CiphertextStore;
use crate::types::{AccessGrant, Capability, CiphertextHandle, Principal};

/// Encrypted arithmetic over stored handles
#[derive(Debug)]
pub struct HomomorphicArithmeticEngine {
    store: Arc<CiphertextStore>,
    acl: Arc<AccessControlList>,
}

impl HomomorphicArithmeticEngine {
    pub fn new(store: Arc<CiphertextStore>, acl: Arc<AccessControlList>) -> Self {
        Self { store, acl }
    }

    pub fn store(&self) -> &Arc<CiphertextStore> {
        &self.store
    }

    pub fn acl(&self) -> &Arc<AccessControlList> {
        &self.acl
    }

    /// Encrypt a fresh value owned by `owner`, readable by `readers`
    pub fn encrypt(
        &self,
        value: u64,
        owner: &Principal,
        label: &str,
        readers: &[Principal],
    ) -> LedgerResult<CiphertextHandle> {
        self.encrypt_recorded(value, owner, label, readers, &mut Journal::default())
    }

    /// Start a journaled batch of operations
    pub fn scope(&self) -> ComputeScope<'_> {
        ComputeScope {
            engine: self,
            journal: Journal::default(),
            committed: false,
        }
    }

    /// Encrypted `a + b`
    pub fn add(
        &self,
        actor: &Principal,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
        readers: &[Principal],
    ) -> LedgerResult<CiphertextHandle> {
        self.apply(HomomorphicOp::Add, actor, a, b, readers)
    }

    /// Encrypted `a - b`; underflow is an error, never a wraparound
    pub fn sub(
        &self,
        actor: &Principal,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
        readers: &[Principal],
    ) -> LedgerResult<CiphertextHandle> {
        self.apply(HomomorphicOp::Sub, actor, a, b, readers)
    }

    /// Encrypted boolean `a > b`
    pub fn compare_greater(
        &self,
        actor: &Principal,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
        readers: &[Principal],
    ) -> LedgerResult<CiphertextHandle> {
        self.apply(HomomorphicOp::Gt, actor, a, b, readers)
    }

    /// Encrypted boolean `a < b`
    pub fn compare_less(
        &self,
        actor: &Principal,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
        readers: &[Principal],
    ) -> LedgerResult<CiphertextHandle> {
        self.apply(HomomorphicOp::Lt, actor, a, b, readers)
    }

    /// Encrypted boolean `a == b`
    pub fn compare_equal(
        &self,
        actor: &Principal,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
        readers: &[Principal],
    ) -> LedgerResult<CiphertextHandle> {
        self.apply(HomomorphicOp::Eq, actor, a, b, readers)
    }

    fn apply(
        &self,
        op: HomomorphicOp,
        actor: &Principal,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
        readers: &[Principal],
    ) -> LedgerResult<CiphertextHandle> {
        self.apply_recorded(op, actor, a, b, readers, &mut Journal::default())
    }

    fn encrypt_recorded(
        &self,
        value: u64,
        owner: &Principal,
        label: &str,
        readers: &[Principal],
        journal: &mut Journal,
    ) -> LedgerResult<CiphertextHandle> {
        let context = EncryptionContext::new(*owner.as_bytes(), label);
        let (handle, fresh) = self.store.put_entry(value, &context)?;
        journal.stored(handle, fresh);
        self.grant_result(handle, readers, journal);
        Ok(handle)
    }

    fn apply_recorded(
        &self,
        op: HomomorphicOp,
        actor: &Principal,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
        readers: &[Principal],
        journal: &mut Journal,
    ) -> LedgerResult<CiphertextHandle> {
        self.acl.require(a, actor, Capability::UseInComputation)?;
        self.acl.require(b, actor, Capability::UseInComputation)?;

        let (result, fresh) = self.store.combine_entry(op, a, b)?;
        journal.stored(result, fresh);
        self.grant_result(result, readers, journal);
        Ok(result)
    }

    /// The core may compute on the result; readers may compute on and decrypt it
    fn grant_result(&self, handle: CiphertextHandle, readers: &[Principal], journal: &mut Journal) {
        let mut grant = |principal: Principal, capability: Capability| {
            if self.acl.grant(handle, principal, capability) {
                journal.granted.push(AccessGrant {
                    handle,
                    principal,
                    capability,
                });
            }
        };
        grant(Principal::core(), Capability::UseInComputation);
        for reader in readers {
            grant(*reader, Capability::UseInComputation);
            grant(*reader, Capability::Decrypt);
        }
    }

    fn roll_back(&self, journal: &mut Journal) {
        for grant in journal.granted.drain(..).rev() {
            self.acl.revoke(grant.handle, grant.principal, grant.capability);
        }
        let mut discarded = 0;
        for handle in journal.created.drain(..).rev() {
            if self.store.discard(&handle) {
                discarded += 1;
            }
        }
        debug!("Rolled back {} uncommitted ciphertexts", discarded);
    }
}

/// What a scope has added to the store and the ACL
#[derive(Debug, Default)]
struct Journal {
    created: Vec<CiphertextHandle>,
    granted: Vec<AccessGrant>,
}

impl Journal {
    fn stored(&mut self, handle: CiphertextHandle, fresh: bool) {
        if fresh {
            self.created.push(handle);
        }
    }

    fn is_empty(&self) -> bool {
        self.created.is_empty() && self.granted.is_empty()
    }
}

/// Engine operations whose results are removed again unless committed
#[derive(Debug)]
pub struct ComputeScope<'a> {
    engine: &'a HomomorphicArithmeticEngine,
    journal: Journal,
    committed: bool,
}

impl ComputeScope<'_> {
    pub fn encrypt(
        &mut self,
        value: u64,
        owner: &Principal,
        label: &str,
        readers: &[Principal],
    ) -> LedgerResult<CiphertextHandle> {
        self.engine
            .encrypt_recorded(value, owner, label, readers, &mut self.journal)
    }

    pub fn add(
        &mut self,
        actor: &Principal,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
        readers: &[Principal],
    ) -> LedgerResult<CiphertextHandle> {
        self.engine
            .apply_recorded(HomomorphicOp::Add, actor, a, b, readers, &mut self.journal)
    }

    pub fn sub(
        &mut self,
        actor: &Principal,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
        readers: &[Principal],
    ) -> LedgerResult<CiphertextHandle> {
        self.engine
            .apply_recorded(HomomorphicOp::Sub, actor, a, b, readers, &mut self.journal)
    }

    pub fn compare_greater(
        &mut self,
        actor: &Principal,
        a: &CiphertextHandle,
        b: &CiphertextHandle,
        readers: &[Principal],
    ) -> LedgerResult<CiphertextHandle> {
        self.engine
            .apply_recorded(HomomorphicOp::Gt, actor, a, b, readers, &mut self.journal)
    }

    /// Keep everything produced in this scope
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for ComputeScope<'_> {
    fn drop(&mut self) {
        if !self.committed && !self.journal.is_empty() {
            self.engine.roll_back(&mut self.journal);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::LedgerError;
    use cipherfolio_fhe::PlaintextBackend;

    fn engine() -> HomomorphicArithmeticEngine {
        let store = Arc::new(CiphertextStore::new(Arc::new(PlaintextBackend::new())));
        HomomorphicArithmeticEngine::new(store, Arc::new(AccessControlList::new()))
    }

    fn value_of(engine: &HomomorphicArithmeticEngine, h: &CiphertextHandle) -> u64 {
        PlaintextBackend::plaintext_of(&engine.store().ciphertext(h).unwrap()).unwrap()
    }

    #[test]
    fn test_encrypt_grants_readers_and_core() {
        let engine = engine();
        let alice = Principal::from_label("alice");
        let h = engine.encrypt(10, &alice, "amount", &[alice]).unwrap();

        let acl = engine.acl();
        assert!(acl.check(&h, &Principal::core(), Capability::UseInComputation));
        assert!(!acl.check(&h, &Principal::core(), Capability::Decrypt));
        assert!(acl.check(&h, &alice, Capability::Decrypt));
    }

    #[test]
    fn test_add_and_compare() {
        let engine = engine();
        let core = Principal::core();
        let alice = Principal::from_label("alice");
        let a = engine.encrypt(100, &alice, "value", &[alice]).unwrap();
        let b = engine.encrypt(50, &alice, "value", &[alice]).unwrap();

        let sum = engine.add(&core, &a, &b, &[alice]).unwrap();
        assert_eq!(value_of(&engine, &sum), 150);

        let gt = engine.compare_greater(&core, &a, &b, &[alice]).unwrap();
        assert_eq!(value_of(&engine, &gt), 1);
        let lt = engine.compare_less(&core, &a, &b, &[alice]).unwrap();
        assert_eq!(value_of(&engine, &lt), 0);
        let eq = engine.compare_equal(&core, &a, &a, &[alice]).unwrap();
        assert_eq!(value_of(&engine, &eq), 1);
    }

    #[test]
    fn test_unauthorized_actor_fails_closed() {
        let engine = engine();
        let alice = Principal::from_label("alice");
        let mallory = Principal::from_label("mallory");
        let a = engine.encrypt(1, &alice, "value", &[alice]).unwrap();
        let before = engine.store().len();

        assert!(matches!(
            engine.add(&mallory, &a, &a, &[mallory]),
            Err(LedgerError::NotAuthorized { .. })
        ));
        assert_eq!(engine.store().len(), before);
    }

    #[test]
    fn test_dropped_scope_rolls_back() {
        let engine = engine();
        let core = Principal::core();
        let alice = Principal::from_label("alice");
        let max = engine.encrypt(u64::MAX, &alice, "value", &[alice]).unwrap();
        let (stored, grants) = (engine.store().len(), engine.acl().len());

        {
            let mut scope = engine.scope();
            let one = scope.encrypt(1, &alice, "value", &[alice]).unwrap();
            assert_eq!(
                scope.add(&core, &max, &one, &[alice]).unwrap_err(),
                LedgerError::ArithmeticOverflow
            );
            assert_eq!(engine.store().len(), stored + 1);
        }

        assert_eq!(engine.store().len(), stored);
        assert_eq!(engine.acl().len(), grants);
    }

    #[test]
    fn test_committed_scope_keeps_results() {
        let engine = engine();
        let core = Principal::core();
        let alice = Principal::from_label("alice");
        let a = engine.encrypt(2, &alice, "value", &[alice]).unwrap();

        let mut scope = engine.scope();
        let b = scope.encrypt(3, &alice, "value", &[alice]).unwrap();
        let sum = scope.add(&core, &a, &b, &[alice]).unwrap();
        scope.commit();

        assert_eq!(value_of(&engine, &sum), 5);
        assert!(engine.acl().check(&b, &alice, Capability::Decrypt));
        assert!(engine.acl().check(&sum, &core, Capability::UseInComputation));
    }

    #[test]
    fn test_sub_underflow() {
        let engine = engine();
        let core = Principal::core();
        let alice = Principal::from_label("alice");
        let a = engine.encrypt(1, &alice, "value", &[alice]).unwrap();
        let b = engine.encrypt(2, &alice, "value", &[alice]).unwrap();

        assert_eq!(
            engine.sub(&core, &a, &b, &[alice]).unwrap_err(),
            LedgerError::ArithmeticOverflow
        );
    }
}
