//! Ledger Integration Tests
//!
//! End-to-end flows through the command interface on the sealed scheme,
//! with the decryption authority answering out of band.

mod harness {
    use std::sync::Arc;

    use cipherfolio::fhe::{BackendPair, FHEConfig, SealedKeys};
    use cipherfolio::ledger::{
        CiphertextHandle, Command, DecryptionAuthority, LedgerConfig, LedgerCore, LedgerEvent,
        LedgerResult, ManualClock, Principal, RequestId,
    };

    pub struct Harness {
        pub core: LedgerCore,
        pub authority: DecryptionAuthority,
        pub clock: Arc<ManualClock>,
        pub keys: SealedKeys,
    }

    impl Harness {
        pub fn new() -> Self {
            let keys = SealedKeys::generate().unwrap();
            let pair = BackendPair::from_config(&FHEConfig::default(), Some(&keys)).unwrap();
            let authority = DecryptionAuthority::generate(pair.decryptor);
            let clock = Arc::new(ManualClock::new(1_700_000_000_000));
            let core = LedgerCore::with_clock(
                LedgerConfig::default(),
                pair.backend,
                authority.verifying_key(),
                clock.clone(),
            )
            .unwrap();
            Self {
                core,
                authority,
                clock,
                keys,
            }
        }

        pub fn request(&self, handle: CiphertextHandle, requester: Principal) -> LedgerResult<RequestId> {
            match self.core.execute(Command::RequestDecryption { handle, requester })? {
                LedgerEvent::DecryptionRequested { request_id, .. } => Ok(request_id),
                other => panic!("unexpected event {:?}", other),
            }
        }

        /// Play the authority for a pending request
        pub fn answer(&self, request_id: RequestId) {
            let request = self.core.decryption_request(request_id).unwrap();
            let ciphertext = self.core.ciphertext(&request.handle).unwrap();
            let answer = self.authority.process(&request, &ciphertext).unwrap();
            self.core
                .execute(Command::FulfillDecryption {
                    request_id: answer.request_id,
                    plaintext: answer.plaintext,
                    proof: answer.proof,
                })
                .unwrap();
        }

        /// Full request, answer, read round
        pub fn reveal(&self, handle: CiphertextHandle, requester: Principal) -> u64 {
            let id = self.request(handle, requester).unwrap();
            self.answer(id);
            self.core.take_decryption_result(id, &requester).unwrap()
        }

        pub fn total(&self, owner: Principal) -> u64 {
            let handle = self.core.portfolios().encrypted_total_value(&owner).unwrap();
            self.reveal(handle, owner)
        }

        pub fn create(&self, owner: Principal) {
            self.core
                .execute(Command::CreatePortfolio { principal: owner })
                .unwrap();
        }

        pub fn add(&self, owner: Principal, symbol: &str, amount: u64, value: u64) -> LedgerResult<LedgerEvent> {
            self.core.execute(Command::AddAsset {
                principal: owner,
                symbol: symbol.into(),
                amount,
                value,
            })
        }
    }
}

// ============================================================================
// Portfolio Lifecycle
// ============================================================================

mod lifecycle_tests {
    use super::harness::Harness;
    use cipherfolio::ledger::{Command, ErrorKind, LedgerEvent, Principal, Query, QueryResponse};

    #[test]
    fn test_add_then_reveal_total() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        h.create(p1);
        h.add(p1, "BTC", 100_000_000, 5_000_000).unwrap();

        assert_eq!(
            h.core.query(Query::GetAssetCount(p1)).unwrap(),
            QueryResponse::Count(1)
        );
        assert_eq!(h.total(p1), 5_000_000);
    }

    #[test]
    fn test_duplicate_add_leaves_state_unchanged() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        h.create(p1);
        h.add(p1, "BTC", 100_000_000, 5_000_000).unwrap();
        let before = h.core.portfolios().portfolio(&p1).unwrap();

        let err = h.add(p1, "BTC", 1, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateAsset);

        let after = h.core.portfolios().portfolio(&p1).unwrap();
        assert_eq!(after.asset_count(), 1);
        assert_eq!(*after, *before);
        assert_eq!(h.total(p1), 5_000_000);
    }

    #[test]
    fn test_overflowing_add_leaves_snapshot_unchanged() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        h.create(p1);
        h.add(p1, "BTC", 1, u64::MAX).unwrap();
        let before = h.core.snapshot();

        let err = h.add(p1, "ETH", 1, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArithmeticOverflow);
        assert_eq!(h.core.snapshot(), before);
    }

    #[test]
    fn test_overflowing_update_leaves_snapshot_unchanged() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        h.create(p1);
        h.add(p1, "BTC", 1, u64::MAX - 1).unwrap();
        h.add(p1, "ETH", 1, 1).unwrap();
        let before = h.core.snapshot();

        let err = h
            .core
            .execute(Command::UpdateAsset {
                principal: p1,
                symbol: "ETH".into(),
                amount: 1,
                value: 2,
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArithmeticOverflow);
        assert_eq!(h.core.snapshot(), before);
        assert_eq!(h.total(p1), u64::MAX);
    }

    #[test]
    fn test_update_replaces_value_and_advances_timestamp() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        h.create(p1);
        h.add(p1, "BTC", 100_000_000, 5_000_000).unwrap();
        let first = h.core.portfolios().asset_last_update(&p1, "BTC").unwrap();

        let event = h
            .core
            .execute(Command::UpdateAsset {
                principal: p1,
                symbol: "BTC".into(),
                amount: 150_000_000,
                value: 7_500_000,
            })
            .unwrap();
        assert!(matches!(event, LedgerEvent::AssetUpdated { .. }));

        let second = h.core.portfolios().asset_last_update(&p1, "BTC").unwrap();
        assert!(second > first);
        assert_eq!(h.total(p1), 7_500_000);

        let amount = h.core.portfolios().encrypted_asset_amount(&p1, "BTC").unwrap();
        assert_eq!(h.reveal(amount, p1), 150_000_000);
    }

    #[test]
    fn test_update_within_same_millisecond_still_advances() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        h.create(p1);
        h.add(p1, "ETH", 1, 1).unwrap();
        let mut last = h.core.portfolios().asset_last_update(&p1, "ETH").unwrap();

        // Clock frozen: timestamps must keep increasing anyway
        for value in 2..6 {
            h.core
                .execute(Command::UpdateAsset {
                    principal: p1,
                    symbol: "ETH".into(),
                    amount: value,
                    value,
                })
                .unwrap();
            let ts = h.core.portfolios().asset_last_update(&p1, "ETH").unwrap();
            assert!(ts > last);
            last = ts;
        }
    }

    #[test]
    fn test_remove_brings_total_back_to_zero() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        h.create(p1);
        h.add(p1, "BTC", 100_000_000, 5_000_000).unwrap();
        h.core
            .execute(Command::RemoveAsset {
                principal: p1,
                symbol: "BTC".into(),
            })
            .unwrap();

        assert_eq!(h.core.portfolios().asset_count(&p1).unwrap(), 0);
        assert_eq!(h.total(p1), 0);

        // Symbol is free again
        h.add(p1, "BTC", 2, 3).unwrap();
        assert_eq!(h.total(p1), 3);
    }

    #[test]
    fn test_total_tracks_many_assets() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        h.create(p1);
        h.add(p1, "BTC", 1, 500).unwrap();
        h.add(p1, "ETH", 1, 250).unwrap();
        h.add(p1, "SOL", 1, 125).unwrap();
        h.core
            .execute(Command::RemoveAsset {
                principal: p1,
                symbol: "ETH".into(),
            })
            .unwrap();

        assert_eq!(
            h.core.portfolios().asset_symbols(&p1).unwrap(),
            vec!["BTC".to_string(), "SOL".to_string()]
        );
        assert_eq!(h.total(p1), 625);
    }

    #[test]
    fn test_missing_portfolio() {
        let h = Harness::new();
        let ghost = Principal::from_label("ghost");

        let err = h.add(ghost, "BTC", 1, 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PortfolioNotFound);
        assert_eq!(
            h.core.query(Query::PortfolioExists(ghost)).unwrap(),
            QueryResponse::Exists(false)
        );
        assert!(h.core.query(Query::GetEncryptedTotalValue(ghost)).is_err());
    }

    #[test]
    fn test_create_twice_fails() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        h.create(p1);
        let err = h
            .core
            .execute(Command::CreatePortfolio { principal: p1 })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(h.core.portfolios().len(), 1);
    }

    #[test]
    fn test_symbol_validation() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        h.create(p1);

        assert_eq!(h.add(p1, "", 1, 1).unwrap_err().kind(), ErrorKind::InvalidSymbol);
        assert_eq!(
            h.add(p1, "ABCDEFGHIJK", 1, 1).unwrap_err().kind(),
            ErrorKind::InvalidSymbol
        );
        h.add(p1, "ABCDEFGHIJ", 1, 1).unwrap();
        assert_eq!(h.core.portfolios().asset_count(&p1).unwrap(), 1);
    }

    #[test]
    fn test_stranger_cannot_mutate() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        let mallory = Principal::from_label("mallory");
        h.create(p1);

        let err = h
            .core
            .execute_as(
                mallory,
                Command::AddAsset {
                    principal: p1,
                    symbol: "BTC".into(),
                    amount: 1,
                    value: 1,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAuthorized);

        let err = h
            .core
            .execute_as(mallory, Command::CreatePortfolio { principal: p1 })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAuthorized);
    }

    #[test]
    fn test_queries_reflect_state() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        h.create(p1);
        h.add(p1, "BTC", 7, 9).unwrap();

        let created = match h.core.query(Query::GetPortfolioCreatedAt(p1)).unwrap() {
            QueryResponse::Timestamp(ts) => ts,
            other => panic!("unexpected {:?}", other),
        };
        let updated = match h
            .core
            .query(Query::GetAssetLastUpdate {
                principal: p1,
                symbol: "BTC".into(),
            })
            .unwrap()
        {
            QueryResponse::Timestamp(ts) => ts,
            other => panic!("unexpected {:?}", other),
        };
        assert!(updated > created);

        let handle = match h
            .core
            .query(Query::GetEncryptedAssetValue {
                principal: p1,
                symbol: "BTC".into(),
            })
            .unwrap()
        {
            QueryResponse::Handle(handle) => handle,
            other => panic!("unexpected {:?}", other),
        };
        match h.core.query(Query::GetOpaqueCiphertext(handle)).unwrap() {
            QueryResponse::Ciphertext(opaque) => assert!(!opaque.is_empty()),
            other => panic!("unexpected {:?}", other),
        }

        assert_eq!(
            h.core.query(Query::ListPortfolios).unwrap(),
            QueryResponse::Principals(vec![p1])
        );
    }
}

// ============================================================================
// Managers
// ============================================================================

mod manager_tests {
    use super::harness::Harness;
    use cipherfolio::ledger::{Capability, Command, ErrorKind, Principal};

    #[test]
    fn test_manager_can_act_and_read() {
        let h = Harness::new();
        let owner = Principal::from_label("owner");
        let manager = Principal::from_label("manager");
        h.create(owner);
        h.add(owner, "BTC", 1, 100).unwrap();

        h.core
            .execute(Command::AuthorizeManager {
                principal: owner,
                manager,
            })
            .unwrap();

        // Grants reach handles that existed before authorization
        let total = h.core.portfolios().encrypted_total_value(&owner).unwrap();
        assert!(h.core.acl().check(&total, &manager, Capability::Decrypt));

        h.core
            .execute_as(
                manager,
                Command::AddAsset {
                    principal: owner,
                    symbol: "ETH".into(),
                    amount: 1,
                    value: 50,
                },
            )
            .unwrap();

        let total = h.core.portfolios().encrypted_total_value(&owner).unwrap();
        assert_eq!(h.reveal(total, manager), 150);
        assert_eq!(h.core.portfolios().managers(&owner).unwrap(), vec![manager]);
    }

    #[test]
    fn test_revoked_manager_loses_access() {
        let h = Harness::new();
        let owner = Principal::from_label("owner");
        let manager = Principal::from_label("manager");
        h.create(owner);
        h.add(owner, "BTC", 1, 100).unwrap();
        h.core
            .execute(Command::AuthorizeManager {
                principal: owner,
                manager,
            })
            .unwrap();
        h.core
            .execute(Command::RevokeManager {
                principal: owner,
                manager,
            })
            .unwrap();

        let err = h
            .core
            .execute_as(
                manager,
                Command::RemoveAsset {
                    principal: owner,
                    symbol: "BTC".into(),
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAuthorized);

        let total = h.core.portfolios().encrypted_total_value(&owner).unwrap();
        assert_eq!(h.request(total, manager).unwrap_err().kind(), ErrorKind::NotAuthorized);
    }

    #[test]
    fn test_only_owner_manages_managers() {
        let h = Harness::new();
        let owner = Principal::from_label("owner");
        let manager = Principal::from_label("manager");
        let other = Principal::from_label("other");
        h.create(owner);
        h.core
            .execute(Command::AuthorizeManager {
                principal: owner,
                manager,
            })
            .unwrap();

        let err = h
            .core
            .execute_as(
                manager,
                Command::AuthorizeManager {
                    principal: owner,
                    manager: other,
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAuthorized);

        let err = h
            .core
            .execute(Command::AuthorizeManager {
                principal: owner,
                manager: owner,
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidManager);
    }
}

// ============================================================================
// Encrypted Comparisons
// ============================================================================

mod comparison_tests {
    use super::harness::Harness;
    use cipherfolio::ledger::{Command, ErrorKind, LedgerEvent, Principal};

    fn compared(event: LedgerEvent) -> cipherfolio::ledger::CiphertextHandle {
        match event {
            LedgerEvent::ComparisonComputed { result, .. } => result,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_compare_asset_values() {
        let h = Harness::new();
        let p = Principal::from_label("p");
        h.create(p);
        h.add(p, "BTC", 1, 900).unwrap();
        h.add(p, "ETH", 1, 300).unwrap();

        let gt = compared(
            h.core
                .execute(Command::CompareAssetValues {
                    principal: p,
                    first: "BTC".into(),
                    second: "ETH".into(),
                })
                .unwrap(),
        );
        assert_eq!(h.reveal(gt, p), 1);

        let lt = compared(
            h.core
                .execute(Command::CompareAssetValues {
                    principal: p,
                    first: "ETH".into(),
                    second: "BTC".into(),
                })
                .unwrap(),
        );
        assert_eq!(h.reveal(lt, p), 0);
    }

    #[test]
    fn test_compare_total_against_threshold() {
        let h = Harness::new();
        let p = Principal::from_label("p");
        h.create(p);
        h.add(p, "BTC", 1, 1_000).unwrap();

        for (threshold, expected) in [(999, 1), (1_000, 0), (5_000, 0)] {
            let result = compared(
                h.core
                    .execute(Command::CompareTotalAgainst {
                        principal: p,
                        threshold,
                    })
                    .unwrap(),
            );
            assert_eq!(h.reveal(result, p), expected, "threshold {}", threshold);
        }
    }

    #[test]
    fn test_compare_unknown_symbol() {
        let h = Harness::new();
        let p = Principal::from_label("p");
        h.create(p);
        h.add(p, "BTC", 1, 1).unwrap();

        let err = h
            .core
            .execute(Command::CompareAssetValues {
                principal: p,
                first: "BTC".into(),
                second: "XRP".into(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::AssetNotFound);
    }

    #[test]
    fn test_engine_requires_grants_on_inputs() {
        let h = Harness::new();
        let alice = Principal::from_label("alice");
        let bob = Principal::from_label("bob");

        let a = h.core.engine().encrypt(5, &alice, "x", &[alice]).unwrap();
        let b = h.core.engine().encrypt(6, &bob, "y", &[bob]).unwrap();

        let err = h.core.engine().add(&alice, &a, &b, &[alice]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAuthorized);

        let eq = h.core.engine().compare_equal(&alice, &a, &a, &[alice]).unwrap();
        assert_eq!(h.reveal(eq, alice), 1);
    }
}

// ============================================================================
// Decryption Flow
// ============================================================================

mod decryption_tests {
    use super::harness::Harness;
    use cipherfolio::ledger::{
        AuthorityProof, Capability, Command, ErrorKind, LedgerEvent, Principal, Query, QueryResponse,
        RequestStatus,
    };

    #[test]
    fn test_request_requires_decrypt_grant() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        let auditor = Principal::from_label("auditor");
        h.create(p1);
        h.add(p1, "BTC", 100_000_000, 5_000_000).unwrap();
        let total = h.core.portfolios().encrypted_total_value(&p1).unwrap();

        let err = h.request(total, auditor).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotAuthorized);

        h.core.acl().grant(total, auditor, Capability::Decrypt);
        let id = h.request(total, auditor).unwrap();
        assert_eq!(
            h.core.query(Query::GetRequestStatus(id)).unwrap(),
            QueryResponse::Status(RequestStatus::Pending)
        );

        h.answer(id);
        assert_eq!(h.core.take_decryption_result(id, &auditor).unwrap(), 5_000_000);
    }

    #[test]
    fn test_result_is_read_once_by_requester() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        let other = Principal::from_label("other");
        h.create(p1);
        let total = h.core.portfolios().encrypted_total_value(&p1).unwrap();

        let id = h.request(total, p1).unwrap();
        assert_eq!(
            h.core.take_decryption_result(id, &p1).unwrap_err().kind(),
            ErrorKind::ResultUnavailable
        );
        h.answer(id);

        assert_eq!(
            h.core.take_decryption_result(id, &other).unwrap_err().kind(),
            ErrorKind::NotAuthorized
        );
        assert_eq!(h.core.take_decryption_result(id, &p1).unwrap(), 0);
        assert_eq!(
            h.core.take_decryption_result(id, &p1).unwrap_err().kind(),
            ErrorKind::ResultUnavailable
        );
        assert_eq!(
            h.core.query(Query::GetRequestStatus(id)).unwrap(),
            QueryResponse::Status(RequestStatus::Fulfilled)
        );
    }

    #[test]
    fn test_forged_answer_is_rejected() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        h.create(p1);
        h.add(p1, "BTC", 1, 42).unwrap();
        let total = h.core.portfolios().encrypted_total_value(&p1).unwrap();
        let id = h.request(total, p1).unwrap();

        let request = h.core.decryption_request(id).unwrap();
        let ciphertext = h.core.ciphertext(&total).unwrap();
        let answer = h.authority.process(&request, &ciphertext).unwrap();

        // Valid signature, different plaintext
        let err = h
            .core
            .execute(Command::FulfillDecryption {
                request_id: id,
                plaintext: answer.plaintext + 1,
                proof: answer.proof.clone(),
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidProof);

        let err = h
            .core
            .execute(Command::FulfillDecryption {
                request_id: id,
                plaintext: answer.plaintext,
                proof: AuthorityProof::from_bytes(&[0u8; 64]),
            })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidProof);

        // Still pending, the real answer goes through
        h.core
            .execute(Command::FulfillDecryption {
                request_id: id,
                plaintext: answer.plaintext,
                proof: answer.proof,
            })
            .unwrap();
        assert_eq!(h.core.take_decryption_result(id, &p1).unwrap(), 42);
    }

    #[test]
    fn test_rejection_and_double_answer() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        h.create(p1);
        let total = h.core.portfolios().encrypted_total_value(&p1).unwrap();
        let id = h.request(total, p1).unwrap();

        let request = h.core.decryption_request(id).unwrap();
        let proof = h.authority.reject(&request);
        let event = h
            .core
            .execute(Command::RejectDecryption {
                request_id: id,
                proof: proof.clone(),
            })
            .unwrap();
        assert_eq!(event, LedgerEvent::DecryptionRejected { request_id: id });
        assert_eq!(
            h.core.decryption().status(id).unwrap(),
            RequestStatus::Failed
        );

        let err = h
            .core
            .execute(Command::RejectDecryption { request_id: id, proof })
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RequestNotPending);

        assert_eq!(
            h.core.decryption().status(999).unwrap_err().kind(),
            ErrorKind::UnknownRequest
        );
    }

    #[test]
    fn test_stale_requests_are_pruned() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        h.create(p1);
        let total = h.core.portfolios().encrypted_total_value(&p1).unwrap();

        let old = h.request(total, p1).unwrap();
        h.clock.advance(h.core.config().decryption_ttl_ms + 10);
        let fresh = h.request(total, p1).unwrap();

        assert_eq!(h.core.pending_decryptions().len(), 2);
        assert_eq!(h.core.prune_stale_decryptions(), vec![old]);
        assert_eq!(
            h.core.decryption().status(old).unwrap_err().kind(),
            ErrorKind::UnknownRequest
        );
        assert_eq!(h.core.decryption().status(fresh).unwrap(), RequestStatus::Pending);
    }

    #[test]
    fn test_ledger_never_holds_decryption_keys() {
        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        h.create(p1);
        h.add(p1, "BTC", 1, 77).unwrap();
        let value = h.core.portfolios().encrypted_asset_value(&p1, "BTC").unwrap();

        let opaque = h.core.store().get_opaque(&value).unwrap();
        assert!(!opaque
            .as_bytes()
            .windows(8)
            .any(|w| w == 77u64.to_le_bytes()));
        assert_ne!(h.keys.key_id(), [0u8; 32]);
    }
}

// ============================================================================
// Persistence
// ============================================================================

mod persistence_tests {
    use std::sync::Arc;

    use super::harness::Harness;
    use cipherfolio::fhe::{BackendPair, FHEConfig, PlaintextBackend};
    use cipherfolio::ledger::{Command, LedgerConfig, LedgerCore, ManualClock, Principal};
    use cipherfolio::storage::Storage;
    use tempfile::tempdir;

    #[test]
    fn test_snapshot_survives_storage_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let h = Harness::new();
        let p1 = Principal::from_label("p1");
        let manager = Principal::from_label("manager");
        h.create(p1);
        h.add(p1, "BTC", 3, 300).unwrap();
        h.add(p1, "ETH", 4, 400).unwrap();
        h.core
            .execute(Command::AuthorizeManager {
                principal: p1,
                manager,
            })
            .unwrap();
        let total = h.core.portfolios().encrypted_total_value(&p1).unwrap();
        let pending = h.request(total, p1).unwrap();

        let snapshot = h.core.snapshot();
        {
            let storage = Storage::open(&path).unwrap();
            storage.ledger.save_snapshot(&snapshot).unwrap();
        }

        let storage = Storage::open(&path).unwrap();
        let loaded = storage.ledger.load_snapshot().unwrap().unwrap();
        assert_eq!(loaded.digest(), snapshot.digest());

        let pair = BackendPair::from_config(&FHEConfig::default(), Some(&h.keys)).unwrap();
        let restored = LedgerCore::restore(
            loaded,
            LedgerConfig::default(),
            pair.backend,
            h.authority.verifying_key(),
            Arc::new(ManualClock::new(0)),
        )
        .unwrap();

        assert_eq!(
            *restored.portfolios().portfolio(&p1).unwrap(),
            *h.core.portfolios().portfolio(&p1).unwrap()
        );
        assert_eq!(restored.portfolios().managers(&p1).unwrap(), vec![manager]);
        assert_eq!(restored.pending_decryptions().len(), 1);

        // The authority can still answer a request made before the restart
        let request = restored.decryption_request(pending).unwrap();
        let ciphertext = restored.ciphertext(&request.handle).unwrap();
        let answer = h.authority.process(&request, &ciphertext).unwrap();
        restored.decryption().apply(&answer).unwrap();
        assert_eq!(restored.take_decryption_result(pending, &p1).unwrap(), 700);

        // Timestamps stay monotonic across a restore onto an earlier clock
        let before = restored.portfolios().asset_last_update(&p1, "ETH").unwrap();
        restored
            .execute(Command::UpdateAsset {
                principal: p1,
                symbol: "ETH".into(),
                amount: 1,
                value: 1,
            })
            .unwrap();
        assert!(restored.portfolios().asset_last_update(&p1, "ETH").unwrap() > before);
    }

    #[test]
    fn test_restore_rejects_scheme_mismatch() {
        let h = Harness::new();
        h.create(Principal::from_label("p1"));

        let err = LedgerCore::restore(
            h.core.snapshot(),
            LedgerConfig::default(),
            Arc::new(PlaintextBackend::new()),
            h.authority.verifying_key(),
            Arc::new(ManualClock::new(0)),
        )
        .unwrap_err();
        assert_eq!(err.kind(), cipherfolio::ledger::ErrorKind::Backend);
        assert_eq!(
            err,
            cipherfolio::ledger::LedgerError::Backend(cipherfolio::fhe::FHEError::SchemeMismatch {
                expected: "plaintext".into(),
                got: "sealed".into(),
            })
        );
    }
}
