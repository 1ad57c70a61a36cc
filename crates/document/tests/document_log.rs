//! Document-backend behavior beyond the shared conformance suite:
//! typed payloads, the strict abort policy, persistence across factories,
//! and the on-disk document shape.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use txstate_document::{
    AbortPolicy, DocumentCollection, DocumentStorageFactory, MemoryCollection, PendingState,
    SerializerSettings, StorageError, StoreOptions, TransactionalStateStorage,
    TransactionalStorageFactory,
};

// ──────────────────────────────────────────────
// Fixtures
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Account {
    owner: String,
    balance: i64,
    tags: Vec<String>,
}

fn account(balance: i64) -> Account {
    Account {
        owner: "alice".to_string(),
        balance,
        tags: vec!["retail".to_string()],
    }
}

fn prepared(seq: i64, balance: i64) -> PendingState<Account> {
    PendingState::new(seq, account(balance), "2026-10-17T00:00:00Z", format!("tx-{seq}"))
}

fn memory_factory(options: &StoreOptions) -> (DocumentStorageFactory, Arc<MemoryCollection>) {
    let collection = Arc::new(MemoryCollection::new("Transactions_accounts"));
    let factory = DocumentStorageFactory::with_collection(collection.clone(), options);
    (factory, collection)
}

// ──────────────────────────────────────────────
// Scenario
// ──────────────────────────────────────────────

#[tokio::test]
async fn prepare_commit_scenario_with_typed_state() {
    let (factory, collection) = memory_factory(&StoreOptions::new("memory://"));
    let mut log = factory.log::<Account>("account-1");

    let loaded = log.load().await.unwrap();
    assert_eq!(loaded.version, "");
    assert_eq!(loaded.committed_state, Account::default());
    assert_eq!(loaded.committed_sequence_id, 0);
    assert!(loaded.pending_states.is_empty());
    assert!(collection.is_empty().unwrap());

    let v1 = log
        .store("", json!({"step": 1}), vec![prepared(1, 100)], None, None)
        .await
        .unwrap();
    assert_eq!(collection.len().unwrap(), 1);
    let record = log.record().unwrap();
    assert_eq!(record.version, v1);
    assert_eq!(record.pending_states, vec![prepared(1, 100)]);

    let v2 = log
        .store(&v1, json!({"step": 2}), Vec::new(), Some(1), None)
        .await
        .unwrap();
    assert_ne!(v1, v2);

    let reloaded = factory.log::<Account>("account-1").load().await.unwrap();
    assert_eq!(reloaded.version, v2);
    assert_eq!(reloaded.committed_sequence_id, 1);
    assert_eq!(reloaded.committed_state, account(100));
    assert_eq!(reloaded.metadata, json!({"step": 2}));
    assert!(reloaded.pending_states.is_empty());
}

#[tokio::test]
async fn boxed_log_from_factory_trait() {
    let factory =
        DocumentStorageFactory::connect("accounts", &StoreOptions::new("memory://")).unwrap();
    assert_eq!(factory.collection_name(), "Transactions_accounts");

    let mut log: Box<dyn TransactionalStateStorage<Account>> = factory.create("account-9");
    assert_eq!(log.entity_key(), "account-9");
    let loaded = log.load().await.unwrap();
    log.store(&loaded.version, json!(null), vec![prepared(3, 7)], Some(3), None)
        .await
        .unwrap();
    let again = factory.create::<Account>("account-9").load().await.unwrap();
    assert_eq!(again.committed_state.balance, 7);
}

// ──────────────────────────────────────────────
// Abort policy
// ──────────────────────────────────────────────

async fn committed_at_two(options: &StoreOptions) -> (DocumentStorageFactory, String) {
    let (factory, _) = memory_factory(options);
    let mut log = factory.log::<Account>("account-1");
    log.load().await.unwrap();
    let version = log
        .store(
            "",
            json!(null),
            vec![prepared(1, 10), prepared(2, 20), prepared(3, 30)],
            Some(2),
            None,
        )
        .await
        .unwrap();
    (factory, version)
}

#[tokio::test]
async fn strict_policy_rejects_abort_below_commit_without_writing() {
    let options = StoreOptions::new("memory://").with_abort_policy(AbortPolicy::Strict);
    let (factory, version) = committed_at_two(&options).await;

    let mut log = factory.log::<Account>("account-1");
    log.load().await.unwrap();
    let err = log
        .store(&version, json!("late"), Vec::new(), None, Some(1))
        .await
        .unwrap_err();
    match &err {
        StorageError::ProtocolViolation {
            entity_key,
            abort_after,
            committed_sequence_id,
        } => {
            assert_eq!(entity_key, "account-1");
            assert_eq!(*abort_after, 1);
            assert_eq!(*committed_sequence_id, 2);
        }
        other => panic!("expected ProtocolViolation, got {other:?}"),
    }
    assert!(err.is_fatal());

    let after = factory.log::<Account>("account-1").load().await.unwrap();
    assert_eq!(after.version, version);
    assert_eq!(after.pending_states.len(), 1);
}

#[tokio::test]
async fn strict_policy_rejects_prepare_at_commit_point() {
    let options = StoreOptions::new("memory://").with_abort_policy(AbortPolicy::Strict);
    let (factory, version) = committed_at_two(&options).await;

    let mut log = factory.log::<Account>("account-1");
    log.load().await.unwrap();
    let err = log
        .store(&version, json!(null), vec![prepared(4, 40), prepared(2, 99)], None, None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        StorageError::StalePrepare {
            sequence_id: 2,
            committed_sequence_id: 2,
            ..
        }
    ));
    assert!(err.is_fatal());

    let after = factory.log::<Account>("account-1").load().await.unwrap();
    assert_eq!(after.version, version);
    assert_eq!(after.pending_states.len(), 1);
    assert_eq!(after.committed_state.balance, 20);
}

#[tokio::test]
async fn permissive_policy_drops_prepare_below_commit() {
    let (factory, version) = committed_at_two(&StoreOptions::new("memory://")).await;

    let mut log = factory.log::<Account>("account-1");
    log.load().await.unwrap();
    log.store(&version, json!(null), vec![prepared(1, 99), prepared(4, 40)], None, None)
        .await
        .unwrap();
    let after = factory.log::<Account>("account-1").load().await.unwrap();
    let ids: Vec<i64> = after.pending_states.iter().map(|p| p.sequence_id).collect();
    assert_eq!(ids, vec![3, 4]);
    assert_eq!(after.committed_state.balance, 20);
}

#[tokio::test]
async fn strict_policy_allows_abort_at_commit_point() {
    let options = StoreOptions::new("memory://").with_abort_policy(AbortPolicy::Strict);
    let (factory, version) = committed_at_two(&options).await;

    let mut log = factory.log::<Account>("account-1");
    log.load().await.unwrap();
    log.store(&version, json!(null), Vec::new(), None, Some(2))
        .await
        .unwrap();
    let after = factory.log::<Account>("account-1").load().await.unwrap();
    assert!(after.pending_states.is_empty());
    assert_eq!(after.committed_sequence_id, 2);
}

#[tokio::test]
async fn permissive_policy_accepts_abort_below_commit() {
    let (factory, version) = committed_at_two(&StoreOptions::new("memory://")).await;

    let mut log = factory.log::<Account>("account-1");
    log.load().await.unwrap();
    log.store(&version, json!(null), Vec::new(), None, Some(0))
        .await
        .unwrap();
    let after = factory.log::<Account>("account-1").load().await.unwrap();
    assert!(after.pending_states.is_empty());
    assert_eq!(after.committed_state, account(20));
}

// ──────────────────────────────────────────────
// File persistence
// ──────────────────────────────────────────────

#[tokio::test]
async fn file_store_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let options = StoreOptions::new(format!("file://{}", dir.path().display()))
        .with_serializer(SerializerSettings { pretty: true });

    let version = {
        let factory = DocumentStorageFactory::connect("accounts", &options).unwrap();
        let mut log = factory.log::<Account>("tenant/account-1");
        log.load().await.unwrap();
        log.store(
            "",
            json!({"owner": "tm-1"}),
            vec![prepared(1, 5), prepared(2, 6)],
            Some(1),
            None,
        )
        .await
        .unwrap()
    };

    let factory = DocumentStorageFactory::connect("accounts", &options).unwrap();
    let loaded = factory
        .log::<Account>("tenant/account-1")
        .load()
        .await
        .unwrap();
    assert_eq!(loaded.version, version);
    assert_eq!(loaded.committed_state, account(5));
    assert_eq!(loaded.pending_states, vec![prepared(2, 6)]);
    assert_eq!(loaded.metadata, json!({"owner": "tm-1"}));

    let documents = std::fs::read_dir(dir.path().join("Transactions_accounts"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .count();
    assert_eq!(documents, 1);
}

/// Two factories connected to the same directory hold separate handles; the
/// file lock still lets exactly one first write through per entity.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn separate_file_factories_exactly_one_wins() {
    let dir = tempfile::tempdir().unwrap();
    let options = StoreOptions::new(format!("file://{}", dir.path().display()));
    let left = DocumentStorageFactory::connect("accounts", &options).unwrap();
    let right = DocumentStorageFactory::connect("accounts", &options).unwrap();

    for round in 0..50 {
        let key = format!("account-{round}");
        let mut a = left.log::<Account>(&key);
        let mut b = right.log::<Account>(&key);
        a.load().await.unwrap();
        b.load().await.unwrap();

        let ta = tokio::spawn(async move {
            a.store("", json!("a"), vec![prepared(1, 1)], None, None).await
        });
        let tb = tokio::spawn(async move {
            b.store("", json!("b"), vec![prepared(1, 2)], None, None).await
        });

        let mut winners = 0;
        for result in [ta.await.unwrap(), tb.await.unwrap()] {
            match result {
                Ok(_) => winners += 1,
                Err(e) => assert!(e.is_conflict(), "round {round}: unexpected {e:?}"),
            }
        }
        assert_eq!(winners, 1, "round {round}: expected exactly one winner");

        let stored = left.log::<Account>(&key).load().await.unwrap();
        let expected = if stored.metadata == json!("a") { 1 } else { 2 };
        assert_eq!(stored.pending_states, vec![prepared(1, expected)]);
    }
}

#[tokio::test]
async fn separate_file_factories_see_stale_version() {
    let dir = tempfile::tempdir().unwrap();
    let options = StoreOptions::new(format!("file://{}", dir.path().display()));
    let left = DocumentStorageFactory::connect("accounts", &options).unwrap();
    let right = DocumentStorageFactory::connect("accounts", &options).unwrap();

    let mut seed = left.log::<Account>("account-1");
    seed.load().await.unwrap();
    let v1 = seed
        .store("", json!(null), vec![prepared(1, 1)], None, None)
        .await
        .unwrap();

    let mut a = left.log::<Account>("account-1");
    let mut b = right.log::<Account>("account-1");
    a.load().await.unwrap();
    b.load().await.unwrap();
    a.store(&v1, json!("a"), Vec::new(), Some(1), None)
        .await
        .unwrap();
    let err = b
        .store(&v1, json!("b"), vec![prepared(2, 2)], None, None)
        .await
        .unwrap_err();
    assert!(err.is_conflict());

    let stored = right.log::<Account>("account-1").load().await.unwrap();
    assert_eq!(stored.metadata, json!("a"));
    assert!(stored.pending_states.is_empty());
}

#[tokio::test]
async fn persisted_document_holds_text_fields() {
    let (factory, collection) = memory_factory(&StoreOptions::new("memory://"));
    let mut log = factory.log::<Account>("account-1");
    log.load().await.unwrap();
    let version = log
        .store("", json!({"k": "v"}), vec![prepared(4, 40)], None, None)
        .await
        .unwrap();

    let doc = collection.find_one("account-1").await.unwrap().unwrap();
    assert_eq!(doc.id, "account-1");
    assert_eq!(doc.version, version);
    assert_eq!(doc.committed_sequence_id, 0);
    let pending: Vec<PendingState<Account>> = serde_json::from_str(&doc.pending_states).unwrap();
    assert_eq!(pending, vec![prepared(4, 40)]);
    let metadata: serde_json::Value = serde_json::from_str(&doc.metadata).unwrap();
    assert_eq!(metadata, json!({"k": "v"}));
}

// ──────────────────────────────────────────────
// Errors
// ──────────────────────────────────────────────

#[tokio::test]
async fn payload_type_mismatch_is_serialization_error() {
    let (factory, _) = memory_factory(&StoreOptions::new("memory://"));
    let mut log = factory.log::<Account>("account-1");
    log.load().await.unwrap();
    log.store("", json!(null), vec![prepared(1, 1)], Some(1), None)
        .await
        .unwrap();

    let err = factory.log::<u64>("account-1").load().await.unwrap_err();
    assert!(matches!(err, StorageError::Serialization(_)));
}

#[test]
fn options_file_drives_connect() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("txstate.toml");
    std::fs::write(
        &path,
        "connection_string = \"memory://ops\"\ncollection_prefix = \"Tx_\"\nabort_policy = \"strict\"\n",
    )
    .unwrap();
    let options = StoreOptions::from_path(&path).unwrap();
    let factory = DocumentStorageFactory::connect("ledger", &options).unwrap();
    assert_eq!(factory.collection_name(), "Tx_ledger");
    assert_eq!(options.abort_policy, AbortPolicy::Strict);

    let missing = StoreOptions::from_path(&dir.path().join("absent.toml"));
    assert!(matches!(missing, Err(StorageError::Configuration(_))));
}
