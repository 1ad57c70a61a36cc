use std::future::Future;

use super::{metadata, open, pending, prepare_only, reload, sequence_ids, TestResult};
use crate::TransactionalStorageFactory;

pub(super) async fn run_roundtrip_tests<P, F, Fut>(factory: &F) -> Vec<TestResult>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "roundtrip",
        "store_then_load_matches",
        store_then_load_matches(factory).await,
    ));
    results.push(TestResult::from_result(
        "roundtrip",
        "pending_fields_preserved",
        pending_fields_preserved(factory).await,
    ));
    results.push(TestResult::from_result(
        "roundtrip",
        "prepare_then_commit_scenario",
        prepare_then_commit_scenario(factory).await,
    ));
    results.push(TestResult::from_result(
        "roundtrip",
        "reload_then_continue",
        reload_then_continue(factory).await,
    ));

    results
}

// ── 1. a fresh log reads exactly what was written ───────────────────────────

async fn store_then_load_matches<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;
    let v1 = log
        .store(
            &loaded.version,
            metadata("roundtrip"),
            vec![pending(1, "A"), pending(2, "B"), pending(3, "C")],
            Some(1),
            None,
        )
        .await
        .map_err(|e| format!("store: {e}"))?;

    let rec = reload(&p, "account-1").await?;
    if rec.version != v1 || rec.version == loaded.version {
        return Err(format!(
            "expected new version {v1:?} (was {:?}), got {:?}",
            loaded.version, rec.version
        ));
    }
    if rec.committed_state != "A" || rec.committed_sequence_id != 1 {
        return Err(format!(
            "expected committed (1, A), got ({}, {:?})",
            rec.committed_sequence_id, rec.committed_state
        ));
    }
    if rec.metadata != metadata("roundtrip") {
        return Err(format!("metadata mismatch: {:?}", rec.metadata));
    }
    if rec.pending_states != vec![pending(2, "B"), pending(3, "C")] {
        return Err(format!("pending mismatch: {:?}", rec.pending_states));
    }
    Ok(())
}

// ── 2. timestamp and transaction id survive persistence ─────────────────────

async fn pending_fields_preserved<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;
    let mut entry = pending(9, "payload with \"quotes\" and \n newline");
    entry.timestamp = "2026-10-17T12:34:56.789Z".to_string();
    entry.transaction_id = "8d3f6c1e-tx".to_string();
    prepare_only(&mut log, &loaded.version, vec![entry.clone()]).await?;

    let rec = reload(&p, "account-1").await?;
    match rec.pending_states.as_slice() {
        [only] if *only == entry => Ok(()),
        other => Err(format!("expected [{entry:?}], got {other:?}")),
    }
}

// ── 3. never persisted → prepare → commit ───────────────────────────────────

async fn prepare_then_commit_scenario<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;
    if !loaded.version.is_empty() || loaded.committed_sequence_id != 0 {
        return Err(format!("expected fresh record, got {loaded:?}"));
    }

    let v1 = prepare_only(&mut log, "", vec![pending(1, "A")]).await?;
    let rec = reload(&p, "account-1").await?;
    if sequence_ids(&rec.pending_states) != vec![1] || rec.version != v1 {
        return Err(format!("after prepare: {rec:?}"));
    }

    let v2 = log
        .store(&v1, metadata("commit"), Vec::new(), Some(1), None)
        .await
        .map_err(|e| format!("commit: {e}"))?;
    let rec = reload(&p, "account-1").await?;
    if rec.committed_sequence_id != 1
        || rec.committed_state != "A"
        || !rec.pending_states.is_empty()
        || rec.version != v2
        || v2 == v1
    {
        return Err(format!("after commit: {rec:?}"));
    }
    Ok(())
}

// ── 4. a reactivated log picks up where the previous one stopped ────────────

async fn reload_then_continue<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let v1 = {
        let (mut log, loaded) = open(&p, "account-1").await?;
        prepare_only(&mut log, &loaded.version, vec![pending(1, "A"), pending(2, "B")]).await?
    };

    let (mut log, loaded) = open(&p, "account-1").await?;
    if loaded.version != v1 {
        return Err(format!("expected version {v1:?}, got {:?}", loaded.version));
    }
    log.store(&loaded.version, metadata("continue"), Vec::new(), Some(2), None)
        .await
        .map_err(|e| format!("commit after reload: {e}"))?;

    let rec = reload(&p, "account-1").await?;
    if rec.committed_state != "B" || !rec.pending_states.is_empty() {
        return Err(format!("after continue: {rec:?}"));
    }
    Ok(())
}
