use std::future::Future;

use super::{metadata, open, pending, prepare_only, reload, sequence_ids, TestResult};
use crate::TransactionalStorageFactory;

pub(super) async fn run_abort_tests<P, F, Fut>(factory: &F) -> Vec<TestResult>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "abort",
        "abort_removes_entries_above_point",
        abort_removes_entries_above_point(factory).await,
    ));
    results.push(TestResult::from_result(
        "abort",
        "abort_beyond_all_pending_is_noop",
        abort_beyond_all_pending_is_noop(factory).await,
    ));
    results.push(TestResult::from_result(
        "abort",
        "abort_runs_before_prepare",
        abort_runs_before_prepare(factory).await,
    ));
    results.push(TestResult::from_result(
        "abort",
        "abort_on_empty_pending_is_noop",
        abort_on_empty_pending_is_noop(factory).await,
    ));

    results
}

// ── 1. abort_after = k drops exactly the entries above k ────────────────────

async fn abort_removes_entries_above_point<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;
    let v1 = prepare_only(
        &mut log,
        &loaded.version,
        vec![pending(1, "A"), pending(2, "B"), pending(3, "C"), pending(4, "D")],
    )
    .await?;
    log.store(&v1, metadata("abort"), Vec::new(), None, Some(2))
        .await
        .map_err(|e| format!("abort store: {e}"))?;

    let rec = reload(&p, "account-1").await?;
    let ids = sequence_ids(&rec.pending_states);
    if ids != vec![1, 2] {
        return Err(format!("expected [1, 2], got {ids:?}"));
    }
    Ok(())
}

// ── 2. abort above every pending id changes nothing ─────────────────────────

async fn abort_beyond_all_pending_is_noop<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;
    let v1 = prepare_only(
        &mut log,
        &loaded.version,
        vec![pending(1, "A"), pending(2, "B")],
    )
    .await?;
    log.store(&v1, metadata("abort"), Vec::new(), None, Some(99))
        .await
        .map_err(|e| format!("abort store: {e}"))?;

    let rec = reload(&p, "account-1").await?;
    let ids = sequence_ids(&rec.pending_states);
    if ids != vec![1, 2] {
        return Err(format!("expected [1, 2], got {ids:?}"));
    }
    Ok(())
}

// ── 3. abort in the same batch clears stale entries before new prepares ─────

async fn abort_runs_before_prepare<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;
    let v1 = prepare_only(
        &mut log,
        &loaded.version,
        vec![pending(1, "A"), pending(2, "stale"), pending(3, "stale")],
    )
    .await?;
    log.store(
        &v1,
        metadata("abort+prepare"),
        vec![pending(2, "fresh")],
        None,
        Some(1),
    )
    .await
    .map_err(|e| format!("store: {e}"))?;

    let rec = reload(&p, "account-1").await?;
    let ids = sequence_ids(&rec.pending_states);
    if ids != vec![1, 2] {
        return Err(format!("expected [1, 2], got {ids:?}"));
    }
    if rec.pending_states[1].state != "fresh" {
        return Err(format!(
            "expected freshly prepared payload, got {:?}",
            rec.pending_states[1].state
        ));
    }
    Ok(())
}

// ── 4. abort with nothing pending still writes metadata ─────────────────────

async fn abort_on_empty_pending_is_noop<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;
    log.store(&loaded.version, metadata("empty-abort"), Vec::new(), None, Some(0))
        .await
        .map_err(|e| format!("store: {e}"))?;

    let rec = reload(&p, "account-1").await?;
    if !rec.pending_states.is_empty() {
        return Err(format!("expected no pending, got {:?}", rec.pending_states));
    }
    if rec.metadata != metadata("empty-abort") {
        return Err(format!("metadata not persisted: {:?}", rec.metadata));
    }
    Ok(())
}
