use std::future::Future;

use super::{metadata, open, pending, prepare_only, reload, TestResult};
use crate::{StorageError, TransactionalStorageFactory};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<P, F, Fut>(factory: &F) -> Vec<TestResult>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_stores_exactly_one_wins",
        concurrent_stores_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_first_writes_exactly_one_wins",
        concurrent_first_writes_exactly_one_wins(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "concurrent_stores_different_entities_all_succeed",
        concurrent_stores_different_entities_all_succeed(factory).await,
    ));
    results.push(TestResult::from_result(
        "concurrent",
        "loser_retries_after_reload",
        loser_retries_after_reload(factory).await,
    ));

    results
}

/// Spawn one store per log, all holding `expected_version`; returns
/// (winner tags, loser count).
async fn race(
    logs: Vec<super::Log>,
    expected_version: &str,
) -> Result<(Vec<String>, usize), String> {
    let mut handles = Vec::new();
    for (i, mut log) in logs.into_iter().enumerate() {
        let expected = expected_version.to_string();
        handles.push(tokio::spawn(async move {
            let tag = format!("writer-{i}");
            let result = log
                .store(&expected, metadata(&tag), vec![pending(2, &tag)], None, None)
                .await;
            match result {
                Ok(_new_version) => Ok(Some(tag)), // won the race
                Err(StorageError::VersionConflict { .. }) => Ok(None), // lost the race
                Err(e) => Err(e),
            }
        }));
    }

    let mut winners = Vec::new();
    let mut losers = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: StorageError| format!("storage error: {e}"))?;
        match won {
            Some(tag) => winners.push(tag),
            None => losers += 1,
        }
    }
    Ok((winners, losers))
}

// ── Concurrent store: exactly one wins ──────────────────────────────────────

/// N logs load the same persisted version, then race to store. Exactly one
/// conditional write succeeds; the rest must get VersionConflict.
///
/// Every log passes its in-memory pre-check, so this exercises the
/// write-time guard rather than the cached baseline.
async fn concurrent_stores_exactly_one_wins<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut seed, loaded) = open(&p, "account-1").await?;
    let v1 = prepare_only(&mut seed, &loaded.version, vec![pending(1, "A")]).await?;

    let mut logs = Vec::new();
    for _ in 0..N {
        logs.push(open(&p, "account-1").await?.0);
    }
    let (winners, losers) = race(logs, &v1).await?;

    if winners.len() != 1 {
        return Err(format!("expected exactly 1 winner, got {}", winners.len()));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }

    let rec = reload(&p, "account-1").await?;
    let winner_state = rec.pending_states.get(1).map(|s| s.state.as_str());
    if rec.metadata != metadata(&winners[0]) || winner_state != Some(winners[0].as_str()) {
        return Err(format!("persisted record is not the winner's: {rec:?}"));
    }
    Ok(())
}

// ── Concurrent creation: exactly one wins ───────────────────────────────────

/// N logs see a never-written entity and race to create it.
async fn concurrent_first_writes_exactly_one_wins<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let mut logs = Vec::new();
    for _ in 0..N {
        logs.push(open(&p, "account-1").await?.0);
    }
    let (winners, losers) = race(logs, "").await?;

    if winners.len() != 1 {
        return Err(format!("expected exactly 1 winner, got {}", winners.len()));
    }
    if losers != N - 1 {
        return Err(format!("expected {} losers, got {losers}", N - 1));
    }
    Ok(())
}

// ── Different entities: no false conflicts ──────────────────────────────────

async fn concurrent_stores_different_entities_all_succeed<P, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let mut handles = Vec::new();
    for i in 0..N {
        let (mut log, loaded) = open(&p, &format!("account-{i}")).await?;
        handles.push(tokio::spawn(async move {
            log.store(
                &loaded.version,
                metadata("parallel"),
                vec![pending(1, "A")],
                Some(1),
                None,
            )
            .await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("account-{i}: {e}"))?;
    }

    for i in 0..N {
        let rec = reload(&p, &format!("account-{i}")).await?;
        if rec.committed_sequence_id != 1 || rec.committed_state != "A" {
            return Err(format!("account-{i} not committed: {rec:?}"));
        }
    }
    Ok(())
}

// ── Recovery: the loser reloads and retries ─────────────────────────────────

async fn loser_retries_after_reload<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut a, _) = open(&p, "account-1").await?;
    let (mut b, _) = open(&p, "account-1").await?;

    prepare_only(&mut a, "", vec![pending(1, "A")]).await?;
    let err = b
        .store("", metadata("b"), vec![pending(2, "B")], None, None)
        .await
        .err()
        .ok_or("expected b to conflict")?;
    if !err.is_conflict() {
        return Err(format!("expected a retryable conflict, got {err:?}"));
    }

    let reloaded = b.load().await.map_err(|e| format!("reload: {e}"))?;
    b.store(
        &reloaded.version,
        metadata("b"),
        vec![pending(2, "B")],
        None,
        None,
    )
    .await
    .map_err(|e| format!("retry: {e}"))?;

    let rec = reload(&p, "account-1").await?;
    if rec.pending_states.len() != 2 {
        return Err(format!("expected both prepares, got {:?}", rec.pending_states));
    }
    Ok(())
}
