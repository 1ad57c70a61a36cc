use std::future::Future;

use super::{metadata, open, pending, prepare_only, reload, sequence_ids, TestResult};
use crate::{StorageError, TransactionalStorageFactory};

pub(super) async fn run_commit_tests<P, F, Fut>(factory: &F) -> Vec<TestResult>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "commit",
        "commit_promotes_pending_entry",
        commit_promotes_pending_entry(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "commit_keeps_later_entries",
        commit_keeps_later_entries(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "commit_in_same_batch_as_prepare",
        commit_in_same_batch_as_prepare(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "commit_missing_entry_is_corruption",
        commit_missing_entry_is_corruption(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "corruption_has_correct_fields",
        corruption_has_correct_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "commit_at_committed_point_is_noop",
        commit_at_committed_point_is_noop(factory).await,
    ));
    results.push(TestResult::from_result(
        "commit",
        "prepare_below_commit_never_pending",
        prepare_below_commit_never_pending(factory).await,
    ));

    results
}

// ── 1. committed state and sequence follow the promoted entry ───────────────

async fn commit_promotes_pending_entry<P, F, Fut>(factory: &F) -> Result<(), String>
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
    log.store(&v1, metadata("commit"), Vec::new(), Some(2), None)
        .await
        .map_err(|e| format!("commit store: {e}"))?;

    let rec = reload(&p, "account-1").await?;
    if rec.committed_sequence_id != 2 {
        return Err(format!(
            "expected committed sequence 2, got {}",
            rec.committed_sequence_id
        ));
    }
    if rec.committed_state != "B" {
        return Err(format!("expected committed state B, got {:?}", rec.committed_state));
    }
    if !rec.pending_states.is_empty() {
        return Err(format!(
            "expected pending consolidated, got {:?}",
            sequence_ids(&rec.pending_states)
        ));
    }
    Ok(())
}

// ── 2. entries above the commit point survive ───────────────────────────────

async fn commit_keeps_later_entries<P, F, Fut>(factory: &F) -> Result<(), String>
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
    log.store(&v1, metadata("commit"), Vec::new(), Some(2), None)
        .await
        .map_err(|e| format!("commit store: {e}"))?;

    let rec = reload(&p, "account-1").await?;
    let ids = sequence_ids(&rec.pending_states);
    if ids != vec![3, 4] {
        return Err(format!("expected [3, 4] to remain, got {ids:?}"));
    }
    if rec.committed_state != "B" {
        return Err(format!("expected committed state B, got {:?}", rec.committed_state));
    }
    Ok(())
}

// ── 3. a commit sees prepares from its own batch ────────────────────────────

async fn commit_in_same_batch_as_prepare<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;
    log.store(
        &loaded.version,
        metadata("prepare+commit"),
        vec![pending(1, "A")],
        Some(1),
        None,
    )
    .await
    .map_err(|e| format!("store: {e}"))?;

    let rec = reload(&p, "account-1").await?;
    if rec.committed_sequence_id != 1 || rec.committed_state != "A" {
        return Err(format!(
            "expected committed (1, A), got ({}, {:?})",
            rec.committed_sequence_id, rec.committed_state
        ));
    }
    Ok(())
}

// ── 4. commit of an unprepared sequence id fails without writing ────────────

async fn commit_missing_entry_is_corruption<P, F, Fut>(factory: &F) -> Result<(), String>
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
        vec![pending(1, "A"), pending(3, "C")],
    )
    .await?;
    let before = reload(&p, "account-1").await?;

    let result = log
        .store(&v1, metadata("bad-commit"), vec![pending(4, "D")], Some(2), None)
        .await;
    match result {
        Err(StorageError::Corruption { .. }) => {}
        other => return Err(format!("expected Corruption, got {other:?}")),
    }

    let after = reload(&p, "account-1").await?;
    if before != after {
        return Err(format!("corrupt store must not write: {before:?} vs {after:?}"));
    }

    // The cached baseline is untouched too: the same version still works.
    log.store(&v1, metadata("retry"), Vec::new(), Some(1), None)
        .await
        .map_err(|e| format!("store after corruption: {e}"))?;
    Ok(())
}

// ── 5. corruption reports the entity and sequence id ────────────────────────

async fn corruption_has_correct_fields<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-7").await?;
    let result = log
        .store(&loaded.version, metadata("bad"), Vec::new(), Some(5), None)
        .await;
    match result {
        Err(StorageError::Corruption {
            entity_key,
            sequence_id,
        }) => {
            if entity_key != "account-7" {
                return Err(format!("expected entity_key 'account-7', got '{entity_key}'"));
            }
            if sequence_id != 5 {
                return Err(format!("expected sequence_id 5, got {sequence_id}"));
            }
            Ok(())
        }
        other => Err(format!("expected Corruption, got {other:?}")),
    }
}

// ── 6. commit_up_to at or below the committed point is ignored ──────────────

async fn commit_at_committed_point_is_noop<P, F, Fut>(factory: &F) -> Result<(), String>
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
            metadata("commit"),
            vec![pending(1, "A"), pending(2, "B")],
            Some(1),
            None,
        )
        .await
        .map_err(|e| format!("first store: {e}"))?;
    log.store(&v1, metadata("recommit"), Vec::new(), Some(1), None)
        .await
        .map_err(|e| format!("recommit store: {e}"))?;

    let rec = reload(&p, "account-1").await?;
    if rec.committed_sequence_id != 1 || rec.committed_state != "A" {
        return Err(format!(
            "expected committed (1, A), got ({}, {:?})",
            rec.committed_sequence_id, rec.committed_state
        ));
    }
    let ids = sequence_ids(&rec.pending_states);
    if ids != vec![2] {
        return Err(format!("expected [2] pending, got {ids:?}"));
    }
    Ok(())
}

// ── 7. a prepare at or below the committed point never becomes pending ──────

async fn prepare_below_commit_never_pending<P, F, Fut>(factory: &F) -> Result<(), String>
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
            metadata("commit"),
            vec![pending(1, "A"), pending(2, "B"), pending(3, "C")],
            Some(2),
            None,
        )
        .await
        .map_err(|e| format!("first store: {e}"))?;
    let before = reload(&p, "account-1").await?;

    // Backends may drop the late entry or reject the batch; either way it
    // must not land below the committed point.
    let result = log
        .store(&v1, metadata("late"), vec![pending(1, "late")], None, None)
        .await;
    let after = reload(&p, "account-1").await?;
    match result {
        Ok(_) => {
            if let Some(bad) = after
                .pending_states
                .iter()
                .find(|s| s.sequence_id <= after.committed_sequence_id)
            {
                return Err(format!(
                    "pending sequence {} at or below committed {}",
                    bad.sequence_id, after.committed_sequence_id
                ));
            }
            let ids = sequence_ids(&after.pending_states);
            if ids != vec![3] {
                return Err(format!("expected [3] pending, got {ids:?}"));
            }
        }
        Err(StorageError::StalePrepare { sequence_id: 1, .. }) => {
            if before != after {
                return Err(format!("rejected store must not write: {before:?} vs {after:?}"));
            }
        }
        Err(other) => return Err(format!("expected drop or StalePrepare, got {other:?}")),
    }
    if after.committed_state != "B" {
        return Err(format!("expected committed state B, got {:?}", after.committed_state));
    }
    Ok(())
}
