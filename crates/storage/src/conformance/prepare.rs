use std::future::Future;

use super::{open, pending, prepare_only, reload, sequence_ids, TestResult};
use crate::TransactionalStorageFactory;

pub(super) async fn run_prepare_tests<P, F, Fut>(factory: &F) -> Vec<TestResult>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "prepare",
        "prepare_appends_in_order",
        prepare_appends_in_order(factory).await,
    ));
    results.push(TestResult::from_result(
        "prepare",
        "prepare_out_of_order_stays_sorted",
        prepare_out_of_order_stays_sorted(factory).await,
    ));
    results.push(TestResult::from_result(
        "prepare",
        "reprepare_replaces_payload",
        reprepare_replaces_payload(factory).await,
    ));
    results.push(TestResult::from_result(
        "prepare",
        "prepare_across_batches_sorted_and_unique",
        prepare_across_batches_sorted_and_unique(factory).await,
    ));

    results
}

// ── 1. ascending prepares append ────────────────────────────────────────────

async fn prepare_appends_in_order<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;
    prepare_only(
        &mut log,
        &loaded.version,
        vec![pending(1, "A"), pending(2, "B"), pending(3, "C")],
    )
    .await?;

    let rec = reload(&p, "account-1").await?;
    let ids = sequence_ids(&rec.pending_states);
    if ids != vec![1, 2, 3] {
        return Err(format!("expected [1, 2, 3], got {ids:?}"));
    }
    Ok(())
}

// ── 2. out-of-order prepares are inserted in place ──────────────────────────

async fn prepare_out_of_order_stays_sorted<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;
    prepare_only(
        &mut log,
        &loaded.version,
        vec![pending(4, "D"), pending(1, "A"), pending(3, "C"), pending(2, "B")],
    )
    .await?;

    let rec = reload(&p, "account-1").await?;
    let ids = sequence_ids(&rec.pending_states);
    if ids != vec![1, 2, 3, 4] {
        return Err(format!("expected [1, 2, 3, 4], got {ids:?}"));
    }
    let states: Vec<&str> = rec.pending_states.iter().map(|s| s.state.as_str()).collect();
    if states != vec!["A", "B", "C", "D"] {
        return Err(format!("payloads out of step with ids: {states:?}"));
    }
    Ok(())
}

// ── 3. re-prepare replaces without growing the list ─────────────────────────

async fn reprepare_replaces_payload<P, F, Fut>(factory: &F) -> Result<(), String>
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
    prepare_only(&mut log, &v1, vec![pending(2, "B2")]).await?;

    let rec = reload(&p, "account-1").await?;
    if rec.pending_states.len() != 2 {
        return Err(format!(
            "expected 2 pending states, got {}",
            rec.pending_states.len()
        ));
    }
    if rec.pending_states[1].state != "B2" {
        return Err(format!(
            "expected replaced payload B2, got {:?}",
            rec.pending_states[1].state
        ));
    }
    Ok(())
}

// ── 4. many batches, duplicates included, stay sorted ───────────────────────

async fn prepare_across_batches_sorted_and_unique<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;
    let batches: [&[i64]; 4] = [&[5, 3], &[3, 8, 1], &[2, 8], &[7, 1, 6]];

    let mut version = loaded.version;
    for batch in batches {
        let states = batch.iter().map(|s| pending(*s, &format!("v{s}"))).collect();
        version = prepare_only(&mut log, &version, states).await?;
    }

    let rec = reload(&p, "account-1").await?;
    let ids = sequence_ids(&rec.pending_states);
    if ids != vec![1, 2, 3, 5, 6, 7, 8] {
        return Err(format!("expected [1, 2, 3, 5, 6, 7, 8], got {ids:?}"));
    }
    Ok(())
}
