use std::future::Future;

use super::{open, pending, prepare_only, reload, TestResult};
use crate::TransactionalStorageFactory;

pub(super) async fn run_load_tests<P, F, Fut>(factory: &F) -> Vec<TestResult>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let mut results = Vec::new();

    results.push(TestResult::from_result(
        "load",
        "load_fresh_entity_is_empty",
        load_fresh_entity_is_empty(factory).await,
    ));
    results.push(TestResult::from_result(
        "load",
        "load_fresh_entity_twice_is_stable",
        load_fresh_entity_twice_is_stable(factory).await,
    ));
    results.push(TestResult::from_result(
        "load",
        "load_is_scoped_to_entity_key",
        load_is_scoped_to_entity_key(factory).await,
    ));

    results
}

// ── 1. never-written entity loads empty ─────────────────────────────────────

async fn load_fresh_entity_is_empty<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let loaded = reload(&p, "account-1").await?;
    if !loaded.version.is_empty() {
        return Err(format!("expected empty version, got {:?}", loaded.version));
    }
    if loaded.committed_sequence_id != 0 {
        return Err(format!(
            "expected committed sequence 0, got {}",
            loaded.committed_sequence_id
        ));
    }
    if !loaded.committed_state.is_empty() {
        return Err(format!(
            "expected default committed state, got {:?}",
            loaded.committed_state
        ));
    }
    if !loaded.pending_states.is_empty() {
        return Err(format!(
            "expected no pending states, got {}",
            loaded.pending_states.len()
        ));
    }
    Ok(())
}

// ── 2. loading does not create the entity ───────────────────────────────────

async fn load_fresh_entity_twice_is_stable<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, first) = open(&p, "account-1").await?;
    let second = log.load().await.map_err(|e| format!("second load: {e}"))?;
    if first != second {
        return Err(format!("loads differ: {first:?} vs {second:?}"));
    }
    if !reload(&p, "account-1").await?.version.is_empty() {
        return Err("load must not persist a document".to_string());
    }
    Ok(())
}

// ── 3. writes to one entity are invisible to another ────────────────────────

async fn load_is_scoped_to_entity_key<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;
    prepare_only(&mut log, &loaded.version, vec![pending(1, "A")]).await?;

    let other = reload(&p, "account-2").await?;
    if !other.version.is_empty() || !other.pending_states.is_empty() {
        return Err(format!("account-2 should be untouched, got {other:?}"));
    }
    Ok(())
}
