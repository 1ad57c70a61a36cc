use std::future::Future;

use super::{metadata, open, pending, prepare_only, reload, TestResult};
use crate::{StorageError, TransactionalStorageFactory};

pub(super) async fn run_version_tests<P, F, Fut>(factory: &F) -> Vec<TestResult>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let mut results = Vec::new();

    // Version tracking
    results.push(TestResult::from_result(
        "version",
        "first_store_assigns_version",
        first_store_assigns_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "every_store_assigns_fresh_version",
        every_store_assigns_fresh_version(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "returned_version_matches_persisted",
        returned_version_matches_persisted(factory).await,
    ));

    // Wrong version fails
    results.push(TestResult::from_result(
        "version",
        "store_with_wrong_version_conflicts",
        store_with_wrong_version_conflicts(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "conflict_leaves_document_unchanged",
        conflict_leaves_document_unchanged(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "stale_version_after_intervening_write",
        stale_version_after_intervening_write(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "fresh_writer_loses_to_first_insert",
        fresh_writer_loses_to_first_insert(factory).await,
    ));

    // Error fields
    results.push(TestResult::from_result(
        "version",
        "conflict_has_correct_fields",
        conflict_has_correct_fields(factory).await,
    ));
    results.push(TestResult::from_result(
        "version",
        "store_before_load_is_rejected",
        store_before_load_is_rejected(factory).await,
    ));

    results
}

// ── Version tracking ────────────────────────────────────────────────────────

async fn first_store_assigns_version<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;
    let v1 = prepare_only(&mut log, &loaded.version, vec![pending(1, "A")]).await?;
    if v1.is_empty() {
        return Err("first store returned an empty version".to_string());
    }
    Ok(())
}

async fn every_store_assigns_fresh_version<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;

    let mut seen = vec![loaded.version];
    for i in 1..=5 {
        let prev = seen.last().cloned().unwrap_or_default();
        // Identical content each round: the version must still change.
        let next = log
            .store(&prev, metadata("same"), Vec::new(), None, None)
            .await
            .map_err(|e| format!("store {i}: {e}"))?;
        if seen.contains(&next) {
            return Err(format!("store {i} reused version {next:?}"));
        }
        seen.push(next);
    }
    Ok(())
}

async fn returned_version_matches_persisted<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;
    let v1 = prepare_only(&mut log, &loaded.version, vec![pending(1, "A")]).await?;

    let rec = reload(&p, "account-1").await?;
    if rec.version != v1 {
        return Err(format!("returned {v1:?}, persisted {:?}", rec.version));
    }
    Ok(())
}

// ── Wrong version fails ─────────────────────────────────────────────────────

async fn store_with_wrong_version_conflicts<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, _) = open(&p, "account-1").await?;
    let result = log
        .store("not-a-version", metadata("x"), vec![pending(1, "A")], None, None)
        .await;
    match result {
        Err(StorageError::VersionConflict { .. }) => Ok(()),
        other => Err(format!("expected VersionConflict, got {other:?}")),
    }
}

async fn conflict_leaves_document_unchanged<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, loaded) = open(&p, "account-1").await?;
    let v1 = prepare_only(&mut log, &loaded.version, vec![pending(1, "A")]).await?;
    let before = reload(&p, "account-1").await?;

    let result = log
        .store("", metadata("stale"), vec![pending(2, "B")], Some(1), None)
        .await;
    if !matches!(result, Err(StorageError::VersionConflict { .. })) {
        return Err(format!("expected VersionConflict, got {result:?}"));
    }

    let after = reload(&p, "account-1").await?;
    if before != after {
        return Err(format!("conflict must not write: {before:?} vs {after:?}"));
    }

    // The cached baseline still accepts the current version.
    prepare_only(&mut log, &v1, vec![pending(2, "B")]).await?;
    Ok(())
}

/// Two logs load the same version; the second to write is rejected at
/// write time even though its in-memory pre-check passes.
async fn stale_version_after_intervening_write<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut seed, loaded) = open(&p, "account-1").await?;
    let v1 = prepare_only(&mut seed, &loaded.version, vec![pending(1, "A")]).await?;

    let (mut first, _) = open(&p, "account-1").await?;
    let (mut second, _) = open(&p, "account-1").await?;

    first
        .store(&v1, metadata("first"), Vec::new(), Some(1), None)
        .await
        .map_err(|e| format!("first writer: {e}"))?;

    let result = second
        .store(&v1, metadata("second"), vec![pending(2, "B")], None, None)
        .await;
    match result {
        Err(StorageError::VersionConflict { .. }) => {}
        other => return Err(format!("expected VersionConflict, got {other:?}")),
    }

    let rec = reload(&p, "account-1").await?;
    if rec.metadata != metadata("first") {
        return Err(format!("second writer leaked into store: {:?}", rec.metadata));
    }
    Ok(())
}

/// Two logs load a never-written entity; only one may create it.
async fn fresh_writer_loses_to_first_insert<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut first, _) = open(&p, "account-1").await?;
    let (mut second, _) = open(&p, "account-1").await?;

    prepare_only(&mut first, "", vec![pending(1, "A")]).await?;
    let result = second
        .store("", metadata("second"), vec![pending(1, "Z")], None, None)
        .await;
    match result {
        Err(StorageError::VersionConflict { .. }) => Ok(()),
        other => Err(format!("expected VersionConflict, got {other:?}")),
    }
}

// ── Error fields ────────────────────────────────────────────────────────────

async fn conflict_has_correct_fields<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let (mut log, _) = open(&p, "account-42").await?;
    let result = log
        .store("bogus", metadata("x"), Vec::new(), None, None)
        .await;
    match result {
        Err(StorageError::VersionConflict {
            entity_key,
            expected_version,
        }) => {
            if entity_key != "account-42" {
                return Err(format!(
                    "expected entity_key 'account-42', got '{entity_key}'"
                ));
            }
            if expected_version != "bogus" {
                return Err(format!(
                    "expected expected_version 'bogus', got '{expected_version}'"
                ));
            }
            Ok(())
        }
        other => Err(format!("expected VersionConflict, got {other:?}")),
    }
}

async fn store_before_load_is_rejected<P, F, Fut>(factory: &F) -> Result<(), String>
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let p = factory().await;
    let mut log = p.create::<String>("account-1");
    let result = log
        .store("", metadata("x"), vec![pending(1, "A")], None, None)
        .await;
    match result {
        Err(StorageError::NotLoaded { entity_key }) if entity_key == "account-1" => {}
        other => return Err(format!("expected NotLoaded, got {other:?}")),
    }
    if !reload(&p, "account-1").await?.version.is_empty() {
        return Err("rejected store must not write".to_string());
    }
    Ok(())
}
