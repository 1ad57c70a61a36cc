//! Conformance test suite for `TransactionalStateStorage` implementations.
//!
//! This module provides a backend-agnostic test suite that any storage
//! factory can run to verify correctness. The suite covers:
//!
//! - **Load**: never-written entities load as an empty record
//! - **Prepare**: the pending list stays sorted and unique by sequence id
//! - **Abort**: exactly the entries above the abort point are removed
//! - **Commit**: promotion, consolidation, corruption on a missing prepare
//! - **Version validation / OCC**: conflicting writers are rejected untouched
//! - **Round-trip**: what a store writes is exactly what a later load reads
//! - **Concurrency**: racing writers on one entity, exactly one wins
//!
//! # Usage
//!
//! Backend crates call [`run_conformance_suite`] with a function that creates
//! a fresh, empty storage factory for each test:
//!
//! ```ignore
//! use txstate_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async { memory_factory().await }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod abort;
mod commit;
mod concurrent;
mod load;
mod prepare;
mod roundtrip;
mod version;

use std::fmt;
use std::future::Future;

use crate::record::{LoadResult, PendingState};
use crate::{TransactionalStateStorage, TransactionalStorageFactory};

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "load", "commit", "version").
    pub category: String,
    /// Test name (e.g. "load_fresh_entity_is_empty").
    pub name: String,
    /// Whether the test passed.
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a storage backend.
///
/// The `factory` function is called once per test to create a fresh, empty
/// storage factory, ensuring test isolation. Tests that need several writers
/// on the same entity create several logs from that one factory.
pub async fn run_conformance_suite<P, F, Fut>(factory: F) -> ConformanceReport
where
    P: TransactionalStorageFactory,
    F: Fn() -> Fut,
    Fut: Future<Output = P>,
{
    let mut results = Vec::new();

    results.extend(load::run_load_tests(&factory).await);
    results.extend(prepare::run_prepare_tests(&factory).await);
    results.extend(abort::run_abort_tests(&factory).await);
    results.extend(commit::run_commit_tests(&factory).await);
    results.extend(version::run_version_tests(&factory).await);
    results.extend(roundtrip::run_roundtrip_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

type Log = Box<dyn TransactionalStateStorage<String>>;

fn pending(sequence_id: i64, state: &str) -> PendingState<String> {
    PendingState::new(
        sequence_id,
        state.to_string(),
        "2026-01-01T00:00:00Z",
        format!("tx-{sequence_id}"),
    )
}

fn metadata(tag: &str) -> serde_json::Value {
    serde_json::json!({ "timestamp": "2026-01-01T00:00:00Z", "tag": tag })
}

fn sequence_ids(pending: &[PendingState<String>]) -> Vec<i64> {
    pending.iter().map(|p| p.sequence_id).collect()
}

/// Create a log for `entity_key` and load it.
async fn open<P: TransactionalStorageFactory>(
    factory: &P,
    entity_key: &str,
) -> Result<(Log, LoadResult<String>), String> {
    let mut log = factory.create::<String>(entity_key);
    let loaded = log.load().await.map_err(|e| format!("load: {e}"))?;
    Ok((log, loaded))
}

/// Load the entity through a brand-new log, bypassing any cached record.
async fn reload<P: TransactionalStorageFactory>(
    factory: &P,
    entity_key: &str,
) -> Result<LoadResult<String>, String> {
    open(factory, entity_key).await.map(|(_, loaded)| loaded)
}

/// Store a prepare-only batch and return the new version.
async fn prepare_only(
    log: &mut Log,
    version: &str,
    states: Vec<PendingState<String>>,
) -> Result<String, String> {
    log.store(version, metadata("prepare"), states, None, None)
        .await
        .map_err(|e| format!("store: {e}"))
}
