use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{LoadResult, PendingState, StatePayload};

/// Durable storage for one entity's transactional state log.
///
/// A `TransactionalStateStorage` instance is bound to a single entity key and
/// owns that entity's cached record. The host transaction manager drives it:
///
/// 1. `load()` once per activation, recovering the committed state, metadata
///    and pending (prepared) entries, and establishing the version baseline.
/// 2. `store(...)` zero or more times, each applying one batch of abort,
///    prepare and commit instructions in a single conditional write.
///
/// ## OCC Conflict Detection
///
/// `store` first checks `expected_version` against the cached version, then
/// persists with a write conditional on the stored version still being
/// `expected_version`. Either mismatch returns
/// `Err(StorageError::VersionConflict { .. })` and leaves both the persisted
/// record and the cached baseline unchanged. Retrying (from a fresh `load`)
/// is the caller's job.
///
/// ## Corruption
///
/// A `commit_up_to` above the committed point that has no matching pending
/// entry returns `Err(StorageError::Corruption { .. })` without writing.
///
/// ## Thread Safety
///
/// Instances are `Send` so they can move across task boundaries, but each is
/// used by one logical writer at a time (`&mut self`). Logs for different
/// entities are fully independent.
#[async_trait]
pub trait TransactionalStateStorage<T: StatePayload>: Send {
    /// The entity key this log is bound to.
    fn entity_key(&self) -> &str;

    /// Read the entity's record, or a fresh default if it was never written.
    async fn load(&mut self) -> Result<LoadResult<T>, StorageError>;

    /// Apply abort, prepare-merge and commit (in that order) and persist the
    /// result under the version guard. Returns the new version.
    async fn store(
        &mut self,
        expected_version: &str,
        metadata: serde_json::Value,
        states_to_prepare: Vec<PendingState<T>>,
        commit_up_to: Option<i64>,
        abort_after: Option<i64>,
    ) -> Result<String, StorageError>;
}

/// Produces per-entity storage logs bound to one backing collection and one
/// shared serializer configuration.
///
/// Construction of the factory itself is where configuration faults surface;
/// `create` never fails.
pub trait TransactionalStorageFactory: Send + Sync + 'static {
    /// Name of the collection every created log reads and writes.
    fn collection_name(&self) -> &str;

    /// Bind a new log to `entity_key`.
    fn create<T: StatePayload>(
        &self,
        entity_key: &str,
    ) -> Box<dyn TransactionalStateStorage<T>>;
}
