use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use txstate_storage::{
    AbortPolicy, LoadResult, PendingState, StatePayload, StateRecord, StorageError, StoreBatch,
    TransactionalStateStorage,
};
use uuid::Uuid;

use crate::collection::DocumentCollection;
use crate::document::StateDocument;
use crate::serializer::PayloadSerializer;

/// The transactional state log for one entity, backed by one document.
///
/// Holds the record read by the last `load` (or written by the last
/// successful `store`) as the baseline for the next version check.
pub struct DocumentStateLog<T> {
    entity_key: String,
    collection: Arc<dyn DocumentCollection>,
    serializer: PayloadSerializer,
    abort_policy: AbortPolicy,
    record: Option<StateRecord<T>>,
}

impl<T: StatePayload> DocumentStateLog<T> {
    pub fn new(
        entity_key: impl Into<String>,
        collection: Arc<dyn DocumentCollection>,
        serializer: PayloadSerializer,
        abort_policy: AbortPolicy,
    ) -> Self {
        Self {
            entity_key: entity_key.into(),
            collection,
            serializer,
            abort_policy,
            record: None,
        }
    }

    /// The cached record, if `load` has run.
    pub fn record(&self) -> Option<&StateRecord<T>> {
        self.record.as_ref()
    }

    fn conflict(&self, expected_version: &str) -> StorageError {
        StorageError::VersionConflict {
            entity_key: self.entity_key.clone(),
            expected_version: expected_version.to_string(),
        }
    }
}

#[async_trait]
impl<T: StatePayload> TransactionalStateStorage<T> for DocumentStateLog<T> {
    fn entity_key(&self) -> &str {
        &self.entity_key
    }

    async fn load(&mut self) -> Result<LoadResult<T>, StorageError> {
        let record = match self.collection.find_one(&self.entity_key).await? {
            Some(doc) => doc.decode::<T>(&self.serializer)?,
            None => StateRecord::fresh(self.entity_key.clone()),
        };
        debug!(
            collection = self.collection.name(),
            entity_key = %self.entity_key,
            version = %record.version,
            committed_sequence_id = record.committed_sequence_id,
            pending = record.pending_states.len(),
            "loaded transactional state"
        );
        let result = record.to_load_result();
        self.record = Some(record);
        Ok(result)
    }

    async fn store(
        &mut self,
        expected_version: &str,
        metadata: serde_json::Value,
        states_to_prepare: Vec<PendingState<T>>,
        commit_up_to: Option<i64>,
        abort_after: Option<i64>,
    ) -> Result<String, StorageError> {
        let current = self.record.as_ref().ok_or_else(|| StorageError::NotLoaded {
            entity_key: self.entity_key.clone(),
        })?;
        if current.version != expected_version {
            warn!(
                entity_key = %self.entity_key,
                expected_version,
                current_version = %current.version,
                "version conflict before write"
            );
            return Err(self.conflict(expected_version));
        }

        let prepared = states_to_prepare.len();
        let batch = StoreBatch {
            metadata,
            states_to_prepare,
            commit_up_to,
            abort_after,
        };
        let mut next = current.clone();
        if let Err(e) = next.apply_batch(batch, self.abort_policy) {
            warn!(entity_key = %self.entity_key, error = %e, "rejected store batch");
            return Err(e);
        }
        next.version = Uuid::new_v4().to_string();

        let document = StateDocument::encode(&next, &self.serializer)?;
        if !self
            .collection
            .replace_one(expected_version, document)
            .await?
        {
            warn!(
                entity_key = %self.entity_key,
                expected_version,
                "version conflict at write"
            );
            return Err(self.conflict(expected_version));
        }

        debug!(
            collection = self.collection.name(),
            entity_key = %self.entity_key,
            version = %next.version,
            prepared,
            commit_up_to,
            abort_after,
            committed_sequence_id = next.committed_sequence_id,
            pending = next.pending_states.len(),
            "stored transactional state"
        );
        let version = next.version.clone();
        self.record = Some(next);
        Ok(version)
    }
}
