use serde::{Deserialize, Serialize};
use txstate_storage::{PendingState, StatePayload, StateRecord, StorageError};

use crate::serializer::PayloadSerializer;

/// One entity's record as stored in the document collection.
///
/// Payload-bearing fields are serialized text so the document shape does not
/// depend on the application's state type. The pending list is a single
/// field, not a set of sub-documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    #[serde(rename = "_id")]
    pub id: String,
    pub version: String,
    pub committed_state: String,
    pub committed_sequence_id: i64,
    pub metadata: String,
    pub pending_states: String,
}

impl StateDocument {
    pub fn encode<T: StatePayload>(
        record: &StateRecord<T>,
        serializer: &PayloadSerializer,
    ) -> Result<Self, StorageError> {
        Ok(Self {
            id: record.id.clone(),
            version: record.version.clone(),
            committed_state: serializer.encode(&record.committed_state)?,
            committed_sequence_id: record.committed_sequence_id,
            metadata: serializer.encode(&record.metadata)?,
            pending_states: serializer.encode(&record.pending_states)?,
        })
    }

    pub fn decode<T: StatePayload>(
        self,
        serializer: &PayloadSerializer,
    ) -> Result<StateRecord<T>, StorageError> {
        let pending_states: Vec<PendingState<T>> = serializer.decode(&self.pending_states)?;
        Ok(StateRecord {
            committed_state: serializer.decode(&self.committed_state)?,
            metadata: serializer.decode(&self.metadata)?,
            id: self.id,
            version: self.version,
            committed_sequence_id: self.committed_sequence_id,
            pending_states,
        })
    }
}
