use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Bounds every application state payload must satisfy.
///
/// Payloads are opaque to the storage layer; they only need to round-trip
/// through the backend's serializer.
pub trait StatePayload:
    Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
}

impl<T> StatePayload for T where
    T: Serialize + DeserializeOwned + Default + Clone + Send + Sync + 'static
{
}

/// A prepared-but-not-yet-committed state, tagged with its sequence id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingState<T> {
    pub sequence_id: i64,
    pub state: T,
    /// ISO 8601 / RFC 3339 timestamp string.
    pub timestamp: String,
    pub transaction_id: String,
}

impl<T> PendingState<T> {
    pub fn new(
        sequence_id: i64,
        state: T,
        timestamp: impl Into<String>,
        transaction_id: impl Into<String>,
    ) -> Self {
        Self {
            sequence_id,
            state,
            timestamp: timestamp.into(),
            transaction_id: transaction_id.into(),
        }
    }
}

/// Everything the transaction manager needs to recover after activation.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadResult<T> {
    /// Empty when the entity has never been written.
    pub version: String,
    pub committed_state: T,
    pub committed_sequence_id: i64,
    pub metadata: serde_json::Value,
    pub pending_states: Vec<PendingState<T>>,
}

impl<T: Default> Default for LoadResult<T> {
    fn default() -> Self {
        Self {
            version: String::new(),
            committed_state: T::default(),
            committed_sequence_id: 0,
            metadata: serde_json::Value::Null,
            pending_states: Vec::new(),
        }
    }
}

/// The in-memory image of one entity's persisted record.
///
/// Owned by a single log instance and mutated only while applying a store
/// batch. `pending_states` stays sorted ascending and unique by sequence id.
#[derive(Debug, Clone, PartialEq)]
pub struct StateRecord<T> {
    pub id: String,
    pub version: String,
    pub committed_state: T,
    pub committed_sequence_id: i64,
    pub metadata: serde_json::Value,
    pub pending_states: Vec<PendingState<T>>,
}

impl<T: Default> StateRecord<T> {
    /// A record that has never been durably written.
    pub fn fresh(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: String::new(),
            committed_state: T::default(),
            committed_sequence_id: 0,
            metadata: serde_json::Value::Null,
            pending_states: Vec::new(),
        }
    }
}

impl<T: Clone> StateRecord<T> {
    pub fn is_fresh(&self) -> bool {
        self.version.is_empty()
    }

    pub fn to_load_result(&self) -> LoadResult<T> {
        LoadResult {
            version: self.version.clone(),
            committed_state: self.committed_state.clone(),
            committed_sequence_id: self.committed_sequence_id,
            metadata: self.metadata.clone(),
            pending_states: self.pending_states.clone(),
        }
    }
}
