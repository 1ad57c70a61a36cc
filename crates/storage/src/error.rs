/// All errors that can be returned by a TransactionalStateStorage implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Optimistic concurrency control conflict: the version supplied by the
    /// caller is not the version currently held (in memory or in the store).
    /// Recoverable by reloading and retrying.
    #[error("version conflict on {entity_key}: expected version {expected_version:?}")]
    VersionConflict {
        entity_key: String,
        expected_version: String,
    },

    /// A commit referenced a sequence id with no prepared entry.
    #[error(
        "transactional state corrupted for {entity_key}: missing prepare record (sequence_id={sequence_id}) for committed transaction"
    )]
    Corruption { entity_key: String, sequence_id: i64 },

    /// Abort point lies below the committed point (strict abort policy only).
    #[error(
        "protocol violation on {entity_key}: abort_after {abort_after} is below committed sequence id {committed_sequence_id}"
    )]
    ProtocolViolation {
        entity_key: String,
        abort_after: i64,
        committed_sequence_id: i64,
    },

    /// Prepare at or below the committed point (strict abort policy only).
    #[error(
        "protocol violation on {entity_key}: prepare of sequence id {sequence_id} is at or below committed sequence id {committed_sequence_id}"
    )]
    StalePrepare {
        entity_key: String,
        sequence_id: i64,
        committed_sequence_id: i64,
    },

    /// `store` was called before `load` established a baseline.
    #[error("state for {entity_key} must be loaded before it is stored")]
    NotLoaded { entity_key: String },

    /// Invalid connection parameters or options. Raised at construction time.
    #[error("storage configuration error: {0}")]
    Configuration(String),

    /// A payload or metadata value could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A backend-specific storage error (I/O, unreachable store, etc.).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// True for errors the host is expected to recover from by reloading.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StorageError::VersionConflict { .. })
    }

    /// True for integrity faults that must never be retried or repaired.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StorageError::Corruption { .. }
                | StorageError::ProtocolViolation { .. }
                | StorageError::StalePrepare { .. }
                | StorageError::Configuration(_)
        )
    }
}
