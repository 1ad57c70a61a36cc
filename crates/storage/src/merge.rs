//! The abort, prepare-merge, commit protocol applied by every backend.
//!
//! Backends call [`StateRecord::apply_batch`] on a copy of their cached record,
//! persist the copy under a version guard, and only then adopt it. The steps
//! run in a fixed order: abort clears stale entries before new prepares are
//! merged, and commit sees the final pending set.

use serde::{Deserialize, Serialize};

use crate::error::StorageError;
use crate::record::{PendingState, StateRecord};

/// How instructions that reach at or below the committed point are treated:
/// an abort point under it, or a prepare at or under it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortPolicy {
    /// Accept any abort point; only pending entries above it are dropped.
    /// Prepares at or below the committed point are discarded.
    #[default]
    Permissive,
    /// Reject `abort_after < committed_sequence_id` and prepares with
    /// `sequence_id <= committed_sequence_id` as protocol violations.
    Strict,
}

/// One store call's worth of instructions from the transaction manager.
#[derive(Debug, Clone)]
pub struct StoreBatch<T> {
    pub metadata: serde_json::Value,
    pub states_to_prepare: Vec<PendingState<T>>,
    pub commit_up_to: Option<i64>,
    pub abort_after: Option<i64>,
}

impl<T> StoreBatch<T> {
    pub fn new(metadata: serde_json::Value) -> Self {
        Self {
            metadata,
            states_to_prepare: Vec::new(),
            commit_up_to: None,
            abort_after: None,
        }
    }

    pub fn prepare(mut self, states: impl IntoIterator<Item = PendingState<T>>) -> Self {
        self.states_to_prepare.extend(states);
        self
    }

    pub fn commit_up_to(mut self, sequence_id: i64) -> Self {
        self.commit_up_to = Some(sequence_id);
        self
    }

    pub fn abort_after(mut self, sequence_id: i64) -> Self {
        self.abort_after = Some(sequence_id);
        self
    }
}

impl<T> StateRecord<T> {
    /// Apply a batch in place. On error the record may be partially modified;
    /// callers work on a copy.
    pub fn apply_batch(
        &mut self,
        batch: StoreBatch<T>,
        policy: AbortPolicy,
    ) -> Result<(), StorageError> {
        self.metadata = batch.metadata;

        if let Some(abort_after) = batch.abort_after {
            if policy == AbortPolicy::Strict && abort_after < self.committed_sequence_id {
                return Err(StorageError::ProtocolViolation {
                    entity_key: self.id.clone(),
                    abort_after,
                    committed_sequence_id: self.committed_sequence_id,
                });
            }
            self.abort_after(abort_after);
        }

        if policy == AbortPolicy::Strict {
            if let Some(stale) = batch
                .states_to_prepare
                .iter()
                .find(|s| s.sequence_id <= self.committed_sequence_id)
            {
                return Err(StorageError::StalePrepare {
                    entity_key: self.id.clone(),
                    sequence_id: stale.sequence_id,
                    committed_sequence_id: self.committed_sequence_id,
                });
            }
        }
        for state in batch.states_to_prepare {
            self.merge_prepared(state);
        }

        if let Some(commit_up_to) = batch.commit_up_to {
            self.commit_up_to(commit_up_to)?;
        }

        Ok(())
    }

    /// Drop every pending entry with `sequence_id > abort_after`.
    pub fn abort_after(&mut self, abort_after: i64) {
        if let Some(pos) = self
            .pending_states
            .iter()
            .position(|p| p.sequence_id > abort_after)
        {
            self.pending_states.truncate(pos);
        }
    }

    /// Insert, replace, or append a prepared entry, preserving sort order.
    /// Entries at or below the committed point are already consolidated and
    /// are dropped; returns whether the entry was kept.
    pub fn merge_prepared(&mut self, state: PendingState<T>) -> bool {
        if state.sequence_id <= self.committed_sequence_id {
            return false;
        }
        match self
            .pending_states
            .iter()
            .position(|p| p.sequence_id >= state.sequence_id)
        {
            None => self.pending_states.push(state),
            Some(pos) if self.pending_states[pos].sequence_id == state.sequence_id => {
                self.pending_states[pos] = state;
            }
            Some(pos) => self.pending_states.insert(pos, state),
        }
        true
    }

    /// Promote the pending entry at `commit_up_to` and consolidate everything
    /// at or below it. A target at or below the committed point is a no-op.
    pub fn commit_up_to(&mut self, commit_up_to: i64) -> Result<(), StorageError> {
        if commit_up_to <= self.committed_sequence_id {
            return Ok(());
        }
        let pos = self
            .pending_states
            .iter()
            .position(|p| p.sequence_id == commit_up_to)
            .ok_or_else(|| StorageError::Corruption {
                entity_key: self.id.clone(),
                sequence_id: commit_up_to,
            })?;
        let committed = self
            .pending_states
            .drain(..=pos)
            .last()
            .ok_or_else(|| StorageError::Corruption {
                entity_key: self.id.clone(),
                sequence_id: commit_up_to,
            })?;
        self.committed_sequence_id = committed.sequence_id;
        self.committed_state = committed.state;
        Ok(())
    }
}
