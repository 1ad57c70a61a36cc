//! Document collection drivers.
//!
//! A driver stores one [`StateDocument`] per entity key and offers exactly the
//! two primitives the transactional log needs: a point read by `_id` and an
//! atomic conditional upsert guarded by the stored version.

mod file;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use txstate_storage::StorageError;

use crate::config::Connection;
use crate::document::StateDocument;

pub use file::FileCollection;
pub use memory::MemoryCollection;

/// A handle to one collection of state documents.
#[async_trait]
pub trait DocumentCollection: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Read the document whose `_id` is `id`.
    async fn find_one(&self, id: &str) -> Result<Option<StateDocument>, StorageError>;

    /// Conditional upsert filtered on `(_id = document.id, version = expected_version)`.
    ///
    /// Replaces the stored document when its version equals
    /// `expected_version`, or inserts when no document exists and
    /// `expected_version` is empty. Returns `Ok(false)` when nothing matched;
    /// the stored document is then left untouched. The check and the write
    /// are atomic with respect to every other caller of this collection.
    async fn replace_one(
        &self,
        expected_version: &str,
        document: StateDocument,
    ) -> Result<bool, StorageError>;
}

/// Open the collection `name` on `connection`.
pub fn open_collection(
    connection: &Connection,
    name: &str,
) -> Result<Arc<dyn DocumentCollection>, StorageError> {
    match connection {
        Connection::Memory { .. } => Ok(Arc::new(MemoryCollection::new(name))),
        Connection::File { root } => Ok(Arc::new(FileCollection::open(root, name)?)),
    }
}

/// The version guard every driver applies under its own lock.
fn version_matches(current: Option<&StateDocument>, expected_version: &str) -> bool {
    match current {
        Some(doc) => doc.version == expected_version,
        None => expected_version.is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(version: &str) -> StateDocument {
        StateDocument {
            id: "e-1".to_string(),
            version: version.to_string(),
            committed_state: "\"\"".to_string(),
            committed_sequence_id: 0,
            metadata: "null".to_string(),
            pending_states: "[]".to_string(),
        }
    }

    #[test]
    fn test_version_guard() {
        assert!(version_matches(None, ""));
        assert!(!version_matches(None, "v1"));
        assert!(version_matches(Some(&doc("v1")), "v1"));
        assert!(!version_matches(Some(&doc("v1")), "v2"));
        assert!(!version_matches(Some(&doc("v1")), ""));
    }

    #[tokio::test]
    async fn test_memory_conditional_upsert() {
        let c = MemoryCollection::new("Transactions_test");
        assert!(c.find_one("e-1").await.unwrap().is_none());
        assert!(c.replace_one("", doc("v1")).await.unwrap());
        assert!(!c.replace_one("", doc("v9")).await.unwrap());
        assert!(!c.replace_one("v0", doc("v9")).await.unwrap());
        assert!(c.replace_one("v1", doc("v2")).await.unwrap());
        assert_eq!(c.find_one("e-1").await.unwrap().unwrap().version, "v2");
        assert_eq!(c.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_file_conditional_upsert() {
        let dir = tempfile::tempdir().unwrap();
        let c = FileCollection::open(dir.path(), "Transactions_test").unwrap();
        assert!(c.find_one("e-1").await.unwrap().is_none());
        assert!(c.replace_one("", doc("v1")).await.unwrap());
        assert!(!c.replace_one("stale", doc("v9")).await.unwrap());
        assert!(c.replace_one("v1", doc("v2")).await.unwrap());
        assert_eq!(c.find_one("e-1").await.unwrap().unwrap(), doc("v2"));

        // A second handle on the same directory sees the same documents.
        let again = FileCollection::open(dir.path(), "Transactions_test").unwrap();
        assert_eq!(again.find_one("e-1").await.unwrap().unwrap().version, "v2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_file_handles_on_same_dir_serialize_writes() {
        let dir = tempfile::tempdir().unwrap();
        let handles: Vec<Arc<FileCollection>> = (0..2)
            .map(|_| Arc::new(FileCollection::open(dir.path(), "Transactions_test").unwrap()))
            .collect();

        let mut tasks = Vec::new();
        for i in 0..8 {
            let c = handles[i % 2].clone();
            tasks.push(tokio::spawn(async move {
                c.replace_one("", doc(&format!("v{i}"))).await.unwrap()
            }));
        }
        let mut wins = 0;
        for task in tasks {
            if task.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert!(dir.path().join("Transactions_test").join(".collection.lock").exists());
    }

    #[test]
    fn test_open_collection_unusable_root() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();
        let err = open_collection(&Connection::File { root: blocker }, "c").err().unwrap();
        assert!(matches!(err, StorageError::Configuration(_)));
    }
}
