use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use txstate_storage::StorageError;

use super::{version_matches, DocumentCollection};
use crate::document::StateDocument;

/// An in-process collection. Documents live as long as the handle.
#[derive(Debug)]
pub struct MemoryCollection {
    name: String,
    documents: Mutex<HashMap<String, StateDocument>>,
}

impl MemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            documents: Mutex::new(HashMap::new()),
        }
    }

    /// Number of stored documents. Fails if a writer panicked mid-update.
    pub fn len(&self) -> Result<usize, StorageError> {
        self.lock().map(|docs| docs.len())
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        self.len().map(|n| n == 0)
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, StateDocument>>, StorageError> {
        self.documents
            .lock()
            .map_err(|_| StorageError::Backend(format!("collection {} lock poisoned", self.name)))
    }
}

#[async_trait]
impl DocumentCollection for MemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_one(&self, id: &str) -> Result<Option<StateDocument>, StorageError> {
        Ok(self.lock()?.get(id).cloned())
    }

    async fn replace_one(
        &self,
        expected_version: &str,
        document: StateDocument,
    ) -> Result<bool, StorageError> {
        let mut docs = self.lock()?;
        if !version_matches(docs.get(&document.id), expected_version) {
            return Ok(false);
        }
        docs.insert(document.id.clone(), document);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_poisoned_lock_is_backend_error() {
        let c = Arc::new(MemoryCollection::new("Transactions_test"));
        let writer = c.clone();
        let joined = std::thread::spawn(move || {
            let _docs = writer.documents.lock().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(joined.is_err());

        assert!(matches!(c.len(), Err(StorageError::Backend(_))));
        assert!(c.is_empty().is_err());
    }
}
