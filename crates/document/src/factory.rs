use std::sync::Arc;

use tracing::info;
use txstate_storage::{
    AbortPolicy, StatePayload, StorageError, TransactionalStateStorage,
    TransactionalStorageFactory,
};

use crate::collection::{open_collection, DocumentCollection};
use crate::config::{Connection, StoreOptions};
use crate::log::DocumentStateLog;
use crate::serializer::PayloadSerializer;

/// Creates per-entity [`DocumentStateLog`]s for one logical store.
///
/// Cloning is cheap; clones share the collection handle, which is what lets
/// several logs race on the same entity under one version guard.
#[derive(Clone)]
pub struct DocumentStorageFactory {
    collection: Arc<dyn DocumentCollection>,
    serializer: PayloadSerializer,
    abort_policy: AbortPolicy,
}

impl DocumentStorageFactory {
    /// Resolve `options` and open the collection for `store_name`.
    ///
    /// All configuration faults surface here: a bad connection string, an
    /// invalid store name, or an unusable file root.
    pub fn connect(store_name: &str, options: &StoreOptions) -> Result<Self, StorageError> {
        let connection = options.connection()?;
        let collection_name = options.collection_name(store_name)?;
        let collection = open_collection(&connection, &collection_name)?;
        match &connection {
            Connection::Memory { label } => info!(
                store = store_name,
                collection = %collection_name,
                label = %label,
                "connected in-memory transactional store"
            ),
            Connection::File { root } => info!(
                store = store_name,
                collection = %collection_name,
                root = %root.display(),
                "connected file transactional store"
            ),
        }
        Ok(Self::with_collection(collection, options))
    }

    /// Build a factory over an already-open collection.
    pub fn with_collection(collection: Arc<dyn DocumentCollection>, options: &StoreOptions) -> Self {
        Self {
            collection,
            serializer: PayloadSerializer::new(options.serializer.clone()),
            abort_policy: options.abort_policy,
        }
    }

    pub fn collection(&self) -> &Arc<dyn DocumentCollection> {
        &self.collection
    }

    /// Bind a concrete log to `entity_key`.
    pub fn log<T: StatePayload>(&self, entity_key: &str) -> DocumentStateLog<T> {
        DocumentStateLog::new(
            entity_key,
            self.collection.clone(),
            self.serializer.clone(),
            self.abort_policy,
        )
    }
}

impl TransactionalStorageFactory for DocumentStorageFactory {
    fn collection_name(&self) -> &str {
        self.collection.name()
    }

    fn create<T: StatePayload>(&self, entity_key: &str) -> Box<dyn TransactionalStateStorage<T>> {
        Box::new(self.log::<T>(entity_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_memory_uses_prefixed_collection() {
        let f = DocumentStorageFactory::connect("orders", &StoreOptions::new("memory://")).unwrap();
        assert_eq!(f.collection_name(), "Transactions_orders");
    }

    #[test]
    fn test_connect_rejects_bad_connection_string() {
        let result = DocumentStorageFactory::connect("orders", &StoreOptions::new("redis://x"));
        assert!(matches!(result, Err(StorageError::Configuration(_))));
    }

    #[test]
    fn test_connect_rejects_empty_store_name() {
        let result = DocumentStorageFactory::connect("", &StoreOptions::new("memory://"));
        assert!(matches!(result, Err(StorageError::Configuration(_))));
    }

    #[test]
    fn test_connect_file_creates_collection_dir() {
        let dir = tempfile::tempdir().unwrap();
        let options = StoreOptions::new(format!("file://{}", dir.path().display()));
        let f = DocumentStorageFactory::connect("orders", &options).unwrap();
        assert_eq!(f.collection_name(), "Transactions_orders");
        assert!(dir.path().join("Transactions_orders").is_dir());
    }
}
