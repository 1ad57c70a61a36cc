//! Document-store backend for transactional state logs.
//!
//! Each entity's log is one document in a collection named after the logical
//! store. [`DocumentStorageFactory`] binds logs to that collection and to a
//! shared serializer configuration; [`DocumentStateLog`] implements the
//! load / store protocol from `txstate-storage` with a version-guarded
//! conditional upsert as its only concurrency mechanism.

pub mod collection;
pub mod config;
mod document;
mod factory;
mod log;
mod serializer;

pub use collection::{DocumentCollection, FileCollection, MemoryCollection};
pub use config::{Connection, StoreOptions, DEFAULT_COLLECTION_PREFIX};
pub use document::StateDocument;
pub use factory::DocumentStorageFactory;
pub use log::DocumentStateLog;
pub use serializer::{PayloadSerializer, SerializerSettings};
pub use txstate_storage::{
    AbortPolicy, LoadResult, PendingState, StatePayload, StorageError,
    TransactionalStateStorage, TransactionalStorageFactory,
};
