pub mod conformance;
mod error;
mod merge;
mod record;
mod traits;

pub use error::StorageError;
pub use merge::{AbortPolicy, StoreBatch};
pub use record::{LoadResult, PendingState, StatePayload, StateRecord};
pub use traits::{TransactionalStateStorage, TransactionalStorageFactory};
