use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use fs2::FileExt;
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use txstate_storage::StorageError;

use super::{version_matches, DocumentCollection};
use crate::document::StateDocument;

/// A collection stored as one JSON file per document under
/// `<root>/<collection name>/`.
///
/// File names are the SHA-256 of the document `_id`, so any entity key maps
/// to a valid path. Writes go to a temporary file that is renamed over the
/// target, so readers only ever see whole documents. The version check and
/// the rename run under an exclusive `fs2` lock on the collection's lock file,
/// so writers holding different handles, or living in different processes,
/// are serialized too. The in-handle mutex only keeps this handle's writers
/// from tying up blocking threads while they wait on that lock.
#[derive(Debug)]
pub struct FileCollection {
    name: String,
    dir: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl FileCollection {
    /// Open (creating if needed) the collection directory.
    pub fn open(root: &Path, name: &str) -> Result<Self, StorageError> {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).map_err(|e| {
            StorageError::Configuration(format!(
                "could not open collection directory '{}': {}",
                dir.display(),
                e
            ))
        })?;
        Ok(Self {
            name: name.to_string(),
            dir,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    fn document_path(&self, id: &str) -> PathBuf {
        let hash = Sha256::digest(id.as_bytes());
        self.dir.join(format!("{:x}.json", hash))
    }
}

/// Lock file guarding the read-check-write of every document in a collection.
const LOCK_FILE: &str = ".collection.lock";

/// Block until this process holds the collection's exclusive lock. The lock is
/// released when the returned file is dropped.
fn lock_collection(lock_path: &Path) -> Result<File, StorageError> {
    let backend = |e: io::Error| {
        StorageError::Backend(format!("could not lock '{}': {}", lock_path.display(), e))
    };
    let lock_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(backend)?;
    lock_file.lock_exclusive().map_err(backend)?;
    Ok(lock_file)
}

fn read_document(path: &Path) -> Result<Option<StateDocument>, StorageError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StorageError::Backend(format!(
                "could not read '{}': {}",
                path.display(),
                e
            )))
        }
    };
    serde_json::from_slice(&bytes).map(Some).map_err(|e| {
        StorageError::Serialization(format!("malformed document '{}': {}", path.display(), e))
    })
}

fn write_document(dir: &Path, path: &Path, document: &StateDocument) -> Result<(), StorageError> {
    let backend = |e: io::Error| {
        StorageError::Backend(format!("could not write '{}': {}", path.display(), e))
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(backend)?;
    let bytes =
        serde_json::to_vec(document).map_err(|e| StorageError::Serialization(e.to_string()))?;
    tmp.write_all(&bytes).map_err(backend)?;
    tmp.as_file().sync_all().map_err(backend)?;
    tmp.persist(path).map_err(|e| backend(e.error))?;
    Ok(())
}

async fn blocking<R, F>(f: F) -> Result<R, StorageError>
where
    F: FnOnce() -> Result<R, StorageError> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| StorageError::Backend(format!("blocking task failed: {e}")))?
}

#[async_trait]
impl DocumentCollection for FileCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn find_one(&self, id: &str) -> Result<Option<StateDocument>, StorageError> {
        let path = self.document_path(id);
        blocking(move || read_document(&path)).await
    }

    async fn replace_one(
        &self,
        expected_version: &str,
        document: StateDocument,
    ) -> Result<bool, StorageError> {
        // Both guards live in the blocking task so a dropped caller cannot
        // release them while the write is still in flight.
        let guard = self.write_lock.clone().lock_owned().await;
        let path = self.document_path(&document.id);
        let lock_path = self.lock_path();
        let dir = self.dir.clone();
        let expected_version = expected_version.to_string();
        blocking(move || {
            let _guard = guard;
            let _lock_file = lock_collection(&lock_path)?;
            let current = read_document(&path)?;
            if !version_matches(current.as_ref(), &expected_version) {
                return Ok(false);
            }
            write_document(&dir, &path, &document)?;
            Ok(true)
        })
        .await
    }
}
