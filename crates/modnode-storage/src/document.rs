//! Whole-document persistence backends.
//!
//! The node persists a handful of small JSON documents, each read once at
//! startup and rewritten as a whole. [`DocumentStore`] hides whether a document
//! lives in a file or in memory (tests, diskless simulation).

use crate::error::{StorageError, StorageResult};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Backend for one persisted document.
#[derive(Debug, Clone)]
pub enum DocumentStore {
    /// Document stored in a file, replaced atomically on write
    File(PathBuf),
    /// Document held in memory, shared between clones
    Memory(MemoryDocument),
}

impl DocumentStore {
    /// File-backed document at `path`
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::File(path.into())
    }

    /// Empty in-memory document
    pub fn memory() -> Self {
        Self::Memory(MemoryDocument::default())
    }

    /// Human-readable location, for logs
    pub fn location(&self) -> String {
        match self {
            Self::File(path) => path.display().to_string(),
            Self::Memory(_) => "<memory>".to_string(),
        }
    }

    /// Read the document; `Ok(None)` if it does not exist
    pub async fn read(&self) -> StorageResult<Option<Vec<u8>>> {
        match self {
            Self::File(path) => match tokio::fs::read(path).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            },
            Self::Memory(memory) => {
                let inner = memory.lock();
                if inner.fail_reads {
                    return Err(StorageError::Unavailable(
                        "simulated read failure".to_string(),
                    ));
                }
                Ok(inner.contents.clone())
            }
        }
    }

    /// Replace the document with `bytes`
    pub async fn write(&self, bytes: &[u8]) -> StorageResult<()> {
        match self {
            Self::File(path) => write_atomic(path, bytes).await,
            Self::Memory(memory) => {
                let mut inner = memory.lock();
                if inner.fail_writes {
                    return Err(StorageError::Unavailable(
                        "simulated write failure".to_string(),
                    ));
                }
                inner.contents = Some(bytes.to_vec());
                Ok(())
            }
        }
    }

    /// Delete the document; returns whether it existed
    pub async fn remove(&self) -> StorageResult<bool> {
        match self {
            Self::File(path) => match tokio::fs::remove_file(path).await {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            },
            Self::Memory(memory) => Ok(memory.lock().contents.take().is_some()),
        }
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> StorageResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await?;
    trace!(path = %path.display(), len = bytes.len(), "Document written");
    Ok(())
}

#[derive(Debug, Default)]
struct MemoryInner {
    contents: Option<Vec<u8>>,
    fail_reads: bool,
    fail_writes: bool,
}

/// In-memory document shared between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocument {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryDocument {
    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Seed the document with `bytes`
    pub fn set_contents(&self, bytes: impl Into<Vec<u8>>) {
        self.lock().contents = Some(bytes.into());
    }

    /// Current contents
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.lock().contents.clone()
    }

    /// Make reads fail (or succeed again)
    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    /// Make writes fail (or succeed again)
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::file(dir.path().join("nested/doc.json"));

        assert_eq!(store.read().await.unwrap(), None);

        store.write(b"{\"a\":1}").await.unwrap();
        assert_eq!(store.read().await.unwrap(), Some(b"{\"a\":1}".to_vec()));
        assert!(!dir.path().join("nested/doc.json.tmp").exists());

        assert!(store.remove().await.unwrap());
        assert!(!store.remove().await.unwrap());
        assert_eq!(store.read().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_shared_between_clones() {
        let memory = MemoryDocument::default();
        let store = DocumentStore::Memory(memory.clone());

        store.write(b"x").await.unwrap();
        assert_eq!(memory.contents(), Some(b"x".to_vec()));

        memory.set_fail_writes(true);
        assert!(matches!(
            store.write(b"y").await,
            Err(StorageError::Unavailable(_))
        ));
        assert_eq!(store.read().await.unwrap(), Some(b"x".to_vec()));

        memory.set_fail_reads(true);
        assert!(matches!(store.read().await, Err(StorageError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_directory_read_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::file(dir.path());

        assert!(matches!(store.read().await, Err(StorageError::Io(_))));
    }

    #[test]
    fn test_location() {
        assert_eq!(DocumentStore::memory().location(), "<memory>");
        assert_eq!(DocumentStore::file("/tmp/a.json").location(), "/tmp/a.json");
    }
}
