//! File-per-blob storage
//!
//! Each blob lives at `<data_dir>/<blob_id>.enc`. Writes go to a hidden temp
//! file first and are renamed into place, so readers never see a partial blob.
//! The node treats blob contents as opaque bytes.

use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Extension of committed blob files
pub const BLOB_EXTENSION: &str = "enc";

/// Longest accepted blob id
pub const MAX_BLOB_ID_LEN: usize = 128;

/// Blob store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid blob id: {0:?}")]
    InvalidId(String),

    #[error("Blob not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Blob ids become file names, so only `[A-Za-z0-9_-]` is allowed.
pub fn validate_blob_id(id: &str) -> Result<()> {
    let valid = !id.is_empty()
        && id.len() <= MAX_BLOB_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidId(id.to_string()))
    }
}

/// Directory-backed blob store
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// Open the store, creating the directory if missing.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        info!(data_dir = %dir.display(), "Blob store opened");
        Ok(Self { dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.dir
    }

    fn blob_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", id, BLOB_EXTENSION))
    }

    /// Store a blob, replacing any existing one with the same id.
    pub async fn write(&self, id: &str, data: &[u8]) -> Result<u64> {
        validate_blob_id(id)?;

        let tmp = self.dir.join(format!(".{}.{}.tmp", id, Uuid::new_v4().simple()));
        if let Err(e) = tokio::fs::write(&tmp, data).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = tokio::fs::rename(&tmp, self.blob_path(id)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(blob_id = %id, size = data.len(), "Blob written");
        Ok(data.len() as u64)
    }

    pub async fn read(&self, id: &str) -> Result<Bytes> {
        validate_blob_id(id)?;
        match tokio::fs::read(self.blob_path(id)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a blob. Returns whether it existed; absent blobs are not an error.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        validate_blob_id(id)?;
        match tokio::fs::remove_file(self.blob_path(id)).await {
            Ok(()) => {
                debug!(blob_id = %id, "Blob deleted");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of committed blobs.
    pub async fn count(&self) -> Result<u64> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut count = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let committed = path.extension().is_some_and(|ext| ext == BLOB_EXTENSION)
                && !entry.file_name().to_string_lossy().starts_with('.');
            if committed {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_creates_directory() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("nested").join("blobs");
        let store = BlobStore::open(&dir).await.unwrap();
        assert!(dir.is_dir());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_write_read_overwrite() {
        let temp = TempDir::new().unwrap();
        let store = BlobStore::open(temp.path()).await.unwrap();

        assert_eq!(store.write("blob-1", b"first").await.unwrap(), 5);
        assert_eq!(store.read("blob-1").await.unwrap(), "first");
        assert!(temp.path().join("blob-1.enc").is_file());

        store.write("blob-1", b"second").await.unwrap();
        assert_eq!(store.read("blob-1").await.unwrap(), "second");
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_read_missing() {
        let temp = TempDir::new().unwrap();
        let store = BlobStore::open(temp.path()).await.unwrap();
        assert!(matches!(
            store.read("nope").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let store = BlobStore::open(temp.path()).await.unwrap();
        store.write("b", b"x").await.unwrap();

        assert!(store.delete("b").await.unwrap());
        assert!(!store.delete("b").await.unwrap());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_count_ignores_foreign_files() {
        let temp = TempDir::new().unwrap();
        let store = BlobStore::open(temp.path()).await.unwrap();
        store.write("a", b"1").await.unwrap();
        store.write("b", b"2").await.unwrap();
        std::fs::write(temp.path().join("notes.txt"), b"hi").unwrap();
        std::fs::write(temp.path().join(".c.123.tmp"), b"partial").unwrap();

        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[test]
    fn test_blob_id_validation() {
        assert!(validate_blob_id("3f2a9c1e-0000-4bcd-8000-aabbccddeeff").is_ok());
        assert!(validate_blob_id("chunk_01").is_ok());
        assert!(validate_blob_id("").is_err());
        assert!(validate_blob_id("../etc/passwd").is_err());
        assert!(validate_blob_id("a/b").is_err());
        assert!(validate_blob_id(&"x".repeat(MAX_BLOB_ID_LEN + 1)).is_err());
    }
}
