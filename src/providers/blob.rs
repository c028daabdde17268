//! Raw payload storage behind a narrow byte-store interface

use async_trait::async_trait;
use std::path::PathBuf;

use crate::error::{Error, Result};

/// Write/read raw payload bytes by path
///
/// Used by the normalizer to fetch uploaded bytes and by job resubmission to
/// recover a failed upload's payload.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes under the given path; returns the canonical path
    async fn write(&self, path: &str, data: &[u8]) -> Result<String>;

    /// Read bytes back; `Error::PayloadMissing` when the path has no data
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Whether the path currently holds data
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Remove the bytes at the path, if present
    async fn delete(&self, path: &str) -> Result<()>;

    /// Store name for logging
    fn name(&self) -> &str;
}

/// Filesystem-backed blob store
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    /// Create the store, ensuring the root directory exists
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    fn resolve(&self, path: &str) -> PathBuf {
        // Strip path traversal components rather than trusting caller input
        let sanitized: PathBuf = std::path::Path::new(path)
            .components()
            .filter(|c| matches!(c, std::path::Component::Normal(_)))
            .collect();
        self.root.join(sanitized)
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn write(&self, path: &str, data: &[u8]) -> Result<String> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&full, data).await?;
        Ok(path.to_string())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full = self.resolve(path);
        match tokio::fs::read(&full).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::PayloadMissing(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.resolve(path).exists())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        if full.exists() {
            tokio::fs::remove_file(&full).await?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "local-filesystem"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf()).unwrap();

        store.write("uploads/a.txt", b"hello").await.unwrap();
        assert!(store.exists("uploads/a.txt").await.unwrap());
        assert_eq!(store.read("uploads/a.txt").await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn missing_payload_is_typed() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf()).unwrap();

        match store.read("nope/gone.txt").await {
            Err(Error::PayloadMissing(path)) => assert_eq!(path, "nope/gone.txt"),
            other => panic!("expected PayloadMissing, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn traversal_components_are_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path().to_path_buf()).unwrap();

        store.write("../escape.txt", b"x").await.unwrap();
        assert!(dir.path().join("escape.txt").exists());
    }
}
