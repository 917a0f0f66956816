//! Artifact Store Implementation using Tokio

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    storage::{ArtifactStore, StoredFile},
};
use bytes::Bytes;
use std::path::Path;
use std::time::UNIX_EPOCH;
use tokio::fs;
use tracing::debug;

/// Tokio-based artifact store
///
/// Persists cached artifacts on the local filesystem using `tokio::fs`.
/// Paths are taken as provided; the cache directory itself comes from
/// [`CacheSettings`](bridge_traits::CacheSettings).
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioArtifactStore;

impl TokioArtifactStore {
    pub fn new() -> Self {
        Self
    }

    /// Convert std::io::Error to BridgeError
    fn map_io_error(e: std::io::Error) -> BridgeError {
        BridgeError::Io(e)
    }
}

#[async_trait]
impl ArtifactStore for TokioArtifactStore {
    async fn write(&self, path: &Path, data: Bytes) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(Self::map_io_error)?;
        }

        fs::write(path, data.as_ref())
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Wrote artifact");
        Ok(())
    }

    async fn read(&self, path: &Path) -> Result<Bytes> {
        let data = fs::read(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, size = data.len(), "Read artifact");
        Ok(Bytes::from(data))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        fs::remove_file(path).await.map_err(Self::map_io_error)?;
        debug!(path = ?path, "Deleted artifact");
        Ok(())
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        Ok(fs::try_exists(path).await.map_err(Self::map_io_error)?)
    }

    async fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)
            .await
            .map_err(Self::map_io_error)?;
        debug!(path = ?path, "Created directory");
        Ok(())
    }

    async fn list_directory(&self, path: &Path) -> Result<Vec<StoredFile>> {
        let mut read_dir = match fs::read_dir(path).await {
            Ok(read_dir) => read_dir,
            // A cache directory that does not exist yet is just empty.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Self::map_io_error(e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(Self::map_io_error)? {
            let metadata = entry.metadata().await.map_err(Self::map_io_error)?;
            if metadata.is_dir() {
                continue;
            }

            files.push(StoredFile {
                path: entry.path(),
                size_bytes: metadata.len(),
                modified_at_ms: metadata
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_millis() as i64),
            });
        }

        debug!(path = ?path, count = files.len(), "Listed cache directory");
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        env::temp_dir().join(format!("artifact-store-{name}"))
    }

    #[tokio::test]
    async fn test_write_creates_parent_directories() {
        let dir = temp_dir("write");
        let _ = fs::remove_dir_all(&dir).await;
        let store = TokioArtifactStore::new();

        let file = dir.join("nested").join("artifact.mp4");
        store
            .write(&file, Bytes::from_static(b"abc"))
            .await
            .unwrap();
        assert!(store.exists(&file).await.unwrap());

        let data = store.read(&file).await.unwrap();
        assert_eq!(data, Bytes::from_static(b"abc"));

        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_delete_removes_file() {
        let dir = temp_dir("delete");
        let _ = fs::remove_dir_all(&dir).await;
        let store = TokioArtifactStore::new();

        let file = dir.join("artifact.mp4");
        store
            .write(&file, Bytes::from_static(b"abc"))
            .await
            .unwrap();
        store.delete(&file).await.unwrap();
        assert!(!store.exists(&file).await.unwrap());

        // Deleting an already-gone file surfaces the IO error.
        assert!(store.delete(&file).await.is_err());

        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_directory_reports_sizes() {
        let dir = temp_dir("list");
        let _ = fs::remove_dir_all(&dir).await;
        let store = TokioArtifactStore::new();

        store
            .write(&dir.join("a.mp4"), Bytes::from(vec![0u8; 10]))
            .await
            .unwrap();
        store
            .write(&dir.join("b.mp4"), Bytes::from(vec![0u8; 20]))
            .await
            .unwrap();
        store.create_dir_all(&dir.join("sub")).await.unwrap();

        let mut files = store.list_directory(&dir).await.unwrap();
        files.sort_by(|a, b| a.path.cmp(&b.path));

        // The subdirectory is not listed.
        assert_eq!(files.len(), 2);
        assert_eq!(files[0].size_bytes, 10);
        assert_eq!(files[1].size_bytes, 20);
        assert!(files.iter().all(|file| file.modified_at_ms.is_some()));

        let stats = store.stat_directory(&dir).await.unwrap();
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.total_bytes, 30);

        fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_missing_directory_is_empty() {
        let store = TokioArtifactStore::new();
        let files = store.list_directory(&temp_dir("missing")).await.unwrap();
        assert!(files.is_empty());
    }
}
