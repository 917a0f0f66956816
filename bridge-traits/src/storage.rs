//! Artifact Storage Abstraction
//!
//! Provides the filesystem contract for transcoded output files. The cache
//! layer owns every call into this trait; the transcode coordinator never
//! touches storage directly.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A single file observed in the artifact directory.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredFile {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Last modification time in Unix millis, when the platform reports one.
    pub modified_at_ms: Option<i64>,
}

/// Aggregate statistics for an artifact directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DirectoryStats {
    pub file_count: u64,
    pub total_bytes: u64,
    pub oldest_file_age_ms: Option<i64>,
}

/// Artifact store trait
///
/// Abstracts file I/O for transcoded artifacts:
/// - Desktop: direct filesystem access under a configured cache directory
/// - Containerized: a mounted volume
///
/// Paths are absolute; the store does not resolve them against an implicit
/// root. A missing directory reads as empty rather than as an error so that
/// a sweep over a not-yet-created cache directory is a no-op.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::storage::ArtifactStore;
///
/// async fn persist(store: &dyn ArtifactStore, path: &std::path::Path, data: bytes::Bytes) -> bridge_traits::error::Result<()> {
///     store.write(path, data).await?;
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Write data to a file, creating parent directories as needed.
    async fn write(&self, path: &Path, data: Bytes) -> Result<()>;

    /// Read entire file contents into memory.
    async fn read(&self, path: &Path) -> Result<Bytes>;

    /// Delete a file.
    async fn delete(&self, path: &Path) -> Result<()>;

    /// Check if a file exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Create a directory and all parent directories if they don't exist.
    async fn create_dir_all(&self, path: &Path) -> Result<()>;

    /// List the files directly inside a directory.
    ///
    /// Subdirectories are not descended into; artifact directories are flat.
    /// A missing directory yields an empty listing.
    async fn list_directory(&self, path: &Path) -> Result<Vec<StoredFile>>;

    /// Compute file count, total size, and oldest-file age for a directory.
    async fn stat_directory(&self, path: &Path) -> Result<DirectoryStats> {
        let files = self.list_directory(path).await?;
        let now_ms = chrono::Utc::now().timestamp_millis();

        let mut stats = DirectoryStats {
            file_count: files.len() as u64,
            ..Default::default()
        };

        for file in files {
            stats.total_bytes += file.size_bytes;
            if let Some(modified) = file.modified_at_ms {
                let age = (now_ms - modified).max(0);
                stats.oldest_file_age_ms = Some(match stats.oldest_file_age_ms {
                    Some(oldest) => oldest.max(age),
                    None => age,
                });
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct MapStore {
        files: Mutex<HashMap<PathBuf, StoredFile>>,
    }

    #[async_trait]
    impl ArtifactStore for MapStore {
        async fn write(&self, path: &Path, data: Bytes) -> Result<()> {
            self.files.lock().unwrap().insert(
                path.to_path_buf(),
                StoredFile {
                    path: path.to_path_buf(),
                    size_bytes: data.len() as u64,
                    modified_at_ms: Some(chrono::Utc::now().timestamp_millis()),
                },
            );
            Ok(())
        }

        async fn read(&self, _path: &Path) -> Result<Bytes> {
            Ok(Bytes::new())
        }

        async fn delete(&self, path: &Path) -> Result<()> {
            self.files.lock().unwrap().remove(path);
            Ok(())
        }

        async fn exists(&self, path: &Path) -> Result<bool> {
            Ok(self.files.lock().unwrap().contains_key(path))
        }

        async fn create_dir_all(&self, _path: &Path) -> Result<()> {
            Ok(())
        }

        async fn list_directory(&self, _path: &Path) -> Result<Vec<StoredFile>> {
            Ok(self.files.lock().unwrap().values().cloned().collect())
        }
    }

    #[tokio::test]
    async fn test_stat_directory_default_impl() {
        let store = MapStore {
            files: Mutex::new(HashMap::new()),
        };

        store
            .write(Path::new("/cache/a.mp4"), Bytes::from(vec![0u8; 100]))
            .await
            .unwrap();
        store
            .write(Path::new("/cache/b.mp4"), Bytes::from(vec![0u8; 50]))
            .await
            .unwrap();

        let stats = store.stat_directory(Path::new("/cache")).await.unwrap();
        assert_eq!(stats.file_count, 2);
        assert_eq!(stats.total_bytes, 150);
        assert!(stats.oldest_file_age_ms.is_some());
    }

    #[tokio::test]
    async fn test_stat_directory_empty() {
        let store = MapStore {
            files: Mutex::new(HashMap::new()),
        };

        let stats = store.stat_directory(Path::new("/cache")).await.unwrap();
        assert_eq!(stats, DirectoryStats::default());
    }
}
