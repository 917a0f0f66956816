//! Media Catalog Abstraction
//!
//! Read-only view of the host's media records. The engine resolves a media
//! id to its source file before producing an artifact; it never writes back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Source description for one media item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaSource {
    pub media_id: String,

    /// Absolute path of the original file.
    pub source_path: PathBuf,

    /// Container/mime hint as stored by the catalog, when known.
    pub container: Option<String>,

    pub size_bytes: Option<u64>,

    pub duration_seconds: Option<f64>,
}

impl MediaSource {
    pub fn new(media_id: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            media_id: media_id.into(),
            source_path: source_path.into(),
            container: None,
            size_bytes: None,
            duration_seconds: None,
        }
    }
}

/// Media catalog trait
///
/// Owned by the host application; the authoritative media record lives
/// there. The engine only reads from it.
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// Resolve a media id to its source description.
    ///
    /// An unknown id is an error, not an empty result: a transcode request
    /// for missing media cannot proceed.
    async fn media_source(&self, media_id: &str) -> Result<MediaSource>;

    /// Check whether a media id exists in the catalog.
    async fn contains(&self, media_id: &str) -> Result<bool> {
        Ok(self.media_source(media_id).await.is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;

    struct SingleItemCatalog;

    #[async_trait]
    impl MediaCatalog for SingleItemCatalog {
        async fn media_source(&self, media_id: &str) -> Result<MediaSource> {
            if media_id == "m1" {
                Ok(MediaSource::new("m1", "/library/m1.avi"))
            } else {
                Err(BridgeError::OperationFailed(format!(
                    "unknown media: {media_id}"
                )))
            }
        }
    }

    #[tokio::test]
    async fn test_contains_uses_media_source() {
        let catalog = SingleItemCatalog;
        assert!(catalog.contains("m1").await.unwrap());
        assert!(!catalog.contains("m2").await.unwrap());
    }

    #[tokio::test]
    async fn test_media_source_fields() {
        let catalog = SingleItemCatalog;
        let source = catalog.media_source("m1").await.unwrap();
        assert_eq!(source.media_id, "m1");
        assert_eq!(source.source_path, PathBuf::from("/library/m1.avi"));
        assert!(source.container.is_none());
    }
}
