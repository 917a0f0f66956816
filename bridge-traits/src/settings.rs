//! Settings Provider Abstraction
//!
//! The engine never caches configuration: the provider is consulted before
//! every sweep and before every cache-miss production so that live
//! reconfiguration (a new size budget, TTL, or directory) takes effect
//! without a restart.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;

/// Default size budget for the transcode cache: 10 GB.
pub const DEFAULT_MAX_CACHE_BYTES: u64 = 10 * 1024 * 1024 * 1024;

/// Default entry TTL: 1 hour.
pub const DEFAULT_CACHE_TTL_MS: i64 = 60 * 60 * 1000;

/// Cache configuration as served by the host settings system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Maximum total size of cached artifacts in bytes.
    pub max_size_bytes: u64,

    /// Time-to-live for a cache entry in milliseconds.
    pub ttl_ms: i64,

    /// Directory artifacts are written to.
    pub directory: PathBuf,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            max_size_bytes: DEFAULT_MAX_CACHE_BYTES,
            ttl_ms: DEFAULT_CACHE_TTL_MS,
            directory: PathBuf::from("transcode-cache"),
        }
    }
}

impl CacheSettings {
    pub fn new(max_size_bytes: u64, ttl_ms: i64, directory: impl Into<PathBuf>) -> Self {
        Self {
            max_size_bytes,
            ttl_ms,
            directory: directory.into(),
        }
    }

    /// Set the maximum cache size in bytes.
    pub fn with_max_size(mut self, max_size_bytes: u64) -> Self {
        self.max_size_bytes = max_size_bytes;
        self
    }

    /// Set the entry TTL in milliseconds.
    pub fn with_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    /// Set the artifact directory.
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    /// Validate the configuration.
    ///
    /// Rejects a zero size budget, a non-positive TTL, and an empty
    /// directory. Failure messages name the offending field.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.max_size_bytes == 0 {
            return Err("max_size_bytes must be greater than zero".to_string());
        }

        if self.ttl_ms <= 0 {
            return Err(format!("ttl_ms must be positive, got {}", self.ttl_ms));
        }

        if self.directory.as_os_str().is_empty() {
            return Err("cache directory must not be empty".to_string());
        }

        Ok(())
    }
}

/// Settings provider trait
///
/// Host-side source of the cache configuration. Implementations may read a
/// settings database, a config file, or environment values; the engine only
/// requires that each call reflects the current configuration.
#[async_trait]
pub trait SettingsProvider: Send + Sync {
    /// Fetch the current cache configuration.
    async fn cache_settings(&self) -> Result<CacheSettings>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = CacheSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.max_size_bytes, DEFAULT_MAX_CACHE_BYTES);
        assert_eq!(settings.ttl_ms, DEFAULT_CACHE_TTL_MS);
    }

    #[test]
    fn test_builder_methods() {
        let settings = CacheSettings::default()
            .with_max_size(100 * 1024 * 1024)
            .with_ttl_ms(30_000)
            .with_directory("/tmp/artifacts");

        assert_eq!(settings.max_size_bytes, 100 * 1024 * 1024);
        assert_eq!(settings.ttl_ms, 30_000);
        assert_eq!(settings.directory, PathBuf::from("/tmp/artifacts"));
    }

    #[test]
    fn test_validate_rejects_zero_size() {
        let settings = CacheSettings::default().with_max_size(0);
        let err = settings.validate().unwrap_err();
        assert!(err.contains("max_size_bytes"));
    }

    #[test]
    fn test_validate_rejects_non_positive_ttl() {
        let settings = CacheSettings::default().with_ttl_ms(0);
        assert!(settings.validate().is_err());

        let settings = CacheSettings::default().with_ttl_ms(-5);
        let err = settings.validate().unwrap_err();
        assert!(err.contains("ttl_ms"));
    }

    #[test]
    fn test_validate_rejects_empty_directory() {
        let settings = CacheSettings::default().with_directory("");
        let err = settings.validate().unwrap_err();
        assert!(err.contains("directory"));
    }

    #[test]
    fn test_settings_serde_round_trip() {
        let settings = CacheSettings::new(1024, 5_000, "/var/cache/msc");
        let json = serde_json::to_string(&settings).unwrap();
        let parsed: CacheSettings = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, settings);
    }
}
