//! Cache Settings Provider for Desktop Hosts

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    settings::{CacheSettings, SettingsProvider},
};
use std::path::PathBuf;
use tokio::sync::RwLock;
use tracing::debug;

/// Default cache location for desktop hosts.
///
/// Resolves to the platform cache directory (`~/.cache`, `~/Library/Caches`,
/// `%LOCALAPPDATA%`), falling back to the system temp directory.
pub fn default_cache_directory() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("media-streaming-core")
        .join("transcode-cache")
}

/// Settings provider holding one [`CacheSettings`] value in memory.
///
/// Hosts construct it from their configuration at startup and may swap the
/// value at runtime; running components read the provider again on every
/// operation, so an update applies from the next sweep or production on.
pub struct DesktopSettingsProvider {
    settings: RwLock<CacheSettings>,
}

impl DesktopSettingsProvider {
    /// Create a provider with explicit settings.
    pub fn new(settings: CacheSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    /// Create a provider with default limits and the platform cache
    /// directory.
    pub fn with_defaults() -> Self {
        Self::new(CacheSettings::default().with_directory(default_cache_directory()))
    }

    /// Replace the current settings.
    ///
    /// The new value is validated first; invalid settings are rejected and
    /// the previous value stays in effect.
    pub async fn update(&self, settings: CacheSettings) -> Result<()> {
        settings
            .validate()
            .map_err(BridgeError::InvalidConfiguration)?;

        let mut current = self.settings.write().await;
        *current = settings;
        debug!(
            max_size_bytes = current.max_size_bytes,
            ttl_ms = current.ttl_ms,
            "Updated cache settings"
        );
        Ok(())
    }

    /// Read the current settings without going through the trait.
    pub async fn current(&self) -> CacheSettings {
        self.settings.read().await.clone()
    }
}

impl Default for DesktopSettingsProvider {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl SettingsProvider for DesktopSettingsProvider {
    async fn cache_settings(&self) -> Result<CacheSettings> {
        Ok(self.settings.read().await.clone())
    }
}
