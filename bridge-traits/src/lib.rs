//! # Host Bridge Traits
//!
//! Collaborator contracts between the transcode engine and its host
//! application.
//!
//! ## Overview
//!
//! This crate defines what the engine needs from the outside world without
//! fixing how the host provides it. Each trait is one capability the core
//! consumes as an `Arc<dyn Trait>` handle (desktop filesystem, settings
//! database, media catalog, codec pipeline).
//!
//! ## Traits
//!
//! ### Storage & Configuration
//! - [`ArtifactStore`](storage::ArtifactStore) - File I/O for transcoded artifacts and directory statistics
//! - [`SettingsProvider`](settings::SettingsProvider) - Live cache configuration (size budget, TTL, directory)
//!
//! ### Media
//! - [`MediaCatalog`](catalog::MediaCatalog) - Read-only media id to source file resolution
//! - [`MediaTranscoder`](transcode::MediaTranscoder) - Opaque transcode operation with progress callback
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with descriptive errors when a required capability is
//! missing:
//!
//! ```ignore
//! use core_service::{ServiceError, Result};
//!
//! fn require_store(store: Option<std::sync::Arc<dyn bridge_traits::ArtifactStore>>) -> Result<std::sync::Arc<dyn bridge_traits::ArtifactStore>> {
//!     store.ok_or_else(|| ServiceError::CapabilityMissing {
//!         capability: "ArtifactStore".to_string(),
//!         message: "No artifact store provided. \
//!                  Desktop: use bridge_desktop::TokioArtifactStore.".to_string(),
//!     })
//! }
//! ```
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Implementations should convert platform-specific failures into it and
//! keep messages actionable (include paths and the failing operation).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support safe concurrent
//! usage across async tasks.

pub mod catalog;
pub mod error;
pub mod settings;
pub mod storage;
pub mod time;
pub mod transcode;

pub use error::BridgeError;

// Re-export commonly used types
pub use catalog::{MediaCatalog, MediaSource};
pub use settings::{CacheSettings, SettingsProvider};
pub use storage::{ArtifactStore, DirectoryStats, StoredFile};
pub use time::{Clock, ManualClock, SystemClock};
pub use transcode::{MediaTranscoder, ProgressCallback, TranscodeOutput, TranscodeRequest};
