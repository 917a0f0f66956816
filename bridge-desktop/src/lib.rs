//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! This crate provides production-ready implementations of the bridge traits
//! using desktop-appropriate libraries:
//! - `ArtifactStore` using `tokio::fs`
//! - `SettingsProvider` as an in-memory value that hosts can swap at runtime
//!
//! Transcoder and catalog bridges stay with the host application: they wrap
//! whatever encoder binary and media library the host ships with.
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use bridge_desktop::{DesktopSettingsProvider, TokioArtifactStore};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(TokioArtifactStore::new());
//!     let settings = Arc::new(DesktopSettingsProvider::with_defaults());
//!
//!     // Hand both to StreamingService::builder()
//! }
//! ```

mod artifact_store;
mod settings;

pub use artifact_store::TokioArtifactStore;
pub use settings::{default_cache_directory, DesktopSettingsProvider};
