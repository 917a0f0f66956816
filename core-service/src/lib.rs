//! # Streaming Service Façade
//!
//! Single entry point wiring the transcode coordinator, the cache ledger,
//! and the cleanup sweeper behind host-provided bridges (artifact store,
//! settings, media catalog, transcoder).
//!
//! Hosts build one [`StreamingService`] at startup:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use core_service::StreamingService;
//! # async fn example(
//! #     store: Arc<dyn bridge_traits::ArtifactStore>,
//! #     settings: Arc<dyn bridge_traits::SettingsProvider>,
//! #     catalog: Arc<dyn bridge_traits::MediaCatalog>,
//! #     transcoder: Arc<dyn bridge_traits::MediaTranscoder>,
//! #     pool: sqlx::SqlitePool,
//! # ) -> core_service::Result<()> {
//! let service = StreamingService::builder()
//!     .artifact_store(store)
//!     .settings_provider(settings)
//!     .media_catalog(catalog)
//!     .media_transcoder(transcoder)
//!     .database_pool(pool)
//!     .build()
//!     .await?;
//! service.start_background_tasks();
//! # Ok(())
//! # }
//! ```
//!
//! and then call [`StreamingService::stream_ready`] from the playback
//! request path.

pub mod error;
pub mod streaming;

pub use error::{Result, ServiceError};
pub use streaming::{StreamingService, StreamingServiceBuilder};
