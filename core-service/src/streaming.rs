//! Streaming service façade.
//!
//! One owned object wires the transcode coordinator, the cache ledger, and
//! the cleanup sweeper behind host-provided bridges. Hosts build a single
//! [`StreamingService`] at startup, keep it behind an `Arc`, and drive every
//! playback request through [`StreamingService::stream_ready`].

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use bridge_traits::{
    ArtifactStore, Clock, MediaCatalog, MediaTranscoder, ProgressCallback, SettingsProvider,
    SystemClock, TranscodeRequest,
};
use core_cache::{
    CacheError, CacheLedger, CacheStatsReport, CleanupReport, CleanupSweeper, NewCacheEntry,
    SqliteCacheLedger, DEFAULT_SWEEP_INTERVAL,
};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use core_transcode::{
    ArtifactResult, ContainerFormat, CoordinatorConfig, MediaId, ProgressHandle,
    ProgressSubscription, Resolution, TranscodeCoordinator, TranscodeFingerprint, TranscodeStatus,
};

use crate::error::{Result, ServiceError};

// ============================================================================
// Streaming Service
// ============================================================================

/// Façade over transcode coordination, the cache ledger, and cleanup.
///
/// Construct with [`StreamingService::builder`]. The service owns its
/// components; hosts only hand in the bridge implementations and receive
/// artifact results and events back.
pub struct StreamingService {
    coordinator: TranscodeCoordinator,
    ledger: Arc<dyn CacheLedger>,
    sweeper: CleanupSweeper,
    store: Arc<dyn ArtifactStore>,
    settings: Arc<dyn SettingsProvider>,
    catalog: Arc<dyn MediaCatalog>,
    transcoder: Arc<dyn MediaTranscoder>,
    clock: Arc<dyn Clock>,
    event_bus: Arc<EventBus>,
    sweep_interval: Duration,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl StreamingService {
    /// Start building a service.
    pub fn builder() -> StreamingServiceBuilder {
        StreamingServiceBuilder::new()
    }

    /// Ensure a playable artifact exists for the given media and output
    /// parameters, transcoding from the catalog source when necessary.
    ///
    /// This is the request-path entry point: it resolves the source file
    /// through the media catalog, derives the output location from the cache
    /// settings, and delegates to [`Self::get_or_produce`] with the
    /// configured transcoder as the producer.
    #[instrument(skip(self))]
    pub async fn stream_ready(
        &self,
        media_id: MediaId,
        resolution: Resolution,
        format: ContainerFormat,
    ) -> Result<ArtifactResult> {
        let fingerprint = TranscodeFingerprint::new(media_id, resolution, format);
        let settings = self.settings.cache_settings().await?;
        let source = self
            .catalog
            .media_source(fingerprint.media_id.as_str())
            .await?;
        let output_path = settings.directory.join(fingerprint.artifact_file_name());

        let transcoder = Arc::clone(&self.transcoder);
        let request = TranscodeRequest {
            source_path: source.source_path,
            resolution: resolution.as_str().to_string(),
            format: format.as_str().to_string(),
            output_path,
        };

        self.get_or_produce(&fingerprint, move |handle| async move {
            let progress: ProgressCallback = Arc::new(move |percent| handle.report(percent));
            let output = transcoder.transcode(request, progress).await?;
            Ok(ArtifactResult {
                path: output.output_path,
                size_bytes: output.size_bytes,
                duration_seconds: output.duration_seconds,
            })
        })
        .await
    }

    /// Return the cached artifact for `fingerprint`, producing it when
    /// absent.
    ///
    /// A live ledger entry whose file still exists is returned immediately
    /// and has its expiry pushed out. An entry whose file has vanished is
    /// pruned and treated as a miss. On a miss the producer runs under the
    /// coordinator, so concurrent calls for the same fingerprint share one
    /// production, and the finished artifact is recorded in the ledger.
    #[instrument(skip(self, producer), fields(fingerprint = %fingerprint))]
    pub async fn get_or_produce<F, Fut>(
        &self,
        fingerprint: &TranscodeFingerprint,
        producer: F,
    ) -> Result<ArtifactResult>
    where
        F: FnOnce(ProgressHandle) -> Fut,
        Fut: Future<Output = anyhow::Result<ArtifactResult>> + Send + 'static,
    {
        let settings = self.settings.cache_settings().await?;
        settings.validate().map_err(CacheError::Configuration)?;

        let now = self.clock.unix_timestamp_millis();
        if let Some(entry) = self
            .ledger
            .lookup(
                fingerprint.media_id.as_str(),
                fingerprint.resolution.as_str(),
                fingerprint.format.as_str(),
                now,
            )
            .await?
        {
            if self.store.exists(Path::new(&entry.path)).await? {
                self.ledger.extend(entry.id, now, settings.ttl_ms).await?;
                debug!("Cache hit for {}: {}", fingerprint, entry.path);
                return Ok(ArtifactResult {
                    path: entry.path,
                    size_bytes: entry.size_bytes,
                    duration_seconds: entry.duration_seconds,
                });
            }

            warn!(
                "Cache entry {} references missing file {}; pruning",
                entry.id, entry.path
            );
            match self.ledger.remove(entry.id).await {
                Ok(()) => {}
                // Another request may have pruned the same stale row first.
                Err(CacheError::EntryNotFound { .. }) => {}
                Err(err) => return Err(err.into()),
            }
        }

        // A remembered completion only stays valid while its artifact file
        // exists; drop it so the producer can run again.
        if let Some(job) = self.coordinator.snapshot(fingerprint) {
            if job.status == TranscodeStatus::Complete {
                if let Some(result) = &job.result {
                    if !self.store.exists(Path::new(&result.path)).await? {
                        self.coordinator.invalidate(fingerprint);
                    }
                }
            }
        }

        let ran_producer = Arc::new(AtomicBool::new(false));
        let ran_flag = Arc::clone(&ran_producer);
        let result = self
            .coordinator
            .produce(fingerprint, move |handle| {
                ran_flag.store(true, Ordering::SeqCst);
                producer(handle)
            })
            .await?;

        let inserted = self
            .ledger
            .insert(
                NewCacheEntry {
                    media_id: fingerprint.media_id.as_str().to_string(),
                    resolution: fingerprint.resolution.as_str().to_string(),
                    format: fingerprint.format.as_str().to_string(),
                    path: result.path.clone(),
                    size_bytes: result.size_bytes,
                    duration_seconds: result.duration_seconds,
                },
                self.clock.unix_timestamp_millis(),
                settings.ttl_ms,
            )
            .await?;

        if ran_producer.load(Ordering::SeqCst) {
            self.event_bus
                .emit(CoreEvent::Cache(CacheEvent::EntryInserted {
                    media_id: inserted.media_id.clone(),
                    resolution: inserted.resolution.clone(),
                    format: inserted.format.clone(),
                    path: inserted.path.clone(),
                    size_bytes: inserted.size_bytes,
                }))
                .ok();
            info!(
                "Produced {} ({} bytes) for {}",
                inserted.path, inserted.size_bytes, fingerprint
            );
        }

        Ok(result)
    }

    /// Subscribe to progress for one fingerprint.
    ///
    /// A subscriber that arrives after completion still receives the
    /// terminal event as catch-up, as long as the job is within its
    /// retention window.
    pub fn subscribe_progress(&self, fingerprint: &TranscodeFingerprint) -> ProgressSubscription {
        self.coordinator.subscribe(fingerprint)
    }

    /// Run one cleanup sweep over the ledger and the artifact directory.
    pub async fn run_cleanup(&self) -> Result<CleanupReport> {
        Ok(self.sweeper.run_sweep().await?)
    }

    /// Aggregate ledger statistics and on-disk usage into one report.
    pub async fn cache_report(&self) -> Result<CacheStatsReport> {
        let settings = self.settings.cache_settings().await?;
        let now = self.clock.unix_timestamp_millis();
        let ledger = self.ledger.stats(now).await?;
        let disk = self.store.stat_directory(&settings.directory).await?;
        Ok(CacheStatsReport {
            ledger,
            disk,
            max_size_bytes: settings.max_size_bytes,
            ttl_ms: settings.ttl_ms,
            calculated_at_ms: now,
        })
    }

    /// Remove every cached artifact and ledger row for one media item.
    ///
    /// Used when media is deleted from the catalog. File deletion failures
    /// are logged and skipped; the rows are removed regardless, leaving any
    /// survivors for the orphan pass of a later sweep. Returns the number of
    /// rows removed.
    #[instrument(skip(self))]
    pub async fn purge_media(&self, media_id: &MediaId) -> Result<u64> {
        let entries = self.ledger.all_entries().await?;
        for entry in entries
            .iter()
            .filter(|entry| entry.media_id == media_id.as_str())
        {
            if let Err(err) = self.store.delete(Path::new(&entry.path)).await {
                warn!("Failed to delete {} during purge: {}", entry.path, err);
            }
        }

        let removed = self.ledger.remove_for_media(media_id.as_str()).await?;
        if removed > 0 {
            info!("Purged {} cached artifacts for media {}", removed, media_id);
        }
        Ok(removed)
    }

    /// Subscribe to the service-wide event stream.
    pub fn events(&self) -> broadcast::Receiver<CoreEvent> {
        self.event_bus.subscribe()
    }

    /// Handle to the shared event bus.
    pub fn event_bus(&self) -> Arc<EventBus> {
        Arc::clone(&self.event_bus)
    }

    /// The coordinator behind this service, for job introspection.
    pub fn coordinator(&self) -> &TranscodeCoordinator {
        &self.coordinator
    }

    /// Start the periodic maintenance tasks: the coordinator's idle-job
    /// sweeper and the cache cleanup sweeper. Calling this again while the
    /// tasks are running has no effect.
    pub fn start_background_tasks(&self) {
        let mut tasks = self.background.lock();
        if !tasks.is_empty() {
            return;
        }
        tasks.push(self.coordinator.spawn_idle_sweeper());
        tasks.push(self.sweeper.spawn_periodic(self.sweep_interval));
        info!("Background maintenance tasks started");
    }

    /// Stop background tasks and reject new productions.
    ///
    /// In-flight `produce` calls resolve with a shutdown error; the periodic
    /// sweepers finish their current iteration and exit before this returns.
    pub async fn shutdown(&self) {
        self.coordinator.shutdown();
        self.sweeper.shutdown();

        let tasks: Vec<JoinHandle<()>> = {
            let mut background = self.background.lock();
            background.drain(..).collect()
        };
        for task in tasks {
            task.await.ok();
        }
        info!("Streaming service stopped");
    }
}

impl fmt::Debug for StreamingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingService")
            .field("coordinator", &self.coordinator)
            .field("sweep_interval", &self.sweep_interval)
            .field("background_tasks", &self.background.lock().len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`StreamingService`].
///
/// Host capabilities are checked up front so a missing bridge fails at
/// startup rather than on the first playback request.
#[derive(Default)]
pub struct StreamingServiceBuilder {
    store: Option<Arc<dyn ArtifactStore>>,
    settings: Option<Arc<dyn SettingsProvider>>,
    catalog: Option<Arc<dyn MediaCatalog>>,
    transcoder: Option<Arc<dyn MediaTranscoder>>,
    clock: Option<Arc<dyn Clock>>,
    pool: Option<SqlitePool>,
    ledger: Option<Arc<dyn CacheLedger>>,
    coordinator_config: CoordinatorConfig,
    sweep_interval: Option<Duration>,
}

impl StreamingServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Artifact store holding the cached files.
    pub fn artifact_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Provider for cache limits, TTL, and the cache directory.
    pub fn settings_provider(mut self, settings: Arc<dyn SettingsProvider>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Catalog used to resolve media ids to source files.
    pub fn media_catalog(mut self, catalog: Arc<dyn MediaCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Transcoder that produces artifacts.
    pub fn media_transcoder(mut self, transcoder: Arc<dyn MediaTranscoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    /// Clock override, mainly for tests. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// SQLite pool backing the default cache ledger.
    pub fn database_pool(mut self, pool: SqlitePool) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Explicit ledger implementation. Takes precedence over
    /// [`Self::database_pool`].
    pub fn cache_ledger(mut self, ledger: Arc<dyn CacheLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Coordinator tuning (worker-pool size, buffers, retention).
    pub fn coordinator_config(mut self, config: CoordinatorConfig) -> Self {
        self.coordinator_config = config;
        self
    }

    /// Interval between periodic cleanup sweeps.
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Assemble the service, verifying capabilities and preparing storage.
    ///
    /// Initializes the ledger schema and creates the cache directory, so a
    /// successfully built service can serve its first request without any
    /// further setup.
    pub async fn build(self) -> Result<StreamingService> {
        let store = self.store.ok_or_else(|| ServiceError::CapabilityMissing {
            capability: "ArtifactStore".to_string(),
            message: "An artifact store is required. Desktop hosts can use \
                      bridge_desktop::TokioArtifactStore; use .artifact_store() to set it."
                .to_string(),
        })?;
        let settings = self
            .settings
            .ok_or_else(|| ServiceError::CapabilityMissing {
                capability: "SettingsProvider".to_string(),
                message: "A settings provider is required to read cache limits and the \
                          TTL. Use .settings_provider() to set it."
                    .to_string(),
            })?;
        let catalog = self.catalog.ok_or_else(|| ServiceError::CapabilityMissing {
            capability: "MediaCatalog".to_string(),
            message: "A media catalog is required to resolve media ids to source \
                      files. Use .media_catalog() to set it."
                .to_string(),
        })?;
        let transcoder = self
            .transcoder
            .ok_or_else(|| ServiceError::CapabilityMissing {
                capability: "MediaTranscoder".to_string(),
                message: "A transcoder implementation is required to produce artifacts. \
                          Use .media_transcoder() to set it."
                    .to_string(),
            })?;
        let clock: Arc<dyn Clock> = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let ledger: Arc<dyn CacheLedger> = match (self.ledger, self.pool) {
            (Some(ledger), _) => ledger,
            (None, Some(pool)) => Arc::new(SqliteCacheLedger::new(pool)),
            (None, None) => {
                return Err(ServiceError::CapabilityMissing {
                    capability: "CacheLedger".to_string(),
                    message: "A cache ledger is required. Provide a SQLite pool with \
                              .database_pool() or an implementation with .cache_ledger()."
                        .to_string(),
                })
            }
        };

        ledger.initialize().await?;

        let current = settings.cache_settings().await?;
        current
            .validate()
            .map_err(ServiceError::InitializationFailed)?;
        store.create_dir_all(&current.directory).await?;

        let event_bus = Arc::new(EventBus::default());
        let coordinator = TranscodeCoordinator::with_clock(
            self.coordinator_config,
            Some(Arc::clone(&event_bus)),
            Arc::clone(&clock),
        );
        let sweeper = CleanupSweeper::new(
            Arc::clone(&settings),
            Arc::clone(&store),
            Arc::clone(&ledger),
            Arc::clone(&clock),
        )
        .with_event_bus(Arc::clone(&event_bus));

        info!(
            "Streaming service ready (cache at {})",
            current.directory.display()
        );

        Ok(StreamingService {
            coordinator,
            ledger,
            sweeper,
            store,
            settings,
            catalog,
            transcoder,
            clock,
            event_bus,
            sweep_interval: self.sweep_interval.unwrap_or(DEFAULT_SWEEP_INTERVAL),
            background: Mutex::new(Vec::new()),
        })
    }
}

impl fmt::Debug for StreamingServiceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingServiceBuilder")
            .field("store", &self.store.as_ref().map(|_| "ArtifactStore { ... }"))
            .field(
                "settings",
                &self.settings.as_ref().map(|_| "SettingsProvider { ... }"),
            )
            .field(
                "catalog",
                &self.catalog.as_ref().map(|_| "MediaCatalog { ... }"),
            )
            .field(
                "transcoder",
                &self.transcoder.as_ref().map(|_| "MediaTranscoder { ... }"),
            )
            .field("coordinator_config", &self.coordinator_config)
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::{CacheSettings, MediaSource, StoredFile, TranscodeOutput};
    use bytes::Bytes;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::path::PathBuf;
    use std::sync::Mutex as StdMutex;

    type BridgeResult<T> = bridge_traits::error::Result<T>;

    struct NullStore {
        created_dirs: StdMutex<Vec<PathBuf>>,
    }

    impl NullStore {
        fn new() -> Self {
            Self {
                created_dirs: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl ArtifactStore for NullStore {
        async fn write(&self, _path: &Path, _data: Bytes) -> BridgeResult<()> {
            Ok(())
        }

        async fn read(&self, _path: &Path) -> BridgeResult<Bytes> {
            Ok(Bytes::new())
        }

        async fn delete(&self, _path: &Path) -> BridgeResult<()> {
            Ok(())
        }

        async fn exists(&self, _path: &Path) -> BridgeResult<bool> {
            Ok(false)
        }

        async fn create_dir_all(&self, path: &Path) -> BridgeResult<()> {
            self.created_dirs.lock().unwrap().push(path.to_path_buf());
            Ok(())
        }

        async fn list_directory(&self, _path: &Path) -> BridgeResult<Vec<StoredFile>> {
            Ok(Vec::new())
        }
    }

    struct FixedSettings(CacheSettings);

    #[async_trait]
    impl SettingsProvider for FixedSettings {
        async fn cache_settings(&self) -> BridgeResult<CacheSettings> {
            Ok(self.0.clone())
        }
    }

    struct SingleCatalog;

    #[async_trait]
    impl MediaCatalog for SingleCatalog {
        async fn media_source(&self, media_id: &str) -> BridgeResult<MediaSource> {
            Ok(MediaSource::new(media_id, format!("/library/{media_id}.avi")))
        }
    }

    struct NullTranscoder;

    #[async_trait]
    impl MediaTranscoder for NullTranscoder {
        async fn transcode(
            &self,
            request: TranscodeRequest,
            _on_progress: ProgressCallback,
        ) -> BridgeResult<TranscodeOutput> {
            Ok(TranscodeOutput {
                output_path: request.output_path.to_string_lossy().into_owned(),
                size_bytes: 0,
                duration_seconds: 0.0,
            })
        }
    }

    struct Parts {
        store: Arc<NullStore>,
        settings: Arc<FixedSettings>,
        catalog: Arc<SingleCatalog>,
        transcoder: Arc<NullTranscoder>,
        pool: SqlitePool,
    }

    async fn parts() -> Parts {
        parts_with_settings(CacheSettings::new(1024, 60_000, "/cache")).await
    }

    async fn parts_with_settings(settings: CacheSettings) -> Parts {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(":memory:")
            .await
            .unwrap();
        Parts {
            store: Arc::new(NullStore::new()),
            settings: Arc::new(FixedSettings(settings)),
            catalog: Arc::new(SingleCatalog),
            transcoder: Arc::new(NullTranscoder),
            pool,
        }
    }

    #[tokio::test]
    async fn test_build_requires_artifact_store() {
        let parts = parts().await;
        let result = StreamingService::builder()
            .settings_provider(parts.settings)
            .media_catalog(parts.catalog)
            .media_transcoder(parts.transcoder)
            .database_pool(parts.pool)
            .build()
            .await;

        let err = result.unwrap_err();
        assert!(err.to_string().contains("ArtifactStore"));
        assert!(err.to_string().contains(".artifact_store()"));
    }

    #[tokio::test]
    async fn test_build_requires_settings_provider() {
        let parts = parts().await;
        let err = StreamingService::builder()
            .artifact_store(parts.store)
            .media_catalog(parts.catalog)
            .media_transcoder(parts.transcoder)
            .database_pool(parts.pool)
            .build()
            .await
            .unwrap_err();

        assert!(err.to_string().contains("SettingsProvider"));
    }

    #[tokio::test]
    async fn test_build_requires_media_catalog() {
        let parts = parts().await;
        let err = StreamingService::builder()
            .artifact_store(parts.store)
            .settings_provider(parts.settings)
            .media_transcoder(parts.transcoder)
            .database_pool(parts.pool)
            .build()
            .await
            .unwrap_err();

        assert!(err.to_string().contains("MediaCatalog"));
    }

    #[tokio::test]
    async fn test_build_requires_media_transcoder() {
        let parts = parts().await;
        let err = StreamingService::builder()
            .artifact_store(parts.store)
            .settings_provider(parts.settings)
            .media_catalog(parts.catalog)
            .database_pool(parts.pool)
            .build()
            .await
            .unwrap_err();

        assert!(err.to_string().contains("MediaTranscoder"));
    }

    #[tokio::test]
    async fn test_build_requires_ledger_source() {
        let parts = parts().await;
        let err = StreamingService::builder()
            .artifact_store(parts.store)
            .settings_provider(parts.settings)
            .media_catalog(parts.catalog)
            .media_transcoder(parts.transcoder)
            .build()
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ServiceError::CapabilityMissing { ref capability, .. } if capability == "CacheLedger"
        ));
        assert!(err.to_string().contains(".database_pool()"));
    }

    #[tokio::test]
    async fn test_build_rejects_invalid_settings() {
        let parts = parts_with_settings(CacheSettings::new(0, 60_000, "/cache")).await;
        let err = StreamingService::builder()
            .artifact_store(parts.store)
            .settings_provider(parts.settings)
            .media_catalog(parts.catalog)
            .media_transcoder(parts.transcoder)
            .database_pool(parts.pool)
            .build()
            .await
            .unwrap_err();

        assert!(matches!(err, ServiceError::InitializationFailed(_)));
        assert!(err.to_string().contains("max_size_bytes"));
    }

    #[tokio::test]
    async fn test_build_prepares_cache_directory() {
        let parts = parts().await;
        let store = Arc::clone(&parts.store);

        let service = StreamingService::builder()
            .artifact_store(parts.store)
            .settings_provider(parts.settings)
            .media_catalog(parts.catalog)
            .media_transcoder(parts.transcoder)
            .database_pool(parts.pool)
            .build()
            .await
            .unwrap();

        assert_eq!(
            store.created_dirs.lock().unwrap().as_slice(),
            &[PathBuf::from("/cache")]
        );
        // The schema is in place: stats on the fresh ledger succeed.
        let report = service.cache_report().await.unwrap();
        assert_eq!(report.ledger.entry_count, 0);
    }
}
