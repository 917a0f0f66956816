//! Cache cleanup sweeper.
//!
//! One sweep reconciles the ledger with the artifact directory:
//!
//! 1. Read and validate the current cache configuration.
//! 2. Stat the artifact directory for the report.
//! 3. Delete expired entries (file first, then row).
//! 4. Delete orphaned files older than the TTL that no row references.
//! 5. Delete oldest-accessed entries until the recorded total fits the
//!    size budget.
//!
//! A failed file deletion is recorded in the report and its row kept, so a
//! later sweep can retry; it never aborts the rest of the sweep. Rows whose
//! backing file is already gone are pruned and counted as consistency
//! repairs.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::settings::{CacheSettings, SettingsProvider};
use bridge_traits::storage::{ArtifactStore, DirectoryStats};
use bridge_traits::time::Clock;
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::entry::CacheEntry;
use crate::error::{CacheError, Result};
use crate::ledger::CacheLedger;

/// How often scheduled sweeps run unless the host overrides it.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// One file the sweep could not delete.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanupFailure {
    pub path: String,
    pub message: String,
}

impl CleanupFailure {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    /// Files actually deleted from the store.
    pub files_deleted: u64,
    /// Bytes those deletions freed.
    pub bytes_freed: u64,
    /// Deletions driven by entry expiry.
    pub expired_count: u64,
    /// Deletions driven by the size budget.
    pub lru_count: u64,
    /// Unreferenced files reclaimed from the artifact directory.
    pub orphan_count: u64,
    /// Ledger rows pruned because their file was already gone.
    pub consistency_repairs: u64,
    /// Per-file failures; never fatal to the sweep.
    pub errors: Vec<CleanupFailure>,
    /// Directory statistics observed before any deletion.
    pub disk: DirectoryStats,
}

enum EntryOutcome {
    /// File deleted and row removed.
    Deleted,
    /// File was already gone; the stale row was pruned.
    Repaired,
    /// Deletion failed; the row is kept so a retry can find it.
    Failed,
}

/// Periodic reconciliation of the cache ledger and artifact directory.
///
/// Configuration is re-read on every sweep so a new budget, TTL, or
/// directory takes effect without a restart.
#[derive(Clone)]
pub struct CleanupSweeper {
    settings: Arc<dyn SettingsProvider>,
    store: Arc<dyn ArtifactStore>,
    ledger: Arc<dyn CacheLedger>,
    clock: Arc<dyn Clock>,
    event_bus: Option<Arc<EventBus>>,
    cancel: CancellationToken,
}

impl fmt::Debug for CleanupSweeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CleanupSweeper").finish_non_exhaustive()
    }
}

impl CleanupSweeper {
    pub fn new(
        settings: Arc<dyn SettingsProvider>,
        store: Arc<dyn ArtifactStore>,
        ledger: Arc<dyn CacheLedger>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            store,
            ledger,
            clock,
            event_bus: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Announce sweep completions on the given bus.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Run one full sweep and report what happened.
    #[instrument(skip(self))]
    pub async fn run_sweep(&self) -> Result<CleanupReport> {
        let settings = self.settings.cache_settings().await?;
        settings.validate().map_err(CacheError::Configuration)?;
        let now_ms = self.clock.unix_timestamp_millis();

        let disk = self.store.stat_directory(&settings.directory).await?;
        debug!(
            "Sweep starting: {} files, {} bytes on disk, budget {} bytes, ttl {} ms",
            disk.file_count, disk.total_bytes, settings.max_size_bytes, settings.ttl_ms
        );

        let mut report = CleanupReport {
            disk,
            ..CleanupReport::default()
        };
        let mut failed_ids = HashSet::new();

        self.remove_expired(now_ms, &mut report, &mut failed_ids)
            .await?;
        self.remove_orphans(&settings, now_ms, &mut report).await?;
        self.evict_lru(settings.max_size_bytes, &mut report, &failed_ids)
            .await?;

        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Cache(CacheEvent::SweepCompleted {
                files_deleted: report.files_deleted,
                bytes_freed: report.bytes_freed,
                expired_count: report.expired_count,
                lru_count: report.lru_count,
                error_count: report.errors.len() as u64,
            }))
            .ok();
        }

        info!(
            "Sweep complete: {} files removed, {} bytes freed, {} errors",
            report.files_deleted,
            report.bytes_freed,
            report.errors.len()
        );
        Ok(report)
    }

    /// Run sweeps on a fixed interval until [`shutdown`](Self::shutdown).
    pub fn spawn_periodic(&self, interval: Duration) -> JoinHandle<()> {
        let sweeper = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; consume it so the first
            // sweep happens one full interval after startup.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = sweeper.cancel.cancelled() => {
                        debug!("Cleanup sweeper stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = sweeper.run_sweep().await {
                            warn!("Scheduled cache sweep failed: {}", e);
                        }
                    }
                }
            }
        })
    }

    /// Stop any periodic sweeping. In-flight sweeps finish their current
    /// pass.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn remove_expired(
        &self,
        now_ms: i64,
        report: &mut CleanupReport,
        failed_ids: &mut HashSet<i64>,
    ) -> Result<()> {
        let expired = self.ledger.expired_entries(now_ms).await?;
        if expired.is_empty() {
            return Ok(());
        }
        debug!("Found {} expired cache entries", expired.len());

        for entry in expired {
            match self.delete_entry(&entry, report).await {
                EntryOutcome::Deleted => report.expired_count += 1,
                EntryOutcome::Repaired => {}
                EntryOutcome::Failed => {
                    failed_ids.insert(entry.id);
                }
            }
        }
        Ok(())
    }

    async fn remove_orphans(
        &self,
        settings: &CacheSettings,
        now_ms: i64,
        report: &mut CleanupReport,
    ) -> Result<()> {
        let referenced: HashSet<PathBuf> = self
            .ledger
            .all_entries()
            .await?
            .into_iter()
            .map(|entry| PathBuf::from(entry.path))
            .collect();

        let files = self.store.list_directory(&settings.directory).await?;
        for file in files {
            if referenced.contains(&file.path) {
                continue;
            }
            // A file with no row may belong to a production that has not
            // recorded its entry yet. Only files older than the TTL are
            // safe to reclaim.
            let old_enough = file
                .modified_at_ms
                .map(|modified| now_ms - modified >= settings.ttl_ms)
                .unwrap_or(false);
            if !old_enough {
                continue;
            }

            debug!("Deleting orphaned cache file {:?}", file.path);
            match self.store.delete(&file.path).await {
                Ok(()) => {
                    report.orphan_count += 1;
                    report.files_deleted += 1;
                    report.bytes_freed += file.size_bytes;
                }
                Err(e) => {
                    warn!("Failed to delete orphaned file {:?}: {}", file.path, e);
                    report
                        .errors
                        .push(CleanupFailure::new(file.path.to_string_lossy(), e.to_string()));
                }
            }
        }
        Ok(())
    }

    async fn evict_lru(
        &self,
        max_bytes: u64,
        report: &mut CleanupReport,
        failed_ids: &HashSet<i64>,
    ) -> Result<()> {
        let victims = self.ledger.entries_for_size_cleanup(max_bytes).await?;
        if victims.is_empty() {
            return Ok(());
        }
        debug!("Evicting {} entries to satisfy the size budget", victims.len());

        for entry in victims {
            // Already reported as failed earlier in this sweep.
            if failed_ids.contains(&entry.id) {
                continue;
            }
            if let EntryOutcome::Deleted = self.delete_entry(&entry, report).await {
                report.lru_count += 1;
            }
        }
        Ok(())
    }

    /// Delete one entry's file and row, ledger row last.
    async fn delete_entry(&self, entry: &CacheEntry, report: &mut CleanupReport) -> EntryOutcome {
        let path = PathBuf::from(&entry.path);

        match self.store.exists(&path).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Pruning ledger row {} for missing file {}", entry.id, entry.path);
                if let Err(e) = self.ledger.remove(entry.id).await {
                    warn!("Failed to prune ledger row {}: {}", entry.id, e);
                    report
                        .errors
                        .push(CleanupFailure::new(&entry.path, e.to_string()));
                    return EntryOutcome::Failed;
                }
                report.consistency_repairs += 1;
                return EntryOutcome::Repaired;
            }
            Err(e) => {
                warn!("Failed to stat cache file {}: {}", entry.path, e);
                report
                    .errors
                    .push(CleanupFailure::new(&entry.path, e.to_string()));
                return EntryOutcome::Failed;
            }
        }

        if let Err(e) = self.store.delete(&path).await {
            warn!("Failed to delete cache file {}: {}", entry.path, e);
            report
                .errors
                .push(CleanupFailure::new(&entry.path, e.to_string()));
            return EntryOutcome::Failed;
        }

        if let Err(e) = self.ledger.remove(entry.id).await {
            // The file is gone but the row survived; the next sweep prunes
            // it as a consistency repair.
            warn!("Failed to remove ledger row {}: {}", entry.id, e);
            report
                .errors
                .push(CleanupFailure::new(&entry.path, e.to_string()));
        }
        report.files_deleted += 1;
        report.bytes_freed += entry.size_bytes;
        EntryOutcome::Deleted
    }
}
