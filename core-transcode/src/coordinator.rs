//! # Transcode Coordinator
//!
//! Deduplicates transcode work per fingerprint and pushes progress to every
//! observer of a job.
//!
//! ## Overview
//!
//! The coordinator owns an in-memory table of transcode jobs keyed by
//! [`TranscodeFingerprint`]. Any number of callers may request the same
//! artifact concurrently; exactly one producer runs, and every caller receives
//! the same outcome. Observers subscribe to a fingerprint and receive the
//! job's event stream, with a catch-up snapshot replayed first so a late
//! observer is never left silent.
//!
//! ## Lifecycle
//!
//! ```text
//!  produce()                         subscribe()
//!     │                                  │
//!     ▼                                  ▼
//!  claim the job, or join one        catch-up replay + live events
//!     │
//!     ▼
//!  producer runs (bounded by a worker-pool semaphore)
//!     │
//!     ▼
//!  Complete / Error broadcast to all waiters and observers
//! ```
//!
//! Finished jobs stay in the table so late callers get the cached outcome
//! without re-running the producer. A job is removed when its last observer
//! unsubscribes while it is idle, or by the periodic sweep once the retention
//! window after completion lapses.

use crate::fingerprint::TranscodeFingerprint;
use crate::job::{ArtifactResult, TranscodeJob, TranscodeStatus};
use crate::{Result, TranscodeError};
use bridge_traits::time::{Clock, SystemClock};
use core_runtime::events::{CoreEvent, EventBus, TranscodeEvent};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for the transcode coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Maximum number of producers allowed to run at the same time
    pub max_concurrent_transcodes: usize,
    /// Capacity of each job's event channel
    pub event_buffer_size: usize,
    /// How long finished jobs stay visible to late callers, in milliseconds
    pub terminal_retention_ms: i64,
    /// Interval between idle sweeps, in milliseconds
    pub sweep_interval_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_transcodes: 2,
            event_buffer_size: 64,
            terminal_retention_ms: 60 * 60 * 1000,
            sweep_interval_ms: 30 * 60 * 1000,
        }
    }
}

// ============================================================================
// Job Table
// ============================================================================

/// One slot in the coordinator's job table.
///
/// The broadcast sender is the job's event channel. Waiters and observers hold
/// receivers; `observers` counts only explicit subscriptions, not callers
/// waiting inside `produce`.
struct JobEntry {
    job: TranscodeJob,
    events: broadcast::Sender<TranscodeEvent>,
    observers: usize,
}

impl JobEntry {
    fn new(job: TranscodeJob, buffer: usize) -> Self {
        let (events, _) = broadcast::channel(buffer);
        Self {
            job,
            events,
            observers: 0,
        }
    }
}

/// Outcome of inspecting the job table for a `produce` call.
enum Claim {
    /// The job already finished; return the stored result.
    Finished(ArtifactResult),
    /// Another caller is producing; wait on its event channel.
    Join(broadcast::Receiver<TranscodeEvent>),
    /// This caller claimed the job and must run the producer.
    Producer(broadcast::Receiver<TranscodeEvent>),
}

struct CoordinatorInner {
    jobs: Mutex<HashMap<TranscodeFingerprint, JobEntry>>,
    config: CoordinatorConfig,
    event_bus: Option<Arc<EventBus>>,
    clock: Arc<dyn Clock>,
    permits: Arc<Semaphore>,
    cancel: CancellationToken,
}

impl CoordinatorInner {
    fn forward_to_bus(&self, event: TranscodeEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Transcode(event)).ok();
        }
    }

    /// Move a claimed job into `Transcoding` and announce it.
    ///
    /// Returns false if the job is gone or refuses the transition; production
    /// must not run in that case.
    fn mark_transcoding(&self, fingerprint: &TranscodeFingerprint) -> bool {
        let now = self.clock.unix_timestamp_millis();
        let mut jobs = self.jobs.lock();

        let entry = match jobs.get_mut(fingerprint) {
            Some(entry) => entry,
            None => {
                warn!("Transcode job {} vanished before production started", fingerprint);
                return false;
            }
        };

        match entry.job.clone().begin_transcoding(now) {
            Ok(job) => entry.job = job,
            Err(e) => {
                warn!("Cannot begin transcoding {}: {}", fingerprint, e);
                return false;
            }
        }

        let event = status_event(&entry.job);
        entry.events.send(event.clone()).ok();
        self.forward_to_bus(event);
        true
    }

    /// Record the terminal outcome of a production run and broadcast it.
    fn finish_job(
        &self,
        fingerprint: &TranscodeFingerprint,
        outcome: std::result::Result<ArtifactResult, String>,
    ) {
        let now = self.clock.unix_timestamp_millis();
        let mut jobs = self.jobs.lock();

        let entry = match jobs.get_mut(fingerprint) {
            Some(entry) => entry,
            None => {
                warn!("Transcode job {} vanished before it could finish", fingerprint);
                return;
            }
        };

        let event = match outcome {
            Ok(result) => match entry.job.clone().complete(result.clone(), now) {
                Ok(job) => {
                    entry.job = job;
                    info!(
                        "Transcode complete for {} ({} bytes)",
                        fingerprint, result.size_bytes
                    );
                    TranscodeEvent::Complete {
                        job_id: entry.job.id.to_string(),
                        fingerprint: fingerprint.to_string(),
                        path: result.path,
                        size_bytes: result.size_bytes,
                        duration_seconds: result.duration_seconds,
                    }
                }
                Err(e) => {
                    warn!("Cannot complete transcode job {}: {}", fingerprint, e);
                    return;
                }
            },
            Err(message) => match entry.job.clone().fail(message.clone(), now) {
                Ok(job) => {
                    entry.job = job;
                    warn!("Transcode failed for {}: {}", fingerprint, message);
                    TranscodeEvent::Error {
                        job_id: entry.job.id.to_string(),
                        fingerprint: fingerprint.to_string(),
                        message,
                    }
                }
                Err(e) => {
                    warn!("Cannot fail transcode job {}: {}", fingerprint, e);
                    return;
                }
            },
        };

        entry.events.send(event.clone()).ok();
        self.forward_to_bus(event);
    }
}

/// Build a status event from the job's current state.
fn status_event(job: &TranscodeJob) -> TranscodeEvent {
    TranscodeEvent::Status {
        job_id: job.id.to_string(),
        fingerprint: job.fingerprint.to_string(),
        status: job.status.to_string(),
    }
}

/// Events a late subscriber must see before any live event.
fn catch_up_events(job: &TranscodeJob) -> Vec<TranscodeEvent> {
    match job.status {
        TranscodeStatus::Complete => match &job.result {
            Some(result) => vec![TranscodeEvent::Complete {
                job_id: job.id.to_string(),
                fingerprint: job.fingerprint.to_string(),
                path: result.path.clone(),
                size_bytes: result.size_bytes,
                duration_seconds: result.duration_seconds,
            }],
            None => vec![status_event(job)],
        },
        TranscodeStatus::Error => vec![TranscodeEvent::Error {
            job_id: job.id.to_string(),
            fingerprint: job.fingerprint.to_string(),
            message: job
                .error_message
                .clone()
                .unwrap_or_else(|| "transcode failed".to_string()),
        }],
        _ => {
            let mut events = vec![status_event(job)];
            if let Some(progress) = &job.progress {
                events.push(TranscodeEvent::Progress {
                    job_id: job.id.to_string(),
                    fingerprint: job.fingerprint.to_string(),
                    percent: progress.percent,
                    eta_seconds: progress.eta_seconds,
                    message: progress.message.clone(),
                });
            }
            events
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Coordinates transcode production so each fingerprint runs at most once.
///
/// Cloning is cheap; all clones share the same job table. The coordinator is
/// an explicit owned service: construct it once, hand clones to whoever needs
/// them, and call [`shutdown`](TranscodeCoordinator::shutdown) when the
/// application exits.
#[derive(Clone)]
pub struct TranscodeCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl TranscodeCoordinator {
    /// Create a coordinator using the system clock and no event bus.
    pub fn new(config: CoordinatorConfig) -> Self {
        Self::with_clock(config, None, Arc::new(SystemClock))
    }

    /// Create a coordinator that mirrors job events onto an application bus.
    pub fn with_event_bus(config: CoordinatorConfig, event_bus: Arc<EventBus>) -> Self {
        Self::with_clock(config, Some(event_bus), Arc::new(SystemClock))
    }

    /// Create a coordinator with an explicit clock.
    pub fn with_clock(
        config: CoordinatorConfig,
        event_bus: Option<Arc<EventBus>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        // A zero-capacity broadcast channel panics, and a zero-permit pool
        // would never run anything.
        let config = CoordinatorConfig {
            max_concurrent_transcodes: config.max_concurrent_transcodes.max(1),
            event_buffer_size: config.event_buffer_size.max(1),
            ..config
        };
        let permits = Arc::new(Semaphore::new(config.max_concurrent_transcodes));

        Self {
            inner: Arc::new(CoordinatorInner {
                jobs: Mutex::new(HashMap::new()),
                config,
                event_bus,
                clock,
                permits,
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Produce the artifact for `fingerprint`, or wait for the production
    /// already in flight.
    ///
    /// The producer closure is invoked only when this call claims the job; at
    /// most one producer ever runs per fingerprint. Once a job finishes, later
    /// calls return the stored outcome without invoking their producer, until
    /// the job is swept from the table.
    ///
    /// # Errors
    ///
    /// Returns [`TranscodeError::Production`] when the producer fails or
    /// panics (every waiter observes the same error), and
    /// [`TranscodeError::Shutdown`] when the coordinator is shutting down.
    #[instrument(skip(self, producer), fields(fingerprint = %fingerprint))]
    pub async fn produce<F, Fut>(
        &self,
        fingerprint: &TranscodeFingerprint,
        producer: F,
    ) -> Result<ArtifactResult>
    where
        F: FnOnce(ProgressHandle) -> Fut,
        Fut: Future<Output = anyhow::Result<ArtifactResult>> + Send + 'static,
    {
        if self.inner.cancel.is_cancelled() {
            return Err(TranscodeError::Shutdown);
        }

        match self.claim_or_join(fingerprint)? {
            Claim::Finished(result) => {
                debug!("Returning stored result for {}", fingerprint);
                Ok(result)
            }
            Claim::Join(receiver) => {
                debug!("Joining in-flight production for {}", fingerprint);
                self.await_terminal(fingerprint, receiver).await
            }
            Claim::Producer(receiver) => {
                let handle = ProgressHandle {
                    inner: Arc::clone(&self.inner),
                    fingerprint: fingerprint.clone(),
                };
                // The closure runs on the caller's stack; a panic in it must
                // still drive the claimed job terminal, or every waiter on
                // this fingerprint hangs.
                let production =
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| producer(handle)));
                match production {
                    Ok(production) => {
                        tokio::spawn(run_production(
                            Arc::clone(&self.inner),
                            fingerprint.clone(),
                            production,
                        ));
                    }
                    Err(payload) => {
                        self.inner.finish_job(
                            fingerprint,
                            Err(format!("producer panicked: {}", panic_message(payload))),
                        );
                    }
                }
                self.await_terminal(fingerprint, receiver).await
            }
        }
    }

    /// Inspect the job table and either claim the job or attach to it.
    ///
    /// Runs entirely under the table lock: checking the current state,
    /// transitioning to `Starting`, and subscribing the caller are one atomic
    /// step, so two concurrent calls can never both claim the same job.
    fn claim_or_join(&self, fingerprint: &TranscodeFingerprint) -> Result<Claim> {
        let now = self.inner.clock.unix_timestamp_millis();
        let mut jobs = self.inner.jobs.lock();

        if let Some(entry) = jobs.get(fingerprint) {
            match entry.job.status {
                TranscodeStatus::Complete => {
                    let result = entry.job.result.clone().ok_or_else(|| {
                        TranscodeError::Internal(format!(
                            "complete job {} has no stored result",
                            fingerprint
                        ))
                    })?;
                    return Ok(Claim::Finished(result));
                }
                TranscodeStatus::Error => {
                    let message = entry
                        .job
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "transcode failed".to_string());
                    return Err(TranscodeError::Production { message });
                }
                TranscodeStatus::Starting | TranscodeStatus::Transcoding => {
                    return Ok(Claim::Join(entry.events.subscribe()));
                }
                // A pending job only has subscribers; this caller claims it.
                TranscodeStatus::Pending => {}
            }
        }

        let entry = jobs.entry(fingerprint.clone()).or_insert_with(|| {
            JobEntry::new(
                TranscodeJob::new(fingerprint.clone(), now),
                self.inner.config.event_buffer_size,
            )
        });

        let started = entry.job.clone().start(now)?;
        entry.job = started;

        // Subscribe before announcing so the claimer cannot miss its own
        // terminal event.
        let receiver = entry.events.subscribe();
        let event = status_event(&entry.job);
        entry.events.send(event.clone()).ok();
        self.inner.forward_to_bus(event);

        debug!("Claimed transcode job {} for {}", entry.job.id, fingerprint);
        Ok(Claim::Producer(receiver))
    }

    /// Wait on a job's event channel until it reports a terminal event.
    async fn await_terminal(
        &self,
        fingerprint: &TranscodeFingerprint,
        mut receiver: broadcast::Receiver<TranscodeEvent>,
    ) -> Result<ArtifactResult> {
        loop {
            match receiver.recv().await {
                Ok(TranscodeEvent::Complete {
                    path,
                    size_bytes,
                    duration_seconds,
                    ..
                }) => {
                    return Ok(ArtifactResult {
                        path,
                        size_bytes,
                        duration_seconds,
                    });
                }
                Ok(TranscodeEvent::Error { message, .. }) => {
                    return Err(TranscodeError::Production { message });
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // The terminal event may be among the skipped ones.
                    debug!("Waiter for {} lagged by {} events", fingerprint, skipped);
                    if let Some(outcome) = self.terminal_outcome(fingerprint) {
                        return outcome;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return self.terminal_outcome(fingerprint).unwrap_or_else(|| {
                        Err(TranscodeError::Internal(
                            "transcode job was removed before it finished".to_string(),
                        ))
                    });
                }
            }
        }
    }

    /// Read the stored outcome of a job that already reached a terminal state.
    fn terminal_outcome(
        &self,
        fingerprint: &TranscodeFingerprint,
    ) -> Option<Result<ArtifactResult>> {
        let jobs = self.inner.jobs.lock();
        let entry = jobs.get(fingerprint)?;
        match entry.job.status {
            TranscodeStatus::Complete => entry.job.result.clone().map(Ok),
            TranscodeStatus::Error => {
                let message = entry
                    .job
                    .error_message
                    .clone()
                    .unwrap_or_else(|| "transcode failed".to_string());
                Some(Err(TranscodeError::Production { message }))
            }
            _ => None,
        }
    }

    /// Subscribe to a fingerprint's event stream.
    ///
    /// The subscription first replays a catch-up snapshot of the job's current
    /// state, then delivers live events. Subscribing to an unknown fingerprint
    /// registers a pending job so the interest survives until a producer
    /// claims it or the subscriber goes away.
    pub fn subscribe(&self, fingerprint: &TranscodeFingerprint) -> ProgressSubscription {
        let now = self.inner.clock.unix_timestamp_millis();
        let mut jobs = self.inner.jobs.lock();

        let entry = jobs.entry(fingerprint.clone()).or_insert_with(|| {
            debug!("Creating pending job for subscriber to {}", fingerprint);
            JobEntry::new(
                TranscodeJob::new(fingerprint.clone(), now),
                self.inner.config.event_buffer_size,
            )
        });
        entry.observers += 1;

        // The receiver is created under the same lock as the snapshot, so no
        // event can fall between the two.
        let receiver = entry.events.subscribe();
        let pending = catch_up_events(&entry.job);

        ProgressSubscription {
            pending: pending.into(),
            receiver,
            _guard: ObserverGuard {
                inner: Arc::clone(&self.inner),
                fingerprint: fingerprint.clone(),
            },
        }
    }

    /// Copy of the job's current state, if it is in the table.
    pub fn snapshot(&self, fingerprint: &TranscodeFingerprint) -> Option<TranscodeJob> {
        self.inner
            .jobs
            .lock()
            .get(fingerprint)
            .map(|entry| entry.job.clone())
    }

    /// True when a producer is working on this fingerprint right now.
    pub fn is_active(&self, fingerprint: &TranscodeFingerprint) -> bool {
        self.inner
            .jobs
            .lock()
            .get(fingerprint)
            .map(|entry| entry.job.status.is_active())
            .unwrap_or(false)
    }

    pub fn job_count(&self) -> usize {
        self.inner.jobs.lock().len()
    }

    pub fn active_count(&self) -> usize {
        self.inner
            .jobs
            .lock()
            .values()
            .filter(|entry| entry.job.status.is_active())
            .count()
    }

    /// Drop finished jobs whose retention window has lapsed.
    ///
    /// Runs even when observers are still attached; their streams end with a
    /// channel close, which any observer already saw the terminal event for.
    /// Returns the number of jobs removed.
    pub fn sweep_idle(&self) -> usize {
        let now = self.inner.clock.unix_timestamp_millis();
        let retention = self.inner.config.terminal_retention_ms;
        let mut jobs = self.inner.jobs.lock();

        let before = jobs.len();
        jobs.retain(|_, entry| {
            !entry.job.status.is_terminal()
                || entry
                    .job
                    .completed_at
                    .map(|completed| now - completed < retention)
                    .unwrap_or(true)
        });
        let removed = before - jobs.len();

        if removed > 0 {
            debug!("Swept {} stale transcode jobs", removed);
        }
        removed
    }

    /// Drop the stored job for `fingerprint` if it reached a terminal state.
    ///
    /// A completed job keeps serving its stored result to later `produce`
    /// calls; when the artifact behind that result is gone, the caller uses
    /// this to clear the memory so the next request runs a fresh producer.
    /// Active and pending jobs are never removed. Returns whether a job was
    /// dropped.
    pub fn invalidate(&self, fingerprint: &TranscodeFingerprint) -> bool {
        let mut jobs = self.inner.jobs.lock();
        match jobs.get(fingerprint) {
            Some(entry) if entry.job.status.is_terminal() => {
                jobs.remove(fingerprint);
                debug!("Invalidated terminal transcode job for {}", fingerprint);
                true
            }
            _ => false,
        }
    }

    /// Spawn a background task that calls [`sweep_idle`](Self::sweep_idle)
    /// every `sweep_interval_ms` until shutdown.
    pub fn spawn_idle_sweeper(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        let interval = Duration::from_millis(coordinator.inner.config.sweep_interval_ms.max(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it so sweeps start one
            // full interval from now.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = coordinator.inner.cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        coordinator.sweep_idle();
                    }
                }
            }
        })
    }

    /// Stop accepting work and cancel running productions.
    ///
    /// In-flight `produce` calls resolve with an error; background tasks
    /// spawned from this coordinator exit.
    pub fn shutdown(&self) {
        info!("Shutting down transcode coordinator");
        self.inner.cancel.cancel();
    }
}

impl std::fmt::Debug for TranscodeCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscodeCoordinator")
            .field("jobs", &self.job_count())
            .field("active", &self.active_count())
            .finish()
    }
}

/// Drive a claimed production to its terminal state.
///
/// Runs detached from the claiming caller, so the producer finishes (and its
/// outcome is recorded) even if every waiter gives up. A panicking producer
/// is caught and recorded as an ordinary production failure.
async fn run_production<Fut>(
    inner: Arc<CoordinatorInner>,
    fingerprint: TranscodeFingerprint,
    production: Fut,
) where
    Fut: Future<Output = anyhow::Result<ArtifactResult>> + Send + 'static,
{
    let _permit = tokio::select! {
        _ = inner.cancel.cancelled() => {
            inner.finish_job(
                &fingerprint,
                Err("coordinator shut down before production started".to_string()),
            );
            return;
        }
        permit = inner.permits.clone().acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => {
                inner.finish_job(&fingerprint, Err("worker pool closed".to_string()));
                return;
            }
        },
    };

    if !inner.mark_transcoding(&fingerprint) {
        return;
    }

    // The producer runs in its own task: a panic inside it must come back as
    // a JoinError rather than tear this task down before the job reaches a
    // terminal state.
    let mut producer_task = tokio::spawn(production);

    let outcome = tokio::select! {
        _ = inner.cancel.cancelled() => {
            producer_task.abort();
            Err(anyhow::anyhow!("coordinator shut down during production"))
        }
        joined = &mut producer_task => match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => Err(anyhow::anyhow!(
                "producer panicked: {}",
                panic_message(e.into_panic())
            )),
            Err(_) => Err(anyhow::anyhow!("producer task was cancelled")),
        },
    };

    match outcome {
        Ok(result) => inner.finish_job(&fingerprint, Ok(result)),
        Err(e) => inner.finish_job(&fingerprint, Err(format!("{:#}", e))),
    }
}

/// Best-effort extraction of a message from a panic payload.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}

// ============================================================================
// Progress Reporting
// ============================================================================

/// Handle a producer uses to report its progress.
///
/// Reports feed the job's event channel and the catch-up snapshot. Out-of-band
/// reports (job no longer transcoding, percent moving backwards) are dropped.
#[derive(Clone)]
pub struct ProgressHandle {
    inner: Arc<CoordinatorInner>,
    fingerprint: TranscodeFingerprint,
}

impl ProgressHandle {
    /// Report progress as a percent of the whole transcode.
    ///
    /// Values of 100 and above are capped just below completion; only the
    /// producer finishing moves a job to 100.
    pub fn report(&self, percent: u8) {
        let now = self.inner.clock.unix_timestamp_millis();
        let mut jobs = self.inner.jobs.lock();

        let entry = match jobs.get_mut(&self.fingerprint) {
            Some(entry) => entry,
            None => return,
        };

        if !entry.job.update_progress(percent, "transcoding", now) {
            return;
        }

        let progress = match entry.job.progress.clone() {
            Some(progress) => progress,
            None => return,
        };

        let event = TranscodeEvent::Progress {
            job_id: entry.job.id.to_string(),
            fingerprint: self.fingerprint.to_string(),
            percent: progress.percent,
            eta_seconds: progress.eta_seconds,
            message: progress.message,
        };
        entry.events.send(event.clone()).ok();
        self.inner.forward_to_bus(event);
    }

    pub fn fingerprint(&self) -> &TranscodeFingerprint {
        &self.fingerprint
    }
}

impl std::fmt::Debug for ProgressHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressHandle")
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

// ============================================================================
// Subscriptions
// ============================================================================

/// A live view of one job's event stream.
///
/// Dropping the subscription unregisters the observer; when the last observer
/// of an idle job leaves, the job is removed from the table.
pub struct ProgressSubscription {
    pending: VecDeque<TranscodeEvent>,
    receiver: broadcast::Receiver<TranscodeEvent>,
    _guard: ObserverGuard,
}

impl ProgressSubscription {
    /// Receive the next event, replaying catch-up events first.
    ///
    /// Returns `None` once the job's channel closes and nothing is buffered.
    pub async fn recv(&mut self) -> Option<TranscodeEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Progress subscriber lagged, skipping {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Receive without waiting. Returns `None` when nothing is ready.
    pub fn try_recv(&mut self) -> Option<TranscodeEvent> {
        if let Some(event) = self.pending.pop_front() {
            return Some(event);
        }

        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

impl std::fmt::Debug for ProgressSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSubscription")
            .field("fingerprint", &self._guard.fingerprint)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Decrements the observer count when a subscription is dropped, removing the
/// job if nobody is watching and nothing is running.
struct ObserverGuard {
    inner: Arc<CoordinatorInner>,
    fingerprint: TranscodeFingerprint,
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        let mut jobs = self.inner.jobs.lock();
        if let Some(entry) = jobs.get_mut(&self.fingerprint) {
            entry.observers = entry.observers.saturating_sub(1);

            // Active jobs stay: the producer runs to completion so its result
            // is available for the next caller.
            let idle = entry.job.status.is_terminal()
                || entry.job.status == TranscodeStatus::Pending;
            if entry.observers == 0 && idle {
                jobs.remove(&self.fingerprint);
                debug!("Removed unobserved transcode job {}", self.fingerprint);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
