//! # Event Bus System
//!
//! Provides an event-driven architecture for the Media Streaming Core using
//! `tokio::sync::broadcast`. This module enables decoupled communication
//! between engine modules through typed events.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies for different domains
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//! - **Subscription Management**: Multiple subscribers can listen independently
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │ Coordinator  ├──────────────>│           │
//! └──────────────┘               │ EventBus  │
//!                                │ (broadcast│     subscribe    ┌────────────┐
//! ┌──────────────┐     emit      │  channel) ├─────────────────>│ Subscriber │
//! │ Sweeper      ├──────────────>│           │                  └────────────┘
//! └──────────────┘               │           │     subscribe    ┌────────────┐
//!                                │           ├─────────────────>│ Subscriber │
//! ┌──────────────┐     emit      │           │                  └────────────┘
//! │ Façade       ├──────────────>│           │
//! └──────────────┘               └───────────┘
//! ```
//!
//! The bus carries engine-wide lifecycle events. Per-fingerprint progress
//! delivery uses a dedicated broadcast channel owned by each transcode job;
//! both mechanisms share the [`TranscodeEvent`] vocabulary, so the JSON shape
//! a push transport sees is identical either way.
//!
//! ## Usage
//!
//! ### Publishing Events
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, CacheEvent};
//!
//! let event_bus = EventBus::new(100);
//! let event = CoreEvent::Cache(CacheEvent::SweepCompleted {
//!     files_deleted: 3,
//!     bytes_freed: 1_500_000,
//!     expired_count: 2,
//!     lru_count: 1,
//!     error_count: 0,
//! });
//!
//! event_bus.emit(event).ok();
//! ```
//!
//! ### Subscribing to Events
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent};
//! use tokio::sync::broadcast::error::RecvError;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! tokio::spawn(async move {
//!     loop {
//!         match stream.recv().await {
//!             Ok(event) => println!("Received: {:?}", event),
//!             Err(RecvError::Lagged(n)) => {
//!                 eprintln!("Missed {} events", n);
//!             }
//!             Err(RecvError::Closed) => break,
//!         }
//!     }
//! });
//! # }
//! ```
//!
//! ## Error Handling
//!
//! The event bus uses `tokio::sync::broadcast`, which can produce two types
//! of errors:
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n`
//!   events. This is non-fatal; the subscriber can continue receiving new
//!   events.
//! - **`RecvError::Closed`**: All senders have been dropped. This indicates
//!   shutdown.
//!
//! Slow subscribers never block fast ones, and a dropped subscriber never
//! blocks an emitter; this is what makes broadcast delivery safe to run from
//! the production hot path.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

// Re-export commonly used types
pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// This value balances memory usage with the ability to handle bursts of
/// events. Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
///
/// This is the main event type published and received through the event bus.
/// It wraps domain-specific event types for different modules.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Transcode job lifecycle events
    Transcode(TranscodeEvent),
    /// Cache ledger and sweep events
    Cache(CacheEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Transcode(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Transcode(TranscodeEvent::Error { .. }) => EventSeverity::Error,
            CoreEvent::Transcode(TranscodeEvent::Complete { .. }) => EventSeverity::Info,
            CoreEvent::Cache(CacheEvent::SweepCompleted { error_count, .. }) => {
                if *error_count > 0 {
                    EventSeverity::Warning
                } else {
                    EventSeverity::Info
                }
            }
            CoreEvent::Cache(CacheEvent::EntryInserted { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Transcode Events
// ============================================================================

/// Events describing the lifecycle of one transcode job.
///
/// The `kind` tag and payload shape are the push-progress wire contract:
/// `status`, `progress`, `complete`, and `error`. Observers subscribed to a
/// fingerprint receive exactly these, in production order, with a catch-up
/// replay of the current state on late subscription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscodeEvent {
    /// Job changed status without other payload (entering `starting`,
    /// `transcoding`, or reported as `pending` to a catch-up subscriber).
    Status {
        /// Unique identifier of the job.
        job_id: String,
        /// Fingerprint in canonical `media:resolution:format` form.
        fingerprint: String,
        /// Status name, e.g. `starting`.
        status: String,
    },
    /// Incremental progress update during production.
    Progress {
        /// The job ID.
        job_id: String,
        /// The fingerprint being produced.
        fingerprint: String,
        /// Progress percentage, `0..=99` while running.
        percent: u8,
        /// Advisory linear ETA in seconds; absent until percent is non-zero.
        eta_seconds: Option<u64>,
        /// Current phase note, e.g. `transcoding`.
        message: String,
    },
    /// Production finished and the artifact is available.
    Complete {
        /// The job ID.
        job_id: String,
        /// The fingerprint that finished.
        fingerprint: String,
        /// Artifact location.
        path: String,
        /// Artifact size in bytes.
        size_bytes: u64,
        /// Producer-reported duration in seconds.
        duration_seconds: f64,
    },
    /// Production failed; terminal for the job.
    Error {
        /// The job ID.
        job_id: String,
        /// The fingerprint that failed.
        fingerprint: String,
        /// Human-readable error message.
        message: String,
    },
}

impl TranscodeEvent {
    fn description(&self) -> &str {
        match self {
            TranscodeEvent::Status { .. } => "Transcode status changed",
            TranscodeEvent::Progress { .. } => "Transcode in progress",
            TranscodeEvent::Complete { .. } => "Transcode completed",
            TranscodeEvent::Error { .. } => "Transcode failed",
        }
    }

    /// The fingerprint this event belongs to.
    pub fn fingerprint(&self) -> &str {
        match self {
            TranscodeEvent::Status { fingerprint, .. }
            | TranscodeEvent::Progress { fingerprint, .. }
            | TranscodeEvent::Complete { fingerprint, .. }
            | TranscodeEvent::Error { fingerprint, .. } => fingerprint,
        }
    }

    /// Returns true for `complete` and `error` events.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TranscodeEvent::Complete { .. } | TranscodeEvent::Error { .. }
        )
    }
}

// ============================================================================
// Cache Events
// ============================================================================

/// Events describing cache ledger changes and sweep outcomes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheEvent {
    /// A new artifact was recorded in the ledger.
    EntryInserted {
        /// Media identifier.
        media_id: String,
        /// Resolution label, e.g. `720p`.
        resolution: String,
        /// Container label, e.g. `mp4`.
        format: String,
        /// Artifact location.
        path: String,
        /// Artifact size in bytes.
        size_bytes: u64,
    },
    /// A cleanup sweep finished.
    SweepCompleted {
        /// Files removed from disk.
        files_deleted: u64,
        /// Bytes reclaimed.
        bytes_freed: u64,
        /// Files removed because their entry TTL had lapsed.
        expired_count: u64,
        /// Files removed to satisfy the size budget.
        lru_count: u64,
        /// Per-file failures recorded during the sweep.
        error_count: u64,
    },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::EntryInserted { .. } => "Cache entry inserted",
            CacheEvent::SweepCompleted { .. } => "Cache sweep completed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally, which provides:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Non-blocking sends (events are cloned for each subscriber)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, CoreEvent, TranscodeEvent};
///
/// # #[tokio::main]
/// # async fn main() {
/// let event_bus = EventBus::new(100);
/// let mut subscriber = event_bus.subscribe();
///
/// let event = CoreEvent::Transcode(TranscodeEvent::Status {
///     job_id: "job-1".to_string(),
///     fingerprint: "m1:720p:mp4".to_string(),
///     status: "starting".to_string(),
/// });
/// event_bus.emit(event).ok();
/// # }
/// ```
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    ///   When a subscriber falls behind by more than this amount, it will
    ///   receive a `RecvError::Lagged` error.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new event bus with the default buffer size.
    ///
    /// # Example
    ///
    /// ```rust
    /// use core_runtime::events::EventBus;
    ///
    /// let event_bus = EventBus::default();
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event.
    /// Returns an error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber to receive events.
    ///
    /// Each call creates an independent receiver that will receive all
    /// future events. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with additional filtering
/// capabilities.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, CoreEvent};
///
/// let event_bus = EventBus::new(100);
/// let stream = EventStream::new(event_bus.subscribe());
///
/// // Filter for transcode events only
/// let mut transcode_stream = stream.filter(|event| {
///     matches!(event, CoreEvent::Transcode(_))
/// });
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Adds a filter function to this stream.
    ///
    /// Only events that match the filter will be returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// This will skip events that don't match the filter and return the next
    /// matching event.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n`
    /// events. Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;

            let Some(filter) = &self.filter else {
                return Ok(event);
            };

            if filter(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    let Some(filter) = &self.filter else {
                        return Some(Ok(event));
                    };

                    if filter(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_event(percent: u8) -> CoreEvent {
        CoreEvent::Transcode(TranscodeEvent::Progress {
            job_id: "job-1".to_string(),
            fingerprint: "m1:720p:mp4".to_string(),
            percent,
            eta_seconds: Some(30),
            message: "transcoding".to_string(),
        })
    }

    #[tokio::test]
    async fn test_event_bus_creation() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);

        // Should error when no subscribers
        assert!(bus.emit(progress_event(10)).is_err());
    }

    #[tokio::test]
    async fn test_event_emission_with_subscribers() {
        let bus = EventBus::new(10);
        let mut sub = bus.subscribe();

        let event = progress_event(42);
        let result = bus.emit(event.clone());
        assert!(result.is_ok());
        assert_eq!(result.unwrap(), 1);

        let received = sub.recv().await.unwrap();
        assert_eq!(received, event);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Cache(CacheEvent::EntryInserted {
            media_id: "m1".to_string(),
            resolution: "720p".to_string(),
            format: "mp4".to_string(),
            path: "/cache/m1.mp4".to_string(),
            size_bytes: 5_000_000,
        });

        bus.emit(event.clone()).ok();

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_filter() {
        let bus = EventBus::new(10);
        let mut stream =
            EventStream::new(bus.subscribe()).filter(|e| matches!(e, CoreEvent::Cache(_)));

        bus.emit(progress_event(10)).ok();
        let cache_event = CoreEvent::Cache(CacheEvent::SweepCompleted {
            files_deleted: 1,
            bytes_freed: 10,
            expired_count: 1,
            lru_count: 0,
            error_count: 0,
        });
        bus.emit(cache_event.clone()).ok();

        // The transcode event is skipped; the cache event comes through.
        let received = stream.recv().await.unwrap();
        assert_eq!(received, cache_event);
    }

    #[tokio::test]
    async fn test_event_stream_try_recv_empty() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber_recovers() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for percent in 0..10 {
            bus.emit(progress_event(percent)).ok();
        }

        // First recv reports the lag, subsequent recvs deliver the retained
        // tail of the buffer.
        match sub.recv().await {
            Err(RecvError::Lagged(missed)) => assert!(missed > 0),
            other => panic!("expected lag, got {:?}", other),
        }
        assert!(sub.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_emitters() {
        let bus = EventBus::new(100);
        let mut sub = bus.subscribe();

        let bus1 = bus.clone();
        let bus2 = bus.clone();
        let t1 = tokio::spawn(async move {
            for p in 0..10 {
                bus1.emit(progress_event(p)).ok();
            }
        });
        let t2 = tokio::spawn(async move {
            for p in 50..60 {
                bus2.emit(progress_event(p)).ok();
            }
        });
        t1.await.unwrap();
        t2.await.unwrap();

        let mut count = 0;
        while let Ok(Some(_)) =
            tokio::time::timeout(std::time::Duration::from_millis(50), async {
                match sub.recv().await {
                    Ok(e) => Some(e),
                    Err(_) => None,
                }
            })
            .await
        {
            count += 1;
        }
        assert_eq!(count, 20);
    }

    #[test]
    fn test_transcode_event_wire_shape() {
        let event = TranscodeEvent::Progress {
            job_id: "job-1".to_string(),
            fingerprint: "m1:720p:mp4".to_string(),
            percent: 25,
            eta_seconds: None,
            message: "transcoding".to_string(),
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "progress");
        assert_eq!(json["percent"], 25);

        let complete = TranscodeEvent::Complete {
            job_id: "job-1".to_string(),
            fingerprint: "m1:720p:mp4".to_string(),
            path: "/cache/m1.mp4".to_string(),
            size_bytes: 5_000_000,
            duration_seconds: 120.0,
        };
        let json = serde_json::to_value(&complete).unwrap();
        assert_eq!(json["kind"], "complete");
        assert_eq!(json["size_bytes"], 5_000_000);
    }

    #[test]
    fn test_core_event_serialization_round_trip() {
        let event = CoreEvent::Transcode(TranscodeEvent::Error {
            job_id: "job-9".to_string(),
            fingerprint: "m2:1080p:webm".to_string(),
            message: "encoder crashed".to_string(),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Transcode\""));
        assert!(json.contains("\"kind\":\"error\""));

        let parsed: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn test_event_severity() {
        let error = CoreEvent::Transcode(TranscodeEvent::Error {
            job_id: "j".to_string(),
            fingerprint: "f".to_string(),
            message: "m".to_string(),
        });
        assert_eq!(error.severity(), EventSeverity::Error);

        let sweep_with_errors = CoreEvent::Cache(CacheEvent::SweepCompleted {
            files_deleted: 2,
            bytes_freed: 100,
            expired_count: 1,
            lru_count: 1,
            error_count: 3,
        });
        assert_eq!(sweep_with_errors.severity(), EventSeverity::Warning);

        assert!(EventSeverity::Error > EventSeverity::Debug);
    }

    #[test]
    fn test_terminal_event_helpers() {
        let status = TranscodeEvent::Status {
            job_id: "j".to_string(),
            fingerprint: "m1:720p:mp4".to_string(),
            status: "pending".to_string(),
        };
        assert!(!status.is_terminal());
        assert_eq!(status.fingerprint(), "m1:720p:mp4");

        let complete = TranscodeEvent::Complete {
            job_id: "j".to_string(),
            fingerprint: "m1:720p:mp4".to_string(),
            path: "/cache/a.mp4".to_string(),
            size_bytes: 1,
            duration_seconds: 1.0,
        };
        assert!(complete.is_terminal());
    }
}
