//! # Transcode Coordination Module
//!
//! Deduplicates transcode production and streams progress to observers.
//!
//! ## Overview
//!
//! This module owns everything that happens between "a caller wants an
//! artifact" and "the artifact exists", including:
//! - Identifying artifacts by fingerprint (media, resolution, container)
//! - Claiming production so each fingerprint runs at most once
//! - Throttling concurrent producers through a worker pool
//! - Broadcasting status, progress, and terminal events to subscribers
//! - Retaining finished jobs so late callers reuse the stored outcome
//!
//! ## Components
//!
//! - **Fingerprints** (`fingerprint`): Identity of a producible artifact and its cache key
//! - **Job State Machine** (`job`): Transcode job lifecycle with validated state transitions
//! - **Coordinator** (`coordinator`): Dedup, progress fan-out, and idle-job sweeping

pub mod coordinator;
pub mod error;
pub mod fingerprint;
pub mod job;

pub use coordinator::{
    CoordinatorConfig, ProgressHandle, ProgressSubscription, TranscodeCoordinator,
};
pub use error::{Result, TranscodeError};
pub use fingerprint::{ContainerFormat, MediaId, Resolution, TranscodeFingerprint};
pub use job::{
    ArtifactResult, TranscodeJob, TranscodeJobId, TranscodeProgress, TranscodeStatus,
    RUNNING_PERCENT_CAP,
};
