//! # Transcode Job State Machine
//!
//! Manages the lifecycle of transcode jobs with validated state transitions.
//!
//! ## Overview
//!
//! This module provides a state machine for transcode job lifecycle management,
//! ensuring that state transitions are valid and that progress only moves
//! forward while a job runs. Jobs live in the coordinator's in-memory table and
//! never persist across restarts; the cache ledger records finished artifacts.
//!
//! ## State Machine
//!
//! ```text
//! Pending → Starting → Transcoding → Complete
//!               ↓           ↓
//!               └──→ Error ←┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_transcode::{ArtifactResult, TranscodeFingerprint, TranscodeJob};
//!
//! let fingerprint: TranscodeFingerprint = "M1:720p:mp4".parse()?;
//!
//! // Create a new job and walk it through production
//! let job = TranscodeJob::new(fingerprint, now_ms);
//! let job = job.start(now_ms)?;
//! let mut job = job.begin_transcoding(now_ms)?;
//!
//! // Report progress while the encoder runs
//! job.update_progress(50, "transcoding", now_ms);
//!
//! // Finish with the produced artifact
//! let job = job.complete(result, now_ms)?;
//! ```

use crate::fingerprint::TranscodeFingerprint;
use crate::{Result, TranscodeError};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for a transcode job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TranscodeJobId(Uuid);

impl TranscodeJobId {
    /// Create a new random transcode job ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a transcode job ID from a string
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid UUID
    pub fn from_string(s: &str) -> Result<Self> {
        Ok(Self(
            Uuid::parse_str(s).map_err(|e| TranscodeError::InvalidJobId(e.to_string()))?,
        ))
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for TranscodeJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TranscodeJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TranscodeJobId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<TranscodeJobId> for Uuid {
    fn from(id: TranscodeJobId) -> Self {
        id.0
    }
}

// ============================================================================
// Status Types
// ============================================================================

/// The current status of a transcode job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscodeStatus {
    /// Job exists only because subscribers are waiting; no producer claimed it
    Pending,
    /// A producer has claimed the job and is preparing to run
    Starting,
    /// The producer is running and reporting progress
    Transcoding,
    /// Production finished and the artifact result is available
    Complete,
    /// Production failed with an error message
    Error,
}

impl TranscodeStatus {
    /// Check if this status represents a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TranscodeStatus::Complete | TranscodeStatus::Error)
    }

    /// Check if this status represents ongoing production
    ///
    /// `Pending` is not active: a pending job only marks subscriber interest,
    /// no producer is working on it.
    pub fn is_active(&self) -> bool {
        matches!(self, TranscodeStatus::Starting | TranscodeStatus::Transcoding)
    }

    /// Get the string representation used in events and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscodeStatus::Pending => "pending",
            TranscodeStatus::Starting => "starting",
            TranscodeStatus::Transcoding => "transcoding",
            TranscodeStatus::Complete => "complete",
            TranscodeStatus::Error => "error",
        }
    }
}

impl FromStr for TranscodeStatus {
    type Err = TranscodeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(TranscodeStatus::Pending),
            "starting" => Ok(TranscodeStatus::Starting),
            "transcoding" => Ok(TranscodeStatus::Transcoding),
            "complete" => Ok(TranscodeStatus::Complete),
            "error" => Ok(TranscodeStatus::Error),
            _ => Err(TranscodeError::InvalidStatus(s.to_string())),
        }
    }
}

impl std::fmt::Display for TranscodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Progress Types
// ============================================================================

/// Highest percent a running job may report. 100 is reserved for `Complete`.
pub const RUNNING_PERCENT_CAP: u8 = 99;

/// Progress information for a running transcode job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeProgress {
    /// Progress percentage (0-99 while running, 100 once complete)
    pub percent: u8,
    /// Advisory estimate of remaining seconds, when one can be computed
    pub eta_seconds: Option<u64>,
    /// Current processing phase
    pub message: String,
}

/// Description of a finished artifact, returned to every caller of the job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactResult {
    /// Absolute path of the produced file in the cache directory
    pub path: String,
    /// Size of the produced file in bytes
    pub size_bytes: u64,
    /// Playable duration of the media in seconds
    pub duration_seconds: f64,
}

// ============================================================================
// Transcode Job Entity
// ============================================================================

/// A transcode job with state machine semantics
///
/// Jobs are created in `Pending` state and must move through valid states.
/// All timestamps are Unix epoch milliseconds supplied by the coordinator's
/// clock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeJob {
    /// Unique identifier for this job
    pub id: TranscodeJobId,
    /// Which artifact this job produces
    pub fingerprint: TranscodeFingerprint,
    /// Current status
    pub status: TranscodeStatus,
    /// Latest progress report, if any has been made
    pub progress: Option<TranscodeProgress>,
    /// Produced artifact (only available when complete)
    pub result: Option<ArtifactResult>,
    /// Error message if production failed
    pub error_message: Option<String>,
    /// When the job was created
    pub created_at: i64,
    /// When production started
    pub started_at: Option<i64>,
    /// When the job reached a terminal state
    pub completed_at: Option<i64>,
}

impl TranscodeJob {
    /// Create a new transcode job in pending state
    pub fn new(fingerprint: TranscodeFingerprint, now_ms: i64) -> Self {
        Self {
            id: TranscodeJobId::new(),
            fingerprint,
            status: TranscodeStatus::Pending,
            progress: None,
            result: None,
            error_message: None,
            created_at: now_ms,
            started_at: None,
            completed_at: None,
        }
    }

    /// Claim the job for production
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Pending` state
    pub fn start(mut self, now_ms: i64) -> Result<Self> {
        self.validate_transition(TranscodeStatus::Starting)?;
        self.status = TranscodeStatus::Starting;
        self.started_at = Some(now_ms);
        Ok(self)
    }

    /// Mark the producer as running
    ///
    /// Refreshes `started_at` so remaining-time estimates measure production
    /// time rather than queue time.
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Starting` state
    pub fn begin_transcoding(mut self, now_ms: i64) -> Result<Self> {
        self.validate_transition(TranscodeStatus::Transcoding)?;
        self.status = TranscodeStatus::Transcoding;
        self.started_at = Some(now_ms);
        Ok(self)
    }

    /// Record a progress report from the producer
    ///
    /// Returns `true` if the report was accepted. Reports are dropped when the
    /// job is not transcoding or when the (capped) percent would move
    /// backwards; a report equal to the current percent refreshes the message
    /// and estimate. Percent is capped at [`RUNNING_PERCENT_CAP`].
    pub fn update_progress(&mut self, reported: u8, message: &str, now_ms: i64) -> bool {
        if self.status != TranscodeStatus::Transcoding {
            return false;
        }

        let clamped = reported.min(RUNNING_PERCENT_CAP);
        let current = self.progress.as_ref().map(|p| p.percent).unwrap_or(0);
        if clamped < current {
            return false;
        }

        let eta_seconds = self.estimate_eta(clamped, now_ms);
        self.progress = Some(TranscodeProgress {
            percent: clamped,
            eta_seconds,
            message: message.to_string(),
        });
        true
    }

    /// Mark the job as complete with its produced artifact
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Transcoding` state
    pub fn complete(mut self, result: ArtifactResult, now_ms: i64) -> Result<Self> {
        self.validate_transition(TranscodeStatus::Complete)?;
        self.status = TranscodeStatus::Complete;
        self.completed_at = Some(now_ms);
        self.result = Some(result);
        self.progress = Some(TranscodeProgress {
            percent: 100,
            eta_seconds: None,
            message: "complete".to_string(),
        });
        Ok(self)
    }

    /// Mark the job as failed with an error message
    ///
    /// # Errors
    ///
    /// Returns an error if the job is not in `Starting` or `Transcoding` state
    pub fn fail(mut self, error_message: String, now_ms: i64) -> Result<Self> {
        self.validate_transition(TranscodeStatus::Error)?;
        self.status = TranscodeStatus::Error;
        self.completed_at = Some(now_ms);
        self.error_message = Some(error_message);
        Ok(self)
    }

    /// Get the wall-clock duration of production in seconds
    ///
    /// Returns None if the job hasn't started or finished yet
    pub fn duration_secs(&self) -> Option<u64> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => Some((end - start).max(0) as u64 / 1000),
            _ => None,
        }
    }

    /// Estimate remaining seconds by extrapolating the elapsed time linearly.
    ///
    /// Encoders rarely run at a constant rate, so treat this as advisory.
    fn estimate_eta(&self, percent: u8, now_ms: i64) -> Option<u64> {
        if percent == 0 {
            return None;
        }
        let started = self.started_at?;
        let elapsed_ms = (now_ms - started).max(0) as u64;
        let remaining_ms = elapsed_ms * (100 - percent as u64) / percent as u64;
        Some(remaining_ms / 1000)
    }

    /// Validate a state transition
    fn validate_transition(&self, to: TranscodeStatus) -> Result<()> {
        let valid = match (self.status, to) {
            // From Pending
            (TranscodeStatus::Pending, TranscodeStatus::Starting) => true,

            // From Starting
            (TranscodeStatus::Starting, TranscodeStatus::Transcoding) => true,
            (TranscodeStatus::Starting, TranscodeStatus::Error) => true,

            // From Transcoding
            (TranscodeStatus::Transcoding, TranscodeStatus::Complete) => true,
            (TranscodeStatus::Transcoding, TranscodeStatus::Error) => true,

            // Terminal states cannot transition
            (TranscodeStatus::Complete, _) => false,
            (TranscodeStatus::Error, _) => false,

            // All other transitions are invalid
            _ => false,
        };

        if !valid {
            return Err(TranscodeError::InvalidStateTransition {
                from: self.status.as_str().to_string(),
                to: to.as_str().to_string(),
                reason: format!(
                    "Cannot transition from {} to {}",
                    self.status.as_str(),
                    to.as_str()
                ),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
