//! Transcoder Abstraction
//!
//! The codec pipeline itself (command construction, hardware encoder
//! selection, container muxing) lives behind this trait. The engine treats a
//! transcode as an opaque long-running operation that reports percent
//! progress and resolves to an output description.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;

/// Progress callback handed to a transcoder run.
///
/// Invoked with a percent value in `0..=100`. Implementations may call it
/// from any thread; it must stay cheap and non-blocking.
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// One transcode invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeRequest {
    /// Source file to read from.
    pub source_path: PathBuf,

    /// Target resolution label, e.g. `720p`.
    pub resolution: String,

    /// Target container label, e.g. `mp4`.
    pub format: String,

    /// Where the finished artifact must land.
    pub output_path: PathBuf,
}

/// Result of a finished transcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeOutput {
    pub output_path: String,
    pub size_bytes: u64,
    pub duration_seconds: f64,
}

/// Media transcoder trait
///
/// A single call produces a single artifact. Failures are terminal for the
/// call; retry policy belongs to the caller.
#[async_trait]
pub trait MediaTranscoder: Send + Sync {
    /// Run one transcode to completion, reporting progress along the way.
    async fn transcode(
        &self,
        request: TranscodeRequest,
        on_progress: ProgressCallback,
    ) -> Result<TranscodeOutput>;
}
