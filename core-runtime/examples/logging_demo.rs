//! Logging system demonstration
//!
//! This example shows how to use the logging infrastructure in different modes.
//!
//! Run with:
//! ```bash
//! # Pretty format (default in debug)
//! cargo run --example logging_demo
//!
//! # JSON format
//! cargo run --example logging_demo -- json
//!
//! # Compact format
//! cargo run --example logging_demo -- compact
//!
//! # With custom filter
//! cargo run --example logging_demo -- pretty "core_runtime=trace"
//! ```

use core_runtime::logging::{init_logging, strip_path, LogFormat, LogLevel, LoggingConfig};
use std::env;
use tracing::{debug, error, info, instrument, span, trace, warn, Level};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    let format = if args.len() > 1 {
        match args[1].as_str() {
            "json" => LogFormat::Json,
            "compact" => LogFormat::Compact,
            _ => LogFormat::Pretty,
        }
    } else {
        LogFormat::default()
    };

    let filter = args.get(2).cloned();

    // Initialize logging
    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Trace)
        .with_spans(true)
        .with_target(true);

    if let Some(f) = filter {
        config = config.with_filter(f);
    }

    init_logging(config).expect("Failed to initialize logging");

    info!("=== Logging System Demo ===");
    info!(format = ?format, "Logging initialized");

    // Demonstrate different log levels
    demo_log_levels();

    // Demonstrate structured logging
    demo_structured_logging();

    // Demonstrate spans for tracing
    demo_spans().await;

    // Demonstrate path stripping
    demo_path_stripping();

    // Demonstrate instrumentation
    demo_instrumentation().await;

    info!("=== Demo Complete ===");
}

fn demo_log_levels() {
    let span = span!(Level::INFO, "log_levels");
    let _enter = span.enter();

    trace!("This is a TRACE level log");
    debug!("This is a DEBUG level log");
    info!("This is an INFO level log");
    warn!("This is a WARN level log");
    error!("This is an ERROR level log");
}

fn demo_structured_logging() {
    let span = span!(Level::INFO, "structured_logging");
    let _enter = span.enter();

    info!("Simple message without fields");

    info!(
        media_id = "movie-4821",
        resolution = "720p",
        container = "mp4",
        "Transcode request"
    );

    info!(
        entry_count = 42,
        total_size_bytes = 1_073_741_824u64,
        hit_rate = 0.95,
        "Cache metrics"
    );
}

async fn demo_spans() {
    let span = span!(Level::INFO, "cleanup_sweep", trigger = "interval");
    let _enter = span.enter();

    info!("Starting cleanup sweep");

    {
        let inner_span = span!(Level::DEBUG, "expired_pass");
        let _inner = inner_span.enter();

        debug!(count = 3, "Found expired entries");
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }

    {
        let inner_span = span!(Level::DEBUG, "size_pass");
        let _inner = inner_span.enter();

        debug!(excess_bytes = 52_428_800u64, "Cache over size budget");
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }

    info!(files_deleted = 5, bytes_freed = 104_857_600u64, "Cleanup sweep completed");
}

fn demo_path_stripping() {
    let span = span!(Level::INFO, "path_stripping");
    let _enter = span.enter();

    // Log basenames rather than full filesystem paths
    let path = "/home/user/.cache/media-streaming-core/ab12cd34ef.mp4";
    info!(file = %strip_path(path), "Deleting artifact");
}

#[instrument]
async fn demo_instrumentation() {
    info!("Instrumented function automatically creates spans");

    let resolutions = vec!["480p", "720p", "1080p"];
    produce_ladder(&resolutions).await;
}

#[instrument(fields(count = resolutions.len()))]
async fn produce_ladder(resolutions: &[&str]) {
    debug!("Producing renditions");

    for (idx, resolution) in resolutions.iter().enumerate() {
        produce_rendition(idx, resolution).await;
    }

    info!("All renditions produced");
}

#[instrument(fields(rendition = idx))]
async fn produce_rendition(idx: usize, resolution: &str) {
    trace!(resolution = %resolution, "Producing rendition");
    tokio::time::sleep(tokio::time::Duration::from_millis(5)).await;
}
