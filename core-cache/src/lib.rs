//! # Transcode Cache Module
//!
//! Durable record of produced transcode artifacts plus the cleanup sweeper
//! that enforces expiry and the cache size budget.
//!
//! ## Overview
//!
//! - SQLite-backed ledger of artifacts: location, size, timestamps, expiry
//! - Lazy expiry: readers treat stale rows as absent, only sweeps delete them
//! - LRU eviction selection ordered by `last_accessed_at`
//! - Orphan reclamation for files left behind by interrupted productions
//! - Per-file sweep errors are collected and reported, never fatal
//!
//! ## Components
//!
//! - [`CacheLedger`] / [`SqliteCacheLedger`]: entry persistence and eviction
//!   queries
//! - [`CleanupSweeper`]: scheduled reconciliation of ledger and filesystem
//! - [`CacheStatsReport`]: combined ledger and directory statistics

pub mod entry;
pub mod error;
pub mod ledger;
pub mod stats;
pub mod sweeper;

pub use entry::{CacheEntry, NewCacheEntry};
pub use error::{CacheError, Result};
pub use ledger::{CacheLedger, SqliteCacheLedger};
pub use stats::{CacheStatsReport, LedgerStats};
pub use sweeper::{
    CleanupFailure, CleanupReport, CleanupSweeper, DEFAULT_SWEEP_INTERVAL,
};
