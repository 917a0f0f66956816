//! Persisted cache entry model.

use serde::{Deserialize, Serialize};

/// One produced artifact recorded in the cache ledger.
///
/// The `(media_id, resolution, format)` triple is the persisted form of the
/// transcode fingerprint. At most one live entry exists per triple; an
/// expired row may linger until a sweep removes it, but readers treat it as
/// absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Row id. Monotonically increasing, so it doubles as insertion order.
    pub id: i64,
    pub media_id: String,
    pub resolution: String,
    pub format: String,
    /// Artifact location inside the cache directory.
    pub path: String,
    pub size_bytes: u64,
    /// Producer-reported media duration, persisted so a cache hit can
    /// answer without re-probing the file.
    pub duration_seconds: f64,
    pub created_at: i64,
    pub last_accessed_at: i64,
    pub expires_at: i64,
}

impl CacheEntry {
    /// An entry whose expiry is not in the future counts as expired.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at <= now_ms
    }
}

/// Fields supplied when recording a newly produced artifact.
///
/// Timestamps and expiry are filled in by the ledger at insert time.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCacheEntry {
    pub media_id: String,
    pub resolution: String,
    pub format: String,
    pub path: String,
    pub size_bytes: u64,
    pub duration_seconds: f64,
}
