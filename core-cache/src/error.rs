use bridge_traits::BridgeError;
use thiserror::Error;

/// Errors from the cache ledger and cleanup sweeper.
#[derive(Error, Debug)]
pub enum CacheError {
    /// A ledger row references an artifact the store no longer has.
    ///
    /// Treated as a cache miss by readers; the stale row is pruned and the
    /// artifact reproduced on the next request.
    #[error("Cache entry references missing artifact: {path}")]
    Consistency { path: String },

    /// Cache configuration failed validation (zero budget, non-positive
    /// TTL, empty directory).
    #[error("Invalid cache configuration: {0}")]
    Configuration(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cache entry {id} not found")]
    EntryNotFound { id: i64 },

    /// Failure from the artifact store while statting or listing the cache
    /// directory. Individual file deletions do not surface here; the
    /// sweeper collects those per file.
    #[error("Artifact store error: {0}")]
    Store(#[from] BridgeError),
}

pub type Result<T> = std::result::Result<T, CacheError>;
