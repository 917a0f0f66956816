//! Cache statistics reporting.
//!
//! Combines what the ledger records with what the filesystem actually holds.
//! The two can disagree after a crash; the sweeper reconciles them, and this
//! report is how hosts see both sides.

use bridge_traits::storage::DirectoryStats;
use serde::Serialize;

/// Aggregate counters computed from the ledger in SQL.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerStats {
    pub entry_count: u64,
    pub live_count: u64,
    pub expired_count: u64,
    pub total_bytes: u64,
}

/// Combined ledger and filesystem view of the cache, measured against the
/// configured budget.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStatsReport {
    pub ledger: LedgerStats,
    pub disk: DirectoryStats,
    pub max_size_bytes: u64,
    pub ttl_ms: i64,
    pub calculated_at_ms: i64,
}

impl CacheStatsReport {
    /// Disk usage as a percentage of the configured budget.
    pub fn usage_percentage(&self) -> f64 {
        if self.max_size_bytes == 0 {
            return 0.0;
        }
        (self.disk.total_bytes as f64 / self.max_size_bytes as f64) * 100.0
    }

    /// True once usage passes 90% of the budget.
    pub fn is_near_capacity(&self) -> bool {
        self.usage_percentage() > 90.0
    }

    pub fn is_full(&self) -> bool {
        self.disk.total_bytes >= self.max_size_bytes
    }

    /// Bytes that must be evicted to get back under the budget.
    pub fn space_needed(&self) -> u64 {
        self.disk.total_bytes.saturating_sub(self.max_size_bytes)
    }

    /// Average recorded size of a ledger entry.
    pub fn average_entry_size(&self) -> u64 {
        if self.ledger.entry_count == 0 {
            return 0;
        }
        self.ledger.total_bytes / self.ledger.entry_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(disk_bytes: u64, max_size_bytes: u64) -> CacheStatsReport {
        CacheStatsReport {
            disk: DirectoryStats {
                file_count: 3,
                total_bytes: disk_bytes,
                oldest_file_age_ms: None,
            },
            max_size_bytes,
            ..Default::default()
        }
    }

    #[test]
    fn test_usage_percentage() {
        assert_eq!(report(500, 1_000).usage_percentage(), 50.0);
        assert_eq!(report(1_000, 1_000).usage_percentage(), 100.0);
        assert_eq!(report(500, 0).usage_percentage(), 0.0);
    }

    #[test]
    fn test_near_capacity_threshold() {
        assert!(!report(900, 1_000).is_near_capacity());
        assert!(report(901, 1_000).is_near_capacity());
    }

    #[test]
    fn test_is_full_and_space_needed() {
        let under = report(800, 1_000);
        assert!(!under.is_full());
        assert_eq!(under.space_needed(), 0);

        let over = report(1_200, 1_000);
        assert!(over.is_full());
        assert_eq!(over.space_needed(), 200);
    }

    #[test]
    fn test_average_entry_size() {
        let mut r = report(0, 1_000);
        assert_eq!(r.average_entry_size(), 0);

        r.ledger = LedgerStats {
            entry_count: 4,
            live_count: 4,
            expired_count: 0,
            total_bytes: 100,
        };
        assert_eq!(r.average_entry_size(), 25);
    }
}
