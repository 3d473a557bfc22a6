//! Cache statistics and monitoring

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of orchestrator activity since startup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Parent requests delivered successfully
    pub requests_completed: u64,

    /// Parent requests that ended with an error
    pub requests_failed: u64,

    /// Parent requests cancelled before delivery
    pub requests_cancelled: u64,

    /// Bytes served from scratch stores
    pub bytes_from_cache: u64,

    /// Bytes fetched from the network (committed even if not delivered)
    pub bytes_from_network: u64,

    /// Cache reads that failed and were refetched
    pub cache_read_recoveries: u64,

    /// Timestamp when the snapshot was taken
    pub calculated_at: i64,
}

impl CacheStats {
    /// Fraction of served bytes that came from the cache (0.0 - 1.0).
    pub fn hit_ratio(&self) -> f64 {
        let total = self.bytes_from_cache + self.bytes_from_network;
        if total == 0 {
            return 0.0;
        }

        self.bytes_from_cache as f64 / total as f64
    }

    /// Total parent requests that reached a terminal state.
    pub fn requests_finished(&self) -> u64 {
        self.requests_completed + self.requests_failed + self.requests_cancelled
    }

    /// Returns success rate percentage (completed / finished).
    pub fn success_rate(&self) -> f64 {
        let finished = self.requests_finished();
        if finished == 0 {
            return 100.0;
        }

        (self.requests_completed as f64 / finished as f64) * 100.0
    }
}

/// Lock-free counters behind [`CacheStats`].
#[derive(Debug, Default)]
pub(crate) struct StatsRecorder {
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    from_cache: AtomicU64,
    from_network: AtomicU64,
    recoveries: AtomicU64,
}

impl StatsRecorder {
    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancelled(&self) {
        self.cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_bytes(&self, bytes: u64) {
        self.from_cache.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_network_bytes(&self, bytes: u64) {
        self.from_network.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_recovery(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            requests_completed: self.completed.load(Ordering::Relaxed),
            requests_failed: self.failed.load(Ordering::Relaxed),
            requests_cancelled: self.cancelled.load(Ordering::Relaxed),
            bytes_from_cache: self.from_cache.load(Ordering::Relaxed),
            bytes_from_network: self.from_network.load(Ordering::Relaxed),
            cache_read_recoveries: self.recoveries.load(Ordering::Relaxed),
            calculated_at: chrono::Utc::now().timestamp(),
        }
    }
}
