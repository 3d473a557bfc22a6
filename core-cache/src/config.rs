//! Cache configuration

use std::time::Duration;

/// Default cap on a single network fetch (4 MiB).
pub const DEFAULT_MAX_FETCH_BYTES: u64 = 4 * 1024 * 1024;

/// Default cap on a single parent request (256 MiB).
pub const DEFAULT_MAX_REQUEST_BYTES: u64 = 256 * 1024 * 1024;

/// Configuration for the progressive range cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Directory name for scratch files (relative to the host cache dir)
    pub cache_directory: String,

    /// Network fetches allowed in flight across all requests (default: 4)
    pub max_concurrent_fetches: usize,

    /// Gaps longer than this are fetched as several consecutive subrequests
    pub max_fetch_bytes: Option<u64>,

    /// Longest range a single request may ask for; longer ones are rejected
    /// before planning because the result is assembled in memory
    pub max_request_bytes: u64,

    /// Quiet period before a changed range index is written (default: 250ms)
    pub index_flush_debounce: Duration,

    /// Per-fetch timeout applied by the HTTP range fetcher (default: 30s)
    pub fetch_timeout: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_directory: "range_cache".to_string(),
            max_concurrent_fetches: 4,
            max_fetch_bytes: Some(DEFAULT_MAX_FETCH_BYTES),
            max_request_bytes: DEFAULT_MAX_REQUEST_BYTES,
            index_flush_debounce: Duration::from_millis(250),
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

impl CacheConfig {
    /// Create a new cache configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set cache directory name.
    pub fn with_cache_directory(mut self, dir: impl Into<String>) -> Self {
        self.cache_directory = dir.into();
        self
    }

    /// Set maximum concurrent network fetches.
    pub fn with_max_concurrent_fetches(mut self, count: usize) -> Self {
        self.max_concurrent_fetches = count;
        self
    }

    /// Set (or clear) the per-fetch size cap.
    pub fn with_max_fetch_bytes(mut self, bytes: Option<u64>) -> Self {
        self.max_fetch_bytes = bytes;
        self
    }

    /// Set the longest range a single request may ask for.
    pub fn with_max_request_bytes(mut self, bytes: u64) -> Self {
        self.max_request_bytes = bytes;
        self
    }

    /// Set the index flush debounce interval.
    pub fn with_index_flush_debounce(mut self, debounce: Duration) -> Self {
        self.index_flush_debounce = debounce;
        self
    }

    /// Set the per-fetch timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.cache_directory.is_empty() {
            return Err("cache_directory cannot be empty".to_string());
        }

        if self.max_concurrent_fetches == 0 {
            return Err("max_concurrent_fetches must be at least 1".to_string());
        }

        if self.max_fetch_bytes == Some(0) {
            return Err("max_fetch_bytes must be greater than 0".to_string());
        }

        if self.max_request_bytes == 0 {
            return Err("max_request_bytes must be greater than 0".to_string());
        }

        if self.fetch_timeout.is_zero() {
            return Err("fetch_timeout must be greater than 0".to_string());
        }

        Ok(())
    }
}
