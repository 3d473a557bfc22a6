//! # Core Configuration Module
//!
//! Provides configuration management for the range cache core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds all dependencies and settings the core needs. It
//! enforces fail-fast validation so that a missing bridge or a nonsensical
//! limit is reported at startup rather than on the first byte-range request.
//!
//! ## Required Dependencies
//!
//! - `cache_dir` - Root directory for scratch data files and range indexes
//! - `HttpClient` - Transport for ranged GETs (desktop default: reqwest)
//!
//! When the `desktop-shims` feature is enabled, `ReqwestHttpClient` is
//! injected automatically if no client was provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//! use std::sync::Arc;
//!
//! let config = CoreConfig::builder()
//!     .cache_dir("/path/to/cache")
//!     .http_client(Arc::new(MyHttpClient))
//!     .max_concurrent_fetches(8)
//!     .build()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::CoreConfig;
//!
//! // Panics with an actionable error message
//! let config = CoreConfig::builder()
//!     .build()
//!     .expect("Should fail - missing cache directory");
//! ```

use crate::error::{Error, Result};
use crate::events::DEFAULT_EVENT_BUFFER_SIZE;
use bridge_traits::HttpClient;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Default number of network fetches in flight across all requests.
pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

/// Default cap on a single network fetch (4 MiB).
pub const DEFAULT_MAX_FETCH_BYTES: u64 = 4 * 1024 * 1024;

/// Default cap on a single request (256 MiB).
pub const DEFAULT_MAX_REQUEST_BYTES: u64 = 256 * 1024 * 1024;

/// Core configuration for the range cache.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Root directory for scratch files and sidecar indexes
    pub cache_dir: PathBuf,

    /// Transport used for ranged network fetches
    pub http_client: Arc<dyn HttpClient>,

    /// Network fetches allowed in flight across all requests
    pub max_concurrent_fetches: usize,

    /// Gaps longer than this are fetched as several subrequests
    pub max_fetch_bytes: Option<u64>,

    /// Requests longer than this are rejected
    pub max_request_bytes: u64,

    /// Per-fetch timeout handed to the HTTP client
    pub fetch_timeout: Duration,

    /// Quiet period before a changed range index is persisted
    pub index_flush_debounce: Duration,

    /// Capacity of the event bus broadcast channel
    pub event_buffer_size: usize,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("cache_dir", &self.cache_dir)
            .field("http_client", &"HttpClient { ... }")
            .field("max_concurrent_fetches", &self.max_concurrent_fetches)
            .field("max_fetch_bytes", &self.max_fetch_bytes)
            .field("max_request_bytes", &self.max_request_bytes)
            .field("fetch_timeout", &self.fetch_timeout)
            .field("index_flush_debounce", &self.index_flush_debounce)
            .field("event_buffer_size", &self.event_buffer_size)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Cache directory is not empty
    /// - Concurrency, fetch size and timeout limits are non-zero
    /// - Event buffer can hold at least one event
    pub fn validate(&self) -> Result<()> {
        if self.cache_dir.as_os_str().is_empty() {
            return Err(Error::Config("Cache directory cannot be empty".to_string()));
        }

        if self.max_concurrent_fetches == 0 {
            return Err(Error::Config(
                "max_concurrent_fetches must be at least 1".to_string(),
            ));
        }

        if self.max_fetch_bytes == Some(0) {
            return Err(Error::Config(
                "max_fetch_bytes must be greater than 0. Use None to disable chunking."
                    .to_string(),
            ));
        }

        if self.max_request_bytes == 0 {
            return Err(Error::Config(
                "max_request_bytes must be greater than 0".to_string(),
            ));
        }

        if self.fetch_timeout.is_zero() {
            return Err(Error::Config(
                "fetch_timeout must be greater than 0".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "event_buffer_size must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required for ranged network fetches. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Mobile: inject the platform-native HTTP adapter."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    let client = ReqwestHttpClient::with_timeout(timeout).map_err(|e| Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: format!("Failed to build default ReqwestHttpClient: {}", e),
    })?;
    let client: Arc<dyn HttpClient> = Arc::new(client);
    Ok(client)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

/// Builder for constructing [`CoreConfig`] instances.
///
/// Call [`build()`](CoreConfigBuilder::build) to validate and create the
/// final config.
#[derive(Default)]
pub struct CoreConfigBuilder {
    cache_dir: Option<PathBuf>,
    http_client: Option<Arc<dyn HttpClient>>,
    max_concurrent_fetches: Option<usize>,
    max_fetch_bytes: Option<Option<u64>>,
    max_request_bytes: Option<u64>,
    fetch_timeout: Option<Duration>,
    index_flush_debounce: Option<Duration>,
    event_buffer_size: Option<usize>,
}

impl CoreConfigBuilder {
    /// Sets the cache directory (required).
    ///
    /// Scratch files live in a subdirectory of this path.
    pub fn cache_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.cache_dir = Some(path.into());
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// Required unless the `desktop-shims` feature provides a default.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets how many network fetches may run at once (default: 4).
    pub fn max_concurrent_fetches(mut self, count: usize) -> Self {
        self.max_concurrent_fetches = Some(count);
        self
    }

    /// Sets the per-fetch size cap; `None` fetches each gap in one request.
    pub fn max_fetch_bytes(mut self, bytes: Option<u64>) -> Self {
        self.max_fetch_bytes = Some(bytes);
        self
    }

    /// Sets the longest range a single request may ask for (default: 256 MiB).
    pub fn max_request_bytes(mut self, bytes: u64) -> Self {
        self.max_request_bytes = Some(bytes);
        self
    }

    /// Sets the per-fetch timeout (default: 30s).
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Sets the index persistence debounce (default: 250ms).
    pub fn index_flush_debounce(mut self, debounce: Duration) -> Self {
        self.index_flush_debounce = Some(debounce);
        self
    }

    /// Sets the event bus capacity.
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when `cache_dir` is missing or a limit is invalid
    /// - [`Error::CapabilityMissing`] when no `HttpClient` is available
    pub fn build(self) -> Result<CoreConfig> {
        let cache_dir = self.cache_dir.ok_or_else(|| {
            Error::Config("Cache directory is required. Use .cache_dir() to set it.".to_string())
        })?;

        let fetch_timeout = self.fetch_timeout.unwrap_or(Duration::from_secs(30));

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client(fetch_timeout)?,
        };

        let config = CoreConfig {
            cache_dir,
            http_client,
            max_concurrent_fetches: self
                .max_concurrent_fetches
                .unwrap_or(DEFAULT_MAX_CONCURRENT_FETCHES),
            max_fetch_bytes: self
                .max_fetch_bytes
                .unwrap_or(Some(DEFAULT_MAX_FETCH_BYTES)),
            max_request_bytes: self
                .max_request_bytes
                .unwrap_or(DEFAULT_MAX_REQUEST_BYTES),
            fetch_timeout,
            index_flush_debounce: self
                .index_flush_debounce
                .unwrap_or(Duration::from_millis(250)),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
        };

        config.validate()?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{HttpRequest, HttpResponse};

    struct StaticHttpClient;

    #[async_trait]
    impl HttpClient for StaticHttpClient {
        async fn execute(&self, _request: HttpRequest) -> BridgeResult<HttpResponse> {
            Ok(HttpResponse::new(200, ""))
        }
    }

    fn builder() -> CoreConfigBuilder {
        CoreConfig::builder().http_client(Arc::new(StaticHttpClient))
    }

    #[test]
    fn test_builder_requires_cache_dir() {
        let result = builder().build();

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Cache directory is required"));
    }

    #[cfg(not(feature = "desktop-shims"))]
    #[test]
    fn test_builder_requires_http_client() {
        let result = CoreConfig::builder().cache_dir("/cache").build();

        match result {
            Err(Error::CapabilityMissing { capability, .. }) => {
                assert_eq!(capability, "HttpClient")
            }
            other => panic!("expected CapabilityMissing, got {:?}", other),
        }
    }

    #[cfg(feature = "desktop-shims")]
    #[test]
    fn test_build_with_desktop_defaults() {
        let config = CoreConfig::builder()
            .cache_dir(std::env::temp_dir())
            .build()
            .expect("desktop defaults should succeed");
        assert_eq!(config.max_concurrent_fetches, DEFAULT_MAX_CONCURRENT_FETCHES);
    }

    #[test]
    fn test_builder_defaults() {
        let config = builder().cache_dir("/cache").build().unwrap();

        assert_eq!(config.cache_dir, PathBuf::from("/cache"));
        assert_eq!(config.max_concurrent_fetches, DEFAULT_MAX_CONCURRENT_FETCHES);
        assert_eq!(config.max_fetch_bytes, Some(DEFAULT_MAX_FETCH_BYTES));
        assert_eq!(config.max_request_bytes, DEFAULT_MAX_REQUEST_BYTES);
        assert_eq!(config.fetch_timeout, Duration::from_secs(30));
        assert_eq!(config.index_flush_debounce, Duration::from_millis(250));
        assert_eq!(config.event_buffer_size, DEFAULT_EVENT_BUFFER_SIZE);
    }

    #[test]
    fn test_builder_overrides() {
        let config = builder()
            .cache_dir("/cache")
            .max_concurrent_fetches(8)
            .max_fetch_bytes(None)
            .max_request_bytes(4_096)
            .fetch_timeout(Duration::from_secs(5))
            .index_flush_debounce(Duration::from_millis(10))
            .event_buffer_size(16)
            .build()
            .unwrap();

        assert_eq!(config.max_concurrent_fetches, 8);
        assert_eq!(config.max_fetch_bytes, None);
        assert_eq!(config.max_request_bytes, 4_096);
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
        assert_eq!(config.index_flush_debounce, Duration::from_millis(10));
        assert_eq!(config.event_buffer_size, 16);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let cases: Vec<CoreConfigBuilder> = vec![
            builder().cache_dir("/cache").max_concurrent_fetches(0),
            builder().cache_dir("/cache").max_fetch_bytes(Some(0)),
            builder().cache_dir("/cache").max_request_bytes(0),
            builder().cache_dir("/cache").fetch_timeout(Duration::ZERO),
            builder().cache_dir("/cache").event_buffer_size(0),
            builder().cache_dir(""),
        ];

        for case in cases {
            assert!(matches!(case.build(), Err(Error::Config(_))));
        }
    }

    #[test]
    fn test_config_is_cloneable_and_debuggable() {
        let config = builder().cache_dir("/cache").build().unwrap();
        let cloned = config.clone();
        assert_eq!(cloned.cache_dir, config.cache_dir);
        assert!(format!("{:?}", cloned).contains("HttpClient { ... }"));
    }
}
