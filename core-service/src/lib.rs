//! Core service façade and bootstrap helpers.
//!
//! This crate wires a validated [`CoreConfig`] (host bridges plus cache
//! settings) into a ready-to-use [`CoreService`]: one event bus, one store
//! registry, one orchestrator shared by every request. Desktop apps
//! typically enable the `desktop-shims` feature so a reqwest-backed HTTP
//! client is injected when the host does not provide one.

pub mod error;

pub use error::{CoreError, Result};

use bytes::Bytes;
use core_cache::{
    ByteRange, CacheConfig, CacheStats, FetchOrchestrator, HttpRangeFetcher, RangeFetcher,
    RangeSet, RequestHandle, ResourceLoader, ResourceLocator, ResultSink, StoreRegistry,
};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use std::sync::Arc;
use tracing::info;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    event_bus: EventBus,
    loader: ResourceLoader,
}

impl CoreService {
    /// Build the service over the config's HTTP client.
    pub fn new(config: CoreConfig) -> Result<Self> {
        let fetcher = Arc::new(HttpRangeFetcher::new(
            Arc::clone(&config.http_client),
            config.fetch_timeout,
        ));
        Self::with_fetcher(config, fetcher)
    }

    /// Build the service over a custom [`RangeFetcher`].
    pub fn with_fetcher(config: CoreConfig, fetcher: Arc<dyn RangeFetcher>) -> Result<Self> {
        config.validate()?;

        let cache_config = cache_config(&config);
        cache_config
            .validate()
            .map_err(CoreError::InitializationFailed)?;

        let event_bus = EventBus::new(config.event_buffer_size);
        let registry = Arc::new(StoreRegistry::new(
            &config.cache_dir,
            &cache_config,
            Some(event_bus.clone()),
        ));
        let orchestrator = FetchOrchestrator::new(fetcher, &cache_config, Some(event_bus.clone()));

        info!(
            cache_dir = %core_runtime::logging::strip_path(&registry.directory().to_string_lossy()),
            max_concurrent_fetches = cache_config.max_concurrent_fetches,
            "Core service ready"
        );

        Ok(Self {
            config: Arc::new(config),
            event_bus,
            loader: ResourceLoader::new(registry, orchestrator),
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    /// Event bus carrying store and request events.
    pub fn events(&self) -> &EventBus {
        &self.event_bus
    }

    /// Subscribe to every event the core emits.
    pub fn subscribe_events(&self) -> EventStream {
        EventStream::new(self.event_bus.subscribe())
    }

    /// Service a request given as a raw `Range` header.
    pub async fn load(
        &self,
        locator: ResourceLocator,
        range_header: &str,
        resource_len: Option<u64>,
        sink: Option<Arc<dyn ResultSink>>,
    ) -> Result<RequestHandle> {
        Ok(self
            .loader
            .load(locator, range_header, resource_len, sink)
            .await?)
    }

    /// Service a request for a parsed range.
    pub async fn request(
        &self,
        locator: ResourceLocator,
        range: ByteRange,
        sink: Option<Arc<dyn ResultSink>>,
    ) -> Result<RequestHandle> {
        Ok(self.loader.request(locator, range, sink).await?)
    }

    /// Submit a request and wait for its bytes.
    pub async fn read(&self, locator: ResourceLocator, range: ByteRange) -> Result<Bytes> {
        let handle = self.loader.request(locator, range, None).await?;
        Ok(handle.wait().await?)
    }

    pub async fn cached_ranges(&self, resource_id: &str) -> Result<RangeSet> {
        Ok(self.loader.registry().cached_ranges(resource_id).await?)
    }

    pub async fn invalidate(&self, resource_id: &str) -> Result<()> {
        Ok(self.loader.registry().invalidate(resource_id).await?)
    }

    pub fn stats(&self) -> CacheStats {
        self.loader.orchestrator().stats()
    }

    /// Flush every range index and close all stores.
    pub async fn shutdown(&self) -> Result<()> {
        self.loader.registry().close_all().await?;
        info!("Core service shut down");
        Ok(())
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.config)
            .finish()
    }
}

/// Cache settings carried by a [`CoreConfig`].
pub fn cache_config(config: &CoreConfig) -> CacheConfig {
    CacheConfig::new()
        .with_max_concurrent_fetches(config.max_concurrent_fetches)
        .with_max_fetch_bytes(config.max_fetch_bytes)
        .with_max_request_bytes(config.max_request_bytes)
        .with_index_flush_debounce(config.index_flush_debounce)
        .with_fetch_timeout(config.fetch_timeout)
}
