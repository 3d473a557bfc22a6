//! # Resource Loader
//!
//! Entry point for playback adapters. The host hands over the raw `Range`
//! header it received; the loader parses it, locates the resource's store,
//! and submits the request to the orchestrator.

use crate::error::Result;
use crate::fetch::ResourceLocator;
use crate::orchestrator::{FetchOrchestrator, RequestHandle, ResultSink};
use crate::range::{parse_range_header, ByteRange};
use crate::registry::StoreRegistry;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone)]
pub struct ResourceLoader {
    registry: Arc<StoreRegistry>,
    orchestrator: FetchOrchestrator,
}

impl ResourceLoader {
    pub fn new(registry: Arc<StoreRegistry>, orchestrator: FetchOrchestrator) -> Self {
        Self {
            registry,
            orchestrator,
        }
    }

    /// Service a request described by an HTTP-style `Range` header.
    ///
    /// `resource_len` resolves open-ended (`bytes=a-`) and suffix
    /// (`bytes=-n`) forms. A header that does not parse fails with
    /// `MalformedRange` before any disk or network access; the error is
    /// also delivered to `sink`.
    #[instrument(skip(self, locator, sink), fields(resource_id = %locator.id))]
    pub async fn load(
        &self,
        locator: ResourceLocator,
        range_header: &str,
        resource_len: Option<u64>,
        sink: Option<Arc<dyn ResultSink>>,
    ) -> Result<RequestHandle> {
        let range = match parse_range_header(range_header, resource_len) {
            Ok(range) => range,
            Err(e) => {
                warn!(error = %e, "Rejected range header");
                if let Some(sink) = &sink {
                    sink.on_error(&e);
                }
                return Err(e);
            }
        };

        self.request(locator, range, sink).await
    }

    /// Service a request for an already-parsed range.
    pub async fn request(
        &self,
        locator: ResourceLocator,
        range: ByteRange,
        sink: Option<Arc<dyn ResultSink>>,
    ) -> Result<RequestHandle> {
        let store = match self.registry.get_or_open(&locator.id).await {
            Ok(store) => store,
            Err(e) => {
                if let Some(sink) = &sink {
                    sink.on_error(&e);
                }
                return Err(e);
            }
        };

        let handle = self.orchestrator.submit(store, locator, range, sink);
        debug!(request_id = %handle.id(), range = %range, "Submitted range request");
        Ok(handle)
    }

    pub fn registry(&self) -> &Arc<StoreRegistry> {
        &self.registry
    }

    pub fn orchestrator(&self) -> &FetchOrchestrator {
        &self.orchestrator
    }
}
