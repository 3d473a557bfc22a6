//! # Range Fetching
//!
//! The network side of the cache: a [`RangeFetcher`] returns exactly the
//! bytes of one half-open range of a remote resource, or a typed error.
//! [`HttpRangeFetcher`] implements it over any host [`HttpClient`].

use crate::error::{CacheError, Result};
use crate::range::{parse_content_range, ByteRange};
use async_trait::async_trait;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_runtime::logging::{redact_if_sensitive, redact_url};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Where a resource lives, separate from what it is.
///
/// `id` keys the scratch store and must stay stable; `url` may be a signed
/// link that changes between requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLocator {
    /// Stable resource identifier.
    pub id: String,
    /// Current URL for the resource.
    pub url: String,
    /// Extra request headers (e.g. authorization).
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

impl ResourceLocator {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            headers: HashMap::new(),
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// Ranged network fetch primitive.
///
/// Implementations own retry and timeout policy; the cache never retries.
#[async_trait]
pub trait RangeFetcher: Send + Sync {
    /// Fetch exactly `range.len()` bytes starting at `range.start()`.
    ///
    /// # Errors
    ///
    /// - `ByteRangeUnsupported` if the server ignores ranged requests
    /// - `NetworkFetchFailed` on transport errors, timeouts, unexpected
    ///   statuses, or a body of the wrong length
    async fn fetch(&self, locator: &ResourceLocator, range: ByteRange) -> Result<Bytes>;
}

/// [`RangeFetcher`] issuing `Range` GETs through a host [`HttpClient`].
pub struct HttpRangeFetcher {
    client: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl HttpRangeFetcher {
    pub fn new(client: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn extract(range: ByteRange, response: HttpResponse) -> Result<Bytes> {
        if response.is_partial_content() {
            return Self::extract_partial(range, response);
        }

        if response.is_full_content() {
            // Server ignored the Range header and sent the whole body.
            return if range.start() == 0 && response.body.len() as u64 >= range.len() {
                Ok(response.body.slice(..range.len() as usize))
            } else {
                Err(CacheError::ByteRangeUnsupported(format!(
                    "server answered {} with 200 and {} bytes",
                    range,
                    response.body.len()
                )))
            };
        }

        if response.is_range_not_satisfiable() {
            return Err(CacheError::NetworkFetchFailed(format!(
                "range {} not satisfiable",
                range
            )));
        }

        Err(CacheError::NetworkFetchFailed(format!(
            "HTTP {}",
            response.status
        )))
    }

    fn extract_partial(range: ByteRange, response: HttpResponse) -> Result<Bytes> {
        let body_len = response.body.len() as u64;

        let served = match response.header("Content-Range") {
            Some(value) => parse_content_range(value)
                .map_err(|e| CacheError::NetworkFetchFailed(e.to_string()))?
                .range,
            None => ByteRange::with_len(range.start(), body_len)?,
        };

        if served.len() != body_len {
            return Err(CacheError::NetworkFetchFailed(format!(
                "Content-Range {} does not match body of {} bytes",
                served, body_len
            )));
        }
        if !served.contains_range(&range) {
            return Err(CacheError::NetworkFetchFailed(format!(
                "requested {} but server sent {}",
                range, served
            )));
        }

        let offset = (range.start() - served.start()) as usize;
        Ok(response
            .body
            .slice(offset..offset + range.len() as usize))
    }
}

/// `name=value` pairs, sorted, with credentials redacted.
fn loggable_headers(headers: &HashMap<String, String>) -> Vec<String> {
    let mut pairs: Vec<String> = headers
        .iter()
        .map(|(name, value)| format!("{}={}", name, redact_if_sensitive(name, value)))
        .collect();
    pairs.sort();
    pairs
}

#[async_trait]
impl RangeFetcher for HttpRangeFetcher {
    #[instrument(skip_all, fields(resource_id = %locator.id, range = %range))]
    async fn fetch(&self, locator: &ResourceLocator, range: ByteRange) -> Result<Bytes> {
        let Some(header) = range.to_header_value() else {
            return Ok(Bytes::new());
        };

        debug!(
            url = %redact_url(&locator.url),
            headers = ?loggable_headers(&locator.headers),
            "Fetching byte range"
        );

        let request = HttpRequest::get(&locator.url)
            .headers(locator.headers.clone())
            .header("Range", header)
            .timeout(self.timeout);

        let response = self.client.execute(request).await?;
        let status = response.status;

        Self::extract(range, response).map_err(|e| {
            warn!(status, url = %redact_url(&locator.url), error = %e, "Range fetch rejected");
            e
        })
    }
}
