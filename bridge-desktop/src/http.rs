//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy},
};
use core_async::time::{sleep, Duration};
use reqwest::Client;
use std::collections::HashMap;
use tracing::{debug, warn};

const USER_AGENT: &str = concat!("range-cache/", env!("CARGO_PKG_VERSION"));

/// Reqwest-based HTTP client implementation
///
/// Provides HTTP operations with:
/// - Connection pooling via reqwest
/// - Automatic retry with exponential backoff on transport errors, 5xx and 429
/// - TLS via rustls
pub struct ReqwestHttpClient {
    client: Client,
    policy: RetryPolicy,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with custom timeout
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| BridgeError::NotAvailable(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self::with_client(client))
    }

    /// Wrap a preconfigured reqwest client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            policy: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy used by [`HttpClient::execute`]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build reqwest request from bridge request
    fn build_request(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let mut req = self.client.get(&request.url);

        for (key, value) in &request.headers {
            req = req.header(key, value);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    fn is_retryable_status(status: u16) -> bool {
        status >= 500 || status == 429
    }

    fn classify(err: reqwest::Error) -> BridgeError {
        if err.is_timeout() {
            BridgeError::Timeout(err.to_string())
        } else if err.is_connect() {
            BridgeError::OperationFailed(format!("Connection failed: {}", err))
        } else {
            BridgeError::OperationFailed(err.to_string())
        }
    }

    /// Execute request with retry logic
    async fn execute_with_retry(&self, request: HttpRequest) -> Result<HttpResponse> {
        let policy = &self.policy;
        let max_attempts = policy.max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            debug!(attempt, max_attempts, "Executing HTTP request");

            match self.build_request(&request).send().await {
                Ok(response) => {
                    let status = response.status().as_u16();

                    if Self::is_retryable_status(status) && attempt < max_attempts {
                        warn!(status, attempt, "HTTP request failed with retryable status");
                        last_error =
                            Some(BridgeError::OperationFailed(format!("HTTP {} error", status)));
                    } else {
                        let headers: HashMap<String, String> = response
                            .headers()
                            .iter()
                            .filter_map(|(k, v)| {
                                v.to_str().ok().map(|s| (k.to_string(), s.to_string()))
                            })
                            .collect();

                        let body = response.bytes().await.map_err(Self::classify)?;

                        return Ok(HttpResponse {
                            status,
                            headers,
                            body,
                        });
                    }
                }
                Err(e) => {
                    warn!(error = %e, attempt, "HTTP request failed");
                    last_error = Some(Self::classify(e));
                }
            }

            if attempt < max_attempts {
                let delay = policy.delay_for(attempt);
                debug!(delay_ms = delay.as_millis() as u64, "Retrying after delay");
                sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BridgeError::OperationFailed("All retry attempts exhausted".to_string())
        }))
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        self.execute_with_retry(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_client_creation() {
        let client = ReqwestHttpClient::new()
            .unwrap()
            .with_retry_policy(RetryPolicy::none());
        assert_eq!(client.policy.max_attempts, 1);
    }

    #[test]
    fn test_build_request_is_ranged_get() {
        let client = ReqwestHttpClient::new().unwrap();
        let request = HttpRequest::get("https://cdn.example.com/a.flac")
            .header("Range", "bytes=0-99")
            .timeout(Duration::from_secs(2));

        let built = client.build_request(&request).build().unwrap();
        assert_eq!(built.method(), reqwest::Method::GET);
        assert_eq!(built.headers()["Range"], "bytes=0-99");
        assert_eq!(built.timeout(), Some(&Duration::from_secs(2)));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(ReqwestHttpClient::is_retryable_status(503));
        assert!(ReqwestHttpClient::is_retryable_status(429));
        assert!(!ReqwestHttpClient::is_retryable_status(416));
        assert!(!ReqwestHttpClient::is_retryable_status(206));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let client = ReqwestHttpClient::with_timeout(Duration::from_millis(500))
            .unwrap()
            .with_retry_policy(RetryPolicy::none());
        let request = HttpRequest::get("http://127.0.0.1:9/missing").header("Range", "bytes=0-9");

        assert!(client.execute(request).await.is_err());
    }
}
