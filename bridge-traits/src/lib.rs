//! # Host Bridge Traits
//!
//! Contracts between the range cache core and host-specific implementations.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Async HTTP transport used for ranged GETs
//! - [`LoggerSink`](logger::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//! | Mobile   | injected by the host app |
//!
//! ## Fail-Fast Strategy
//!
//! The core fails fast with a descriptive error when a required capability is
//! missing instead of silently degrading:
//!
//! ```ignore
//! let http_client = config.http_client.ok_or_else(|| Error::CapabilityMissing {
//!     capability: "HttpClient".to_string(),
//!     message: "No HTTP client implementation provided. \
//!               Desktop: enable the desktop-shims feature. \
//!               Mobile: inject platform-native adapter.".to_string(),
//! })?;
//! ```
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so they can be shared across tasks.

pub mod error;
pub mod http;
pub mod logger;

pub use error::BridgeError;

pub use http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
pub use logger::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
