//! # Desktop Bridge Implementations
//!
//! Default bridge implementations for desktop platforms (macOS, Windows,
//! Linux):
//! - `HttpClient` using `reqwest` with retry and exponential backoff
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::ReqwestHttpClient;
//! use std::sync::Arc;
//!
//! let http_client = Arc::new(ReqwestHttpClient::new()?);
//! let config = CoreConfig::builder()
//!     .cache_dir("/tmp/cache")
//!     .http_client(http_client)
//!     .build()?;
//! ```

mod http;

pub use http::ReqwestHttpClient;
