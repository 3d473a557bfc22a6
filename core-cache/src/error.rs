//! # Cache Error Types
//!
//! Error kinds surfaced by the progressive range cache.

use crate::splitter::Subrequest;
use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Errors that can occur while servicing byte-range requests.
#[derive(Error, Debug)]
pub enum CacheError {
    // ========================================================================
    // Request Errors
    // ========================================================================
    /// Requested range is inverted or otherwise unparseable.
    #[error("Malformed byte range: {0}")]
    MalformedRange(String),

    /// The request was cancelled before its bytes were delivered.
    #[error("Request cancelled")]
    Cancelled,

    /// One subrequest of a parent request failed.
    #[error("Subrequest #{index} ({subrequest}) failed: {source}")]
    Subrequest {
        /// Position of the failed subrequest in the plan.
        index: usize,
        /// The failed subrequest.
        subrequest: Subrequest,
        /// Why it failed.
        #[source]
        source: Box<CacheError>,
    },

    // ========================================================================
    // Network Errors
    // ========================================================================
    /// The remote resource does not honor ranged requests.
    #[error("Remote resource does not support byte-range requests: {0}")]
    ByteRangeUnsupported(String),

    /// Transport-level failure (timeout, reset, non-success status).
    #[error("Network fetch failed: {0}")]
    NetworkFetchFailed(String),

    // ========================================================================
    // Storage Errors
    // ========================================================================
    /// Backing file read or write failed.
    #[error("Scratch storage I/O failed: {0}")]
    StorageIoFailed(String),

    /// Sidecar index could not be parsed.
    #[error("Range index corrupt: {0}")]
    IndexCorrupt(String),

    // ========================================================================
    // Generic Errors
    // ========================================================================
    /// Invalid cache configuration.
    #[error("Invalid cache configuration: {0}")]
    Config(String),

    /// Internal error (should not occur in normal operation).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Returns the innermost error, unwrapping subrequest reports.
    pub fn root_cause(&self) -> &CacheError {
        match self {
            CacheError::Subrequest { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Returns `true` if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.root_cause(),
            CacheError::NetworkFetchFailed(_) | CacheError::StorageIoFailed(_)
        )
    }

    /// Returns `true` if this error originated from the network.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self.root_cause(),
            CacheError::NetworkFetchFailed(_) | CacheError::ByteRangeUnsupported(_)
        )
    }

    /// Returns `true` if this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root_cause(), CacheError::Cancelled)
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::StorageIoFailed(err.to_string())
    }
}

impl From<BridgeError> for CacheError {
    fn from(err: BridgeError) -> Self {
        CacheError::NetworkFetchFailed(err.to_string())
    }
}

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::ByteRange;

    #[test]
    fn test_root_cause_unwraps_subrequest() {
        let err = CacheError::Subrequest {
            index: 1,
            subrequest: Subrequest::NetworkFetch(ByteRange::new(50, 100).unwrap()),
            source: Box::new(CacheError::NetworkFetchFailed("timeout".into())),
        };

        assert!(matches!(
            err.root_cause(),
            CacheError::NetworkFetchFailed(_)
        ));
        assert!(err.is_network_error());
        assert!(err.is_transient());
        assert!(err.to_string().contains("#1"));
    }

    #[test]
    fn test_classification() {
        assert!(!CacheError::ByteRangeUnsupported("200".into()).is_transient());
        assert!(CacheError::ByteRangeUnsupported("200".into()).is_network_error());
        assert!(CacheError::Cancelled.is_cancelled());
        assert!(!CacheError::MalformedRange("x".into()).is_network_error());
    }

    #[test]
    fn test_io_error_maps_to_storage() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        assert!(matches!(CacheError::from(io), CacheError::StorageIoFailed(_)));
    }
}
