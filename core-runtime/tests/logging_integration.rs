//! Integration tests for logging system

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::logger::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{
    init_logging, redact_if_sensitive, redact_url, strip_path, LogFormat, LoggingConfig,
};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct CapturingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for CapturingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

#[test]
fn test_global_logging_forwards_workspace_events() {
    // Logging can only be initialized once per process
    let sink = Arc::new(CapturingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());

    init_logging(config).unwrap();

    tracing::info!(target: "core_cache::store", ranges = 2, "Opened scratch store");
    tracing::debug!(target: "core_cache::store", "Below the sink's level");
    tracing::info!(target: "hyper::client", "Filtered transport noise");

    let entries = sink.entries.lock().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].message, "Opened scratch store");
    assert_eq!(entries[0].fields.get("ranges"), Some(&"2".to_string()));
    drop(entries);

    assert!(init_logging(LoggingConfig::default()).is_err());
}

#[test]
fn test_signed_url_redaction() {
    let url = "https://media.example.com/song.ogg?token=abc&expires=1700000000";
    assert_eq!(redact_url(url), "https://media.example.com/song.ogg");
    assert_eq!(redact_url("https://a.example/b#frag"), "https://a.example/b");
    assert_eq!(redact_url("https://a.example/plain"), "https://a.example/plain");
}

#[test]
fn test_header_redaction() {
    assert_eq!(redact_if_sensitive("Authorization", "Bearer abc"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("X-Signature", "deadbeef"), "[REDACTED]");
    assert_eq!(redact_if_sensitive("Range", "bytes=0-99"), "bytes=0-99");
}

#[test]
fn test_cache_paths_are_stripped() {
    assert_eq!(strip_path("/var/cache/app/range_cache/ab12.data"), "ab12.data");
    assert_eq!(strip_path("C:\\cache\\range_cache\\ab12.index"), "ab12.index");
    assert_eq!(strip_path("ab12.data"), "ab12.data");
}
