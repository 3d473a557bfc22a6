//! End-to-end tests: CoreService over an in-memory HTTP origin

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::{HttpClient, HttpRequest, HttpResponse};
use bytes::Bytes;
use core_cache::{ByteRange, CacheError, RangeSet, ResourceLocator};
use core_runtime::config::CoreConfig;
use core_runtime::events::{CoreEvent, RequestEvent};
use core_service::CoreService;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Serves one in-memory resource, honoring `Range` unless told not to.
struct Origin {
    body: Bytes,
    honor_ranges: bool,
    requests: Mutex<Vec<String>>,
}

impl Origin {
    fn new(len: usize, honor_ranges: bool) -> Arc<Self> {
        Arc::new(Self {
            body: (0..len).map(|i| (i % 97) as u8).collect(),
            honor_ranges,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl HttpClient for Origin {
    async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse> {
        let range = request.headers.get("Range").cloned().unwrap_or_default();
        self.requests.lock().push(range.clone());

        if !self.honor_ranges {
            return Ok(HttpResponse::new(200, self.body.clone()));
        }

        let (first, last) = range
            .trim_start_matches("bytes=")
            .split_once('-')
            .expect("origin expects bytes=a-b");
        let first: usize = first.parse().unwrap();
        let last: usize = last.parse().unwrap();
        if first >= self.body.len() {
            return Ok(HttpResponse::new(416, ""));
        }
        let last = last.min(self.body.len() - 1);

        Ok(HttpResponse::new(206, self.body.slice(first..=last)).with_header(
            "Content-Range",
            format!("bytes {}-{}/{}", first, last, self.body.len()),
        ))
    }
}

fn service(dir: &tempfile::TempDir, origin: Arc<Origin>) -> CoreService {
    let config = CoreConfig::builder()
        .cache_dir(dir.path())
        .http_client(origin)
        .max_fetch_bytes(Some(256))
        .index_flush_debounce(Duration::from_millis(10))
        .build()
        .unwrap();
    CoreService::new(config).unwrap()
}

fn locator() -> ResourceLocator {
    ResourceLocator::new("song-7", "https://media.example.com/song-7.ogg?token=xyz")
        .with_header("Authorization", "Bearer abc")
}

fn r(start: u64, end: u64) -> ByteRange {
    ByteRange::new(start, end).unwrap()
}

#[core_async::test]
async fn test_read_through_http_origin() {
    let dir = tempfile::tempdir().unwrap();
    let origin = Origin::new(4_096, true);
    let service = service(&dir, origin.clone());

    let bytes = service.read(locator(), r(1_000, 1_600)).await.unwrap();
    assert_eq!(bytes, origin.body.slice(1_000..1_600));

    // 600 bytes under a 256-byte cap: three ranged GETs
    let mut requests = origin.requests();
    requests.sort();
    assert_eq!(
        requests,
        vec!["bytes=1000-1255", "bytes=1256-1511", "bytes=1512-1599"]
    );

    assert_eq!(
        service.cached_ranges("song-7").await.unwrap(),
        RangeSet::from_ranges([r(1_000, 1_600)])
    );
}

#[core_async::test]
async fn test_repeat_read_skips_network() {
    let dir = tempfile::tempdir().unwrap();
    let origin = Origin::new(1_024, true);
    let service = service(&dir, origin.clone());

    service.read(locator(), r(0, 200)).await.unwrap();
    let before = origin.requests().len();

    let handle = service
        .load(locator(), "bytes=50-149", Some(1_024), None)
        .await
        .unwrap();
    assert_eq!(handle.wait().await.unwrap(), origin.body.slice(50..150));
    assert_eq!(origin.requests().len(), before);
    assert!(service.stats().hit_ratio() > 0.0);
}

#[core_async::test]
async fn test_origin_without_range_support() {
    let dir = tempfile::tempdir().unwrap();
    let origin = Origin::new(1_024, false);
    let service = service(&dir, origin);

    let err = service.read(locator(), r(100, 200)).await.unwrap_err();
    let cache_err = err.as_cache_error().expect("cache error");
    assert!(matches!(
        cache_err.root_cause(),
        CacheError::ByteRangeUnsupported(_)
    ));
    assert!(service.cached_ranges("song-7").await.unwrap().is_empty());
}

#[core_async::test]
async fn test_request_events_are_published() {
    let dir = tempfile::tempdir().unwrap();
    let service = service(&dir, Origin::new(512, true));
    let mut events = service
        .subscribe_events()
        .filter(|e| matches!(e, CoreEvent::Request(_)));

    service.read(locator(), r(0, 100)).await.unwrap();

    assert!(matches!(
        events.recv().await.unwrap(),
        CoreEvent::Request(RequestEvent::Started { .. })
    ));
    match events.recv().await.unwrap() {
        CoreEvent::Request(RequestEvent::Completed {
            resource_id,
            bytes_from_network,
            ..
        }) => {
            assert_eq!(resource_id, "song-7");
            assert_eq!(bytes_from_network, 100);
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[core_async::test]
async fn test_invalidate_and_shutdown() {
    let dir = tempfile::tempdir().unwrap();
    let origin = Origin::new(512, true);
    let service = service(&dir, origin.clone());

    service.read(locator(), r(0, 100)).await.unwrap();
    service.invalidate("song-7").await.unwrap();
    assert!(service.cached_ranges("song-7").await.unwrap().is_empty());

    service.read(locator(), r(0, 100)).await.unwrap();
    service.shutdown().await.unwrap();

    // A fresh service over the same directory starts warm
    let revived = self::service(&dir, origin);
    assert_eq!(
        revived.cached_ranges("song-7").await.unwrap(),
        RangeSet::from_ranges([r(0, 100)])
    );
}

#[core_async::test]
async fn test_oversized_request_never_reaches_origin() {
    let dir = tempfile::tempdir().unwrap();
    let origin = Origin::new(4_096, true);
    let config = CoreConfig::builder()
        .cache_dir(dir.path())
        .http_client(origin.clone())
        .max_request_bytes(1_024)
        .build()
        .unwrap();
    let service = CoreService::new(config).unwrap();

    let err = service.read(locator(), r(0, 1 << 40)).await.unwrap_err();
    assert!(matches!(
        err.as_cache_error(),
        Some(CacheError::MalformedRange(_))
    ));
    assert!(origin.requests().is_empty());
    assert_eq!(service.stats().requests_failed, 1);
}
