//! # Fetch Orchestrator
//!
//! Executes parent byte-range requests against a [`ScratchStore`].
//!
//! ## Lifecycle
//!
//! ```text
//! Planning ──► Executing ──► Completed
//!    │             ├───────► Failed
//!    └─────────────┴───────► Cancelled
//! ```
//!
//! - **Planning**: the request is split against a snapshot of the store's
//!   ranges. An empty plan completes immediately with zero bytes.
//! - **Executing**: every subrequest runs concurrently. Cache reads go
//!   straight to the store; network fetches share one bounded pool of
//!   permits across all requests. Fetched bytes are committed to the store
//!   before they reach the assembler, so progress survives failure and
//!   cancellation of the parent.
//! - **Completed**: pieces are concatenated in plan order and delivered
//!   exactly once.
//! - **Failed**: siblings are allowed to finish (and commit), then the
//!   earliest failing subrequest in plan order is reported.
//!
//! A cache read that fails with `StorageIoFailed` is refetched from the
//! network and re-populates the store.
//!
//! The orchestrator never retries a fetch and imposes no overall timeout;
//! both belong to the [`RangeFetcher`].

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::fetch::{RangeFetcher, ResourceLocator};
use crate::range::ByteRange;
use crate::splitter::{self, Subrequest};
use crate::stats::{CacheStats, StatsRecorder};
use crate::store::ScratchStore;
use bytes::{Bytes, BytesMut};
use core_async::sync::{watch, CancellationToken, Semaphore};
use core_async::task::{self, JoinHandle};
use core_runtime::events::{CoreEvent, EventBus, RequestEvent};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

// ============================================================================
// Request Identity and State
// ============================================================================

/// Unique identifier for a parent request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Create a new random request ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Get the string representation of this ID
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Parent request state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestState {
    /// Splitting the request against cached ranges
    Planning,
    /// Subrequests in flight
    Executing,
    /// Bytes delivered
    Completed,
    /// A subrequest failed; nothing delivered
    Failed,
    /// Cancelled by the caller; nothing delivered
    Cancelled,
}

impl RequestState {
    /// Returns true if the request can no longer change state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Completed | RequestState::Failed | RequestState::Cancelled
        )
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RequestState::Planning => "planning",
            RequestState::Executing => "executing",
            RequestState::Completed => "completed",
            RequestState::Failed => "failed",
            RequestState::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// Receives the outcome of a submitted request, exactly once.
pub trait ResultSink: Send + Sync {
    /// All requested bytes, in offset order.
    fn on_bytes(&self, bytes: Bytes);

    /// The request failed or was cancelled.
    fn on_error(&self, error: &CacheError);
}

// ============================================================================
// Request Handle
// ============================================================================

/// Handle to a submitted parent request.
///
/// Dropping the handle detaches the request; it still runs to completion
/// and still delivers to its sink.
pub struct RequestHandle {
    id: RequestId,
    range: ByteRange,
    state: watch::Receiver<RequestState>,
    cancel: CancellationToken,
    task: JoinHandle<Result<Bytes>>,
}

impl RequestHandle {
    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn range(&self) -> ByteRange {
        self.range
    }

    pub fn state(&self) -> RequestState {
        *self.state.borrow()
    }

    /// Ask the request to stop. In-flight fetches are abandoned; bytes that
    /// already arrived are still committed to the store.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the outcome.
    pub async fn wait(self) -> Result<Bytes> {
        self.task
            .await
            .map_err(|e| CacheError::Internal(format!("request task failed: {}", e)))?
    }
}

impl fmt::Debug for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestHandle")
            .field("id", &self.id)
            .field("range", &self.range)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// One piece of an executing request.
struct Piece {
    bytes: Bytes,
    from_network: bool,
}

/// Per-request context shared by its subrequests.
struct RequestContext {
    id: RequestId,
    store: Arc<ScratchStore>,
    locator: ResourceLocator,
    cancel: CancellationToken,
}

/// Runs parent requests. Cheap to clone; clones share the fetch pool and
/// statistics.
#[derive(Clone)]
pub struct FetchOrchestrator {
    fetcher: Arc<dyn RangeFetcher>,
    fetch_permits: Arc<Semaphore>,
    max_fetch_bytes: Option<u64>,
    max_request_bytes: u64,
    event_bus: Option<EventBus>,
    stats: Arc<StatsRecorder>,
}

impl FetchOrchestrator {
    pub fn new(
        fetcher: Arc<dyn RangeFetcher>,
        config: &CacheConfig,
        event_bus: Option<EventBus>,
    ) -> Self {
        Self {
            fetcher,
            fetch_permits: Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1))),
            max_fetch_bytes: config.max_fetch_bytes,
            max_request_bytes: config.max_request_bytes,
            event_bus,
            stats: Arc::new(StatsRecorder::default()),
        }
    }

    /// Snapshot of activity since construction.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Spawn a parent request and return its handle.
    ///
    /// The outcome goes to `sink` (if any) and to [`RequestHandle::wait`].
    pub fn submit(
        &self,
        store: Arc<ScratchStore>,
        locator: ResourceLocator,
        range: ByteRange,
        sink: Option<Arc<dyn ResultSink>>,
    ) -> RequestHandle {
        let id = RequestId::new();
        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(RequestState::Planning);

        let ctx = RequestContext {
            id,
            store,
            locator,
            cancel: cancel.clone(),
        };

        let orchestrator = self.clone();
        let task = task::spawn(async move {
            let result = orchestrator.run(&ctx, range, &state_tx).await;
            if let Some(sink) = sink {
                match &result {
                    Ok(bytes) => sink.on_bytes(bytes.clone()),
                    Err(e) => sink.on_error(e),
                }
            }
            result
        });

        RequestHandle {
            id,
            range,
            state: state_rx,
            cancel,
            task,
        }
    }

    /// Run a parent request on the current task.
    ///
    /// Dropping the future abandons the request; fetches already committed
    /// stay in the store.
    pub async fn execute(
        &self,
        store: Arc<ScratchStore>,
        locator: ResourceLocator,
        range: ByteRange,
    ) -> Result<Bytes> {
        let ctx = RequestContext {
            id: RequestId::new(),
            store,
            locator,
            cancel: CancellationToken::new(),
        };
        let (state_tx, _state_rx) = watch::channel(RequestState::Planning);
        self.run(&ctx, range, &state_tx).await
    }

    #[instrument(
        skip_all,
        fields(request_id = %ctx.id, resource_id = %ctx.locator.id, range = %range)
    )]
    async fn run(
        &self,
        ctx: &RequestContext,
        range: ByteRange,
        state: &watch::Sender<RequestState>,
    ) -> Result<Bytes> {
        let result = self.plan_and_execute(ctx, range, state).await;

        let final_state = match &result {
            Ok(_) => RequestState::Completed,
            Err(CacheError::Cancelled) => RequestState::Cancelled,
            Err(_) => RequestState::Failed,
        };

        let resource_id = ctx.locator.id.clone();
        let request_id = ctx.id.to_string();
        match &result {
            Ok((_, from_cache, from_network)) => {
                self.stats.record_completed();
                self.stats.record_cache_bytes(*from_cache);
                debug!(from_cache, from_network, "Range request completed");
                self.emit(RequestEvent::Completed {
                    request_id,
                    resource_id,
                    bytes_from_cache: *from_cache,
                    bytes_from_network: *from_network,
                });
            }
            Err(CacheError::Cancelled) => {
                self.stats.record_cancelled();
                info!("Range request cancelled");
                self.emit(RequestEvent::Cancelled {
                    request_id,
                    resource_id,
                });
            }
            Err(e) => {
                self.stats.record_failed();
                warn!(error = %e, "Range request failed");
                self.emit(RequestEvent::Failed {
                    request_id,
                    resource_id,
                    message: e.to_string(),
                });
            }
        }

        state.send_replace(final_state);
        result.map(|(bytes, _, _)| bytes)
    }

    /// Returns the assembled bytes plus the cache and network byte counts.
    async fn plan_and_execute(
        &self,
        ctx: &RequestContext,
        range: ByteRange,
        state: &watch::Sender<RequestState>,
    ) -> Result<(Bytes, u64, u64)> {
        if range.len() > self.max_request_bytes {
            return Err(CacheError::MalformedRange(format!(
                "{} exceeds the {} byte request limit",
                range, self.max_request_bytes
            )));
        }

        let plan = splitter::split(range, &ctx.store.ranges(), self.max_fetch_bytes);
        if plan.is_empty() {
            return Ok((Bytes::new(), 0, 0));
        }

        debug!(
            cache_reads = plan.cache_reads(),
            network_fetches = plan.network_fetches(),
            "Planned range request"
        );
        self.emit(RequestEvent::Started {
            request_id: ctx.id.to_string(),
            resource_id: ctx.locator.id.clone(),
            start: range.start(),
            end: range.end(),
            cache_reads: plan.cache_reads(),
            network_fetches: plan.network_fetches(),
        });
        state.send_replace(RequestState::Executing);

        let results = join_all(
            plan.subrequests()
                .iter()
                .map(|sub| self.run_subrequest(ctx, *sub)),
        )
        .await;

        if ctx.cancel.is_cancelled() {
            return Err(CacheError::Cancelled);
        }

        // Nothing is buffered until every subrequest has succeeded.
        let mut pieces = Vec::with_capacity(results.len());
        let outcomes = plan.into_subrequests().into_iter().zip(results);
        for (index, (subrequest, result)) in outcomes.enumerate() {
            let piece = result.map_err(|source| CacheError::Subrequest {
                index,
                subrequest,
                source: Box::new(source),
            })?;
            pieces.push(piece);
        }

        let mut from_cache = 0u64;
        let mut from_network = 0u64;
        for piece in &pieces {
            if piece.from_network {
                from_network += piece.bytes.len() as u64;
            } else {
                from_cache += piece.bytes.len() as u64;
            }
        }

        if from_cache + from_network != range.len() {
            return Err(CacheError::Internal(format!(
                "assembled {} bytes for {}",
                from_cache + from_network,
                range
            )));
        }

        let bytes = match pieces.len() {
            1 => pieces.remove(0).bytes,
            _ => {
                let total = pieces.iter().map(|p| p.bytes.len()).sum();
                let mut assembled = BytesMut::with_capacity(total);
                for piece in &pieces {
                    assembled.extend_from_slice(&piece.bytes);
                }
                assembled.freeze()
            }
        };

        Ok((bytes, from_cache, from_network))
    }

    async fn run_subrequest(&self, ctx: &RequestContext, subrequest: Subrequest) -> Result<Piece> {
        match subrequest {
            Subrequest::CacheRead(range) => match ctx.store.read(range).await {
                Ok(bytes) => Ok(Piece {
                    bytes,
                    from_network: false,
                }),
                Err(CacheError::StorageIoFailed(reason)) => {
                    warn!(range = %range, reason = %reason, "Cache read failed, refetching");
                    self.stats.record_recovery();
                    let bytes = self.refetch(ctx, range).await?;
                    Ok(Piece {
                        bytes,
                        from_network: true,
                    })
                }
                Err(e) => Err(e),
            },
            Subrequest::NetworkFetch(range) => {
                let bytes = self.fetch_and_commit(ctx, range).await?;
                Ok(Piece {
                    bytes,
                    from_network: true,
                })
            }
        }
    }

    /// Refetch a range that should have been cached, honoring the fetch cap.
    async fn refetch(&self, ctx: &RequestContext, range: ByteRange) -> Result<Bytes> {
        let chunk = self.max_fetch_bytes.unwrap_or(range.len()).max(1);
        if range.len() <= chunk {
            return self.fetch_and_commit(ctx, range).await;
        }

        let mut out = BytesMut::new();
        let mut start = range.start();
        while start < range.end() {
            let end = start.saturating_add(chunk).min(range.end());
            out.extend_from_slice(&self.fetch_and_commit(ctx, ByteRange::new(start, end)?).await?);
            start = end;
        }
        Ok(out.freeze())
    }

    /// Fetch `range` and write it back to the store.
    ///
    /// A failed write-back is logged and the fetched bytes are still
    /// returned; the range simply stays uncached.
    async fn fetch_and_commit(&self, ctx: &RequestContext, range: ByteRange) -> Result<Bytes> {
        let permit = core_async::select! {
            _ = ctx.cancel.cancelled() => return Err(CacheError::Cancelled),
            permit = self.fetch_permits.acquire() => permit
                .map_err(|_| CacheError::Internal("fetch pool closed".to_string()))?,
        };

        let bytes = core_async::select! {
            _ = ctx.cancel.cancelled() => return Err(CacheError::Cancelled),
            result = self.fetcher.fetch(&ctx.locator, range) => result?,
        };
        drop(permit);

        if bytes.len() as u64 != range.len() {
            return Err(CacheError::NetworkFetchFailed(format!(
                "expected {} bytes for {}, got {}",
                range.len(),
                range,
                bytes.len()
            )));
        }

        self.stats.record_network_bytes(range.len());
        if let Err(e) = ctx.store.write(range, bytes.clone()).await {
            warn!(range = %range, error = %e, "Failed to commit fetched bytes");
        }

        Ok(bytes)
    }

    fn emit(&self, event: RequestEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Request(event)).ok();
        }
    }
}

impl fmt::Debug for FetchOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchOrchestrator")
            .field("available_fetch_permits", &self.fetch_permits.available_permits())
            .field("max_fetch_bytes", &self.max_fetch_bytes)
            .field("max_request_bytes", &self.max_request_bytes)
            .finish()
    }
}
