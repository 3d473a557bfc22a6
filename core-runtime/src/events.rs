//! # Event Bus System
//!
//! Provides an event-driven architecture for the range cache core using `tokio::sync::broadcast`.
//! Diagnostics and UI layers observe cache activity through typed events without
//! being on the data path.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enums for scratch-store and request activity
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     emit      ┌───────────┐
//! │ ScratchStore ├──────────────>│           │     subscribe    ┌────────────┐
//! └──────────────┘               │ EventBus  ├─────────────────>│ Diagnostics│
//!                                │ (broadcast│                  └────────────┘
//! ┌──────────────┐     emit      │  channel) │     subscribe    ┌────────────┐
//! │ Orchestrator ├──────────────>│           ├─────────────────>│ UI         │
//! └──────────────┘               └───────────┘                  └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{EventBus, CoreEvent, StoreEvent};
//!
//! # core_async::runtime::block_on(async {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Store(StoreEvent::RangesChanged {
//!         resource_id: "track-42".to_string(),
//!         ranges: vec![(0, 100)],
//!         cached_bytes: 100,
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Cached ranges changed");
//! # });
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   Non-fatal; range snapshots are complete, so the next one supersedes what was missed.
//! - **`RecvError::Closed`**: All senders have been dropped. Treat as shutdown.
//!
//! Emission is best-effort: publishing with no subscribers returns an error
//! that callers ignore.

use serde::{Deserialize, Serialize};
use std::fmt;
use core_async::sync::broadcast;

// Re-export commonly used types
pub use core_async::sync::broadcast::error::{RecvError, SendError};
pub use core_async::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Scratch-store events
    Store(StoreEvent),
    /// Parent-request lifecycle events
    Request(RequestEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Store(e) => e.description(),
            CoreEvent::Request(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Request(RequestEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::Store(StoreEvent::IndexRecovered { .. }) => EventSeverity::Warning,
            CoreEvent::Store(StoreEvent::Invalidated { .. }) => EventSeverity::Info,
            CoreEvent::Request(RequestEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }

    /// Resource identifier the event refers to.
    pub fn resource_id(&self) -> &str {
        match self {
            CoreEvent::Store(e) => e.resource_id(),
            CoreEvent::Request(e) => e.resource_id(),
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Store Events
// ============================================================================

/// Events emitted by a scratch store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum StoreEvent {
    /// The set of cached ranges changed. Carries the full snapshot.
    RangesChanged {
        /// Stable resource identifier.
        resource_id: String,
        /// Cached `(start, end)` pairs, ascending, half-open.
        ranges: Vec<(u64, u64)>,
        /// Total cached bytes.
        cached_bytes: u64,
    },
    /// The persisted index was unreadable and the store started cold.
    IndexRecovered {
        /// Stable resource identifier.
        resource_id: String,
        /// Why the index was discarded.
        reason: String,
    },
    /// The store's data file and index were deleted.
    Invalidated {
        /// Stable resource identifier.
        resource_id: String,
    },
}

impl StoreEvent {
    fn description(&self) -> &str {
        match self {
            StoreEvent::RangesChanged { .. } => "Cached ranges changed",
            StoreEvent::IndexRecovered { .. } => "Range index discarded",
            StoreEvent::Invalidated { .. } => "Scratch store invalidated",
        }
    }

    fn resource_id(&self) -> &str {
        match self {
            StoreEvent::RangesChanged { resource_id, .. }
            | StoreEvent::IndexRecovered { resource_id, .. }
            | StoreEvent::Invalidated { resource_id } => resource_id,
        }
    }
}

// ============================================================================
// Request Events
// ============================================================================

/// Events describing one parent byte-range request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum RequestEvent {
    /// Request planned and executing.
    Started {
        /// Request identifier.
        request_id: String,
        /// Stable resource identifier.
        resource_id: String,
        /// Requested range start.
        start: u64,
        /// Requested range end (exclusive).
        end: u64,
        /// Number of cache reads in the plan.
        cache_reads: usize,
        /// Number of network fetches in the plan.
        network_fetches: usize,
    },
    /// Bytes delivered to the caller.
    Completed {
        /// Request identifier.
        request_id: String,
        /// Stable resource identifier.
        resource_id: String,
        /// Bytes served from the scratch store.
        bytes_from_cache: u64,
        /// Bytes fetched over the network.
        bytes_from_network: u64,
    },
    /// Request failed; nothing was delivered.
    Failed {
        /// Request identifier.
        request_id: String,
        /// Stable resource identifier.
        resource_id: String,
        /// Human-readable error message.
        message: String,
    },
    /// Request cancelled by the caller.
    Cancelled {
        /// Request identifier.
        request_id: String,
        /// Stable resource identifier.
        resource_id: String,
    },
}

impl RequestEvent {
    fn description(&self) -> &str {
        match self {
            RequestEvent::Started { .. } => "Range request started",
            RequestEvent::Completed { .. } => "Range request completed",
            RequestEvent::Failed { .. } => "Range request failed",
            RequestEvent::Cancelled { .. } => "Range request cancelled",
        }
    }

    fn resource_id(&self) -> &str {
        match self {
            RequestEvent::Started { resource_id, .. }
            | RequestEvent::Completed { resource_id, .. }
            | RequestEvent::Failed { resource_id, .. }
            | RequestEvent::Cancelled { resource_id, .. } => resource_id,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to events.
///
/// Uses `tokio::sync::broadcast` internally:
/// - Multiple producers (clone the `EventBus`)
/// - Multiple consumers (each `subscribe()` creates a new receiver)
/// - Lagging detection (slow subscribers get `RecvError::Lagged`)
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

/// Type alias for event filter functions.
type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with predicate filtering.
///
/// # Example
///
/// ```rust
/// use core_runtime::events::{EventBus, EventStream, CoreEvent};
///
/// let event_bus = EventBus::new(100);
/// let stream = EventStream::new(event_bus.subscribe())
///     .filter(|event| event.resource_id() == "track-42");
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events that match `predicate` will be returned.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn accepts(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter (if any).
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.accepts(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without blocking.
    ///
    /// Returns `None` if no events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.accepts(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges_changed(resource_id: &str, end: u64) -> CoreEvent {
        CoreEvent::Store(StoreEvent::RangesChanged {
            resource_id: resource_id.to_string(),
            ranges: vec![(0, end)],
            cached_bytes: end,
        })
    }

    #[core_async::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[core_async::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(ranges_changed("r", 10)).is_err());
    }

    #[core_async::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = ranges_changed("track-1", 100);
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[core_async::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Request(_)));

        bus.emit(ranges_changed("track-1", 100)).ok();
        let cancelled = CoreEvent::Request(RequestEvent::Cancelled {
            request_id: "req-1".to_string(),
            resource_id: "track-1".to_string(),
        });
        bus.emit(cancelled.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), cancelled);
    }

    #[core_async::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(ranges_changed("track-1", i + 1)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity_and_description() {
        let failed = CoreEvent::Request(RequestEvent::Failed {
            request_id: "req-1".to_string(),
            resource_id: "track-1".to_string(),
            message: "Network fetch failed: timeout".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);
        assert_eq!(failed.description(), "Range request failed");
        assert_eq!(failed.resource_id(), "track-1");

        let recovered = CoreEvent::Store(StoreEvent::IndexRecovered {
            resource_id: "track-1".to_string(),
            reason: "truncated".to_string(),
        });
        assert_eq!(recovered.severity(), EventSeverity::Warning);

        assert_eq!(ranges_changed("t", 1).severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Request(RequestEvent::Completed {
            request_id: "req-9".to_string(),
            resource_id: "track-9".to_string(),
            bytes_from_cache: 50,
            bytes_from_network: 50,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("req-9"));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[core_async::test]
    async fn test_try_recv() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        let event = CoreEvent::Store(StoreEvent::Invalidated {
            resource_id: "track-1".to_string(),
        });
        bus.emit(event.clone()).ok();

        assert_eq!(stream.try_recv().unwrap().unwrap(), event);
    }
}
