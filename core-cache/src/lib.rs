//! # Progressive Range Cache
//!
//! Services arbitrary byte-range reads of remote resources from a local
//! scratch store, fetching only the bytes that are not cached yet.
//!
//! ## Overview
//!
//! Each remote resource gets one sparse data file plus a sidecar index of
//! the ranges it holds. A read request is split into cache reads and
//! network fetches; fetched bytes are written back before delivery, so a
//! later request (even in a later process) never downloads them again.
//!
//! ## Components
//!
//! - **Ranges** (`range`, `range_set`): half-open byte ranges, header
//!   parsing, and the merged set of cached ranges
//! - **Index** (`index`): atomic on-disk persistence of a range set
//! - **Scratch Store** (`store`): sparse data file plus its range set
//! - **Splitter** (`splitter`): plans a request as ordered subrequests
//! - **Fetcher** (`fetch`): ranged network fetch contract and HTTP adapter
//! - **Orchestrator** (`orchestrator`): executes plans, commits fetched
//!   bytes, assembles results
//! - **Registry** (`registry`): one store per resource identifier
//! - **Loader** (`loader`): entry point taking raw `Range` headers

pub mod config;
pub mod error;
pub mod fetch;
pub mod index;
pub mod loader;
pub mod orchestrator;
pub mod range;
pub mod range_set;
pub mod registry;
pub mod splitter;
pub mod stats;
pub mod store;

pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use fetch::{HttpRangeFetcher, RangeFetcher, ResourceLocator};
pub use index::{IndexLoad, RangeIndex};
pub use loader::ResourceLoader;
pub use orchestrator::{
    FetchOrchestrator, RequestHandle, RequestId, RequestState, ResultSink,
};
pub use range::{parse_content_range, parse_range_header, ByteRange, ContentRange};
pub use range_set::RangeSet;
pub use registry::StoreRegistry;
pub use splitter::{split, RequestPlan, Subrequest};
pub use stats::CacheStats;
pub use store::{storage_key, ScratchStore};
