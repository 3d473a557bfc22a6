//! # Request Splitter
//!
//! Turns one requested [`ByteRange`] into an ordered plan of cache reads and
//! network fetches against a [`RangeSet`] snapshot. Pure: no I/O, no locks.

use crate::range::ByteRange;
use crate::range_set::RangeSet;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One piece of a split request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subrequest {
    /// Bytes already present in the scratch store.
    CacheRead(ByteRange),
    /// Bytes that must be fetched from the remote resource.
    NetworkFetch(ByteRange),
}

impl Subrequest {
    pub fn range(&self) -> ByteRange {
        match self {
            Subrequest::CacheRead(r) | Subrequest::NetworkFetch(r) => *r,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Subrequest::NetworkFetch(_))
    }
}

impl fmt::Display for Subrequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subrequest::CacheRead(r) => write!(f, "CacheRead {}", r),
            Subrequest::NetworkFetch(r) => write!(f, "NetworkFetch {}", r),
        }
    }
}

/// Ordered subrequests for one parent request.
///
/// Subrequests are contiguous and ascending: concatenating their ranges
/// yields exactly the requested range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPlan {
    requested: ByteRange,
    subrequests: Vec<Subrequest>,
}

impl RequestPlan {
    pub fn requested(&self) -> ByteRange {
        self.requested
    }

    pub fn subrequests(&self) -> &[Subrequest] {
        &self.subrequests
    }

    pub fn len(&self) -> usize {
        self.subrequests.len()
    }

    /// An empty plan completes immediately with zero bytes.
    pub fn is_empty(&self) -> bool {
        self.subrequests.is_empty()
    }

    pub fn cache_reads(&self) -> usize {
        self.subrequests.iter().filter(|s| !s.is_network()).count()
    }

    pub fn network_fetches(&self) -> usize {
        self.subrequests.iter().filter(|s| s.is_network()).count()
    }

    /// Bytes the plan expects to serve from the store.
    pub fn cached_bytes(&self) -> u64 {
        self.subrequests
            .iter()
            .filter(|s| !s.is_network())
            .map(|s| s.range().len())
            .sum()
    }

    pub fn into_subrequests(self) -> Vec<Subrequest> {
        self.subrequests
    }
}

/// Split `requested` against `cached`.
///
/// Covered pieces become [`Subrequest::CacheRead`], gaps become
/// [`Subrequest::NetworkFetch`]. With `max_fetch_bytes` set, a gap longer
/// than the cap is emitted as consecutive fetches of at most that size.
/// Ranges beyond the resource's length are passed through unchanged.
pub fn split(requested: ByteRange, cached: &RangeSet, max_fetch_bytes: Option<u64>) -> RequestPlan {
    let mut subrequests = Vec::new();

    if !requested.is_empty() {
        let covered = cached.covering_ranges(&requested);
        let gaps = cached.gaps(&requested);

        // Both lists are ascending and disjoint; merge by start offset.
        let mut covered = covered.into_iter().peekable();
        let mut gaps = gaps.into_iter().peekable();
        loop {
            let take_cached = match (covered.peek(), gaps.peek()) {
                (Some(c), Some(g)) => c.start() < g.start(),
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };

            if take_cached {
                if let Some(c) = covered.next() {
                    subrequests.push(Subrequest::CacheRead(c));
                }
            } else if let Some(g) = gaps.next() {
                push_fetches(&mut subrequests, g, max_fetch_bytes);
            }
        }
    }

    RequestPlan {
        requested,
        subrequests,
    }
}

fn push_fetches(out: &mut Vec<Subrequest>, gap: ByteRange, max_fetch_bytes: Option<u64>) {
    let chunk = match max_fetch_bytes {
        Some(max) if max > 0 && gap.len() > max => max,
        _ => {
            out.push(Subrequest::NetworkFetch(gap));
            return;
        }
    };

    let mut start = gap.start();
    while start < gap.end() {
        let end = start.saturating_add(chunk).min(gap.end());
        out.push(Subrequest::NetworkFetch(ByteRange::from_bounds(start, end)));
        start = end;
    }
}
