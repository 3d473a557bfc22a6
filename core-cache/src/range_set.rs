//! # Range Set
//!
//! Sorted, disjoint, merged collection of [`ByteRange`]s describing which
//! bytes of a resource are present in its scratch store.
//!
//! Invariant: elements are strictly increasing by `start` and no two
//! elements overlap or touch. [`RangeSet::insert`] restores the invariant by
//! merging, and [`RangeSet::deserialize`] refuses any input that violates it.

use crate::error::{CacheError, Result};
use crate::range::ByteRange;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Encoded size of one `(start, end)` pair.
pub const PAIR_LEN: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSet {
    ranges: Vec<ByteRange>,
}

impl RangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from arbitrary ranges, merging as needed.
    pub fn from_ranges<I: IntoIterator<Item = ByteRange>>(ranges: I) -> Self {
        let mut set = Self::new();
        for range in ranges {
            set.insert(range);
        }
        set
    }

    /// Insert `range`, merging it with every overlapping or adjacent element.
    ///
    /// Returns `true` if the set changed. Empty ranges are ignored.
    pub fn insert(&mut self, range: ByteRange) -> bool {
        if range.is_empty() {
            return false;
        }

        // First element that overlaps or touches `range`.
        let first = self.ranges.partition_point(|r| r.end() < range.start());
        let mut last = first;
        while last < self.ranges.len() && self.ranges[last].start() <= range.end() {
            last += 1;
        }

        if first == last {
            self.ranges.insert(first, range);
            return true;
        }

        let start = range.start().min(self.ranges[first].start());
        let end = range.end().max(self.ranges[last - 1].end());
        if last - first == 1 && self.ranges[first].contains_range(&range) {
            return false;
        }

        self.ranges
            .splice(first..last, std::iter::once(ByteRange::from_bounds(start, end)));
        true
    }

    /// `true` if every byte of `range` is present.
    pub fn contains(&self, range: &ByteRange) -> bool {
        if range.is_empty() {
            return true;
        }
        let idx = self.ranges.partition_point(|r| r.start() <= range.start());
        idx > 0 && self.ranges[idx - 1].contains_range(range)
    }

    /// Maximal sub-intervals of `query` that are not present, ascending.
    pub fn gaps(&self, query: &ByteRange) -> Vec<ByteRange> {
        let mut gaps = Vec::new();
        if query.is_empty() {
            return gaps;
        }

        let mut cursor = query.start();
        for r in self.touching(query) {
            if r.start() > cursor {
                gaps.push(ByteRange::from_bounds(cursor, r.start()));
            }
            cursor = cursor.max(r.end());
        }
        if cursor < query.end() {
            gaps.push(ByteRange::from_bounds(cursor, query.end()));
        }
        gaps
    }

    /// Present sub-intervals of `query`, clipped to its bounds, ascending.
    pub fn covering_ranges(&self, query: &ByteRange) -> Vec<ByteRange> {
        if query.is_empty() {
            return Vec::new();
        }
        self.touching(query)
            .filter_map(|r| r.intersect(query))
            .collect()
    }

    fn touching<'a>(&'a self, query: &'a ByteRange) -> impl Iterator<Item = &'a ByteRange> + 'a {
        let idx = self.ranges.partition_point(|r| r.end() <= query.start());
        self.ranges[idx..]
            .iter()
            .take_while(move |r| r.start() < query.end())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ByteRange> {
        self.ranges.iter()
    }

    pub fn as_slice(&self) -> &[ByteRange] {
        &self.ranges
    }

    /// Number of disjoint ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total number of bytes covered.
    pub fn total_bytes(&self) -> u64 {
        self.ranges.iter().map(ByteRange::len).sum()
    }

    /// Highest covered offset (exclusive), or 0 when empty.
    pub fn max_end(&self) -> u64 {
        self.ranges.last().map(ByteRange::end).unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// `(start, end)` pairs in ascending order.
    pub fn to_pairs(&self) -> Vec<(u64, u64)> {
        self.ranges.iter().map(|r| (r.start(), r.end())).collect()
    }

    /// Encode as little-endian `u64` pairs, ascending.
    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.ranges.len() * PAIR_LEN);
        for r in &self.ranges {
            buf.put_u64_le(r.start());
            buf.put_u64_le(r.end());
        }
        buf.freeze()
    }

    /// Decode an index written by [`RangeSet::serialize`].
    ///
    /// Rejects truncated input, empty ranges, and pairs that are not
    /// strictly increasing and separated by at least one byte.
    pub fn deserialize(mut bytes: &[u8]) -> Result<Self> {
        if bytes.len() % PAIR_LEN != 0 {
            return Err(CacheError::IndexCorrupt(format!(
                "length {} is not a multiple of {}",
                bytes.len(),
                PAIR_LEN
            )));
        }

        let mut ranges: Vec<ByteRange> = Vec::with_capacity(bytes.len() / PAIR_LEN);
        while bytes.has_remaining() {
            let start = bytes.get_u64_le();
            let end = bytes.get_u64_le();
            if start >= end {
                return Err(CacheError::IndexCorrupt(format!(
                    "pair #{} ({}, {}) is empty or inverted",
                    ranges.len(),
                    start,
                    end
                )));
            }
            if let Some(prev) = ranges.last() {
                if start <= prev.end() {
                    return Err(CacheError::IndexCorrupt(format!(
                        "pair #{} starts at {} but previous ends at {}",
                        ranges.len(),
                        start,
                        prev.end()
                    )));
                }
            }
            ranges.push(ByteRange::from_bounds(start, end));
        }

        Ok(Self { ranges })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: u64, end: u64) -> ByteRange {
        ByteRange::new(start, end).unwrap()
    }

    fn assert_invariant(set: &RangeSet) {
        for pair in set.as_slice().windows(2) {
            assert!(pair[0].end() < pair[1].start(), "{:?}", set);
        }
        assert!(set.iter().all(|r| !r.is_empty()));
    }

    #[test]
    fn test_insert_disjoint_keeps_order() {
        let mut set = RangeSet::new();
        assert!(set.insert(r(50, 60)));
        assert!(set.insert(r(0, 10)));
        assert!(set.insert(r(20, 30)));
        assert_eq!(set.as_slice(), &[r(0, 10), r(20, 30), r(50, 60)]);
        assert_invariant(&set);
    }

    #[test]
    fn test_insert_merges_adjacent() {
        let mut set = RangeSet::from_ranges([r(0, 50), r(80, 100)]);
        set.insert(r(50, 80));
        assert_eq!(set.as_slice(), &[r(0, 100)]);
    }

    #[test]
    fn test_insert_merges_many_neighbors() {
        let mut set = RangeSet::from_ranges([r(0, 5), r(10, 15), r(20, 25), r(40, 45)]);
        set.insert(r(3, 22));
        assert_eq!(set.as_slice(), &[r(0, 25), r(40, 45)]);
        assert_invariant(&set);
    }

    #[test]
    fn test_insert_is_idempotent() {
        let mut once = RangeSet::new();
        once.insert(r(10, 20));
        let mut twice = once.clone();
        assert!(!twice.insert(r(10, 20)));
        assert!(!twice.insert(r(12, 18)));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_insert_is_commutative() {
        let cases = [
            (r(0, 10), r(5, 15)),
            (r(0, 10), r(10, 20)),
            (r(0, 10), r(11, 20)),
            (r(5, 6), r(0, 100)),
            (r(3, 3), r(0, 2)),
        ];
        for (a, b) in cases {
            let ab = RangeSet::from_ranges([a, b]);
            let ba = RangeSet::from_ranges([b, a]);
            assert_eq!(ab, ba, "{} / {}", a, b);
            assert_invariant(&ab);
        }
    }

    #[test]
    fn test_insert_ignores_empty() {
        let mut set = RangeSet::new();
        assert!(!set.insert(r(7, 7)));
        assert!(set.is_empty());
    }

    #[test]
    fn test_contains() {
        let set = RangeSet::from_ranges([r(0, 50), r(80, 100)]);
        assert!(set.contains(&r(0, 50)));
        assert!(set.contains(&r(85, 90)));
        assert!(!set.contains(&r(40, 60)));
        assert!(!set.contains(&r(100, 101)));
        assert!(set.contains(&r(60, 60)));
    }

    #[test]
    fn test_gaps_and_covering() {
        let set = RangeSet::from_ranges([r(0, 50), r(80, 100)]);
        let q = r(0, 120);

        assert_eq!(set.gaps(&q), vec![r(50, 80), r(100, 120)]);
        assert_eq!(set.covering_ranges(&q), vec![r(0, 50), r(80, 100)]);

        let q = r(40, 90);
        assert_eq!(set.gaps(&q), vec![r(50, 80)]);
        assert_eq!(set.covering_ranges(&q), vec![r(40, 50), r(80, 90)]);
    }

    #[test]
    fn test_gaps_on_empty_set_and_query() {
        let set = RangeSet::new();
        assert_eq!(set.gaps(&r(0, 100)), vec![r(0, 100)]);
        assert!(set.gaps(&r(5, 5)).is_empty());
        assert!(set.covering_ranges(&r(0, 100)).is_empty());
    }

    #[test]
    fn test_gaps_union_covering_reconstructs_query() {
        let set = RangeSet::from_ranges([r(10, 20), r(30, 40), r(41, 60), r(90, 95)]);
        for (start, end) in [(0, 100), (10, 20), (15, 35), (40, 41), (60, 90), (0, 5), (95, 200)] {
            let q = r(start, end);
            let mut pieces: Vec<ByteRange> = set.gaps(&q);
            pieces.extend(set.covering_ranges(&q));
            pieces.sort();

            let mut cursor = q.start();
            for piece in &pieces {
                assert_eq!(piece.start(), cursor, "hole or overlap in {}", q);
                cursor = piece.end();
            }
            assert_eq!(cursor, q.end());
        }
    }

    #[test]
    fn test_serialize_round_trip() {
        let set = RangeSet::from_ranges([r(0, 50), r(80, 100), r(1 << 40, (1 << 40) + 7)]);
        let bytes = set.serialize();
        assert_eq!(bytes.len(), 3 * PAIR_LEN);
        assert_eq!(RangeSet::deserialize(&bytes).unwrap(), set);
        assert_eq!(RangeSet::deserialize(&[]).unwrap(), RangeSet::new());
    }

    #[test]
    fn test_deserialize_rejects_truncated() {
        let bytes = RangeSet::from_ranges([r(0, 10)]).serialize();
        assert!(matches!(
            RangeSet::deserialize(&bytes[..PAIR_LEN - 3]),
            Err(CacheError::IndexCorrupt(_))
        ));
    }

    #[test]
    fn test_deserialize_rejects_bad_ordering() {
        let encode = |pairs: &[(u64, u64)]| {
            let mut buf = BytesMut::new();
            for (s, e) in pairs {
                buf.put_u64_le(*s);
                buf.put_u64_le(*e);
            }
            buf.freeze()
        };

        for pairs in [
            vec![(20, 30), (0, 10)],
            vec![(0, 10), (5, 20)],
            vec![(0, 10), (10, 20)],
            vec![(10, 10)],
            vec![(10, 5)],
        ] {
            assert!(
                RangeSet::deserialize(&encode(&pairs)).is_err(),
                "{:?} should be rejected",
                pairs
            );
        }
    }
}
