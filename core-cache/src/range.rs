//! # Byte Ranges
//!
//! Half-open byte intervals and the narrow header parsers that produce them.
//!
//! A [`ByteRange`] is `[start, end)`. HTTP headers use inclusive end offsets,
//! so conversion happens only at the edges: [`parse_range_header`] on the way
//! in and [`ByteRange::to_header_value`] on the way out.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open interval `[start, end)` over byte offsets.
///
/// Deserialization goes through [`ByteRange::new`], so `start <= end` holds
/// for every value in the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "RawByteRange")]
pub struct ByteRange {
    start: u64,
    end: u64,
}

#[derive(Deserialize)]
struct RawByteRange {
    start: u64,
    end: u64,
}

impl TryFrom<RawByteRange> for ByteRange {
    type Error = CacheError;

    fn try_from(raw: RawByteRange) -> Result<Self> {
        ByteRange::new(raw.start, raw.end)
    }
}

impl ByteRange {
    /// Create a range, rejecting `start > end`.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(CacheError::MalformedRange(format!(
                "start {} is past end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// Bounds already known to be ordered (derived from valid ranges).
    pub(crate) fn from_bounds(start: u64, end: u64) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }

    /// Create a range from a start offset and a length.
    pub fn with_len(start: u64, len: u64) -> Result<Self> {
        let end = start.checked_add(len).ok_or_else(|| {
            CacheError::MalformedRange(format!("{} + {} overflows", start, len))
        })?;
        Ok(Self { start, end })
    }

    pub fn start(&self) -> u64 {
        self.start
    }

    pub fn end(&self) -> u64 {
        self.end
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// `true` if the two ranges share at least one byte.
    pub fn overlaps(&self, other: &ByteRange) -> bool {
        self.start.max(other.start) < self.end.min(other.end)
    }

    /// `true` if one range ends exactly where the other begins.
    pub fn is_adjacent(&self, other: &ByteRange) -> bool {
        self.end == other.start || other.end == self.start
    }

    /// `true` if `other` lies entirely within `self`.
    pub fn contains_range(&self, other: &ByteRange) -> bool {
        other.start >= self.start && other.end <= self.end
    }

    /// Overlapping part of two ranges, if any.
    pub fn intersect(&self, other: &ByteRange) -> Option<ByteRange> {
        let start = self.start.max(other.start);
        let end = self.end.min(other.end);
        (start < end).then_some(ByteRange { start, end })
    }

    /// Outbound `Range` header value (`bytes=first-last`, inclusive).
    ///
    /// Returns `None` for an empty range, which has no HTTP spelling.
    pub fn to_header_value(&self) -> Option<String> {
        if self.is_empty() {
            return None;
        }
        Some(format!("bytes={}-{}", self.start, self.end - 1))
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Parse a request `Range` header value such as `bytes=0-1023`.
///
/// Supported forms:
/// - `bytes=a-b` (inclusive `b`, converted to `[a, b+1)`)
/// - `bytes=a-` (needs `resource_len`)
/// - `bytes=-n` suffix (needs `resource_len`)
///
/// Multiple ranges in one header are rejected. A range beyond
/// `resource_len` is passed through; the fetcher validates lengths.
pub fn parse_range_header(value: &str, resource_len: Option<u64>) -> Result<ByteRange> {
    let malformed = |reason: &str| CacheError::MalformedRange(format!("{:?}: {}", value, reason));

    let spec = value.trim();
    let spec = spec
        .get(..6)
        .filter(|unit| unit.eq_ignore_ascii_case("bytes="))
        .map(|_| &spec[6..])
        .ok_or_else(|| malformed("expected bytes= unit"))?;

    if spec.contains(',') {
        return Err(malformed("multiple ranges are not supported"));
    }

    let (first, last) = spec
        .split_once('-')
        .ok_or_else(|| malformed("missing '-' separator"))?;
    let (first, last) = (first.trim(), last.trim());

    match (first.is_empty(), last.is_empty()) {
        (true, true) => Err(malformed("empty range")),
        (true, false) => {
            let suffix = parse_offset(last).ok_or_else(|| malformed("invalid suffix length"))?;
            if suffix == 0 {
                return Err(malformed("zero-length suffix is not satisfiable"));
            }
            let len = resource_len.ok_or_else(|| malformed("suffix range needs resource length"))?;
            ByteRange::new(len.saturating_sub(suffix), len)
        }
        (false, true) => {
            let start = parse_offset(first).ok_or_else(|| malformed("invalid start offset"))?;
            let len =
                resource_len.ok_or_else(|| malformed("open-ended range needs resource length"))?;
            ByteRange::new(start, len).map_err(|_| malformed("start is past resource length"))
        }
        (false, false) => {
            let start = parse_offset(first).ok_or_else(|| malformed("invalid start offset"))?;
            let last = parse_offset(last).ok_or_else(|| malformed("invalid end offset"))?;
            if last < start {
                return Err(malformed("end precedes start"));
            }
            let end = last
                .checked_add(1)
                .ok_or_else(|| malformed("end offset overflows"))?;
            ByteRange::new(start, end)
        }
    }
}

/// Parsed `Content-Range` response header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// Bytes carried by the response, half-open.
    pub range: ByteRange,
    /// Full resource length, if the server disclosed it.
    pub total: Option<u64>,
}

/// Parse a response `Content-Range` value such as `bytes 0-99/1000`.
pub fn parse_content_range(value: &str) -> Result<ContentRange> {
    let malformed =
        || CacheError::MalformedRange(format!("invalid Content-Range {:?}", value));

    let rest = value.trim().strip_prefix("bytes ").ok_or_else(malformed)?;
    let (span, total) = rest.split_once('/').ok_or_else(malformed)?;
    let (first, last) = span.trim().split_once('-').ok_or_else(malformed)?;

    let start = parse_offset(first).ok_or_else(malformed)?;
    let last = parse_offset(last).ok_or_else(malformed)?;
    if last < start {
        return Err(malformed());
    }
    let end = last.checked_add(1).ok_or_else(malformed)?;

    let total = match total.trim() {
        "*" => None,
        t => Some(parse_offset(t).ok_or_else(malformed)?),
    };

    Ok(ContentRange {
        range: ByteRange::new(start, end)?,
        total,
    })
}

/// Digits only; rejects signs so `-5` can never parse as an offset.
fn parse_offset(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(start: u64, end: u64) -> ByteRange {
        ByteRange::new(start, end).unwrap()
    }

    #[test]
    fn test_new_rejects_inverted() {
        assert!(matches!(
            ByteRange::new(10, 5),
            Err(CacheError::MalformedRange(_))
        ));
        assert!(r(5, 5).is_empty());
        assert_eq!(r(5, 15).len(), 10);
    }

    #[test]
    fn test_with_len_overflow() {
        assert!(ByteRange::with_len(u64::MAX, 1).is_err());
        assert_eq!(ByteRange::with_len(10, 5).unwrap(), r(10, 15));
    }

    #[test]
    fn test_overlap_and_adjacency() {
        assert!(r(0, 10).overlaps(&r(5, 15)));
        assert!(!r(0, 10).overlaps(&r(10, 20)));
        assert!(r(0, 10).is_adjacent(&r(10, 20)));
        assert!(r(10, 20).is_adjacent(&r(0, 10)));
        assert!(!r(0, 10).is_adjacent(&r(11, 20)));
    }

    #[test]
    fn test_intersect() {
        assert_eq!(r(0, 10).intersect(&r(5, 15)), Some(r(5, 10)));
        assert_eq!(r(0, 10).intersect(&r(10, 15)), None);
        assert!(r(0, 100).contains_range(&r(20, 30)));
        assert!(!r(0, 100).contains_range(&r(90, 110)));
    }

    #[test]
    fn test_header_value() {
        assert_eq!(r(0, 100).to_header_value().as_deref(), Some("bytes=0-99"));
        assert_eq!(r(7, 7).to_header_value(), None);
    }

    #[test]
    fn test_parse_closed_range() {
        assert_eq!(parse_range_header("bytes=0-99", None).unwrap(), r(0, 100));
        assert_eq!(parse_range_header(" BYTES=5-5 ", None).unwrap(), r(5, 6));
    }

    #[test]
    fn test_parse_open_and_suffix() {
        assert_eq!(parse_range_header("bytes=100-", Some(1000)).unwrap(), r(100, 1000));
        assert_eq!(parse_range_header("bytes=-200", Some(1000)).unwrap(), r(800, 1000));
        assert_eq!(parse_range_header("bytes=-2000", Some(1000)).unwrap(), r(0, 1000));
        assert!(parse_range_header("bytes=100-", None).is_err());
        assert!(parse_range_header("bytes=-10", None).is_err());
    }

    #[test]
    fn test_parse_passes_through_beyond_length() {
        assert_eq!(
            parse_range_header("bytes=5000-5999", Some(1000)).unwrap(),
            r(5000, 6000)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        for bad in [
            "",
            "bytes=",
            "bytes=-",
            "bytes=-0",
            "items=0-10",
            "bytes=10-5",
            "bytes=a-b",
            "bytes=0-10,20-30",
            "bytes=+1-5",
            "bytes=0-18446744073709551615",
        ] {
            assert!(
                matches!(parse_range_header(bad, Some(100)), Err(CacheError::MalformedRange(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_deserialize_validates_bounds() {
        let range: ByteRange = serde_json::from_str(r#"{"start":10,"end":20}"#).unwrap();
        assert_eq!(range, r(10, 20));
        assert_eq!(
            serde_json::to_string(&range).unwrap(),
            r#"{"start":10,"end":20}"#
        );

        let err = serde_json::from_str::<ByteRange>(r#"{"start":10,"end":5}"#).unwrap_err();
        assert!(err.to_string().contains("past end"));

        let sub = serde_json::from_str::<crate::splitter::Subrequest>(
            r#"{"NetworkFetch":{"start":9,"end":3}}"#,
        );
        assert!(sub.is_err());
    }

    #[test]
    fn test_parse_content_range() {
        let cr = parse_content_range("bytes 0-99/1000").unwrap();
        assert_eq!(cr.range, r(0, 100));
        assert_eq!(cr.total, Some(1000));

        let cr = parse_content_range("bytes 10-19/*").unwrap();
        assert_eq!(cr.total, None);

        assert!(parse_content_range("bytes */1000").is_err());
        assert!(parse_content_range("0-99/1000").is_err());
    }
}
