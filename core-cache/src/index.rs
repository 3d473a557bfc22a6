//! Sidecar range index.
//!
//! The index is the serialized [`RangeSet`] of one scratch store. Writes go
//! to a temporary file in the same directory and are renamed over the old
//! index, so a crash leaves either the previous or the new index on disk.
//! The directory is synced after the rename so the new entry itself is
//! durable.
//!
//! All functions here block; callers run them on the blocking pool.

use crate::error::{CacheError, Result};
use crate::range_set::RangeSet;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Outcome of reading an index from disk.
#[derive(Debug, PartialEq, Eq)]
pub enum IndexLoad {
    /// No index file exists yet.
    Missing,
    /// Index decoded successfully.
    Loaded(RangeSet),
}

#[derive(Debug, Clone)]
pub struct RangeIndex {
    path: PathBuf,
}

impl RangeIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and decode the index.
    ///
    /// # Errors
    ///
    /// - `IndexCorrupt` when the file exists but does not decode
    /// - `StorageIoFailed` when the file exists but cannot be read
    pub fn load(&self) -> Result<IndexLoad> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(IndexLoad::Missing),
            Err(e) => return Err(e.into()),
        };

        let set = RangeSet::deserialize(&bytes)?;
        debug!(ranges = set.len(), bytes = set.total_bytes(), "Loaded range index");
        Ok(IndexLoad::Loaded(set))
    }

    /// Atomically replace the index with `set`.
    pub fn persist(&self, set: &RangeSet) -> Result<()> {
        let dir = self.path.parent().ok_or_else(|| {
            CacheError::StorageIoFailed(format!("index path {:?} has no parent", self.path))
        })?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".index-")
            .tempfile_in(dir)?;
        tmp.write_all(&set.serialize())?;
        tmp.as_file().sync_data()?;
        tmp.persist(&self.path)
            .map_err(|e| CacheError::StorageIoFailed(format!("index rename failed: {}", e)))?;
        sync_dir(dir)?;

        debug!(ranges = set.len(), "Persisted range index");
        Ok(())
    }

    /// Delete the index. A missing file is not an error.
    pub fn remove(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<()> {
    fs::File::open(dir)?.sync_all()?;
    Ok(())
}

// std cannot open a directory handle for syncing on this platform.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::ByteRange;

    fn r(start: u64, end: u64) -> ByteRange {
        ByteRange::new(start, end).unwrap()
    }

    #[test]
    fn test_missing_index() {
        let dir = tempfile::tempdir().unwrap();
        let index = RangeIndex::new(dir.path().join("a.index"));
        assert_eq!(index.load().unwrap(), IndexLoad::Missing);
        index.remove().unwrap();
    }

    #[test]
    fn test_persist_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let index = RangeIndex::new(dir.path().join("a.index"));
        let set = RangeSet::from_ranges([r(0, 50), r(80, 100)]);

        index.persist(&set).unwrap();
        assert_eq!(index.load().unwrap(), IndexLoad::Loaded(set));

        // Overwrite leaves no stray temp files behind
        index.persist(&RangeSet::from_ranges([r(0, 100)])).unwrap();
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_sync_dir_on_index_directory() {
        let dir = tempfile::tempdir().unwrap();
        sync_dir(dir.path()).unwrap();
        assert!(sync_dir(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_truncated_index_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.index");
        let bytes = RangeSet::from_ranges([r(0, 50)]).serialize();
        fs::write(&path, &bytes[..10]).unwrap();

        let index = RangeIndex::new(&path);
        assert!(matches!(index.load(), Err(CacheError::IndexCorrupt(_))));
    }
}
