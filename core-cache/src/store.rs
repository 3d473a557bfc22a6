//! # Scratch Store
//!
//! Sparse, persistent byte container for one remote resource.
//!
//! ## Layout
//!
//! ```text
//! <cache_dir>/<sha256(resource_id)>.data    sparse data file, written at absolute offsets
//! <cache_dir>/<sha256(resource_id)>.index   sidecar RangeSet (see `index`)
//! ```
//!
//! ## Consistency
//!
//! Every range recorded in the [`RangeSet`] is backed by valid bytes in the
//! data file. `write` holds the store's writer lock across "write bytes, then
//! insert range", so readers never observe a range before its bytes. Reads
//! take the range set's read lock only long enough to check coverage.
//!
//! Index persistence is debounced: a background task coalesces bursts of
//! inserts into a single index write. The data file is synced before each
//! index write, so a durable index never names bytes still in the page
//! cache. [`ScratchStore::flush`] persists
//! immediately and [`ScratchStore::close`] flushes and stops the task.

use crate::error::{CacheError, Result};
use crate::index::{IndexLoad, RangeIndex};
use crate::range::ByteRange;
use crate::range_set::RangeSet;
use bytes::Bytes;
use core_async::sync::{CancellationToken, Mutex, Notify};
use core_async::task::{self, JoinHandle};
use core_async::time::{sleep, Duration};
use core_runtime::events::{CoreEvent, EventBus, StoreEvent};
use core_runtime::logging::strip_path;
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

const DATA_EXTENSION: &str = "data";
const INDEX_EXTENSION: &str = "index";

/// Stable on-disk name for a resource identifier.
///
/// Derived from the identifier, never from a URL, so rotating signed URLs
/// for one resource share a store.
pub fn storage_key(resource_id: &str) -> String {
    hex::encode(Sha256::digest(resource_id.as_bytes()))
}

/// State shared with the background flush task.
struct Shared {
    resource_id: String,
    index: RangeIndex,
    file: RwLock<Arc<File>>,
    ranges: RwLock<RangeSet>,
    dirty: AtomicBool,
    persist_lock: Mutex<()>,
    changed: Notify,
}

impl Shared {
    async fn persist(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        if !self.dirty.swap(false, Ordering::AcqRel) {
            return Ok(());
        }

        // Snapshot first: every range in it has already been written.
        let snapshot = self.ranges.read().clone();
        let file = Arc::clone(&*self.file.read());
        let index = self.index.clone();
        let result = task::spawn_blocking(move || -> Result<()> {
            file.sync_data()?;
            index.persist(&snapshot)
        })
            .await
            .map_err(|e| CacheError::Internal(format!("index writer panicked: {}", e)))
            .and_then(|r| r);

        if let Err(e) = &result {
            self.dirty.store(true, Ordering::Release);
            warn!(resource_id = %self.resource_id, error = %e, "Failed to persist range index");
        }
        result
    }
}

/// Persistent byte store plus its [`RangeSet`] for one resource.
pub struct ScratchStore {
    shared: Arc<Shared>,
    data_path: PathBuf,
    write_lock: Mutex<()>,
    event_bus: Option<EventBus>,
    shutdown: CancellationToken,
    flusher: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl ScratchStore {
    /// Locate or create the store for `resource_id` under `directory`.
    ///
    /// An unreadable or inconsistent index is discarded and the store starts
    /// cold. Only failure to create the directory or the data file is an
    /// error.
    #[instrument(skip_all, fields(resource_id = %resource_id))]
    pub async fn open(
        resource_id: &str,
        directory: &Path,
        flush_debounce: Duration,
        event_bus: Option<EventBus>,
    ) -> Result<Self> {
        core_async::fs::create_dir_all(directory).await?;

        let key = storage_key(resource_id);
        let data_path = directory.join(format!("{}.{}", key, DATA_EXTENSION));
        let index = RangeIndex::new(directory.join(format!("{}.{}", key, INDEX_EXTENSION)));

        let (file, ranges, discarded) = {
            let data_path = data_path.clone();
            let index = index.clone();
            task::spawn_blocking(move || open_blocking(&data_path, &index))
                .await
                .map_err(|e| CacheError::Internal(format!("store open panicked: {}", e)))??
        };

        if let Some(reason) = &discarded {
            warn!(reason = %reason, "Discarding range index, starting cold");
            if let Some(bus) = &event_bus {
                bus.emit(CoreEvent::Store(StoreEvent::IndexRecovered {
                    resource_id: resource_id.to_string(),
                    reason: reason.clone(),
                }))
                .ok();
            }
        }

        info!(
            file = %strip_path(&data_path.to_string_lossy()),
            ranges = ranges.len(),
            cached_bytes = ranges.total_bytes(),
            "Opened scratch store"
        );

        let shared = Arc::new(Shared {
            resource_id: resource_id.to_string(),
            index,
            file: RwLock::new(Arc::new(file)),
            ranges: RwLock::new(ranges),
            // A discarded index is rewritten as empty on the next flush.
            dirty: AtomicBool::new(discarded.is_some()),
            persist_lock: Mutex::new(()),
            changed: Notify::new(),
        });

        let shutdown = CancellationToken::new();
        let flusher = task::spawn(flush_loop(
            Arc::clone(&shared),
            flush_debounce,
            shutdown.clone(),
        ));

        Ok(Self {
            shared,
            data_path,
            write_lock: Mutex::new(()),
            event_bus,
            shutdown,
            flusher: parking_lot::Mutex::new(Some(flusher)),
        })
    }

    pub fn resource_id(&self) -> &str {
        &self.shared.resource_id
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn index_path(&self) -> &Path {
        self.shared.index.path()
    }

    /// Snapshot of the cached ranges.
    pub fn ranges(&self) -> RangeSet {
        self.shared.ranges.read().clone()
    }

    pub fn contains(&self, range: &ByteRange) -> bool {
        self.shared.ranges.read().contains(range)
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    pub fn cached_bytes(&self) -> u64 {
        self.shared.ranges.read().total_bytes()
    }

    /// Read exactly `range.len()` bytes at `range.start()`.
    ///
    /// # Errors
    ///
    /// `StorageIoFailed` if `range` is not fully cached or the file read
    /// fails. Callers recover by refetching the range.
    pub async fn read(&self, range: ByteRange) -> Result<Bytes> {
        if range.is_empty() {
            return Ok(Bytes::new());
        }
        if !self.contains(&range) {
            return Err(CacheError::StorageIoFailed(format!(
                "{} is not cached",
                range
            )));
        }

        let len = usize::try_from(range.len())
            .map_err(|_| CacheError::MalformedRange(format!("{} is too large to buffer", range)))?;
        let file = Arc::clone(&*self.shared.file.read());

        task::spawn_blocking(move || -> Result<Bytes> {
            let mut buf = vec![0u8; len];
            positional::read_exact_at(&file, &mut buf, range.start())?;
            Ok(Bytes::from(buf))
        })
        .await
        .map_err(|e| CacheError::Internal(format!("store reader panicked: {}", e)))?
    }

    /// Write `bytes` at `range.start()` and record `range` as cached.
    ///
    /// Rewriting bytes that are already cached is an idempotent merge. A
    /// closed store rejects writes with `StorageIoFailed`.
    pub async fn write(&self, range: ByteRange, bytes: Bytes) -> Result<()> {
        if bytes.len() as u64 != range.len() {
            return Err(CacheError::MalformedRange(format!(
                "{} needs {} bytes, got {}",
                range,
                range.len(),
                bytes.len()
            )));
        }
        if range.is_empty() {
            return Ok(());
        }

        let _writer = self.write_lock.lock().await;
        if self.is_closed() {
            return Err(CacheError::StorageIoFailed(format!(
                "store for {} is closed",
                self.shared.resource_id
            )));
        }

        let file = Arc::clone(&*self.shared.file.read());
        task::spawn_blocking(move || positional::write_all_at(&file, &bytes, range.start()))
            .await
            .map_err(|e| CacheError::Internal(format!("store writer panicked: {}", e)))??;

        let snapshot = {
            let mut ranges = self.shared.ranges.write();
            if !ranges.insert(range) {
                return Ok(());
            }
            ranges.clone()
        };

        debug!(
            resource_id = %self.shared.resource_id,
            range = %range,
            ranges = snapshot.len(),
            "Committed range to scratch store"
        );

        self.shared.dirty.store(true, Ordering::Release);
        self.shared.changed.notify_one();
        self.emit_ranges(&snapshot);
        Ok(())
    }

    /// Persist the index now if it has unsaved changes.
    pub async fn flush(&self) -> Result<()> {
        self.shared.persist().await
    }

    /// Delete the data file and index, leaving an empty, usable store.
    #[instrument(skip(self), fields(resource_id = %self.shared.resource_id))]
    pub async fn invalidate(&self) -> Result<()> {
        let _writer = self.write_lock.lock().await;
        let _persist = self.shared.persist_lock.lock().await;

        let data_path = self.data_path.clone();
        let index = self.shared.index.clone();
        let file = task::spawn_blocking(move || -> Result<File> {
            index.remove()?;
            match std::fs::remove_file(&data_path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            open_data_file(&data_path)
        })
        .await
        .map_err(|e| CacheError::Internal(format!("store invalidation panicked: {}", e)))??;

        *self.shared.file.write() = Arc::new(file);
        self.shared.ranges.write().clear();
        self.shared.dirty.store(false, Ordering::Release);

        info!("Invalidated scratch store");
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Store(StoreEvent::Invalidated {
                resource_id: self.shared.resource_id.clone(),
            }))
            .ok();
        }
        self.emit_ranges(&RangeSet::new());
        Ok(())
    }

    /// Flush pending index changes and stop the background flusher.
    ///
    /// Reads keep working afterwards; writes are rejected.
    pub async fn close(&self) -> Result<()> {
        self.shutdown.cancel();
        // Wait out a write already holding the writer lock.
        drop(self.write_lock.lock().await);
        let flusher = self.flusher.lock().take();
        if let Some(handle) = flusher {
            handle.await.ok();
        }
        self.flush().await
    }

    fn emit_ranges(&self, snapshot: &RangeSet) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Store(StoreEvent::RangesChanged {
                resource_id: self.shared.resource_id.clone(),
                ranges: snapshot.to_pairs(),
                cached_bytes: snapshot.total_bytes(),
            }))
            .ok();
        }
    }
}

impl Drop for ScratchStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for ScratchStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchStore")
            .field("resource_id", &self.shared.resource_id)
            .field("data_path", &self.data_path)
            .field("ranges", &*self.shared.ranges.read())
            .finish()
    }
}

/// Coalesce change notifications into index writes.
async fn flush_loop(shared: Arc<Shared>, debounce: Duration, shutdown: CancellationToken) {
    loop {
        core_async::select! {
            _ = shutdown.cancelled() => break,
            _ = shared.changed.notified() => {}
        }

        // Restart the quiet period on every further change.
        loop {
            core_async::select! {
                _ = shutdown.cancelled() => return,
                _ = shared.changed.notified() => continue,
                _ = sleep(debounce) => break,
            }
        }

        shared.persist().await.ok();
    }
}

fn open_data_file(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

/// Open the data file and load a usable range set.
///
/// Returns the reason when a persisted index had to be discarded.
fn open_blocking(data_path: &Path, index: &RangeIndex) -> Result<(File, RangeSet, Option<String>)> {
    let data_existed = data_path.exists();
    let file = open_data_file(data_path)?;
    let data_len = file.metadata()?.len();

    let (ranges, discarded) = match index.load() {
        Ok(IndexLoad::Missing) => (RangeSet::new(), None),
        Ok(IndexLoad::Loaded(set)) if set.is_empty() => (set, None),
        Ok(IndexLoad::Loaded(_)) if !data_existed => (
            RangeSet::new(),
            Some("data file is missing".to_string()),
        ),
        Ok(IndexLoad::Loaded(set)) if set.max_end() > data_len => (
            RangeSet::new(),
            Some(format!(
                "index covers up to {} but data file holds {} bytes",
                set.max_end(),
                data_len
            )),
        ),
        Ok(IndexLoad::Loaded(set)) => (set, None),
        Err(e) => (RangeSet::new(), Some(e.to_string())),
    };

    Ok((file, ranges, discarded))
}

/// Offset-addressed file I/O that never moves a shared cursor.
mod positional {
    use std::fs::File;
    use std::io;

    #[cfg(unix)]
    pub fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::read_exact_at(file, buf, offset)
    }

    #[cfg(unix)]
    pub fn write_all_at(file: &File, buf: &[u8], offset: u64) -> io::Result<()> {
        std::os::unix::fs::FileExt::write_all_at(file, buf, offset)
    }

    #[cfg(windows)]
    pub fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        while !buf.is_empty() {
            match file.seek_read(buf, offset)? {
                0 => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "scratch file shorter than cached range",
                    ))
                }
                n => {
                    buf = &mut buf[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }

    #[cfg(windows)]
    pub fn write_all_at(file: &File, mut buf: &[u8], mut offset: u64) -> io::Result<()> {
        use std::os::windows::fs::FileExt;
        while !buf.is_empty() {
            match file.seek_write(buf, offset)? {
                0 => return Err(io::Error::from(io::ErrorKind::WriteZero)),
                n => {
                    buf = &buf[n..];
                    offset += n as u64;
                }
            }
        }
        Ok(())
    }
}
