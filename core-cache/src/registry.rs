//! Store registry
//!
//! Owns one [`ScratchStore`] per resource identifier. Stores open lazily on
//! first use and stay open until [`StoreRegistry::close_all`].
//!
//! Each identifier gets its own once-cell, so the registry lock is held only
//! to find the cell. Concurrent opens of one resource share a single open;
//! opens of different resources do not wait on each other.

use crate::config::CacheConfig;
use crate::error::Result;
use crate::range_set::RangeSet;
use crate::store::ScratchStore;
use core_async::sync::OnceCell;
use core_async::time::Duration;
use core_runtime::events::EventBus;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub struct StoreRegistry {
    directory: PathBuf,
    flush_debounce: Duration,
    event_bus: Option<EventBus>,
    stores: Mutex<HashMap<String, Arc<StoreSlot>>>,
}

type StoreSlot = OnceCell<Arc<ScratchStore>>;

impl StoreRegistry {
    /// Stores live under `<root>/<config.cache_directory>`.
    pub fn new(root: impl AsRef<Path>, config: &CacheConfig, event_bus: Option<EventBus>) -> Self {
        Self {
            directory: root.as_ref().join(&config.cache_directory),
            flush_debounce: config.index_flush_debounce,
            event_bus,
            stores: Mutex::new(HashMap::new()),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Return the open store for `resource_id`, opening it on first use.
    ///
    /// A failed open is retried by the next call.
    pub async fn get_or_open(&self, resource_id: &str) -> Result<Arc<ScratchStore>> {
        let slot = Arc::clone(
            self.stores
                .lock()
                .entry(resource_id.to_string())
                .or_default(),
        );

        let store = slot
            .get_or_try_init(|| async {
                ScratchStore::open(
                    resource_id,
                    &self.directory,
                    self.flush_debounce,
                    self.event_bus.clone(),
                )
                .await
                .map(Arc::new)
            })
            .await?;
        Ok(Arc::clone(store))
    }

    /// Return the store for `resource_id` only if it is already open.
    pub async fn get(&self, resource_id: &str) -> Option<Arc<ScratchStore>> {
        self.stores
            .lock()
            .get(resource_id)
            .and_then(|slot| slot.get().cloned())
    }

    /// Drop every cached byte for `resource_id`. The store stays usable.
    pub async fn invalidate(&self, resource_id: &str) -> Result<()> {
        self.get_or_open(resource_id).await?.invalidate().await
    }

    /// Snapshot of the ranges cached for `resource_id`.
    pub async fn cached_ranges(&self, resource_id: &str) -> Result<RangeSet> {
        Ok(self.get_or_open(resource_id).await?.ranges())
    }

    /// Number of open stores.
    pub async fn len(&self) -> usize {
        self.stores
            .lock()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Flush and close every open store. Returns the first failure after
    /// attempting all of them.
    pub async fn close_all(&self) -> Result<()> {
        let stores: Vec<_> = self
            .stores
            .lock()
            .drain()
            .filter_map(|(id, slot)| slot.get().cloned().map(|store| (id, store)))
            .collect();
        let count = stores.len();

        let mut first_error = None;
        for (resource_id, store) in stores {
            if let Err(e) = store.close().await {
                warn!(resource_id = %resource_id, error = %e, "Failed to close scratch store");
                first_error.get_or_insert(e);
            }
        }

        info!(stores = count, "Closed scratch stores");
        first_error.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("directory", &self.directory)
            .field("flush_debounce", &self.flush_debounce)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::ByteRange;
    use bytes::Bytes;

    fn registry(dir: &tempfile::TempDir) -> StoreRegistry {
        StoreRegistry::new(dir.path(), &CacheConfig::default(), None)
    }

    #[core_async::test]
    async fn test_get_or_open_reuses_store() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);

        let a = registry.get_or_open("track-1").await.unwrap();
        let b = registry.get_or_open("track-1").await.unwrap();
        let c = registry.get_or_open("track-2").await.unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(registry.len().await, 2);
        assert!(registry.directory().ends_with("range_cache"));
        assert!(registry.get("track-3").await.is_none());
    }

    #[core_async::test(flavor = "multi_thread")]
    async fn test_concurrent_opens_share_one_store() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(registry(&dir));

        let opens = (0..8).map(|i| {
            let registry = Arc::clone(&registry);
            core_async::spawn(async move {
                let id = if i % 2 == 0 { "track-1" } else { "track-2" };
                registry.get_or_open(id).await.unwrap()
            })
        });
        let stores: Vec<_> = futures::future::join_all(opens)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(registry.len().await, 2);
        for (i, store) in stores.iter().enumerate() {
            assert!(Arc::ptr_eq(store, &stores[i % 2]));
        }
    }

    #[core_async::test]
    async fn test_failed_open_is_retried() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::write(&root, b"not a directory").unwrap();
        let registry = StoreRegistry::new(&root, &CacheConfig::default(), None);

        assert!(registry.get_or_open("track-1").await.is_err());
        assert!(registry.is_empty().await);
        assert!(registry.get("track-1").await.is_none());

        std::fs::remove_file(&root).unwrap();
        registry.get_or_open("track-1").await.unwrap();
        assert_eq!(registry.len().await, 1);
    }

    #[core_async::test]
    async fn test_close_all_persists_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let range = ByteRange::new(0, 4).unwrap();

        let registry = registry(&dir);
        let store = registry.get_or_open("track-1").await.unwrap();
        store.write(range, Bytes::from_static(b"abcd")).await.unwrap();
        registry.close_all().await.unwrap();
        assert!(registry.is_empty().await);
        drop(store);

        let reopened = registry.cached_ranges("track-1").await.unwrap();
        assert_eq!(reopened, RangeSet::from_ranges([range]));
    }

    #[core_async::test]
    async fn test_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir);
        let store = registry.get_or_open("track-1").await.unwrap();
        store
            .write(ByteRange::new(0, 4).unwrap(), Bytes::from_static(b"abcd"))
            .await
            .unwrap();

        registry.invalidate("track-1").await.unwrap();
        assert!(registry.cached_ranges("track-1").await.unwrap().is_empty());
    }
}
