use crate::lru::LRUCache;
use crate::view::ByteView;
use std::sync::Mutex;

/// A snapshot of the usage counters of a [SharedCache](SharedCache).
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries currently stored.
    pub entries: usize,
    /// Memory allocated by the stored keys and values in bytes.
    pub used_bytes: usize,
    /// Percentage of reads which hit an entry.
    pub hit_rate: f32,
}

/// A thread-safe, lazily initialized cache of [ByteView](crate::view::ByteView) values.
///
/// This is a thin wrapper which guards an [LRUCache](crate::lru::LRUCache) with a single
/// mutex. The inner cache is only created once the first value is added, so a cache which
/// is never populated (e.g. a group on a node which owns none of its keys) costs nothing
/// but the mutex itself.
pub struct SharedCache {
    max_bytes: usize,
    inner: Mutex<Option<LRUCache<ByteView>>>,
}

impl SharedCache {
    /// Creates a new cache enforcing the given memory limit (0 = unbounded).
    pub fn new(max_bytes: usize) -> Self {
        SharedCache {
            max_bytes,
            inner: Mutex::new(None),
        }
    }

    /// Puts the given view into the cache, creating the inner LRU on first use.
    pub fn add(&self, key: &str, value: ByteView) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .get_or_insert_with(|| LRUCache::new(self.max_bytes))
            .add(key.to_owned(), value);
    }

    /// Returns a view onto the value stored for the given key.
    ///
    /// Note that this marks the entry as recently used. A cache which was never populated
    /// reports a miss without allocating any storage.
    pub fn get(&self, key: &str) -> Option<ByteView> {
        let mut inner = self.inner.lock().unwrap();
        inner.as_mut().and_then(|cache| cache.get(key).cloned())
    }

    /// Reports the current usage counters of this cache.
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        match inner.as_ref() {
            Some(cache) => CacheStats {
                entries: cache.len(),
                used_bytes: cache.current_bytes(),
                hit_rate: cache.hit_rate(),
            },
            None => CacheStats::default(),
        }
    }
}
