use linked_hash_map::LinkedHashMap;

/// Tells the cache how much memory a value occupies.
pub trait ByteSize {
    /// Reports the memory charged against the cache budget for this value, in bytes.
    ///
    /// An estimate of the dominant allocation is good enough - for a string that is its
    /// heap buffer, while the handful of stack bytes for pointer, length and capacity can
    /// be ignored. What matters is that eviction kicks in roughly where the operator's
    /// budget says it should.
    fn allocated_size(&self) -> usize;
}

impl ByteSize for String {
    fn allocated_size(&self) -> usize {
        self.capacity()
    }
}

impl ByteSize for Vec<u8> {
    fn allocated_size(&self) -> usize {
        self.capacity()
    }
}

/// Invoked once for each entry which is evicted from the cache.
pub type EvictionListener<V> = Box<dyn FnMut(&str, &V) + Send>;

/// A map which trades its oldest entries for staying below a memory budget.
///
/// Under the budget, this is an ordinary key/value store. Once the memory allocated by
/// keys and values grows beyond **max_bytes**, the least recently used entries are
/// evicted until the limit is honored again - hence the name LRU cache. Passing **0** as
/// **max_bytes** disables the limit entirely.
///
/// Every access counts: both **get** and **add** move the touched entry to the most recent
/// end of the internal list, so the entry evicted by [remove_oldest](LRUCache::remove_oldest)
/// is always the one untouched for the longest time.
///
/// Note that a value is never rejected for being too large. Adding an entry whose cost alone
/// exceeds **max_bytes** will insert and then immediately evict it, leaving the cache empty.
/// This keeps **add** a total operation so that callers never have to handle a refusal.
///
/// # Examples
/// ```
/// # use callisto::lru::LRUCache;
/// // Specifies a cache which can hold up to 10 bytes of keys and values...
/// let mut lru = LRUCache::new(10);
///
/// lru.add("k1".to_owned(), "1234".to_owned());
/// lru.add("k2".to_owned(), "56".to_owned());
/// assert_eq!(lru.get("k1").unwrap(), &"1234".to_owned());
///
/// // ...adding a third entry exceeds the limit and drops the least recently used one.
/// lru.add("k3".to_owned(), "78".to_owned());
/// assert_eq!(lru.get("k2"), None);
/// assert_eq!(lru.len(), 2);
/// ```
pub struct LRUCache<V: ByteSize> {
    max_bytes: usize,
    current_bytes: usize,
    reads: usize,
    hits: usize,
    writes: usize,
    map: LinkedHashMap<String, Entry<V>>,
    eviction_listener: Option<EvictionListener<V>>,
}

struct Entry<V: ByteSize> {
    cost: usize,
    value: V,
}

impl<V: ByteSize> LRUCache<V> {
    /// Creates a new cache which evicts entries once the memory allocated by keys and values
    /// exceeds **max_bytes**.
    ///
    /// A **max_bytes** of **0** creates an unbounded cache which never evicts on its own.
    pub fn new(max_bytes: usize) -> Self {
        LRUCache {
            max_bytes,
            current_bytes: 0,
            reads: 0,
            hits: 0,
            writes: 0,
            map: LinkedHashMap::new(),
            eviction_listener: None,
        }
    }

    /// Creates a new cache just like [new](LRUCache::new) which additionally invokes the given
    /// listener once per evicted entry.
    ///
    /// # Examples
    /// ```
    /// # use callisto::lru::LRUCache;
    /// # use std::sync::{Arc, Mutex};
    /// let evicted = Arc::new(Mutex::new(Vec::new()));
    /// let log = evicted.clone();
    /// let mut lru = LRUCache::with_eviction_listener(10, move |key, _value: &String| {
    ///     log.lock().unwrap().push(key.to_owned());
    /// });
    ///
    /// lru.add("k1".to_owned(), "1234".to_owned());
    /// lru.add("k2".to_owned(), "56".to_owned());
    /// lru.add("k3".to_owned(), "78".to_owned());
    ///
    /// assert_eq!(evicted.lock().unwrap().as_slice(), &["k1".to_owned()]);
    /// ```
    pub fn with_eviction_listener(
        max_bytes: usize,
        listener: impl FnMut(&str, &V) + Send + 'static,
    ) -> Self {
        let mut cache = LRUCache::new(max_bytes);
        cache.eviction_listener = Some(Box::new(listener));
        cache
    }

    /// Looks the given key up, returning **None** on a miss.
    ///
    /// A successful lookup marks the entry as most recently used. No eviction ever happens
    /// here.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.reads += 1;

        match self.map.get_refresh(key) {
            Some(entry) => {
                self.hits += 1;
                Some(&entry.value)
            }
            None => None,
        }
    }

    /// Inserts or replaces the value under the given key.
    ///
    /// A replaced entry only shifts the memory accounting by the size difference; a new
    /// entry is charged its key length plus value size. Either way the entry becomes the
    /// most recently used one. Afterwards, entries are evicted from the old end of the
    /// list until the memory limit is honored again.
    pub fn add(&mut self, key: String, value: V) {
        self.writes += 1;

        match self.map.get_refresh(&key) {
            Some(entry) => {
                let cost = key.len() + value.allocated_size();
                self.current_bytes = self.current_bytes - entry.cost + cost;
                entry.cost = cost;
                entry.value = value;
            }
            None => {
                let cost = key.len() + value.allocated_size();
                self.current_bytes += cost;
                let _ = self.map.insert(key, Entry { cost, value });
            }
        }

        self.enforce_limit();
    }

    /// Evicts entries until **current_bytes** no longer exceeds **max_bytes**.
    fn enforce_limit(&mut self) {
        while self.max_bytes > 0 && self.current_bytes > self.max_bytes && !self.map.is_empty() {
            self.remove_oldest();
        }
    }

    /// Evicts the least recently used entry (if any) and notifies the eviction listener.
    pub fn remove_oldest(&mut self) {
        if let Some((key, entry)) = self.map.pop_front() {
            self.current_bytes -= entry.cost;
            if let Some(listener) = &mut self.eviction_listener {
                listener(&key, &entry.value);
            }
        }
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Reports whether the cache currently holds no entries at all.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Returns the configured memory budget.
    ///
    /// A value of **0** indicates an unbounded cache.
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }

    /// Returns the amount of memory allocated by the keys and values currently in the cache.
    pub fn current_bytes(&self) -> usize {
        self.current_bytes
    }

    /// Drops every entry and zeroes the usage counters.
    ///
    /// A flush is a reset, not an eviction - the eviction listener stays silent for the
    /// dropped entries.
    pub fn flush(&mut self) {
        self.map.clear();
        self.current_bytes = 0;
        self.reads = 0;
        self.hits = 0;
        self.writes = 0;
    }

    /// Counts the lookups performed since creation or the last flush.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Counts the insertions performed since creation or the last flush.
    pub fn writes(&self) -> usize {
        self.writes
    }

    /// Returns the cache hit rate in percent (0 if nothing was read yet).
    pub fn hit_rate(&self) -> f32 {
        if self.reads == 0 {
            return 0.;
        }

        self.hits as f32 / self.reads as f32 * 100.
    }
}

#[cfg(test)]
mod tests {
    use super::LRUCache;
    use std::sync::{Arc, Mutex};

    #[test]
    fn oldest_entries_are_evicted_first() {
        let mut lru = LRUCache::new(10);

        // "k1" + "1234" costs 6 bytes, the other two entries cost 4 bytes each...
        lru.add("k1".to_owned(), "1234".to_owned());
        lru.add("k2".to_owned(), "56".to_owned());

        // ...so adding the third entry exceeds the 10 byte limit and evicts "k1" which was
        // touched least recently.
        lru.add("k3".to_owned(), "78".to_owned());

        assert_eq!(lru.get("k1"), None);
        assert_eq!(lru.get("k2").unwrap(), &"56".to_owned());
        assert_eq!(lru.get("k3").unwrap(), &"78".to_owned());
        assert_eq!(lru.len(), 2);
    }

    #[test]
    fn a_read_saves_an_entry_from_eviction() {
        let mut lru = LRUCache::new(10);

        lru.add("k1".to_owned(), "1234".to_owned());
        lru.add("k2".to_owned(), "56".to_owned());

        // Touching "k1" makes "k2" the least recently used entry...
        assert_eq!(lru.get("k1").is_some(), true);

        // ...which is therefore the one sacrificed for "k3".
        lru.add("k3".to_owned(), "78".to_owned());

        assert_eq!(lru.get("k2"), None);
        assert_eq!(lru.get("k1").unwrap(), &"1234".to_owned());
        assert_eq!(lru.get("k3").unwrap(), &"78".to_owned());
    }

    #[test]
    fn byte_accounting_is_exact() {
        let mut lru = LRUCache::new(0);

        lru.add("key1".to_owned(), "value1".to_owned());
        lru.add("key2".to_owned(), "value2".to_owned());
        assert_eq!(lru.current_bytes(), 2 * (4 + 6));

        // Replacing a value only adjusts the accounting by the size difference...
        lru.add("key1".to_owned(), "v1".to_owned());
        assert_eq!(lru.current_bytes(), (4 + 2) + (4 + 6));

        // ...and evicting an entry removes its exact cost. The replacement above also
        // refreshed "key1", so "key2" is the one evicted here.
        lru.remove_oldest();
        assert_eq!(lru.current_bytes(), 4 + 2);
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn unbounded_cache_never_evicts() {
        let mut lru = LRUCache::new(0);
        for i in 0..1000 {
            lru.add(format!("key-{}", i), "X".repeat(128));
        }
        assert_eq!(lru.len(), 1000);
    }

    #[test]
    fn removal_order_is_insertion_order_without_reads() {
        let mut lru = LRUCache::new(0);
        lru.add("a".to_owned(), "1".to_owned());
        lru.add("b".to_owned(), "2".to_owned());
        lru.add("c".to_owned(), "3".to_owned());

        lru.remove_oldest();
        assert_eq!(lru.get("a"), None);
        lru.remove_oldest();
        assert_eq!(lru.get("b"), None);
        assert_eq!(lru.get("c").is_some(), true);
    }

    #[test]
    fn oversized_entries_are_accepted_and_immediately_evicted() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let log = evicted.clone();
        let mut lru = LRUCache::with_eviction_listener(4, move |key, _value: &String| {
            log.lock().unwrap().push(key.to_owned());
        });

        // The entry alone costs 14 bytes and can never fit. It is still accepted, which
        // leaves the cache empty once add returns...
        lru.add("monster".to_owned(), "1234567".to_owned());
        assert_eq!(lru.len(), 0);
        assert_eq!(lru.current_bytes(), 0);

        // ...and the eviction listener saw it exactly once.
        assert_eq!(evicted.lock().unwrap().as_slice(), &["monster".to_owned()]);
    }

    #[test]
    fn eviction_listener_sees_every_evicted_entry() {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let log = evicted.clone();
        let mut lru = LRUCache::with_eviction_listener(7, move |key, value: &String| {
            log.lock().unwrap().push((key.to_owned(), value.clone()));
        });

        // Each entry costs 4 bytes but only 7 fit, so every add beyond the first one
        // pushes the previous entry out...
        lru.add("a".to_owned(), "123".to_owned());
        lru.add("b".to_owned(), "456".to_owned());
        lru.add("c".to_owned(), "789".to_owned());

        assert_eq!(
            evicted.lock().unwrap().as_slice(),
            &[
                ("a".to_owned(), "123".to_owned()),
                ("b".to_owned(), "456".to_owned())
            ]
        );
        assert_eq!(lru.len(), 1);
    }

    #[test]
    fn usage_counters_track_reads_writes_and_hits() {
        let mut lru = LRUCache::new(0);

        lru.add("a".to_owned(), "1".to_owned());
        lru.add("b".to_owned(), "2".to_owned());

        assert_eq!(lru.get("a").is_some(), true);
        assert_eq!(lru.get("b").is_some(), true);
        assert_eq!(lru.get("c").is_none(), true);
        assert_eq!(lru.get("d").is_none(), true);

        // 2 of 4 reads hit an entry...
        assert_eq!(lru.writes(), 2);
        assert_eq!(lru.reads(), 4);
        assert_eq!(lru.hit_rate().round() as i32, 50);

        // ...and a flush resets entries and metrics alike.
        lru.flush();
        assert_eq!(lru.len(), 0);
        assert_eq!(lru.reads(), 0);
        assert_eq!(lru.hit_rate().round() as i32, 0);
    }
}
