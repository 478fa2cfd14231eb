//! The recency-bounded storage below every cache namespace.
//!
//! [LRUCache](LRUCache) is the single threaded engine: it stores any value implementing
//! [ByteSize](ByteSize) and sheds the least recently used entries whenever a configured
//! memory budget would be exceeded. [SharedCache](SharedCache) puts a mutex (and lazy
//! initialization) around it so that a [Group](crate::group::Group) can be hit from any
//! number of tasks.
mod lru_cache;
mod shared;

pub use lru_cache::ByteSize;
pub use lru_cache::EvictionListener;
pub use lru_cache::LRUCache;
pub use shared::CacheStats;
pub use shared::SharedCache;
