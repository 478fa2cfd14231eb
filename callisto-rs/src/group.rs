//! Provides the **Group**, a named cache namespace, and the registry which keeps all groups.
//!
//! A group combines the three building blocks of the system into the read path visible to
//! users: the byte-bounded local store ([SharedCache](crate::lru::SharedCache)), the peer
//! routing ([PeerPicker](crate::peers::PeerPicker)) and the duplicate suppression
//! ([Coalescer](crate::coalesce::Coalescer)). A [Group::get](Group::get) resolves in this
//! order:
//!
//! 1. **Local hit** - the value is served straight from the local store.
//! 2. **Peer fetch** - if a peer picker is registered and routes the key to a remote node,
//!    the value is fetched from there. Such values are *not* placed in the local store:
//!    each key keeps a single authoritative copy on its owning node, so a change of the
//!    peer set can never leave conflicting copies behind.
//! 3. **Loader** - the user supplied [Loader](Loader) materializes the value from the
//!    authoritative source (after a peer error we also degrade to this step). Successful
//!    loads are placed in the local store.
//!
//! Steps 2 and 3 run inside the coalescer, so any number of concurrent callers missing the
//! same key cost exactly one peer fetch or loader call between them.
//!
//! # Examples
//!
//! ```
//! # use callisto::group::{loader_fn, GroupRegistry};
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry = GroupRegistry::new();
//! let group = registry
//!     .create_group(
//!         "scores",
//!         1024,
//!         loader_fn(|key| match key {
//!             "Tom" => Ok(b"630".to_vec()),
//!             _ => Err(anyhow::anyhow!("{} does not exist", key)),
//!         }),
//!     )
//!     .unwrap();
//!
//! assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
//! assert_eq!(group.get("Bob").await.is_err(), true);
//! # }
//! ```
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use async_trait::async_trait;

use crate::coalesce::Coalescer;
use crate::lru::{CacheStats, SharedCache};
use crate::peers::PeerPicker;
use crate::platform::Platform;
use crate::view::ByteView;

/// Enumerates the ways a [Group::get](Group::get) can fail.
///
/// The enum is cloneable so that a single failure can be handed to every caller coalesced
/// onto the same load.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// An empty key was passed to [Group::get](Group::get).
    #[error("an empty key cannot be fetched or cached")]
    EmptyKey,

    /// The loader reported that it cannot provide a value for the key.
    #[error("loading '{key}' failed: {message}")]
    LoaderFailed {
        /// The key for which the load was attempted.
        key: String,
        /// The message of the underlying loader error.
        message: String,
    },

    /// The coalesced load vanished before producing a result (see
    /// [Abandoned](crate::coalesce::Abandoned)).
    #[error("the load for '{0}' was abandoned before it completed")]
    LoadAbandoned(String),
}

/// Materializes values from the authoritative source backing a group.
///
/// This is the callback through which the cache reaches whatever system of record it sits
/// in front of - a database, a search index, a computation. Both outcomes are passed
/// through verbatim: bytes are cached and served, errors are surfaced to the caller.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Produces the value for the given key.
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>>;
}

struct FnLoader<F> {
    callback: F,
}

#[async_trait]
impl<F> Loader for FnLoader<F>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync,
{
    async fn load(&self, key: &str) -> anyhow::Result<Vec<u8>> {
        (self.callback)(key)
    }
}

/// Wraps a plain function as a [Loader](Loader).
///
/// # Examples
///
/// ```
/// # use callisto::group::loader_fn;
/// let loader = loader_fn(|key| Ok(format!("value of {}", key).into_bytes()));
/// ```
pub fn loader_fn<F>(callback: F) -> Box<dyn Loader>
where
    F: Fn(&str) -> anyhow::Result<Vec<u8>> + Send + Sync + 'static,
{
    Box::new(FnLoader { callback })
}

/// A named cache namespace with its own loader and local storage.
///
/// Groups are created via [GroupRegistry::create_group](GroupRegistry::create_group) and are
/// shared as **Arc** - all operations take **&self**.
pub struct Group {
    name: String,
    loader: Box<dyn Loader>,
    store: SharedCache,
    flights: Coalescer<Result<ByteView, CacheError>>,
    picker: OnceLock<Arc<dyn PeerPicker>>,
}

impl Group {
    /// Returns the name of this group.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attaches the peer picker which routes keys to their owning nodes.
    ///
    /// This can be done at most once per group. A group without a picker serves all misses
    /// through its loader, which is the natural mode for a single node setup.
    pub fn register_peers(&self, picker: Arc<dyn PeerPicker>) -> anyhow::Result<()> {
        self.picker
            .set(picker)
            .map_err(|_| anyhow::anyhow!("The peers of group '{}' are already registered.", self.name))
    }

    /// Returns the value cached for the given key, fetching or loading it if necessary.
    ///
    /// See the [module docs](crate::group) for the exact resolution order.
    pub async fn get(&self, key: &str) -> Result<ByteView, CacheError> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey);
        }

        if let Some(view) = self.store.get(key) {
            log::debug!("[{}] hit for '{}'", self.name, key);
            return Ok(view);
        }

        match self.flights.run(key, self.load(key)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(CacheError::LoadAbandoned(key.to_owned())),
        }
    }

    /// Performs the actual load of a missed key. Runs inside the coalescer.
    async fn load(&self, key: &str) -> Result<ByteView, CacheError> {
        if let Some(picker) = self.picker.get() {
            if let Some(peer) = picker.pick_peer(key) {
                match peer.fetch(&self.name, key).await {
                    // The owning node caches the value, we just pass it through...
                    Ok(bytes) => return Ok(ByteView::from(bytes)),
                    Err(error) => log::warn!(
                        "[{}] fetching '{}' from the owning peer failed: {}. \
                         Falling back to the local loader...",
                        self.name,
                        key,
                        error
                    ),
                }
            }
        }

        match self.loader.load(key).await {
            Ok(bytes) => {
                let view = ByteView::from(bytes);
                self.store.add(key, view.clone());
                Ok(view)
            }
            Err(error) => Err(CacheError::LoaderFailed {
                key: key.to_owned(),
                message: error.to_string(),
            }),
        }
    }

    /// Reports the usage counters of the local store of this group.
    pub fn stats(&self) -> CacheStats {
        self.store.stats()
    }
}

/// Keeps all groups of the process, addressable by name.
///
/// The registry is an explicit object (usually installed as a
/// [Platform](crate::platform::Platform) service via [install](GroupRegistry::install))
/// rather than global mutable state, so tests can spin up as many independent registries
/// as they like.
pub struct GroupRegistry {
    groups: Mutex<HashMap<String, Arc<Group>>>,
}

impl GroupRegistry {
    /// Creates a new and empty registry.
    pub fn new() -> Arc<Self> {
        Arc::new(GroupRegistry {
            groups: Mutex::new(HashMap::new()),
        })
    }

    /// Creates a registry and registers it in the given platform.
    pub fn install(platform: &Arc<Platform>) -> Arc<Self> {
        let registry = GroupRegistry::new();
        platform.register::<GroupRegistry>(registry.clone());

        registry
    }

    /// Creates a group with the given name, local memory budget and loader.
    ///
    /// # Errors
    /// Fails if a group with this name already exists. Two groups concurrently answering
    /// for the same name would route requests unpredictably, so duplicates are rejected
    /// outright instead of silently replacing each other.
    pub fn create_group(
        &self,
        name: &str,
        max_bytes: usize,
        loader: Box<dyn Loader>,
    ) -> anyhow::Result<Arc<Group>> {
        let mut groups = self.groups.lock().unwrap();

        if groups.contains_key(name) {
            return Err(anyhow::anyhow!("A group named '{}' already exists.", name));
        }

        let group = Arc::new(Group {
            name: name.to_owned(),
            loader,
            store: SharedCache::new(max_bytes),
            flights: Coalescer::new(),
            picker: OnceLock::new(),
        });
        let _ = groups.insert(name.to_owned(), group.clone());

        log::info!(
            "Created group '{}' with a local budget of {}.",
            name,
            crate::fmt::format_size(max_bytes)
        );

        Ok(group)
    }

    /// Looks up the group with the given name.
    pub fn find(&self, name: &str) -> Option<Arc<Group>> {
        self.groups.lock().unwrap().get(name).cloned()
    }

    /// Lists all currently registered groups.
    pub fn groups(&self) -> Vec<Arc<Group>> {
        self.groups.lock().unwrap().values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{loader_fn, GroupRegistry, CacheError};
    use crate::peers::{PeerClient, PeerPicker};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn sample_registry() -> Arc<GroupRegistry> {
        GroupRegistry::new()
    }

    #[test]
    fn values_are_loaded_once_and_then_served_from_the_cache() {
        crate::testing::test_async(async {
            let loads = Arc::new(AtomicUsize::new(0));
            let counter = loads.clone();

            let registry = sample_registry();
            let group = registry
                .create_group(
                    "scores",
                    2 * 1024,
                    loader_fn(move |key| {
                        let _ = counter.fetch_add(1, Ordering::SeqCst);
                        match key {
                            "Tom" => Ok(b"630".to_vec()),
                            "Jack" => Ok(b"589".to_vec()),
                            _ => Err(anyhow::anyhow!("{} does not exist", key)),
                        }
                    }),
                )
                .unwrap();

            // The first get materializes the value through the loader...
            assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
            assert_eq!(loads.load(Ordering::SeqCst), 1);

            // ...any further get is a pure cache hit.
            assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
            assert_eq!(loads.load(Ordering::SeqCst), 1);

            // Unknown keys surface the loader error and are never cached.
            assert_eq!(
                group.get("Unknown").await,
                Err(CacheError::LoaderFailed {
                    key: "Unknown".to_owned(),
                    message: "Unknown does not exist".to_owned()
                })
            );
            assert_eq!(group.stats().entries, 1);
        });
    }

    #[test]
    fn an_empty_key_is_rejected() {
        crate::testing::test_async(async {
            let registry = sample_registry();
            let group = registry
                .create_group("empty", 1024, loader_fn(|_| Ok(Vec::new())))
                .unwrap();

            assert_eq!(group.get("").await, Err(CacheError::EmptyKey));
        });
    }

    #[test]
    fn concurrent_misses_share_one_loader_call() {
        crate::testing::test_async(async {
            let loads = Arc::new(AtomicUsize::new(0));
            let counter = loads.clone();

            let registry = sample_registry();
            let group = registry
                .create_group(
                    "slow",
                    1024,
                    Box::new(SlowLoader {
                        loads: counter,
                        delay: Duration::from_millis(100),
                    }),
                )
                .unwrap();

            let mut tasks = Vec::new();
            for _ in 0..10 {
                let group = group.clone();
                tasks.push(tokio::spawn(async move {
                    group.get("Tom").await.unwrap()
                }));
            }

            for task in tasks {
                assert_eq!(task.await.unwrap().as_slice(), b"630");
            }

            // Ten concurrent callers, one call into the backend.
            assert_eq!(loads.load(Ordering::SeqCst), 1);
        });
    }

    struct SlowLoader {
        loads: Arc<AtomicUsize>,
        delay: Duration,
    }

    #[async_trait]
    impl super::Loader for SlowLoader {
        async fn load(&self, _key: &str) -> anyhow::Result<Vec<u8>> {
            let _ = self.loads.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(b"630".to_vec())
        }
    }

    /// A picker which always routes to a peer that fails every fetch.
    struct BrokenPeerPicker;
    struct BrokenPeer;

    #[async_trait]
    impl PeerClient for BrokenPeer {
        async fn fetch(&self, _group: &str, _key: &str) -> anyhow::Result<Vec<u8>> {
            Err(anyhow::anyhow!("connection refused"))
        }
    }

    impl PeerPicker for BrokenPeerPicker {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerClient>> {
            Some(Arc::new(BrokenPeer))
        }
    }

    #[test]
    fn a_failing_peer_degrades_to_the_local_loader() {
        crate::testing::test_async(async {
            let registry = sample_registry();
            let group = registry
                .create_group("scores", 1024, loader_fn(|_| Ok(b"630".to_vec())))
                .unwrap();
            group.register_peers(Arc::new(BrokenPeerPicker)).unwrap();

            // The peer errors, so the loader provides the value...
            assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");

            // ...which is cached locally like any loaded value.
            assert_eq!(group.stats().entries, 1);
        });
    }

    /// A picker whose ring always selects the local node itself.
    struct SelfPicker;

    impl PeerPicker for SelfPicker {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerClient>> {
            None
        }
    }

    #[test]
    fn keys_owned_by_the_local_node_are_loaded_and_cached() {
        crate::testing::test_async(async {
            let registry = sample_registry();
            let group = registry
                .create_group("scores", 1024, loader_fn(|_| Ok(b"630".to_vec())))
                .unwrap();
            group.register_peers(Arc::new(SelfPicker)).unwrap();

            assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"630");
            assert_eq!(group.stats().entries, 1);
        });
    }

    /// A picker handing out a peer which records fetches and serves a fixed value.
    struct RecordingPeerPicker {
        fetches: Arc<AtomicUsize>,
    }
    struct RecordingPeer {
        fetches: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl PeerClient for RecordingPeer {
        async fn fetch(&self, _group: &str, _key: &str) -> anyhow::Result<Vec<u8>> {
            let _ = self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(b"from-peer".to_vec())
        }
    }

    impl PeerPicker for RecordingPeerPicker {
        fn pick_peer(&self, _key: &str) -> Option<Arc<dyn PeerClient>> {
            Some(Arc::new(RecordingPeer {
                fetches: self.fetches.clone(),
            }))
        }
    }

    #[test]
    fn peer_fetched_values_are_not_cached_locally() {
        crate::testing::test_async(async {
            let fetches = Arc::new(AtomicUsize::new(0));

            let registry = sample_registry();
            let group = registry
                .create_group(
                    "scores",
                    1024,
                    loader_fn(|_| Err(anyhow::anyhow!("must not be called"))),
                )
                .unwrap();
            group
                .register_peers(Arc::new(RecordingPeerPicker {
                    fetches: fetches.clone(),
                }))
                .unwrap();

            // Every get goes to the owning peer...
            assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"from-peer");
            assert_eq!(group.get("Tom").await.unwrap().as_slice(), b"from-peer");

            // ...as the non-owning node intentionally keeps no local copy.
            assert_eq!(fetches.load(Ordering::SeqCst), 2);
            assert_eq!(group.stats().entries, 0);
        });
    }

    #[test]
    fn peers_can_only_be_registered_once() {
        let registry = sample_registry();
        let group = registry
            .create_group("once", 1024, loader_fn(|_| Ok(Vec::new())))
            .unwrap();

        assert_eq!(group.register_peers(Arc::new(SelfPicker)).is_ok(), true);
        assert_eq!(group.register_peers(Arc::new(SelfPicker)).is_err(), true);
    }

    #[test]
    fn duplicate_group_names_are_rejected() {
        let registry = sample_registry();
        let _ = registry
            .create_group("scores", 1024, loader_fn(|_| Ok(Vec::new())))
            .unwrap();

        assert_eq!(
            registry
                .create_group("scores", 1024, loader_fn(|_| Ok(Vec::new())))
                .is_err(),
            true
        );

        // The original group is still the one being served.
        assert_eq!(registry.find("scores").is_some(), true);
        assert_eq!(registry.groups().len(), 1);
    }

    #[test]
    fn unknown_groups_are_not_found() {
        let registry = sample_registry();
        assert_eq!(registry.find("nope").is_none(), true);
    }
}
