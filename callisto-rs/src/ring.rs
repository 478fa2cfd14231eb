//! Provides the consistent hash ring which assigns each key to its owning peer.
//!
//! Every peer contributes a fixed number of virtual nodes (**replicas**) to the ring. A key is
//! owned by the peer whose virtual node follows the key's hash on the ring (wrapping around at
//! the end). This keeps the key → owner mapping stable: when a peer joins or leaves, only the
//! keys between its virtual nodes and their predecessors move, which is roughly a 1/n share
//! per peer instead of a full reshuffle.
//!
//! The hash function is pluggable. By default we use CRC32 (IEEE) which is cheap, spreads
//! realistic peer counts well enough and - most importantly - is trivially reproducible in
//! other languages, so heterogeneous deployments agree on the ring layout.
use std::collections::HashMap;

/// The number of virtual nodes each peer contributes unless specified otherwise.
pub const DEFAULT_REPLICAS: usize = 50;

/// Computes the placement of a byte sequence on the ring.
pub type HashFn = Box<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// Maps keys to peer identifiers via a ring of virtual nodes.
///
/// # Examples
///
/// ```
/// # use callisto::ring::HashRing;
/// let mut ring = HashRing::new(50);
/// ring.add(&["http://node-a", "http://node-b", "http://node-c"]);
///
/// // The owner of a key is deterministic...
/// let owner = ring.get("Tom").unwrap().to_owned();
/// assert_eq!(ring.get("Tom").unwrap(), owner);
///
/// // ...and an empty ring owns nothing.
/// let empty = HashRing::new(50);
/// assert_eq!(empty.get("Tom"), None);
/// ```
pub struct HashRing {
    replicas: usize,
    hash: HashFn,
    points: Vec<u32>,
    owners: HashMap<u32, String>,
}

impl HashRing {
    /// Creates an empty ring where each peer will contribute the given number of virtual
    /// nodes, using the default CRC32 hash.
    pub fn new(replicas: usize) -> Self {
        HashRing::with_hash(replicas, Box::new(|data| crc32fast::hash(data)))
    }

    /// Creates an empty ring with a custom hash function.
    ///
    /// This is mainly used by tests which need a predictable ring layout, but also permits
    /// to swap in a stronger hash if CRC32 ever turns out to clump for a given peer naming
    /// scheme.
    pub fn with_hash(replicas: usize, hash: HashFn) -> Self {
        HashRing {
            replicas,
            hash,
            points: Vec::new(),
            owners: HashMap::new(),
        }
    }

    /// Adds the given peers to the ring.
    ///
    /// For each peer we place **replicas** virtual nodes, hashed over the decimal virtual
    /// node index concatenated with the peer id. Should two virtual nodes collide on the
    /// same hash, the peer added later takes the slot - with a 32 bit ring and realistic
    /// peer counts this is rare enough to simply be defined away.
    pub fn add<S: AsRef<str>>(&mut self, peers: &[S]) {
        for peer in peers {
            let peer = peer.as_ref();
            for index in 0..self.replicas {
                let point = (self.hash)(format!("{}{}", index, peer).as_bytes());
                self.points.push(point);
                let _ = self.owners.insert(point, peer.to_owned());
            }
        }

        self.points.sort_unstable();
    }

    /// Returns the id of the peer owning the given key or **None** if the ring is empty.
    pub fn get(&self, key: &str) -> Option<&str> {
        if self.points.is_empty() {
            return None;
        }

        let hash = (self.hash)(key.as_bytes());

        // The owner is the first virtual node at or after the key's hash. past-the-end
        // wraps around to the first node, closing the ring.
        let index = self.points.partition_point(|&point| point < hash);
        let point = self.points[index % self.points.len()];

        self.owners.get(&point).map(|owner| owner.as_str())
    }

    /// Determines if any peers have been added.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
