//! Defines the capability interfaces which connect a [Group](crate::group::Group) to its peers.
//!
//! The group itself is transport agnostic: all it needs is something which tells it *who* owns
//! a key ([PeerPicker](PeerPicker)) and something which can *fetch* a value from that owner
//! ([PeerClient](PeerClient)). The canonical implementation of both is the
//! [HttpPool](crate::http::HttpPool); tests plug in trivial stand-ins.
use std::sync::Arc;

use async_trait::async_trait;

/// Fetches a value for a key of a group from a remote peer.
///
/// This is the only operation in the whole system which crosses a network boundary.
#[async_trait]
pub trait PeerClient: Send + Sync {
    /// Requests the value stored for the given key of the given group from the peer.
    ///
    /// Returns the raw value bytes on success. Any transport level problem (connection
    /// failure, non-OK status, truncated body) is reported as an error - the caller decides
    /// whether and how to degrade.
    async fn fetch(&self, group: &str, key: &str) -> anyhow::Result<Vec<u8>>;
}

/// Determines which peer owns a given key.
pub trait PeerPicker: Send + Sync {
    /// Returns a client for the remote peer owning the given key.
    ///
    /// Returns **None** if there are no peers at all or if the key is owned by the local
    /// node itself - in both cases the caller is expected to satisfy the request locally
    /// via its loader.
    fn pick_peer(&self, key: &str) -> Option<Arc<dyn PeerClient>>;
}
