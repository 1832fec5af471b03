//! Shared peer registry (outbound queue buckets).
//!
//! Each [`Bucket`] is owned by one source of peers: the DNS subscription
//! worker replaces its bucket wholesale, the subscription listener adds and
//! removes single peers in its own. Readers see a consistent snapshot of a
//! bucket; every update is a single atomic read-modify-write.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::metrics;
use crate::types::{Bucket, NodeId, NodeType, Peers};

/// Thread-safe multi-bucket peer table.
#[derive(Debug, Clone, Default)]
pub struct PeerRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    buckets: HashMap<Bucket, Peers>,

    /// bucket -> maximum number of peers it may hold
    limits: HashMap<Bucket, usize>,
}

impl PeerRegistry {
    /// Create an empty registry with unlimited buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cap the number of peers `bucket` may hold.
    pub fn with_bucket_limit(self, bucket: Bucket, max_peers: usize) -> Self {
        self.inner.write().limits.insert(bucket, max_peers);
        self
    }

    /// Atomically replace the contents of `bucket` with `f(contents)`.
    ///
    /// Returns `true` if the bucket changed. A result that is identical to
    /// the current contents, or that would exceed the bucket limit, leaves
    /// the bucket untouched and returns `false`.
    pub fn update_peers_bucket<F>(&self, bucket: Bucket, f: F) -> bool
    where
        F: FnOnce(Peers) -> Peers,
    {
        let mut inner = self.inner.write();
        let current = inner.buckets.get(&bucket).cloned().unwrap_or_default();
        let updated = f(current.clone());

        if updated == current {
            return false;
        }
        if let Some(&max_peers) = inner.limits.get(&bucket) {
            if updated.len() > max_peers {
                debug!(%bucket, max_peers, "bucket full, rejecting update");
                return false;
            }
        }

        metrics::record_bucket_size(bucket, updated.len());
        if updated.is_empty() {
            inner.buckets.remove(&bucket);
        } else {
            inner.buckets.insert(bucket, updated);
        }
        true
    }

    /// Add a single peer to `bucket`, returning a guard that removes it again.
    ///
    /// Returns `None` when the add did not take effect (peer already present
    /// or bucket full); nothing will be removed in that case.
    pub fn admit(&self, bucket: Bucket, node_type: NodeType, peer: NodeId) -> Option<Admission> {
        let added = self.update_peers_bucket(bucket, |peers| {
            peers.merge(Peers::simple([(node_type, peer)]))
        });

        if !added {
            return None;
        }

        info!(%bucket, %peer, %node_type, "added peer to bucket");
        metrics::record_peer_added(bucket);
        Some(Admission {
            registry: self.clone(),
            bucket,
            peer,
        })
    }

    /// Snapshot of one bucket.
    pub fn bucket(&self, bucket: Bucket) -> Peers {
        self.inner
            .read()
            .buckets
            .get(&bucket)
            .cloned()
            .unwrap_or_default()
    }

    /// Union of all buckets, as seen by the broadcast layer.
    pub fn all_peers(&self) -> Peers {
        let inner = self.inner.read();
        let mut buckets: Vec<_> = inner.buckets.iter().collect();
        buckets.sort_by_key(|(bucket, _)| **bucket);
        buckets
            .into_iter()
            .fold(Peers::new(), |acc, (_, peers)| acc.merge(peers.clone()))
    }

    /// Whether `peer` is currently in `bucket`.
    pub fn contains(&self, bucket: Bucket, peer: &NodeId) -> bool {
        self.inner
            .read()
            .buckets
            .get(&bucket)
            .is_some_and(|peers| peers.contains(peer))
    }
}

/// Registration of one peer in one bucket, removed when dropped.
///
/// Only [`PeerRegistry::admit`] creates it, so removal happens exactly once
/// and only for peers that were actually added, on every exit path of the
/// owning task including cancellation.
#[derive(Debug)]
#[must_use = "dropping the admission removes the peer immediately"]
pub struct Admission {
    registry: PeerRegistry,
    bucket: Bucket,
    peer: NodeId,
}

impl Admission {
    /// The admitted peer.
    pub fn peer(&self) -> &NodeId {
        &self.peer
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        let peer = self.peer;
        self.registry
            .update_peers_bucket(self.bucket, |peers| peers.remove_peer(&peer));
        info!(bucket = %self.bucket, %peer, "removed peer from bucket");
        metrics::record_peer_removed(self.bucket);
    }
}
