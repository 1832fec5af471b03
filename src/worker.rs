//! DNS-driven subscription worker.
//!
//! Keeps one live subscription per configured alternative group ("valency"
//! slot). Each group runs its own task that resolves the group's names,
//! publishes the union of every group's latest peers into the
//! [`Bucket::BehindNatWorker`] bucket, then subscribes to the resolved peers
//! one after another. When the list is exhausted, or a round fails, the task
//! waits a slot-derived interval and starts over.

use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SubscriptionError;
use crate::metrics;
use crate::registry::PeerRegistry;
use crate::resolver::{flatten_resolved, PeerResolver};
use crate::subscription::subscribe_to;
use crate::timer::Timer;
use crate::transport::Transport;
use crate::types::{Alts, Bucket, NodeAddr, NodeId, NodeType, Peers};

/// Lower bound of the wait between resolution rounds.
pub const MIN_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Current estimate of the next slot's duration.
pub type SlotDurationFn = Arc<dyn Fn() -> Duration + Send + Sync>;

/// Wait between two rounds of one group: a quarter slot, at least five seconds.
pub fn retry_interval(next_slot_duration: Duration) -> Duration {
    (next_slot_duration / 4).max(MIN_RETRY_INTERVAL)
}

/// Latest resolved peers of every group, by 1-based group index.
///
/// A single lock guards the whole map. Publishing replaces one group's entry
/// and republishes the registry bucket under that lock, so concurrent groups
/// never lose each other's contribution.
#[derive(Debug, Clone, Default)]
pub struct DnsPeers {
    inner: Arc<Mutex<BTreeMap<usize, Alts<NodeId>>>>,
}

impl DnsPeers {
    /// One empty entry per group, indices `1..=valency`.
    pub fn new(valency: usize) -> Self {
        let map = (1..=valency).map(|index| (index, Vec::new())).collect();
        Self {
            inner: Arc::new(Mutex::new(map)),
        }
    }

    /// Replace the entry of `index` and republish the union of all entries as
    /// relays into the worker's registry bucket.
    pub fn publish(&self, index: usize, peers: Alts<NodeId>, registry: &PeerRegistry) {
        let mut map = self.inner.lock();
        map.insert(index, peers);

        let all = Peers::simple(
            map.values()
                .flatten()
                .map(|peer| (NodeType::Relay, *peer)),
        );
        let changed = registry.update_peers_bucket(Bucket::BehindNatWorker, |_| all);
        debug!(index, changed, "published DNS peers");
    }

    /// Latest peers of `index`.
    pub fn get(&self, index: usize) -> Alts<NodeId> {
        self.inner.lock().get(&index).cloned().unwrap_or_default()
    }
}

/// Resolve one group's alternatives into a flat, ordered list of peers.
///
/// Per-name failures and an empty result are logged, not returned; only a
/// failure of the resolver itself is an error.
pub async fn resolve_group<R>(
    resolver: &R,
    index: usize,
    alts: &[NodeAddr],
) -> Result<Alts<NodeId>, SubscriptionError>
where
    R: PeerResolver + ?Sized,
{
    let results = resolver.resolve(alts).await?;
    let (peers, errors) = flatten_resolved(results);

    if peers.is_empty() {
        error!(index, "No relays found for index {}", index);
    }
    if !errors.is_empty() {
        let errors: Vec<String> = errors.iter().map(ToString::to_string).collect();
        error!(index, ?errors, "DNS failure for index {}", index);
    }
    metrics::record_resolution(index, peers.len(), errors.len());

    Ok(peers)
}

/// Warn about a group without alternatives. Returns whether the group is empty.
fn warn_if_empty(index: usize, alts: &[NodeAddr]) -> bool {
    if alts.is_empty() {
        warn!(index, "No DNS alternatives for index {}", index);
    }
    alts.is_empty()
}

/// Resolve every group once and publish the results, without subscribing.
///
/// Empty groups are skipped with a warning. Returns the published peers.
pub async fn publish_once<R>(
    resolver: &R,
    groups: &[Alts<NodeAddr>],
    registry: &PeerRegistry,
) -> Result<DnsPeers, SubscriptionError>
where
    R: PeerResolver + ?Sized,
{
    let dns_peers = DnsPeers::new(groups.len());
    for (i, alts) in groups.iter().enumerate() {
        let index = i + 1;
        if warn_if_empty(index, alts) {
            continue;
        }
        let peers = resolve_group(resolver, index, alts).await?;
        dns_peers.publish(index, peers, registry);
    }
    Ok(dns_peers)
}

/// Maintains one subscription per configured alternative group.
pub struct DnsSubscriptionWorker<R: ?Sized, T: ?Sized> {
    registry: PeerRegistry,
    resolver: Arc<R>,
    transport: Arc<T>,
    groups: Vec<Alts<NodeAddr>>,
    timer: Timer,
    next_slot_duration: SlotDurationFn,
}

impl<R, T> DnsSubscriptionWorker<R, T>
where
    R: PeerResolver + ?Sized + 'static,
    T: Transport + ?Sized + 'static,
{
    /// Create a worker. Nothing runs until [`DnsSubscriptionWorker::run`].
    pub fn new(
        registry: PeerRegistry,
        resolver: Arc<R>,
        transport: Arc<T>,
        groups: Vec<Alts<NodeAddr>>,
        timer: Timer,
        next_slot_duration: SlotDurationFn,
    ) -> Self {
        Self {
            registry,
            resolver,
            transport,
            groups,
            timer,
            next_slot_duration,
        }
    }

    /// Run every group task until all of them exit or `shutdown` is cancelled.
    ///
    /// Group tasks only exit on their own when their group has no
    /// alternatives; otherwise this runs until shutdown.
    pub async fn run(self, shutdown: CancellationToken) {
        let valency = self.groups.len();
        info!(valency, "Starting DNS subscription worker");
        metrics::record_valency(valency);

        let dns_peers = DnsPeers::new(valency);

        let handles: Vec<_> = self
            .groups
            .into_iter()
            .enumerate()
            .map(|(i, alts)| {
                let group = GroupTask {
                    index: i + 1,
                    alts,
                    registry: self.registry.clone(),
                    resolver: self.resolver.clone(),
                    transport: self.transport.clone(),
                    timer: self.timer.clone(),
                    dns_peers: dns_peers.clone(),
                    next_slot_duration: self.next_slot_duration.clone(),
                };
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    let index = group.index;
                    tokio::select! {
                        biased;

                        _ = shutdown.cancelled() => {
                            info!(index, "DNS subscription group shutting down");
                        }

                        _ = group.run() => {}
                    }
                })
            })
            .collect();

        // Aborting on drop keeps the group tasks scoped to this future.
        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let _abort_guard = AbortOnDrop(aborts);

        for (i, result) in join_all(handles).await.into_iter().enumerate() {
            if let Err(e) = result {
                if e.is_panic() {
                    error!(index = i + 1, "DNS subscription task panicked: {}", e);
                }
            }
        }

        warn!("DNS subscription worker: all threads finished, no longer subscribed to any peers");
    }
}

struct AbortOnDrop(Vec<tokio::task::AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// One alternative group's resolve, publish, subscribe loop.
struct GroupTask<R: ?Sized, T: ?Sized> {
    index: usize,
    alts: Alts<NodeAddr>,
    registry: PeerRegistry,
    resolver: Arc<R>,
    transport: Arc<T>,
    timer: Timer,
    dns_peers: DnsPeers,
    next_slot_duration: SlotDurationFn,
}

impl<R, T> GroupTask<R, T>
where
    R: PeerResolver + ?Sized,
    T: Transport + ?Sized,
{
    async fn run(self) {
        if warn_if_empty(self.index, &self.alts) {
            return;
        }

        loop {
            if let Err(e) = self.round().await {
                error!(index = self.index, "DNS subscription round failed: {}", e);
                metrics::record_round_failure(self.index);
            }

            let interval = retry_interval((self.next_slot_duration)());
            debug!(index = self.index, ?interval, "waiting before next DNS resolution");
            sleep(interval).await;
        }
    }

    /// Resolve, publish, then subscribe to each resolved peer in turn.
    async fn round(&self) -> Result<(), SubscriptionError> {
        let peers = resolve_group(&*self.resolver, self.index, &self.alts).await?;
        self.dns_peers.publish(self.index, peers.clone(), &self.registry);

        for peer in &peers {
            subscribe_to(&*self.transport, &self.timer, peer).await;
        }

        debug!(index = self.index, "all alternatives exhausted");
        Ok(())
    }
}
