//! Shared test infrastructure for subscription integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use relay_subscription::messages::ProtocolVersion;
use relay_subscription::resolver::Resolved;
use relay_subscription::transport::memory::MemoryTransport;
use relay_subscription::worker::SlotDurationFn;
use relay_subscription::{
    DnsSubscriptionWorker, NodeAddr, NodeId, NodeType, PeerRegistry, PeerResolver,
    SubscriptionError, SubscriptionListener, Timer,
};

// --- Constants ---

pub const RELAY_PORT: u16 = 3000;

/// Slot estimate whose quarter is below the retry floor.
pub const SLOT: Duration = Duration::from_secs(20);

/// Initial keep-alive period used by tests.
pub const KEEP_ALIVE: Duration = Duration::from_secs(60);

// --- Node helpers ---

pub fn node(last: u8) -> NodeId {
    NodeId::new(SocketAddr::from(([10, 0, 0, last], RELAY_PORT)))
}

pub fn local_node() -> NodeId {
    NodeId::new(SocketAddr::from(([192, 168, 1, 1], RELAY_PORT)))
}

pub fn name(host: &str) -> NodeAddr {
    NodeAddr::new(host, RELAY_PORT)
}

pub fn fixed_slot(slot: Duration) -> SlotDurationFn {
    Arc::new(move || slot)
}

/// Slot estimate that tests can change while the worker runs.
#[derive(Clone)]
pub struct SharedSlot(Arc<Mutex<Duration>>);

impl SharedSlot {
    pub fn new(slot: Duration) -> Self {
        Self(Arc::new(Mutex::new(slot)))
    }

    pub fn set(&self, slot: Duration) {
        *self.0.lock() = slot;
    }

    pub fn as_fn(&self) -> SlotDurationFn {
        let slot = self.0.clone();
        Arc::new(move || *slot.lock())
    }
}

// --- Log capture ---

/// Layer recording the message of every WARN event.
#[derive(Clone, Default)]
pub struct WarnCapture {
    messages: Arc<Mutex<Vec<String>>>,
}

impl WarnCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Captured warnings containing `needle`.
    pub fn matching(&self, needle: &str) -> usize {
        self.messages
            .lock()
            .iter()
            .filter(|msg| msg.contains(needle))
            .count()
    }
}

impl<S: Subscriber> Layer<S> for WarnCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            let mut visitor = MessageVisitor(String::new());
            event.record(&mut visitor);
            self.messages.lock().push(visitor.0);
        }
    }
}

struct MessageVisitor(String);

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.0 = format!("{:?}", value);
        }
    }
}

// --- StaticResolver ---

/// Resolver answering from a fixed table, counting every call.
///
/// Unknown names resolve to a per-name `NoRecords` failure. The table can be
/// changed between rounds, and the whole resolver can be told to fail.
#[derive(Clone, Default)]
pub struct StaticResolver {
    table: Arc<Mutex<HashMap<String, Vec<NodeId>>>>,
    calls: Arc<AtomicUsize>,
    failing: Arc<Mutex<bool>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, host: &str, peers: Vec<NodeId>) -> Self {
        self.set(host, peers);
        self
    }

    pub fn set(&self, host: &str, peers: Vec<NodeId>) {
        self.table.lock().insert(host.to_string(), peers);
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PeerResolver for StaticResolver {
    async fn resolve(&self, alts: &[NodeAddr]) -> Result<Vec<Resolved>, SubscriptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock() {
            return Err(SubscriptionError::Transport("resolver unavailable".into()));
        }

        let table = self.table.lock();
        Ok(alts
            .iter()
            .map(|addr| match table.get(&addr.host) {
                Some(peers) if !peers.is_empty() => Ok(peers.clone()),
                _ => Err(SubscriptionError::NoRecords(addr.host.clone())),
            })
            .collect())
    }
}

// --- Loopback network ---

/// A remote relay reachable through the shared memory transport.
pub struct RemoteRelay {
    pub id: NodeId,
    pub registry: PeerRegistry,
}

impl RemoteRelay {
    /// Whether the local node is currently subscribed to this relay.
    pub fn has_subscriber(&self) -> bool {
        self.registry.contains(
            relay_subscription::Bucket::SubscriptionListener,
            &local_node(),
        )
    }
}

/// Register a relay on `transport` that accepts the given protocol versions.
pub fn spawn_relay(
    transport: &MemoryTransport,
    id: NodeId,
    supported: Vec<ProtocolVersion>,
) -> RemoteRelay {
    let registry = PeerRegistry::new();
    let listener = SubscriptionListener::new(registry.clone(), NodeType::Relay);
    transport.register(id, listener, supported);
    RemoteRelay { id, registry }
}

pub fn memory_transport() -> Arc<MemoryTransport> {
    Arc::new(MemoryTransport::new(local_node()))
}

/// Worker over the given resolver and transport with test timings.
pub fn worker(
    registry: &PeerRegistry,
    resolver: &StaticResolver,
    transport: &Arc<MemoryTransport>,
    groups: Vec<Vec<NodeAddr>>,
) -> DnsSubscriptionWorker<StaticResolver, MemoryTransport> {
    worker_with_slot(registry, resolver, transport, groups, fixed_slot(SLOT))
}

/// Like [`worker`], with a caller-supplied slot estimate.
pub fn worker_with_slot(
    registry: &PeerRegistry,
    resolver: &StaticResolver,
    transport: &Arc<MemoryTransport>,
    groups: Vec<Vec<NodeAddr>>,
    next_slot_duration: SlotDurationFn,
) -> DnsSubscriptionWorker<StaticResolver, MemoryTransport> {
    DnsSubscriptionWorker::new(
        registry.clone(),
        Arc::new(resolver.clone()),
        transport.clone(),
        groups,
        Timer::new(KEEP_ALIVE),
        next_slot_duration,
    )
}

/// Let spawned tasks run until they block.
///
/// Under paused time the runtime only advances the clock once every task is
/// idle, so a one millisecond sleep returns after everything else settled.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
