//! Relay Subscription - keeps a blockchain node subscribed to relay peers.
//!
//! Outbound, the [`DnsSubscriptionWorker`] keeps one live subscription per
//! configured group of relay addresses, using DNS to keep the candidate set
//! fresh and publishing every resolved relay into the shared
//! [`PeerRegistry`]. Inbound, the [`SubscriptionListener`] tracks which remote
//! nodes are subscribed to this node in a separate registry bucket.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       relay-subscription                         │
//! │                                                                  │
//! │  ┌────────────────────┐  resolve  ┌──────────────────┐           │
//! │  │ DNS subscription   │──────────▶│  PeerResolver    │◀── DNS    │
//! │  │ worker             │           └──────────────────┘           │
//! │  │  (task per group)  │  publish  ┌──────────────────┐           │
//! │  │                    │──────────▶│  PeerRegistry    │──▶ broadcast
//! │  └─────────┬──────────┘           │  BehindNatWorker │           │
//! │            │ subscribe_to         │  SubscriptionLis.│           │
//! │            ▼                      └────────▲─────────┘           │
//! │  ┌────────────────────┐                    │ admit / evict       │
//! │  │ Transport          │◀── relays          │                     │
//! │  │ (Subscribe,        │           ┌────────┴─────────┐           │
//! │  │  Subscribe1)       │           │ Subscription     │◀── peers  │
//! │  └────────────────────┘           │ listener         │           │
//! │                                   └──────────────────┘           │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use relay_subscription::{Config, DnsSubscriptionWorker, HickoryResolver};
//! use tokio_util::sync::CancellationToken;
//!
//! async fn start(config: Config, transport: Arc<impl relay_subscription::Transport + 'static>) {
//!     let sub = config.subscription;
//!     let registry = sub.registry();
//!     let resolver = Arc::new(HickoryResolver::new(&sub.resolver).unwrap());
//!
//!     let worker = DnsSubscriptionWorker::new(
//!         registry,
//!         resolver,
//!         transport,
//!         sub.dns_groups.clone(),
//!         sub.keep_alive_timer(),
//!         sub.next_slot_duration(),
//!     );
//!     worker.run(CancellationToken::new()).await;
//! }
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod listener;
pub mod messages;
pub mod metrics;
pub mod registry;
pub mod resolver;
pub mod subscription;
pub mod telemetry;
pub mod timer;
pub mod transport;
pub mod types;
pub mod worker;

// Re-export main types
pub use config::{Config, ResolverSettings, SubscriptionConfig, TelemetryConfig};
pub use error::SubscriptionError;
pub use listener::SubscriptionListener;
pub use registry::{Admission, PeerRegistry};
pub use resolver::{HickoryResolver, PeerResolver};
pub use subscription::{subscribe_to, SubscriptionTerminationReason};
pub use timer::Timer;
pub use transport::{Conversation, Negotiated, Transport};
pub use types::{Alts, Bucket, NodeAddr, NodeId, NodeType, Peers};
pub use worker::{DnsPeers, DnsSubscriptionWorker};
