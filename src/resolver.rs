//! Resolution of named relay addresses into peer identifiers.

use async_trait::async_trait;
use futures::future::join_all;
use hickory_resolver::config::{NameServerConfig, ResolverConfig};
use hickory_resolver::name_server::TokioConnectionProvider;
use hickory_resolver::proto::xfer::Protocol;
use hickory_resolver::TokioResolver;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::{debug, trace};

use crate::config::ResolverSettings;
use crate::error::SubscriptionError;
use crate::types::{Alts, NodeAddr, NodeId};

/// Result of resolving one alternative.
pub type Resolved = Result<Vec<NodeId>, SubscriptionError>;

/// Resolves alternatives of named addresses.
#[async_trait]
pub trait PeerResolver: Send + Sync {
    /// Resolve every alternative, returning one result per input in the same
    /// order. The outer error means the resolver as a whole failed.
    async fn resolve(&self, alts: &[NodeAddr]) -> Result<Vec<Resolved>, SubscriptionError>;
}

/// Concatenate the peers of every successful alternative in input order and
/// collect the errors of the rest.
pub fn flatten_resolved(results: Vec<Resolved>) -> (Alts<NodeId>, Vec<SubscriptionError>) {
    let mut peers = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(resolved) => peers.extend(resolved),
            Err(e) => errors.push(e),
        }
    }

    (peers, errors)
}

/// [`PeerResolver`] backed by hickory's async resolver.
///
/// Hosts that are IP literals are returned as-is without a lookup.
#[derive(Clone)]
pub struct HickoryResolver {
    resolver: TokioResolver,
}

impl HickoryResolver {
    /// Build a resolver from settings: the system configuration when no name
    /// servers are given, otherwise exactly those servers over UDP.
    pub fn new(settings: &ResolverSettings) -> Result<Self, SubscriptionError> {
        let mut builder = if settings.nameservers.is_empty() {
            TokioResolver::builder_tokio()?
        } else {
            let mut config = ResolverConfig::new();
            for addr in &settings.nameservers {
                config.add_name_server(NameServerConfig::new(*addr, Protocol::Udp));
            }
            TokioResolver::builder_with_config(config, TokioConnectionProvider::default())
        };

        let opts = builder.options_mut();
        opts.timeout = Duration::from_secs(settings.timeout_secs);
        opts.attempts = settings.attempts;

        Ok(Self {
            resolver: builder.build(),
        })
    }

    async fn resolve_one(&self, addr: &NodeAddr) -> Resolved {
        if let Some(ip) = addr.ip() {
            trace!(%addr, "address is an IP literal, skipping lookup");
            return Ok(vec![NodeId::new(SocketAddr::new(ip, addr.port))]);
        }

        let lookup = self.resolver.lookup_ip(addr.host.as_str()).await?;

        let peers: Vec<NodeId> = lookup
            .iter()
            .map(|ip| NodeId::new(SocketAddr::new(ip, addr.port)))
            .collect();

        if peers.is_empty() {
            return Err(SubscriptionError::NoRecords(addr.to_string()));
        }

        debug!(%addr, peers = peers.len(), "resolved relay address");
        Ok(peers)
    }
}

#[async_trait]
impl PeerResolver for HickoryResolver {
    async fn resolve(&self, alts: &[NodeAddr]) -> Result<Vec<Resolved>, SubscriptionError> {
        Ok(join_all(alts.iter().map(|addr| self.resolve_one(addr))).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(last: u8) -> NodeId {
        NodeId::new(SocketAddr::from(([10, 0, 0, last], 3000)))
    }

    #[test]
    fn test_flatten_keeps_order_and_drops_failures() {
        let results = vec![
            Ok(vec![node(1), node(2)]),
            Err(SubscriptionError::NoRecords("b.example.com:3000".into())),
            Ok(vec![node(3)]),
        ];

        let (peers, errors) = flatten_resolved(results);
        assert_eq!(peers, vec![node(1), node(2), node(3)]);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_flatten_all_failed_is_empty() {
        let results = vec![
            Err(SubscriptionError::NoRecords("a.example.com:3000".into())),
            Err(SubscriptionError::NoRecords("b.example.com:3000".into())),
        ];

        let (peers, errors) = flatten_resolved(results);
        assert!(peers.is_empty());
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_flatten_keeps_duplicates_across_names() {
        let results = vec![Ok(vec![node(1)]), Ok(vec![node(1), node(2)])];
        let (peers, _) = flatten_resolved(results);
        assert_eq!(peers, vec![node(1), node(1), node(2)]);
    }

    #[tokio::test]
    async fn test_ip_literals_skip_lookup() {
        let settings = ResolverSettings {
            nameservers: vec!["127.0.0.1:1".parse().unwrap()],
            ..Default::default()
        };
        let resolver = HickoryResolver::new(&settings).unwrap();
        let alts = vec![
            NodeAddr::new("10.0.0.7", 3000),
            NodeAddr::new("fd00::7", 3001),
        ];

        let results = resolver.resolve(&alts).await.unwrap();
        let (peers, errors) = flatten_resolved(results);

        assert!(errors.is_empty());
        assert_eq!(
            peers,
            vec![
                NodeId::new("10.0.0.7:3000".parse().unwrap()),
                NodeId::new("[fd00::7]:3001".parse().unwrap()),
            ]
        );
    }
}
