//! Node identity and peer registry vocabulary.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use crate::error::SubscriptionError;

/// Ordered list of equally preferred alternatives. The first entry is tried first.
pub type Alts<T> = Vec<T>;

/// Identifier of a remote peer: transport address plus local endpoint discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Transport address of the peer.
    pub addr: SocketAddr,
    /// Endpoint discriminator on that address.
    pub endpoint: u32,
}

impl NodeId {
    /// Node id for the default endpoint of `addr`, as produced by DNS resolution.
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr, endpoint: 0 }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.endpoint)
    }
}

/// Role of a peer in the network topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// Core (block producing) node.
    Core,
    /// Relay node.
    Relay,
    /// Edge node (wallet, explorer).
    Edge,
}

impl NodeType {
    /// Lowercase name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Core => "core",
            NodeType::Relay => "relay",
            NodeType::Edge => "edge",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named address of a peer, resolved through DNS unless the host is an IP literal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeAddr {
    /// Domain name or IP literal.
    pub host: String,
    /// Port of the peer's listener.
    pub port: u16,
}

impl NodeAddr {
    /// Create a named address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// The host as an IP address, if it is a literal.
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.parse().ok()
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.ip() {
            Some(IpAddr::V6(ip)) => write!(f, "[{}]:{}", ip, self.port),
            _ => write!(f, "{}:{}", self.host, self.port),
        }
    }
}

impl FromStr for NodeAddr {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| SubscriptionError::InvalidAddress(s.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| SubscriptionError::InvalidAddress(s.to_string()))?;

        let host = match host.strip_prefix('[') {
            Some(rest) => rest
                .strip_suffix(']')
                .ok_or_else(|| SubscriptionError::InvalidAddress(s.to_string()))?,
            None => host,
        };
        if host.is_empty() {
            return Err(SubscriptionError::InvalidAddress(s.to_string()));
        }

        Ok(Self::new(host, port))
    }
}

impl TryFrom<String> for NodeAddr {
    type Error = SubscriptionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NodeAddr> for String {
    fn from(addr: NodeAddr) -> Self {
        addr.to_string()
    }
}

/// Named partition of the peer registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Bucket {
    /// Peers published by the DNS subscription worker.
    BehindNatWorker,
    /// Remote peers currently subscribed to this node.
    SubscriptionListener,
}

impl Bucket {
    /// Name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::BehindNatWorker => "behind_nat_worker",
            Bucket::SubscriptionListener => "subscription_listener",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Peers grouped by node type, each group a list of alternatives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Peers {
    by_type: BTreeMap<NodeType, Vec<Alts<NodeId>>>,
}

impl Peers {
    /// Empty peer set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Peer set where every peer is its own single alternative.
    pub fn simple<I>(peers: I) -> Self
    where
        I: IntoIterator<Item = (NodeType, NodeId)>,
    {
        let mut result = Self::new();
        for (node_type, peer) in peers {
            result.insert_alts(node_type, vec![peer]);
        }
        result
    }

    /// Union of `self` and `other`.
    ///
    /// Alternatives of `other` are appended in order; peers already present
    /// are skipped and alternatives left empty by that are dropped.
    pub fn merge(mut self, other: Peers) -> Self {
        for (node_type, alts_list) in other.by_type {
            for alts in alts_list {
                self.insert_alts(node_type, alts);
            }
        }
        self
    }

    /// `self` without `peer`. Alternatives emptied by the removal are dropped.
    pub fn remove_peer(mut self, peer: &NodeId) -> Self {
        for alts_list in self.by_type.values_mut() {
            for alts in alts_list.iter_mut() {
                alts.retain(|p| p != peer);
            }
            alts_list.retain(|alts| !alts.is_empty());
        }
        self.by_type.retain(|_, alts_list| !alts_list.is_empty());
        self
    }

    /// Whether `peer` appears under any node type.
    pub fn contains(&self, peer: &NodeId) -> bool {
        self.iter().any(|(_, p)| p == peer)
    }

    /// Number of peers across all types and alternatives.
    pub fn len(&self) -> usize {
        self.by_type
            .values()
            .flat_map(|alts_list| alts_list.iter())
            .map(Vec::len)
            .sum()
    }

    /// Whether there are no peers at all.
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    /// Alternatives for one node type.
    pub fn of_type(&self, node_type: NodeType) -> &[Alts<NodeId>] {
        self.by_type
            .get(&node_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Iterate over all (type, peer) pairs in preference order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeType, &NodeId)> + '_ {
        self.by_type.iter().flat_map(|(node_type, alts_list)| {
            alts_list
                .iter()
                .flat_map(move |alts| alts.iter().map(move |peer| (*node_type, peer)))
        })
    }

    fn insert_alts(&mut self, node_type: NodeType, alts: Alts<NodeId>) {
        let fresh: Alts<NodeId> = alts
            .into_iter()
            .filter(|peer| !self.contains(peer))
            .fold(Vec::new(), |mut acc, peer| {
                if !acc.contains(&peer) {
                    acc.push(peer);
                }
                acc
            });
        if !fresh.is_empty() {
            self.by_type.entry(node_type).or_default().push(fresh);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(last: u8) -> NodeId {
        NodeId::new(SocketAddr::from(([10, 0, 0, last], 3000)))
    }

    #[test]
    fn test_node_id_display_includes_endpoint() {
        assert_eq!(node(1).to_string(), "10.0.0.1:3000:0");
    }

    #[test]
    fn test_parse_node_addr_domain() {
        let addr: NodeAddr = "relays.example.com:3001".parse().unwrap();
        assert_eq!(addr.host, "relays.example.com");
        assert_eq!(addr.port, 3001);
        assert!(addr.ip().is_none());
    }

    #[test]
    fn test_parse_node_addr_ipv6_literal() {
        let addr: NodeAddr = "[fd00::1]:3000".parse().unwrap();
        assert_eq!(addr.host, "fd00::1");
        assert_eq!(addr.ip(), Some("fd00::1".parse().unwrap()));
        assert_eq!(addr.to_string(), "[fd00::1]:3000");
    }

    #[test]
    fn test_parse_node_addr_rejects_missing_port() {
        assert!("relays.example.com".parse::<NodeAddr>().is_err());
        assert!("relays.example.com:http".parse::<NodeAddr>().is_err());
        assert!(":3000".parse::<NodeAddr>().is_err());
    }

    #[test]
    fn test_simple_peers_are_singleton_alternatives() {
        let peers = Peers::simple([(NodeType::Relay, node(1)), (NodeType::Relay, node(2))]);
        assert_eq!(peers.of_type(NodeType::Relay), &[vec![node(1)], vec![node(2)]]);
        assert_eq!(peers.len(), 2);
    }

    #[test]
    fn test_merge_skips_existing_peers() {
        let a = Peers::simple([(NodeType::Relay, node(1))]);
        let b = Peers::simple([(NodeType::Relay, node(1)), (NodeType::Relay, node(2))]);
        let merged = a.merge(b);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged.of_type(NodeType::Relay), &[vec![node(1)], vec![node(2)]]);
    }

    #[test]
    fn test_remove_peer_drops_empty_alternatives() {
        let peers = Peers::simple([(NodeType::Edge, node(1)), (NodeType::Relay, node(2))]);
        let peers = peers.remove_peer(&node(1));
        assert!(!peers.contains(&node(1)));
        assert!(peers.of_type(NodeType::Edge).is_empty());
        assert_eq!(peers.len(), 1);

        let peers = peers.remove_peer(&node(2));
        assert!(peers.is_empty());
    }
}
