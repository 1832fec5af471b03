//! Conversation seam between the subscription logic and the network layer.
//!
//! The transport owns connection setup, the version handshake, and message
//! encoding. The subscription code only sees typed [`Conversation`]s.

use async_trait::async_trait;

use crate::error::SubscriptionError;
use crate::messages::{MsgSubscribe1, ProtocolVersion, SubscriptionMsg, Void};
use crate::types::NodeId;

pub mod memory;

/// One bidirectional, typed message exchange with a single peer.
#[async_trait]
pub trait Conversation<Snd, Rcv>: Send
where
    Snd: Send + 'static,
    Rcv: Send + 'static,
{
    /// Send one message.
    async fn send(&mut self, msg: Snd) -> Result<(), SubscriptionError>;

    /// Receive one message of at most `limit` encoded bytes.
    ///
    /// Returns `Ok(None)` when the peer closed the conversation gracefully.
    /// Implementations must be cancel safe: dropping the future must not
    /// lose a message.
    async fn recv(&mut self, limit: usize) -> Result<Option<Rcv>, SubscriptionError>;
}

/// Dialer side of the current subscription protocol.
pub type SubscribeConversation = Box<dyn Conversation<SubscriptionMsg, Void>>;

/// Dialer side of the legacy subscription protocol.
pub type Subscribe1Conversation = Box<dyn Conversation<MsgSubscribe1, Void>>;

/// The conversation variant picked by version negotiation.
pub enum Negotiated {
    /// Peer speaks the current protocol.
    Subscribe(SubscribeConversation),
    /// Peer only speaks the legacy protocol.
    Subscribe1(Subscribe1Conversation),
}

impl Negotiated {
    /// Version that was negotiated.
    pub fn version(&self) -> ProtocolVersion {
        match self {
            Negotiated::Subscribe(_) => ProtocolVersion::Subscribe,
            Negotiated::Subscribe1(_) => ProtocolVersion::Subscribe1,
        }
    }
}

/// Opens subscription conversations to peers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Connect to `peer` and negotiate exactly one of `offered`, which is
    /// ordered by descending preference.
    async fn open_conversation(
        &self,
        peer: &NodeId,
        offered: &[ProtocolVersion],
    ) -> Result<Negotiated, SubscriptionError>;
}
