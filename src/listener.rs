//! Inbound subscriptions: admit remote subscribers into the registry for the
//! lifetime of their conversation.

use std::fmt;
use tracing::{debug, info, warn};

use crate::error::SubscriptionError;
use crate::messages::{MsgSubscribe1, SubscriptionMsg, Void, SUBSCRIPTION_RECV_LIMIT};
use crate::metrics::{self, ListenerRejection};
use crate::registry::{Admission, PeerRegistry};
use crate::transport::Conversation;
use crate::types::{Bucket, NodeId, NodeType};

/// Serves subscription conversations opened by remote peers.
#[derive(Debug, Clone)]
pub struct SubscriptionListener {
    registry: PeerRegistry,
    node_type: NodeType,
    recv_limit: usize,
}

impl SubscriptionListener {
    /// Create a listener admitting subscribers as `node_type`.
    pub fn new(registry: PeerRegistry, node_type: NodeType) -> Self {
        Self {
            registry,
            node_type,
            recv_limit: SUBSCRIPTION_RECV_LIMIT,
        }
    }

    /// Registry the listener admits peers into.
    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    /// Serve the current protocol: `Subscribe`, then keep-alives until the
    /// peer closes or misbehaves.
    ///
    /// The peer stays in the [`Bucket::SubscriptionListener`] bucket while this
    /// future runs and is removed on every exit path, including when the
    /// future is dropped.
    pub async fn serve<C>(&self, peer: NodeId, conv: &mut C) -> Result<(), SubscriptionError>
    where
        C: Conversation<Void, SubscriptionMsg> + ?Sized,
    {
        match conv.recv(self.recv_limit).await? {
            Some(SubscriptionMsg::Subscribe) => {}
            other => {
                warn!(%peer, got = %Received(other), "expected Subscribe from peer, closing");
                metrics::record_listener_rejection(ListenerRejection::UnexpectedMessage);
                return Ok(());
            }
        }

        let Some(_admission) = self.admit(peer) else {
            return Ok(());
        };

        loop {
            match conv.recv(self.recv_limit).await? {
                Some(SubscriptionMsg::KeepAlive) => {
                    debug!(%peer, "received keep-alive");
                    metrics::record_keep_alive_received();
                }
                other => {
                    info!(
                        %peer,
                        got = %Received(other),
                        "expected SubscribeKeepAlive from peer, closing"
                    );
                    return Ok(());
                }
            }
        }
    }

    /// Serve the legacy protocol: a single `Subscribe1`, after which the peer
    /// stays admitted until it closes the conversation.
    pub async fn serve_legacy<C>(&self, peer: NodeId, conv: &mut C) -> Result<(), SubscriptionError>
    where
        C: Conversation<Void, MsgSubscribe1> + ?Sized,
    {
        let Some(MsgSubscribe1) = conv.recv(self.recv_limit).await? else {
            debug!(%peer, "peer closed before subscribing");
            return Ok(());
        };

        let Some(_admission) = self.admit(peer) else {
            return Ok(());
        };

        // The peer never sends anything after MsgSubscribe1.
        if let Some(MsgSubscribe1) = conv.recv(self.recv_limit).await? {
            warn!(%peer, "unexpected second MsgSubscribe1, closing");
        }
        Ok(())
    }

    fn admit(&self, peer: NodeId) -> Option<Admission> {
        let admission = self
            .registry
            .admit(Bucket::SubscriptionListener, self.node_type, peer);
        if admission.is_none() {
            info!(%peer, "subscription not admitted (already subscribed or bucket full), closing");
            metrics::record_listener_rejection(ListenerRejection::NotAdmitted);
        }
        admission
    }
}

/// Log rendering of a received message, where `None` is the peer closing.
struct Received<T>(Option<T>);

impl<T: fmt::Display> fmt::Display for Received<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(msg) => msg.fmt(f),
            None => f.write_str("connection close"),
        }
    }
}
