//! In-process transport joining dialers directly to subscription listeners.
//!
//! Every registered peer is a [`SubscriptionListener`] plus the protocol
//! versions it accepts. Opening a conversation negotiates the first offered
//! version the peer supports and serves the listener end on a spawned task.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{Conversation, Negotiated, Transport};
use crate::error::SubscriptionError;
use crate::listener::SubscriptionListener;
use crate::messages::{MsgSubscribe1, ProtocolVersion, SubscriptionMsg, Void};
use crate::types::NodeId;

/// One end of an in-memory conversation.
pub struct MemoryConversation<Snd, Rcv> {
    tx: mpsc::UnboundedSender<Snd>,
    rx: mpsc::UnboundedReceiver<Rcv>,
}

/// Create two connected conversation ends.
///
/// Dropping one end closes the conversation for the other: its `recv`
/// returns `Ok(None)` and its `send` fails.
pub fn conversation_pair<A, B>() -> (MemoryConversation<A, B>, MemoryConversation<B, A>) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        MemoryConversation { tx: a_tx, rx: b_rx },
        MemoryConversation { tx: b_tx, rx: a_rx },
    )
}

#[async_trait]
impl<Snd, Rcv> Conversation<Snd, Rcv> for MemoryConversation<Snd, Rcv>
where
    Snd: Send + 'static,
    Rcv: Send + 'static,
{
    async fn send(&mut self, msg: Snd) -> Result<(), SubscriptionError> {
        self.tx
            .send(msg)
            .map_err(|_| SubscriptionError::Transport("conversation closed by peer".into()))
    }

    // In-memory messages are never encoded, so there is no size to check.
    async fn recv(&mut self, _limit: usize) -> Result<Option<Rcv>, SubscriptionError> {
        Ok(self.rx.recv().await)
    }
}

struct MemoryPeer {
    listener: SubscriptionListener,
    supported: Vec<ProtocolVersion>,
    shutdown: CancellationToken,
}

/// Loopback [`Transport`] for wiring nodes inside one process.
#[derive(Clone)]
pub struct MemoryTransport {
    local: NodeId,
    peers: Arc<RwLock<HashMap<NodeId, MemoryPeer>>>,
}

impl MemoryTransport {
    /// Create a transport dialing out as `local`.
    pub fn new(local: NodeId) -> Self {
        Self {
            local,
            peers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Make `peer` reachable, served by `listener` for the given versions.
    pub fn register(
        &self,
        peer: NodeId,
        listener: SubscriptionListener,
        supported: Vec<ProtocolVersion>,
    ) {
        let previous = self.peers.write().insert(
            peer,
            MemoryPeer {
                listener,
                supported,
                shutdown: CancellationToken::new(),
            },
        );
        if let Some(previous) = previous {
            previous.shutdown.cancel();
        }
    }

    /// Make `peer` unreachable and close every conversation it is serving.
    pub fn unregister(&self, peer: &NodeId) {
        if let Some(removed) = self.peers.write().remove(peer) {
            removed.shutdown.cancel();
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open_conversation(
        &self,
        peer: &NodeId,
        offered: &[ProtocolVersion],
    ) -> Result<Negotiated, SubscriptionError> {
        let (listener, version, shutdown) = {
            let peers = self.peers.read();
            let remote = peers.get(peer).ok_or_else(|| {
                SubscriptionError::Transport(format!("connection to {} refused", peer))
            })?;
            let version = offered
                .iter()
                .find(|v| remote.supported.contains(v))
                .copied()
                .ok_or_else(|| SubscriptionError::Negotiation(peer.to_string()))?;
            (remote.listener.clone(), version, remote.shutdown.clone())
        };

        let local = self.local;
        debug!(%peer, %version, "memory transport negotiated");

        let negotiated = match version {
            ProtocolVersion::Subscribe => {
                let (dialer, mut served) = conversation_pair::<SubscriptionMsg, Void>();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        result = listener.serve(local, &mut served) => {
                            if let Err(e) = result {
                                warn!(peer = %local, "memory listener error: {}", e);
                            }
                        }
                    }
                });
                Negotiated::Subscribe(Box::new(dialer))
            }
            ProtocolVersion::Subscribe1 => {
                let (dialer, mut served) = conversation_pair::<MsgSubscribe1, Void>();
                tokio::spawn(async move {
                    tokio::select! {
                        _ = shutdown.cancelled() => {}
                        result = listener.serve_legacy(local, &mut served) => {
                            if let Err(e) = result {
                                warn!(peer = %local, "memory listener error: {}", e);
                            }
                        }
                    }
                });
                Negotiated::Subscribe1(Box::new(dialer))
            }
        };

        Ok(negotiated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dropping_one_end_closes_the_other() {
        let (mut a, b) = conversation_pair::<u8, u8>();
        drop(b);
        assert!(a.recv(1).await.unwrap().is_none());
        assert!(a.send(1).await.is_err());
    }

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (mut a, mut b) = conversation_pair::<u8, u8>();
        a.send(1).await.unwrap();
        a.send(2).await.unwrap();
        assert_eq!(b.recv(1).await.unwrap(), Some(1));
        assert_eq!(b.recv(1).await.unwrap(), Some(2));
    }
}
