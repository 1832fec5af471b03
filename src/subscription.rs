//! Outbound subscription protocol engine.
//!
//! One call to [`subscribe_to`] is one subscription attempt to one peer:
//! open a conversation offering both protocol versions, run whichever the
//! peer picked until the conversation ends, and report why it ended.
//!
//! ```text
//! Subscribe:   Start ──MsgSubscribe──▶ WaitKeepAlive ──timer──▶ SentKeepAlive ─┐
//!                                          ▲   │                              │
//!                                          │   └──peer closed──▶ Terminated   │
//!                                          └──────────── period := 20s ◀──────┘
//!
//! Subscribe1:  Start ──MsgSubscribe1──▶ WaitClose ──peer closed──▶ Terminated
//! ```

use std::fmt;
use tracing::{debug, info};

use crate::error::SubscriptionError;
use crate::messages::{
    MsgSubscribe1, ProtocolVersion, SubscriptionMsg, KEEP_ALIVE_STEADY_PERIOD,
    SUBSCRIPTION_RECV_LIMIT,
};
use crate::metrics::{self, Stopwatch};
use crate::timer::Timer;
use crate::transport::{Negotiated, Subscribe1Conversation, SubscribeConversation, Transport};
use crate::types::NodeId;

/// How a subscription attempt ended.
#[derive(Debug)]
pub enum SubscriptionTerminationReason {
    /// The peer closed the conversation.
    Normal,
    /// The attempt failed: connection, negotiation, or send error.
    Exceptional(SubscriptionError),
}

impl SubscriptionTerminationReason {
    /// Whether the peer ended the subscription cleanly.
    pub fn is_normal(&self) -> bool {
        matches!(self, SubscriptionTerminationReason::Normal)
    }
}

impl fmt::Display for SubscriptionTerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionTerminationReason::Normal => f.write_str("normal termination"),
            SubscriptionTerminationReason::Exceptional(e) => {
                write!(f, "exceptional termination: {}", e)
            }
        }
    }
}

/// Run one subscription attempt against `peer` and report how it ended.
///
/// Ordinary failures are folded into [`SubscriptionTerminationReason::Exceptional`].
/// Cancelling the returned future drops the conversation.
pub async fn subscribe_to<T>(transport: &T, timer: &Timer, peer: &NodeId) -> SubscriptionTerminationReason
where
    T: Transport + ?Sized,
{
    info!(%peer, "Establishing subscription");
    let stopwatch = Stopwatch::start();

    let reason = match transport
        .open_conversation(peer, &ProtocolVersion::OFFERED)
        .await
    {
        Ok(conv) => {
            debug!(%peer, version = %conv.version(), "subscription protocol negotiated");
            let _active = metrics::record_negotiated(conv.version());
            let result = match conv {
                Negotiated::Subscribe(conv) => run_subscribe(conv, timer.clone(), peer).await,
                Negotiated::Subscribe1(conv) => run_subscribe1(conv, peer).await,
            };
            into_reason(result)
        }
        Err(e) => SubscriptionTerminationReason::Exceptional(e),
    };

    metrics::record_subscription_terminated(&reason, stopwatch.elapsed());
    info!(%peer, %reason, "Subscription terminated");
    reason
}

fn into_reason(result: Result<(), SubscriptionError>) -> SubscriptionTerminationReason {
    match result {
        Ok(()) => SubscriptionTerminationReason::Normal,
        Err(e) => SubscriptionTerminationReason::Exceptional(e),
    }
}

/// Current protocol: subscribe, then keep-alives until the peer closes.
async fn run_subscribe(
    mut conv: SubscribeConversation,
    mut timer: Timer,
    peer: &NodeId,
) -> Result<(), SubscriptionError> {
    conv.send(SubscriptionMsg::Subscribe).await?;

    loop {
        timer.start();
        tokio::select! {
            biased;

            received = conv.recv(SUBSCRIPTION_RECV_LIMIT) => {
                return match received? {
                    None => Ok(()),
                    Some(never) => never.absurd(),
                };
            }

            _ = timer.wait() => {}
        }

        conv.send(SubscriptionMsg::KeepAlive).await?;
        metrics::record_keep_alive_sent();
        debug!(%peer, "sent keep-alive");

        // Once steady, keep-alives run at a fixed cadence.
        timer.set_duration(KEEP_ALIVE_STEADY_PERIOD);
    }
}

/// Legacy protocol: subscribe once, then wait for the peer to close.
async fn run_subscribe1(
    mut conv: Subscribe1Conversation,
    peer: &NodeId,
) -> Result<(), SubscriptionError> {
    conv.send(MsgSubscribe1).await?;
    debug!(%peer, "sent MsgSubscribe1, waiting for close");

    match conv.recv(SUBSCRIPTION_RECV_LIMIT).await? {
        None => Ok(()),
        Some(never) => never.absurd(),
    }
}
