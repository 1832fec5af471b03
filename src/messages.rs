//! Subscription wire vocabulary.
//!
//! Encoding is the transport's concern; these are the typed messages the
//! conversations exchange.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Upper bound for the encoded size of a subscription message on receive.
pub const SUBSCRIPTION_RECV_LIMIT: usize = 32;

/// Keep-alive cadence once a subscription has reached steady state.
pub const KEEP_ALIVE_STEADY_PERIOD: Duration = Duration::from_secs(20);

/// Messages of the current subscription protocol, sent by the subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionMsg {
    /// Opens the subscription.
    Subscribe,
    /// Proves the subscriber is still alive.
    KeepAlive,
}

impl fmt::Display for SubscriptionMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionMsg::Subscribe => f.write_str("MsgSubscribe"),
            SubscriptionMsg::KeepAlive => f.write_str("MsgSubscribeKeepAlive"),
        }
    }
}

/// Single message of the legacy subscription protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgSubscribe1;

impl fmt::Display for MsgSubscribe1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MsgSubscribe1")
    }
}

/// Message type of a direction that never carries anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Void {}

impl Void {
    /// A `Void` can never exist, so any code holding one is unreachable.
    pub fn absurd<T>(self) -> T {
        match self {}
    }
}

impl fmt::Display for Void {
    fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {}
    }
}

/// Subscription protocol versions, most preferred first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolVersion {
    /// Subscribe followed by periodic keep-alives.
    Subscribe,
    /// Legacy single-shot subscription.
    Subscribe1,
}

impl ProtocolVersion {
    /// All versions in descending preference.
    pub const OFFERED: [ProtocolVersion; 2] = [ProtocolVersion::Subscribe, ProtocolVersion::Subscribe1];

    /// Name used in logs and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::Subscribe => "subscribe",
            ProtocolVersion::Subscribe1 => "subscribe1",
        }
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
