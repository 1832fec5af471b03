//! Metrics instrumentation for relay-subscription.
//!
//! All metrics are prefixed with `relay_sub.`

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

use crate::messages::ProtocolVersion;
use crate::subscription::SubscriptionTerminationReason;
use crate::types::Bucket;

/// Record the configured number of subscription groups.
pub fn record_valency(valency: usize) {
    gauge!("relay_sub.worker.valency").set(valency as f64);
}

/// Record the outcome of one DNS resolution for a group.
pub fn record_resolution(index: usize, peers: usize, errors: usize) {
    let index = index.to_string();
    counter!("relay_sub.dns.resolution.count", "index" => index.clone()).increment(1);
    gauge!("relay_sub.dns.peers", "index" => index.clone()).set(peers as f64);
    if errors > 0 {
        counter!("relay_sub.dns.error.count", "index" => index).increment(errors as u64);
    }
}

/// Record a worker round that ended in an error.
pub fn record_round_failure(index: usize) {
    counter!("relay_sub.worker.round_failure.count", "index" => index.to_string()).increment(1);
}

/// Record the protocol version negotiated for an outbound subscription.
///
/// The subscription counts as active until the returned guard is dropped.
pub fn record_negotiated(version: ProtocolVersion) -> ActiveSubscription {
    counter!("relay_sub.subscription.negotiated.count", "version" => version.as_str())
        .increment(1);
    gauge!("relay_sub.subscription.active").increment(1.0);
    ActiveSubscription(())
}

/// Keeps `relay_sub.subscription.active` raised while held.
#[must_use]
pub struct ActiveSubscription(());

impl Drop for ActiveSubscription {
    fn drop(&mut self) {
        gauge!("relay_sub.subscription.active").decrement(1.0);
    }
}

/// Record the end of an outbound subscription attempt.
pub fn record_subscription_terminated(reason: &SubscriptionTerminationReason, duration: Duration) {
    let outcome = match reason {
        SubscriptionTerminationReason::Normal => "normal",
        SubscriptionTerminationReason::Exceptional(_) => "exceptional",
    };

    counter!("relay_sub.subscription.terminated.count", "outcome" => outcome).increment(1);
    histogram!("relay_sub.subscription.duration.seconds", "outcome" => outcome)
        .record(duration.as_secs_f64());
}

/// Record a keep-alive sent on an outbound subscription.
pub fn record_keep_alive_sent() {
    counter!("relay_sub.subscription.keep_alive.sent.count").increment(1);
}

/// Record a keep-alive received by the listener.
pub fn record_keep_alive_received() {
    counter!("relay_sub.listener.keep_alive.received.count").increment(1);
}

/// Record an inbound subscription that was closed without admission.
pub fn record_listener_rejection(reason: ListenerRejection) {
    let reason_str = match reason {
        ListenerRejection::UnexpectedMessage => "unexpected_message",
        ListenerRejection::NotAdmitted => "not_admitted",
    };

    counter!("relay_sub.listener.rejection.count", "reason" => reason_str).increment(1);
}

/// Reasons an inbound subscription is not admitted.
#[derive(Debug, Clone, Copy)]
pub enum ListenerRejection {
    /// First message was not a subscription request.
    UnexpectedMessage,
    /// Registry refused the peer (already subscribed, or bucket full).
    NotAdmitted,
}

/// Record a single peer added to a bucket.
pub fn record_peer_added(bucket: Bucket) {
    counter!("relay_sub.registry.added.count", "bucket" => bucket.as_str()).increment(1);
}

/// Record a single peer removed from a bucket.
pub fn record_peer_removed(bucket: Bucket) {
    counter!("relay_sub.registry.removed.count", "bucket" => bucket.as_str()).increment(1);
}

/// Record the size of a bucket after an update.
pub fn record_bucket_size(bucket: Bucket, peers: usize) {
    gauge!("relay_sub.registry.bucket.size", "bucket" => bucket.as_str()).set(peers as f64);
}

/// Helper for timing operations.
pub struct Stopwatch {
    start: Instant,
}

impl Stopwatch {
    /// Start a new stopwatch.
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}
