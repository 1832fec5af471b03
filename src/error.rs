//! Error types for relay-subscription.

use thiserror::Error;

/// Errors that can occur while resolving, subscribing, or listening.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// IO error (network, socket, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// DNS resolver error
    #[error("DNS resolution error: {0}")]
    Resolve(#[from] hickory_resolver::ResolveError),

    /// A name resolved successfully but yielded no addresses
    #[error("No records found for {0}")]
    NoRecords(String),

    /// Conversation or connection failure reported by the transport
    #[error("Transport error: {0}")]
    Transport(String),

    /// The peer supports none of the offered protocol versions
    #[error("Protocol negotiation failed with {0}")]
    Negotiation(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Failed to parse address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}
