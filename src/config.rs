//! Configuration types for relay-subscription.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::SubscriptionError;
use crate::listener::SubscriptionListener;
use crate::registry::PeerRegistry;
use crate::timer::Timer;
use crate::types::{Alts, Bucket, NodeAddr, NodeType};
use crate::worker::SlotDurationFn;

/// Longest accepted initial keep-alive period (one day).
pub const MAX_KEEP_ALIVE_SECS: u64 = 86_400;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Subscription worker and listener configuration.
    pub subscription: SubscriptionConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Subscription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Alternative groups of relay addresses, one subscription per group.
    /// Each entry is "host:port"; IP literals are used without DNS.
    pub dns_groups: Vec<Alts<NodeAddr>>,

    /// DNS resolver settings.
    #[serde(default)]
    pub resolver: ResolverSettings,

    /// Initial keep-alive period in seconds.
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Slot duration estimate in milliseconds, used to size the retry interval.
    #[serde(default = "default_slot_duration_ms")]
    pub slot_duration_ms: u64,

    /// Maximum number of inbound subscribers admitted at once.
    #[serde(default)]
    pub max_subscribers: Option<usize>,

    /// Node type inbound subscribers are registered as.
    #[serde(default = "default_listener_node_type")]
    pub listener_node_type: NodeType,
}

impl SubscriptionConfig {
    /// Reject settings the worker cannot run with.
    pub fn validate(&self) -> Result<(), SubscriptionError> {
        if self.keep_alive_secs == 0 {
            return Err(SubscriptionError::Config(
                "keep_alive_secs must be greater than zero".into(),
            ));
        }
        if self.keep_alive_secs > MAX_KEEP_ALIVE_SECS {
            return Err(SubscriptionError::Config(format!(
                "keep_alive_secs must be at most {}",
                MAX_KEEP_ALIVE_SECS
            )));
        }
        if self.slot_duration_ms == 0 {
            return Err(SubscriptionError::Config(
                "slot_duration_ms must be greater than zero".into(),
            ));
        }
        if self.max_subscribers == Some(0) {
            return Err(SubscriptionError::Config(
                "max_subscribers must be greater than zero when set".into(),
            ));
        }
        Ok(())
    }

    /// Number of subscription groups.
    pub fn valency(&self) -> usize {
        self.dns_groups.len()
    }

    /// Registry with the configured subscriber limit applied.
    pub fn registry(&self) -> PeerRegistry {
        let registry = PeerRegistry::new();
        match self.max_subscribers {
            Some(max) => registry.with_bucket_limit(Bucket::SubscriptionListener, max),
            None => registry,
        }
    }

    /// Listener admitting into `registry` as the configured node type.
    pub fn listener(&self, registry: &PeerRegistry) -> SubscriptionListener {
        SubscriptionListener::new(registry.clone(), self.listener_node_type)
    }

    /// Keep-alive timer with the configured initial period.
    pub fn keep_alive_timer(&self) -> Timer {
        Timer::new(Duration::from_secs(self.keep_alive_secs))
    }

    /// Slot duration estimate as a function, for the worker's retry interval.
    pub fn next_slot_duration(&self) -> SlotDurationFn {
        let slot = Duration::from_millis(self.slot_duration_ms);
        Arc::new(move || slot)
    }
}

/// DNS resolver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverSettings {
    /// Name servers to query. Empty means use the system configuration.
    #[serde(default)]
    pub nameservers: Vec<SocketAddr>,

    /// Per-query timeout in seconds.
    #[serde(default = "default_resolver_timeout_secs")]
    pub timeout_secs: u64,

    /// Attempts per query before giving up.
    #[serde(default = "default_resolver_attempts")]
    pub attempts: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            nameservers: Vec::new(),
            timeout_secs: default_resolver_timeout_secs(),
            attempts: default_resolver_attempts(),
        }
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "relay_subscription=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,

    /// OpenTelemetry configuration.
    #[serde(default)]
    pub opentelemetry: Option<OpenTelemetryConfig>,
}

/// OpenTelemetry exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenTelemetryConfig {
    /// OTLP endpoint (e.g., "http://localhost:4317").
    pub endpoint: String,

    /// Service name for traces.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
            opentelemetry: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "relay-subscription".to_string()
}

fn default_keep_alive_secs() -> u64 {
    60
}

fn default_slot_duration_ms() -> u64 {
    20_000
}

fn default_listener_node_type() -> NodeType {
    NodeType::Relay
}

fn default_resolver_timeout_secs() -> u64 {
    5
}

fn default_resolver_attempts() -> usize {
    2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    fn parse(toml: &str) -> Config {
        ::config::Config::builder()
            .add_source(::config::File::from_str(toml, ::config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = parse(
            r#"
            [subscription]
            dns_groups = [["relays.example.com:3000", "10.0.0.1:3000"], []]
            "#,
        );

        let sub = &config.subscription;
        assert_eq!(sub.valency(), 2);
        assert_eq!(sub.dns_groups[0][0], NodeAddr::new("relays.example.com", 3000));
        assert!(sub.dns_groups[1].is_empty());
        assert_eq!(sub.keep_alive_secs, 60);
        assert_eq!(sub.slot_duration_ms, 20_000);
        assert_eq!(sub.listener_node_type, NodeType::Relay);
        assert!(sub.resolver.nameservers.is_empty());
        assert_eq!(config.telemetry.log_level, "info");
        assert!(sub.validate().is_ok());
    }

    #[test]
    fn test_full_config() {
        let config = parse(
            r#"
            [subscription]
            dns_groups = [["[fd00::1]:3001"]]
            keep_alive_secs = 30
            slot_duration_ms = 40000
            max_subscribers = 10
            listener_node_type = "edge"

            [subscription.resolver]
            nameservers = ["1.1.1.1:53"]
            timeout_secs = 2

            [telemetry]
            log_level = "debug"
            "#,
        );

        let sub = &config.subscription;
        assert_eq!(sub.dns_groups[0][0].ip(), Some("fd00::1".parse().unwrap()));
        assert_eq!(sub.listener_node_type, NodeType::Edge);
        assert_eq!(sub.max_subscribers, Some(10));
        assert_eq!(sub.resolver.timeout_secs, 2);
        assert_eq!(sub.resolver.attempts, 2);
        assert_eq!((sub.next_slot_duration())(), Duration::from_secs(40));
        assert_eq!(sub.keep_alive_timer().duration(), Duration::from_secs(30));
    }

    #[test]
    fn test_validate_rejects_zero_periods() {
        let mut config = parse(
            r#"
            [subscription]
            dns_groups = []
            "#,
        )
        .subscription;

        config.keep_alive_secs = 0;
        assert!(config.validate().is_err());

        config.keep_alive_secs = 60;
        config.slot_duration_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_oversized_keep_alive() {
        let mut config = parse(
            r#"
            [subscription]
            dns_groups = []
            keep_alive_secs = 9223372036854775807
            "#,
        )
        .subscription;
        assert!(matches!(config.validate(), Err(SubscriptionError::Config(_))));

        config.keep_alive_secs = MAX_KEEP_ALIVE_SECS;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_registry_applies_subscriber_limit() {
        let mut config = parse(
            r#"
            [subscription]
            dns_groups = []
            "#,
        )
        .subscription;
        config.max_subscribers = Some(1);

        let registry = config.registry();
        let listener = config.listener(&registry);
        let a = NodeId::new("10.0.0.1:3000".parse().unwrap());
        let b = NodeId::new("10.0.0.2:3000".parse().unwrap());

        let _first = listener
            .registry()
            .admit(Bucket::SubscriptionListener, NodeType::Relay, a)
            .unwrap();
        assert!(registry
            .admit(Bucket::SubscriptionListener, NodeType::Relay, b)
            .is_none());
    }
}
