//! relay-subscription binary entry point.
//!
//! Operator tooling around the subscription configuration: validate it, or
//! run one DNS resolution round per group and show what the worker would
//! publish.

use clap::{Parser, Subcommand};
use relay_subscription::worker::publish_once;
use relay_subscription::{telemetry, Bucket, Config, HickoryResolver};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Relay subscription tooling for a blockchain node.
#[derive(Parser, Debug)]
#[command(name = "relay-subscription")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML).
    #[arg(short, long, default_value = "relay-subscription.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load and validate the configuration.
    Check,
    /// Resolve every group once and print the published relay bucket.
    Resolve,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let config: Config = config::Config::builder()
        .add_source(config::File::from(args.config.clone()))
        .add_source(
            config::Environment::with_prefix("RELAY_SUB")
                .separator("__")
                .try_parsing(true),
        )
        .build()?
        .try_deserialize()?;

    telemetry::init(&config.telemetry).map_err(|e| e as Box<dyn std::error::Error>)?;

    let sub = &config.subscription;
    sub.validate()?;

    info!(
        config_file = %args.config.display(),
        valency = sub.valency(),
        keep_alive_secs = sub.keep_alive_secs,
        slot_duration_ms = sub.slot_duration_ms,
        "Loaded relay-subscription configuration"
    );

    let result = match args.command {
        Command::Check => {
            for (i, alts) in sub.dns_groups.iter().enumerate() {
                let names: Vec<String> = alts.iter().map(ToString::to_string).collect();
                println!("group {}: {}", i + 1, names.join(", "));
            }
            Ok(())
        }
        Command::Resolve => resolve(&config).await,
    };

    telemetry::shutdown();

    if let Err(e) = result {
        error!("relay-subscription error: {}", e);
        return Err(e.into());
    }

    Ok(())
}

async fn resolve(config: &Config) -> Result<(), relay_subscription::SubscriptionError> {
    let sub = &config.subscription;
    let resolver = HickoryResolver::new(&sub.resolver)?;
    let registry = sub.registry();

    // Ctrl-C abandons the remaining lookups.
    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                shutdown.cancel();
            }
        }
    });

    tokio::select! {
        _ = shutdown.cancelled() => {
            info!("Resolution interrupted");
            return Ok(());
        }
        published = publish_once(&resolver, &sub.dns_groups, &registry) => {
            published?;
        }
    }

    let bucket = registry.bucket(Bucket::BehindNatWorker);
    println!("{} ({} peers)", Bucket::BehindNatWorker, bucket.len());
    for (node_type, peer) in bucket.iter() {
        println!("  {} {}", node_type, peer);
    }

    Ok(())
}
