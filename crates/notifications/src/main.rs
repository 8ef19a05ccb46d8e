//! Notifications worker entry point.
//!
//! Usage: notifications-worker [--redis-url <url>] [--stream <name>] [--group <name>]
//!
//! Settings not given on the command line come from the `RPC_*` environment
//! variables, then from built-in defaults. The merged settings are validated
//! once, after the command line is applied.
//!
//! Notifications are held in a process-local [`InMemoryStore`]: they are
//! written through the `add_notification` RPC and are lost when the worker
//! exits.

use anyhow::Context;
use clap::Parser;
use notifications::{InMemoryStore, NotificationRpcHandler, RedisPublisher, Service};
use std::sync::Arc;
use stream_rpc_relay::{ParseFailurePolicy, RedisTransport, Relay, RelayConfig};
use tokio::sync::broadcast;
use tracing::{error, info};

/// Serves notification RPCs from the gateway's Redis stream.
#[derive(Parser, Debug)]
#[command(name = "notifications-worker")]
#[command(about = "Consumer-group worker answering notification RPCs over Redis")]
struct Args {
    /// Redis connection URL.
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Stream to read RPC commands from.
    #[arg(long, env = "RPC_STREAM")]
    stream: Option<String>,

    /// Consumer group name.
    #[arg(long, env = "RPC_CONSUMER_GROUP")]
    group: Option<String>,

    /// Number of dispatch workers.
    #[arg(long, env = "RPC_WORKERS")]
    workers: Option<usize>,

    /// Work queue capacity.
    #[arg(long, env = "RPC_QUEUE_CAPACITY")]
    queue_capacity: Option<usize>,

    /// Idle time in milliseconds before another consumer's pending entry is taken over.
    #[arg(long, env = "RPC_CLAIM_IDLE_MS")]
    claim_idle_ms: Option<u64>,

    /// Acknowledge entries that cannot be parsed instead of leaving them pending.
    #[arg(long)]
    ack_unparseable: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (compact, json)
    #[arg(long, default_value = "compact")]
    log_format: observability::LogFormat,
}

impl Args {
    fn apply(self, config: &mut RelayConfig) {
        if let Some(url) = self.redis_url {
            config.redis_url = url;
        }
        if let Some(stream) = self.stream {
            config.stream = stream;
        }
        if let Some(group) = self.group {
            config.consumer_group = group;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        if let Some(idle) = self.claim_idle_ms {
            config.claim_idle_ms = idle;
        }
        if self.ack_unparseable {
            config.parse_failure_policy = ParseFailurePolicy::Ack;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    observability::init_with_config(observability::LogConfig {
        service_name: "notifications-worker".into(),
        default_level: args.log_level.clone(),
        format: args.log_format,
    });

    info!("Notifications worker starting...");

    let mut config = RelayConfig::from_env().context("invalid relay environment")?;
    args.apply(&mut config);
    config.validate().context("invalid relay configuration")?;

    info!(
        redis_url = %config.redis_url,
        stream = %config.stream,
        group = %config.consumer_group,
        consumer = %config.consumer_name,
        workers = config.workers,
        queue_capacity = config.queue_capacity,
        claim_idle_ms = config.claim_idle_ms,
        reclaim_interval_ms = config.reclaim_interval_ms,
        parse_failure_policy = ?config.parse_failure_policy,
        "Configuration loaded"
    );

    let transport = RedisTransport::connect(&config.redis_url)
        .await
        .context("failed to connect to Redis")?;
    let publisher = RedisPublisher::connect(&config.redis_url)
        .await
        .context("failed to connect notification publisher")?;

    let service = Service::new(Arc::new(InMemoryStore::new()), Arc::new(publisher));
    let handler = NotificationRpcHandler::new(service);
    let relay = Relay::new(config, Arc::new(transport), Arc::new(handler));

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, draining...");
            let _ = shutdown_tx.send(());
        }
    });

    if let Err(e) = relay.run(shutdown_rx).await {
        error!(error = %e, "Relay exited with error");
        return Err(e.into());
    }

    info!("Notifications worker stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_env_config() {
        let args = Args::parse_from([
            "notifications-worker",
            "--stream",
            "rpc",
            "--workers",
            "8",
            "--ack-unparseable",
            "--log-format",
            "json",
        ]);
        assert_eq!(args.log_format, observability::LogFormat::Json);

        let mut config = RelayConfig::default();
        args.apply(&mut config);

        assert_eq!(config.stream, "rpc");
        assert_eq!(config.workers, 8);
        assert_eq!(config.consumer_group, "rpcWorker");
        assert_eq!(config.parse_failure_policy, ParseFailurePolicy::Ack);
    }

    #[test]
    fn test_defaults_leave_config_alone() {
        let args = Args::parse_from(["notifications-worker"]);
        let mut config = RelayConfig::default();
        let before = config.clone();

        args.apply(&mut config);

        assert_eq!(config.stream, before.stream);
        assert_eq!(config.workers, before.workers);
        assert_eq!(config.parse_failure_policy, ParseFailurePolicy::Leave);
    }

    #[test]
    fn test_cli_fixes_env_before_validation() {
        let mut config = RelayConfig::from_lookup(|key| match key {
            "RPC_WORKERS" => Some("0".to_string()),
            _ => None,
        })
        .unwrap();
        assert!(config.validate().is_err());

        let args = Args::parse_from([
            "notifications-worker",
            "--workers",
            "4",
            "--claim-idle-ms",
            "500",
        ]);
        args.apply(&mut config);

        assert!(config.validate().is_ok());
        assert_eq!(config.workers, 4);
        assert_eq!(config.claim_idle_ms, 500);
    }
}
