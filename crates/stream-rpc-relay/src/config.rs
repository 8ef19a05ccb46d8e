//! Configuration for the relay.

use crate::error::{RelayError, RelayResult};

/// Default number of entries pulled per XREADGROUP.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default number of dispatch workers.
pub const DEFAULT_WORKERS: usize = 5;

/// Default capacity of the work queue between reader and workers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Default idle time before a pending entry is reclaimed.
pub const DEFAULT_CLAIM_IDLE_MS: u64 = 60_000;

/// Default interval between pending-entry reclaim passes.
pub const DEFAULT_RECLAIM_INTERVAL_MS: u64 = 30_000;

/// What the reader does with an entry that cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseFailurePolicy {
    /// Log only. The entry stays in the group's pending list.
    #[default]
    Leave,
    /// Log and acknowledge without replying, so a poison entry is dropped.
    Ack,
}

/// Relay configuration.
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Stream the gateway appends RPC commands to
    pub stream: String,

    /// Consumer group name, shared by every relay instance of a deployment
    pub consumer_group: String,

    /// Consumer name (unique per instance)
    pub consumer_name: String,

    /// Maximum entries per read
    pub batch_size: usize,

    /// XREADGROUP block timeout in milliseconds
    pub block_ms: u64,

    /// Number of concurrent dispatch workers
    pub workers: usize,

    /// Work queue capacity
    pub queue_capacity: usize,

    /// Handling of entries that fail to parse
    pub parse_failure_policy: ParseFailurePolicy,

    /// Minimum idle time before a pending entry is taken over (XAUTOCLAIM)
    pub claim_idle_ms: u64,

    /// Interval between reclaim passes; 0 disables reclaiming
    pub reclaim_interval_ms: u64,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            stream: "notifications".to_string(),
            consumer_group: "rpcWorker".to_string(),
            consumer_name: format!("rpc-relay-{}", uuid::Uuid::new_v4()),
            batch_size: DEFAULT_BATCH_SIZE,
            block_ms: 5000,
            workers: DEFAULT_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            parse_failure_policy: ParseFailurePolicy::Leave,
            claim_idle_ms: DEFAULT_CLAIM_IDLE_MS,
            reclaim_interval_ms: DEFAULT_RECLAIM_INTERVAL_MS,
        }
    }
}

impl RelayConfig {
    /// Build a config from defaults overridden by environment variables.
    ///
    /// The result is not validated; callers apply their own overrides first.
    pub fn from_env() -> RelayResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from defaults overridden by `lookup`.
    pub fn from_lookup<F>(lookup: F) -> RelayResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("REDIS_URL") {
            config.redis_url = url;
        }
        if let Some(stream) = lookup("RPC_STREAM") {
            config.stream = stream;
        }
        if let Some(group) = lookup("RPC_CONSUMER_GROUP") {
            config.consumer_group = group;
        }
        if let Some(n) = parse_var(&lookup, "RPC_BATCH_SIZE")? {
            config.batch_size = n;
        }
        if let Some(ms) = parse_var(&lookup, "RPC_BLOCK_MS")? {
            config.block_ms = ms;
        }
        if let Some(n) = parse_var(&lookup, "RPC_WORKERS")? {
            config.workers = n;
        }
        if let Some(n) = parse_var(&lookup, "RPC_QUEUE_CAPACITY")? {
            config.queue_capacity = n;
        }
        if let Some(flag) = lookup("RPC_ACK_UNPARSEABLE") {
            if matches!(flag.trim(), "1" | "true" | "TRUE" | "yes") {
                config.parse_failure_policy = ParseFailurePolicy::Ack;
            }
        }
        if let Some(ms) = parse_var(&lookup, "RPC_CLAIM_IDLE_MS")? {
            config.claim_idle_ms = ms;
        }
        if let Some(ms) = parse_var(&lookup, "RPC_RECLAIM_INTERVAL_MS")? {
            config.reclaim_interval_ms = ms;
        }

        Ok(config)
    }

    /// Reject settings the relay cannot run with.
    pub fn validate(&self) -> RelayResult<()> {
        if self.stream.is_empty() {
            return Err(RelayError::Config("stream name is empty".to_string()));
        }
        if self.consumer_group.is_empty() {
            return Err(RelayError::Config("consumer group is empty".to_string()));
        }
        if self.consumer_name.is_empty() {
            return Err(RelayError::Config("consumer name is empty".to_string()));
        }
        if self.workers == 0 {
            return Err(RelayError::Config("workers must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(RelayError::Config("batch size must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(RelayError::Config(
                "queue capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> RelayResult<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| RelayError::Config(format!("{} is not a valid number: {}", key, raw))),
    }
}
