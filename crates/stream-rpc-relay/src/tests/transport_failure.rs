//! V. Transport failure handling tests.
//!
//! Rules covered:
//! - 16. A failed read is logged, the connection rebuilt and the read retried
//! - 17. The consumer group is ensured before reading, on every start
//! - 18. Failing to ensure the consumer group aborts the run
//! - 19. An invalid configuration is rejected before touching Redis

use super::harness::{
    now, rpc_entry, test_config, wait_until, MockRedis, RecordingHandler, RelayRun,
};
use crate::config::RelayConfig;
use crate::error::RelayError;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Rule 16: A failed read is logged, the connection rebuilt and the read retried
#[tokio::test]
async fn rule_16_read_errors_retried() {
    let redis = Arc::new(MockRedis::new());
    redis.fail_next_reads(3);
    let handler = Arc::new(RecordingHandler::returning(json!([])));

    redis.xadd(rpc_entry("get_notifications", "16", now() + 60));

    let run = RelayRun::start(redis.clone(), handler.clone(), test_config());
    assert!(wait_until(|| redis.ack_count() == 1, Duration::from_secs(2)).await);
    run.stop().await.unwrap();

    assert_eq!(redis.reconnects(), 3);
    assert!(redis.read_calls() >= 4);
    assert_eq!(handler.call_count(), 1);
}

/// Rule 17: The consumer group is ensured before reading, on every start
#[tokio::test]
async fn rule_17_group_ensured_on_every_start() {
    let redis = Arc::new(MockRedis::new());
    let handler = Arc::new(RecordingHandler::returning(json!([])));

    // Reads fail with NOGROUP unless the group exists first
    let run = RelayRun::start(redis.clone(), handler.clone(), test_config());
    assert!(wait_until(|| redis.read_calls() > 0, Duration::from_secs(2)).await);
    run.stop().await.unwrap();
    assert_eq!(redis.reconnects(), 0, "No read should have failed");

    let run = RelayRun::start(redis.clone(), handler, test_config());
    redis.xadd(rpc_entry("get_notifications", "16", now() + 60));
    assert!(wait_until(|| redis.ack_count() == 1, Duration::from_secs(2)).await);
    run.stop().await.unwrap();

    assert_eq!(redis.group_creates(), 2);
    assert_eq!(redis.reconnects(), 0);
}

/// Rule 18: Failing to ensure the consumer group aborts the run
#[tokio::test]
async fn rule_18_group_failure_aborts_run() {
    let redis = Arc::new(MockRedis::new());
    redis.set_fail_group(true);
    let handler = Arc::new(RecordingHandler::returning(json!([])));

    let run = RelayRun::start(redis.clone(), handler, test_config());
    let result = run.join().await;

    assert!(matches!(result, Err(RelayError::Redis(_))));
    assert_eq!(redis.read_calls(), 0);
}

/// Rule 19: An invalid configuration is rejected before touching Redis
#[tokio::test]
async fn rule_19_invalid_config_rejected() {
    let redis = Arc::new(MockRedis::new());
    let handler = Arc::new(RecordingHandler::returning(json!([])));

    let config = RelayConfig {
        workers: 0,
        ..test_config()
    };
    let run = RelayRun::start(redis.clone(), handler, config);
    let result = run.join().await;

    assert!(matches!(result, Err(RelayError::Config(_))));
    assert_eq!(redis.group_creates(), 0);
    assert_eq!(redis.read_calls(), 0);
}
