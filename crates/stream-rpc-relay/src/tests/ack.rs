//! I. Acknowledgment tests.
//!
//! Rules covered:
//! - 1. Every parsed entry is acknowledged exactly once
//! - 2. The ack follows the reply publish
//! - 3. A failed publish is still followed by an ack
//! - 4. A handler error is replied with a null result, then acked
//! - 5. A failed ack leaves the entry pending and the relay keeps serving

use super::harness::{
    now, rpc_entry, test_config, wait_until, HandlerBehavior, MockRedis, RecordingHandler,
    RelayRun, TransportEvent,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Rule 1: Every parsed entry is acknowledged exactly once
#[tokio::test]
async fn rule_01_each_entry_acked_exactly_once() {
    let redis = Arc::new(MockRedis::new());
    let handler = Arc::new(RecordingHandler::returning(json!({ "ok": true })));

    let ids: Vec<String> = (0..5)
        .map(|i| redis.xadd(rpc_entry("get_notifications", &i.to_string(), now() + 60)))
        .collect();

    let run = RelayRun::start(redis.clone(), handler.clone(), test_config());
    assert!(
        wait_until(|| redis.ack_count() == 5, Duration::from_secs(2)).await,
        "All entries should be acked"
    );
    run.stop().await.unwrap();

    for id in &ids {
        assert_eq!(redis.ack_attempts(id), 1, "Entry {} acked more than once", id);
    }
    assert!(redis.pending_ids().is_empty());
}

/// Rule 2: The ack follows the reply publish
#[tokio::test]
async fn rule_02_ack_after_publish() {
    let redis = Arc::new(MockRedis::new());
    let handler = Arc::new(RecordingHandler::returning(json!([])));

    let entry_id = redis.xadd(rpc_entry("get_notifications", "16", now() + 60));

    let run = RelayRun::start(redis.clone(), handler, test_config());
    assert!(wait_until(|| redis.ack_count() == 1, Duration::from_secs(2)).await);
    run.stop().await.unwrap();

    assert_eq!(
        redis.events(),
        vec![
            TransportEvent::Publish {
                channel: "R1".to_string(),
                message_id: Some("16".to_string()),
            },
            TransportEvent::Ack(entry_id),
        ]
    );
}

/// Rule 3: A failed publish is still followed by an ack
#[tokio::test]
async fn rule_03_ack_when_publish_fails() {
    let redis = Arc::new(MockRedis::new());
    redis.set_fail_publish(true);
    let handler = Arc::new(RecordingHandler::returning(json!([])));

    let entry_id = redis.xadd(rpc_entry("get_notifications", "16", now() + 60));

    let run = RelayRun::start(redis.clone(), handler.clone(), test_config());
    assert!(wait_until(|| redis.ack_count() == 1, Duration::from_secs(2)).await);
    run.stop().await.unwrap();

    assert_eq!(handler.call_count(), 1);
    assert!(redis.published().is_empty(), "Publish should have failed");
    assert_eq!(redis.acked(), vec![entry_id]);
}

/// Rule 4: A handler error is replied with a null result, then acked
#[tokio::test]
async fn rule_04_handler_error_replies_null() {
    let redis = Arc::new(MockRedis::new());
    let handler = Arc::new(RecordingHandler::new(HandlerBehavior::Fail(
        "store unavailable".to_string(),
    )));

    let entry_id = redis.xadd(rpc_entry("get_notifications", "16", now() + 60));

    let run = RelayRun::start(redis.clone(), handler, test_config());
    assert!(wait_until(|| redis.ack_count() == 1, Duration::from_secs(2)).await);
    run.stop().await.unwrap();

    let replies = redis.published_on("R1");
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0]["message_id"], "16");
    assert_eq!(replies[0]["response"]["result"], Value::Null);
    assert_eq!(redis.acked(), vec![entry_id]);
}

/// Rule 5: A failed ack leaves the entry pending and the relay keeps serving
#[tokio::test]
async fn rule_05_failed_ack_leaves_entry_pending() {
    let redis = Arc::new(MockRedis::new());
    redis.set_fail_ack(true);
    let handler = Arc::new(RecordingHandler::returning(json!([])));

    let first = redis.xadd(rpc_entry("get_notifications", "1", now() + 60));
    let second = redis.xadd(rpc_entry("get_notifications", "2", now() + 60));

    let run = RelayRun::start(redis.clone(), handler.clone(), test_config());
    assert!(
        wait_until(
            || redis.ack_attempts(&first) == 1 && redis.ack_attempts(&second) == 1,
            Duration::from_secs(2)
        )
        .await
    );
    run.stop().await.unwrap();

    assert_eq!(handler.call_count(), 2, "Relay should keep serving");
    assert_eq!(redis.published_on("R1").len(), 2);
    assert_eq!(redis.pending_ids(), vec![first, second]);
}
