//! Fan-out of new notifications over Redis pub/sub.

use crate::model::Notification;
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tracing::{debug, warn};

/// Channel prefix for per-user notification fan-out.
pub const USER_CHANNEL_PREFIX: &str = "USER_NOTIFICATIONS::";

/// Pub/sub channel carrying new notifications for `user_id`.
pub fn user_channel(user_id: i64) -> String {
    format!("{}{}", USER_CHANNEL_PREFIX, user_id)
}

/// Announces stored notifications. Failures are logged, never returned.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, notification: &Notification);
}

/// Publishes notifications as JSON on the user's channel.
pub struct RedisPublisher {
    conn: MultiplexedConnection,
}

impl RedisPublisher {
    pub async fn connect(redis_url: &str) -> redis::RedisResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self::new(conn))
    }

    pub fn new(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&self, notification: &Notification) {
        let payload = match serde_json::to_vec(notification) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(id = notification.id, error = %e, "Failed to serialize notification");
                return;
            }
        };

        let channel = user_channel(notification.user_id);
        let mut conn = self.conn.clone();
        let published: redis::RedisResult<i64> = conn.publish(&channel, payload).await;
        match published {
            Ok(receivers) => {
                debug!(id = notification.id, channel = %channel, receivers, "Published notification")
            }
            Err(e) => {
                warn!(id = notification.id, channel = %channel, error = %e, "Failed to publish notification")
            }
        }
    }
}
