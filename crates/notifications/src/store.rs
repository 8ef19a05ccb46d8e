//! Notification storage.

use crate::error::NotificationResult;
use crate::model::Notification;
use async_trait::async_trait;
use tokio::sync::RwLock;

/// Persistent notification storage.
#[async_trait]
pub trait Store: Send + Sync {
    /// Store `notification` and return its assigned id.
    async fn add(&self, notification: Notification) -> NotificationResult<i64>;

    /// All notifications for `user_id`, oldest first.
    async fn get(&self, user_id: i64) -> NotificationResult<Vec<Notification>>;
}

/// Process-local store.
#[derive(Default)]
pub struct InMemoryStore {
    notifications: RwLock<Vec<Notification>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn add(&self, mut notification: Notification) -> NotificationResult<i64> {
        let mut notifications = self.notifications.write().await;
        let id = notifications.last().map_or(1, |n| n.id + 1);
        notification.id = id;
        notifications.push(notification);
        Ok(id)
    }

    async fn get(&self, user_id: i64) -> NotificationResult<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        Ok(notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect())
    }
}
