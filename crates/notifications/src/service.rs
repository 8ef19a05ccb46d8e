//! Notification service.

use crate::error::{NotificationError, NotificationResult};
use crate::model::Notification;
use crate::publisher::Publisher;
use crate::store::Store;
use std::sync::Arc;
use tracing::info;

/// Stores notifications and announces them to subscribers.
#[derive(Clone)]
pub struct Service {
    store: Arc<dyn Store>,
    publisher: Arc<dyn Publisher>,
}

impl Service {
    pub fn new(store: Arc<dyn Store>, publisher: Arc<dyn Publisher>) -> Self {
        Self { store, publisher }
    }

    /// Store `notification`, then publish it with its assigned id.
    ///
    /// Nothing is published if the store rejects it.
    pub async fn add(&self, mut notification: Notification) -> NotificationResult<i64> {
        if notification.user_id < 0 {
            return Err(NotificationError::InvalidUserId(
                notification.user_id.to_string(),
            ));
        }

        let id = self
            .store
            .add(notification.clone())
            .await
            .map_err(|e| NotificationError::Store(format!("failed to create notification: {}", e)))?;

        notification.id = id;
        info!(id, user_id = notification.user_id, "Notification added");
        self.publisher.publish(&notification).await;
        Ok(id)
    }

    pub async fn get(&self, user_id: i64) -> NotificationResult<Vec<Notification>> {
        self.store.get(user_id).await
    }
}
