//! RPC handler exposing the notification service to the gateway.

use crate::model::Notification;
use crate::service::Service;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use stream_rpc_relay::{HandlerError, RpcHandler};
use tracing::debug;

/// RPC name for listing a user's notifications.
pub const GET_NOTIFICATIONS: &str = "get_notifications";

/// RPC name for adding a notification, which is also published to the user.
pub const ADD_NOTIFICATION: &str = "add_notification";

/// User id served when the gateway does not pass one.
pub const DEFAULT_USER_ID: i64 = 123;

/// Serves notification RPCs read from the gateway stream.
pub struct NotificationRpcHandler {
    service: Service,
}

impl NotificationRpcHandler {
    pub fn new(service: Service) -> Self {
        Self { service }
    }

    async fn get_notifications(&self, args: &Map<String, Value>) -> Result<Value, HandlerError> {
        let user_id = user_id_from_args(args)?;
        let notifications = self.service.get(user_id).await?;

        debug!(user_id, count = notifications.len(), "Listing notifications");

        Ok(Value::Array(
            notifications
                .into_iter()
                .map(|n| json!({ "id": n.id, "payload": n.payload }))
                .collect(),
        ))
    }

    async fn add_notification(&self, args: &Map<String, Value>) -> Result<Value, HandlerError> {
        let user_id = user_id_from_args(args)?;
        let payload = match args.get("payload") {
            Some(Value::String(payload)) => payload.clone(),
            Some(other) => {
                return Err(HandlerError::InvalidArgs(format!("invalid payload: {}", other)))
            }
            None => return Err(HandlerError::InvalidArgs("missing payload".to_string())),
        };

        let id = self.service.add(Notification::new(user_id, payload)).await?;
        Ok(json!({ "id": id }))
    }
}

#[async_trait]
impl RpcHandler for NotificationRpcHandler {
    async fn handle(
        &self,
        rpc: &str,
        args: &Map<String, Value>,
        _stash: &[String],
    ) -> Result<Value, HandlerError> {
        match rpc {
            GET_NOTIFICATIONS => self.get_notifications(args).await,
            ADD_NOTIFICATION => self.add_notification(args).await,
            other => Err(HandlerError::UnknownRpc(other.to_string())),
        }
    }
}

/// Read `user_id` (or `userId`) from the args as a number or numeric string.
fn user_id_from_args(args: &Map<String, Value>) -> Result<i64, HandlerError> {
    let Some(value) = args.get("user_id").or_else(|| args.get("userId")) else {
        return Ok(DEFAULT_USER_ID);
    };

    let user_id = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    };

    match user_id {
        Some(id) if id >= 0 => Ok(id),
        _ => Err(HandlerError::InvalidArgs(format!("invalid user id: {}", value))),
    }
}
