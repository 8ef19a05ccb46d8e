//! Error types for the notification service.

use stream_rpc_relay::HandlerError;
use thiserror::Error;

/// Notification service errors.
#[derive(Error, Debug)]
pub enum NotificationError {
    /// Storage backend failure
    #[error("Store error: {0}")]
    Store(String),

    /// User id was not a non-negative integer
    #[error("Invalid user id: {0}")]
    InvalidUserId(String),
}

/// Result type alias for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

impl From<NotificationError> for HandlerError {
    fn from(e: NotificationError) -> Self {
        match e {
            NotificationError::Store(msg) => HandlerError::Store(msg),
            NotificationError::InvalidUserId(msg) => HandlerError::InvalidArgs(msg),
        }
    }
}
