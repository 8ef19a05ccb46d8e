use serde::{Deserialize, Serialize};

/// A notification addressed to one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Assigned by the store; zero until stored.
    #[serde(default)]
    pub id: i64,
    pub user_id: i64,
    pub payload: String,
}

impl Notification {
    /// A notification not yet stored.
    pub fn new(user_id: i64, payload: impl Into<String>) -> Self {
        Self {
            id: 0,
            user_id,
            payload: payload.into(),
        }
    }
}
