//! Notification service and its stream RPC front end.
//!
//! Notifications are kept in a [`Store`] and announced on the per-user
//! `USER_NOTIFICATIONS::<user_id>` channel when added. The gateway reads
//! them through the `get_notifications` RPC, which
//! [`NotificationRpcHandler`] serves behind a
//! [`Relay`](stream_rpc_relay::Relay).

pub mod error;
pub mod model;
pub mod publisher;
pub mod rpc_handler;
pub mod service;
pub mod store;

pub use error::{NotificationError, NotificationResult};
pub use model::Notification;
pub use publisher::{user_channel, Publisher, RedisPublisher};
pub use rpc_handler::NotificationRpcHandler;
pub use service::Service;
pub use store::{InMemoryStore, Store};
