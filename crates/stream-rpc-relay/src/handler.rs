//! The capability the relay dispatches requests to.

use crate::error::HandlerError;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Business logic behind the relay.
///
/// Implementations decide which rpc names they serve and must reject the
/// rest. They are called concurrently from every dispatch worker.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    async fn handle(
        &self,
        rpc: &str,
        args: &Map<String, Value>,
        stash: &[String],
    ) -> Result<Value, HandlerError>;
}
