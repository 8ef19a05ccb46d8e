//! Reply publishing and acknowledgment.
//!
//! Every outcome ends here. Live requests get a reply envelope published on
//! their `who` channel; then the stream entry is acknowledged, whether or
//! not the publish went through.

use crate::codec::{build_reply, Request};
use crate::pool::Outcome;
use crate::transport::StreamTransport;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// What the publisher did for one outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub entry_id: String,
    /// A reply reached the transport.
    pub published: bool,
    /// The transport confirmed the acknowledgment.
    pub acked: bool,
}

/// Publishes replies and acknowledges stream entries.
#[derive(Clone)]
pub struct ReplyPublisher {
    transport: Arc<dyn StreamTransport>,
    stream: String,
    consumer_group: String,
}

impl ReplyPublisher {
    pub fn new(
        transport: Arc<dyn StreamTransport>,
        stream: impl Into<String>,
        consumer_group: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            stream: stream.into(),
            consumer_group: consumer_group.into(),
        }
    }

    /// Finish one request: reply unless it expired, then acknowledge.
    pub async fn deliver(&self, outcome: Outcome) -> Delivery {
        let (request, published) = match outcome {
            Outcome::Expired(request) => (request, false),
            Outcome::Handled { request, result } => {
                let published = self.publish_reply(&request, &result).await;
                (request, published)
            }
            Outcome::Failed { request, .. } => {
                let published = self.publish_reply(&request, &Value::Null).await;
                (request, published)
            }
        };

        let acked = self.ack(&request.entry_id).await;

        Delivery {
            entry_id: request.entry_id,
            published,
            acked,
        }
    }

    /// Acknowledge `entry_id`. Failures are logged; the entry stays pending
    /// and the reader reclaims it once idle.
    pub async fn ack(&self, entry_id: &str) -> bool {
        match self
            .transport
            .ack(&self.stream, &self.consumer_group, entry_id)
            .await
        {
            Ok(acked) => acked,
            Err(e) => {
                error!(entry_id = %entry_id, error = %e, "Failed to acknowledge entry");
                false
            }
        }
    }

    async fn publish_reply(&self, request: &Request, result: &Value) -> bool {
        let payload = match build_reply(request, result) {
            Ok(payload) => payload,
            Err(e) => {
                error!(
                    rpc = %request.rpc,
                    message_id = %request.message_id,
                    error = %e,
                    "Failed to build reply"
                );
                return false;
            }
        };

        match self.transport.publish(&request.who, &payload).await {
            Ok(receivers) => {
                debug!(
                    rpc = %request.rpc,
                    message_id = %request.message_id,
                    who = %request.who,
                    receivers,
                    "Sent reply"
                );
                true
            }
            Err(e) => {
                warn!(
                    rpc = %request.rpc,
                    message_id = %request.message_id,
                    who = %request.who,
                    error = %e,
                    "Failed to publish reply"
                );
                false
            }
        }
    }

    /// Spawn a task delivering outcomes until the channel closes.
    pub fn spawn(&self, mut outcomes: mpsc::Receiver<Outcome>) -> JoinHandle<()> {
        let publisher = self.clone();
        tokio::spawn(async move {
            while let Some(outcome) = outcomes.recv().await {
                publisher.deliver(outcome).await;
            }
            debug!("Reply publisher stopped");
        })
    }
}
