//! Relay orchestration.

use crate::codec::Request;
use crate::config::RelayConfig;
use crate::error::RelayResult;
use crate::handler::RpcHandler;
use crate::pool::{Clock, DispatchPool, Outcome, SystemClock};
use crate::reader::StreamReader;
use crate::reply::ReplyPublisher;
use crate::transport::StreamTransport;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};

/// The stream RPC relay.
///
/// Wires the reader, the dispatch pool and the reply publisher:
///
/// ```text
/// Stream --XREADGROUP--> Reader --queue--> Workers --outcomes--> Publisher
///    ^                                        |                    |
///    |                                     handler            PUBLISH who
///    |____________________ XACK ___________________________________|
/// ```
pub struct Relay {
    config: RelayConfig,
    transport: Arc<dyn StreamTransport>,
    handler: Arc<dyn RpcHandler>,
    clock: Arc<dyn Clock>,
}

impl Relay {
    pub fn new(
        config: RelayConfig,
        transport: Arc<dyn StreamTransport>,
        handler: Arc<dyn RpcHandler>,
    ) -> Self {
        Self {
            config,
            transport,
            handler,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for deadline checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Run until `shutdown` fires.
    ///
    /// After the signal the reader stops pulling entries, and the call
    /// returns once every request already queued or in flight has been
    /// replied to and acknowledged.
    pub async fn run(&self, shutdown: broadcast::Receiver<()>) -> RelayResult<()> {
        self.config.validate()?;

        info!(
            stream = %self.config.stream,
            group = %self.config.consumer_group,
            consumer = %self.config.consumer_name,
            workers = self.config.workers,
            queue_capacity = self.config.queue_capacity,
            "Starting relay"
        );

        let (queue_tx, queue_rx) = mpsc::channel::<Request>(self.config.queue_capacity);
        let (outcome_tx, outcome_rx) = mpsc::channel::<Outcome>(self.config.queue_capacity);

        let publisher = ReplyPublisher::new(
            self.transport.clone(),
            self.config.stream.clone(),
            self.config.consumer_group.clone(),
        );
        let publisher_task = publisher.spawn(outcome_rx);

        let pool = DispatchPool::new(self.handler.clone(), self.clock.clone(), self.config.workers);
        let workers = pool.spawn(queue_rx, outcome_tx);

        let reader = StreamReader::new(self.transport.clone(), self.config.clone());
        let result = reader.run(queue_tx, shutdown).await;

        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = %e, "Dispatch worker panicked");
            }
        }
        if let Err(e) = publisher_task.await {
            error!(error = %e, "Reply publisher panicked");
        }

        info!("Relay stopped");
        result.map(|_| ())
    }
}
