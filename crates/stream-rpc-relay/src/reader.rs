//! Consumer-group reader feeding the dispatch queue.

use crate::codec::{parse_request, Request};
use crate::config::{ParseFailurePolicy, RelayConfig};
use crate::error::{RelayError, RelayResult};
use crate::transport::{StreamEntry, StreamTransport, CLAIM_CURSOR_START};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Counters reported when the reader stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub entries_read: u64,
    pub enqueued: u64,
    pub parse_failures: u64,
    pub read_errors: u64,
    /// Pending entries taken over from idle consumers.
    pub reclaimed: u64,
}

/// Sole owner of this instance's consumer-group cursor.
pub struct StreamReader {
    transport: Arc<dyn StreamTransport>,
    config: RelayConfig,
}

impl StreamReader {
    pub fn new(transport: Arc<dyn StreamTransport>, config: RelayConfig) -> Self {
        Self { transport, config }
    }

    /// Ensure the consumer group exists, then read until `shutdown` fires.
    ///
    /// Entries are parsed and pushed onto `queue` in stream order. A full
    /// queue blocks the reader. Read failures are retried straight away.
    /// Pending entries idle for `claim_idle_ms` are reclaimed through the
    /// same path on startup and every `reclaim_interval_ms`.
    pub async fn run(
        &self,
        queue: mpsc::Sender<Request>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> RelayResult<ReaderStats> {
        self.transport
            .ensure_group(&self.config.stream, &self.config.consumer_group)
            .await?;

        info!(
            stream = %self.config.stream,
            group = %self.config.consumer_group,
            consumer = %self.config.consumer_name,
            "Starting stream reader"
        );

        let mut stats = ReaderStats::default();
        let reclaim_every = (self.config.reclaim_interval_ms > 0)
            .then(|| Duration::from_millis(self.config.reclaim_interval_ms));
        let mut next_reclaim = Instant::now();

        loop {
            if let Some(every) = reclaim_every {
                if Instant::now() >= next_reclaim {
                    self.reclaim(&queue, &mut stats).await?;
                    next_reclaim = Instant::now() + every;
                }
            }

            let read = tokio::select! {
                read = self.transport.read_batch(
                    &self.config.stream,
                    &self.config.consumer_group,
                    &self.config.consumer_name,
                    self.config.batch_size,
                    self.config.block_ms,
                ) => read,
                _ = shutdown.recv() => {
                    info!("Stream reader received shutdown signal");
                    break;
                }
            };

            let entries = match read {
                Ok(entries) => entries,
                Err(e) => {
                    stats.read_errors += 1;
                    error!(error = %e, "Error in XREADGROUP");
                    if matches!(e, RelayError::Redis(_)) {
                        if let Err(reconnect_err) = self.transport.reconnect().await {
                            error!(error = %reconnect_err, "Failed to reconnect to Redis");
                        }
                    }
                    continue;
                }
            };

            if entries.is_empty() {
                debug!("No entries available, continuing to poll...");
                continue;
            }

            for entry in entries {
                self.enqueue(&entry, &queue, &mut stats).await?;
            }
        }

        info!(
            entries_read = stats.entries_read,
            enqueued = stats.enqueued,
            parse_failures = stats.parse_failures,
            read_errors = stats.read_errors,
            reclaimed = stats.reclaimed,
            "Stream reader stopped"
        );

        Ok(stats)
    }

    /// Scan the pending list once, taking over idle entries.
    async fn reclaim(
        &self,
        queue: &mpsc::Sender<Request>,
        stats: &mut ReaderStats,
    ) -> RelayResult<()> {
        let mut cursor = CLAIM_CURSOR_START.to_string();

        loop {
            let batch = match self
                .transport
                .claim_idle(
                    &self.config.stream,
                    &self.config.consumer_group,
                    &self.config.consumer_name,
                    self.config.claim_idle_ms,
                    self.config.batch_size,
                    &cursor,
                )
                .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, "Error in XAUTOCLAIM");
                    return Ok(());
                }
            };

            for entry in &batch.entries {
                info!(entry_id = %entry.id, "Reclaimed pending entry");
                stats.reclaimed += 1;
                self.enqueue(entry, queue, stats).await?;
            }

            if batch.next_cursor == CLAIM_CURSOR_START || batch.next_cursor == cursor {
                return Ok(());
            }
            cursor = batch.next_cursor;
        }
    }

    async fn enqueue(
        &self,
        entry: &StreamEntry,
        queue: &mpsc::Sender<Request>,
        stats: &mut ReaderStats,
    ) -> RelayResult<()> {
        stats.entries_read += 1;
        if let Some(request) = self.parse_entry(entry, stats).await {
            queue
                .send(request)
                .await
                .map_err(|_| RelayError::QueueClosed)?;
            stats.enqueued += 1;
        }
        Ok(())
    }

    async fn parse_entry(&self, entry: &StreamEntry, stats: &mut ReaderStats) -> Option<Request> {
        match parse_request(&entry.id, &entry.fields) {
            Ok(request) => {
                debug!(
                    entry_id = %entry.id,
                    rpc = %request.rpc,
                    message_id = %request.message_id,
                    "Got RPC message"
                );
                Some(request)
            }
            Err(e) => {
                stats.parse_failures += 1;
                warn!(
                    entry_id = %entry.id,
                    field = e.field(),
                    error = %e,
                    "Error parsing RPC message"
                );
                if self.config.parse_failure_policy == ParseFailurePolicy::Ack {
                    self.ack_unparseable(&entry.id).await;
                }
                None
            }
        }
    }

    async fn ack_unparseable(&self, entry_id: &str) {
        match self
            .transport
            .ack(&self.config.stream, &self.config.consumer_group, entry_id)
            .await
        {
            Ok(_) => debug!(entry_id = %entry_id, "Acknowledged unparseable entry"),
            Err(e) => error!(entry_id = %entry_id, error = %e, "Failed to acknowledge entry"),
        }
    }
}
