//! Fixed-size pool of dispatch workers.
//!
//! Workers share one bounded queue fed by the stream reader. Each request is
//! checked against its deadline when a worker picks it up; live requests go
//! to the handler and every request leaves the pool as an [`Outcome`].

use crate::codec::Request;
use crate::error::HandlerError;
use crate::handler::RpcHandler;
use futures_util::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Source of "now" in epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// What happened to a request inside the pool.
#[derive(Debug)]
pub enum Outcome {
    /// Deadline had passed at pick-up; the handler was not called.
    Expired(Request),
    /// The handler returned a result.
    Handled { request: Request, result: Value },
    /// The handler returned an error.
    Failed {
        request: Request,
        error: HandlerError,
    },
}

impl Outcome {
    /// The request this outcome belongs to.
    pub fn request(&self) -> &Request {
        match self {
            Outcome::Expired(request) => request,
            Outcome::Handled { request, .. } => request,
            Outcome::Failed { request, .. } => request,
        }
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, Outcome::Expired(_))
    }
}

/// Dispatch pool configuration and collaborators.
#[derive(Clone)]
pub struct DispatchPool {
    handler: Arc<dyn RpcHandler>,
    clock: Arc<dyn Clock>,
    workers: usize,
}

impl DispatchPool {
    pub fn new(handler: Arc<dyn RpcHandler>, clock: Arc<dyn Clock>, workers: usize) -> Self {
        Self {
            handler,
            clock,
            workers: workers.max(1),
        }
    }

    /// Apply the deadline policy to one request and call the handler if it
    /// is still live.
    ///
    /// The deadline is checked once, here. A handler that runs past the
    /// deadline is not interrupted. A handler panic becomes
    /// [`Outcome::Failed`].
    pub async fn dispatch(&self, request: Request) -> Outcome {
        let now = self.clock.now();
        if request.is_expired_at(now) {
            info!(
                rpc = %request.rpc,
                message_id = %request.message_id,
                overdue_secs = now.saturating_sub(request.deadline),
                "Deadline reached, skipping request"
            );
            return Outcome::Expired(request);
        }

        let handled = AssertUnwindSafe(self.handler.handle(
            &request.rpc,
            &request.args,
            &request.stash,
        ))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(HandlerError::Other(format!(
                "handler panicked: {}",
                panic_message(panic.as_ref())
            )))
        });

        match handled {
            Ok(result) => Outcome::Handled { request, result },
            Err(error) => {
                warn!(
                    rpc = %request.rpc,
                    message_id = %request.message_id,
                    error = %error,
                    "Failed to handle rpc"
                );
                Outcome::Failed { request, error }
            }
        }
    }

    /// Spawn the workers.
    ///
    /// Workers exit once `queue` is closed and drained. `outcomes` is closed
    /// when the last worker exits.
    pub fn spawn(
        &self,
        queue: mpsc::Receiver<Request>,
        outcomes: mpsc::Sender<Outcome>,
    ) -> Vec<JoinHandle<()>> {
        let queue = Arc::new(Mutex::new(queue));

        (0..self.workers)
            .map(|worker_id| {
                let pool = self.clone();
                let queue = queue.clone();
                let outcomes = outcomes.clone();
                tokio::spawn(async move { pool.work(worker_id, queue, outcomes).await })
            })
            .collect()
    }

    async fn work(
        &self,
        worker_id: usize,
        queue: Arc<Mutex<mpsc::Receiver<Request>>>,
        outcomes: mpsc::Sender<Outcome>,
    ) {
        debug!(worker_id, "Dispatch worker started");

        loop {
            let next = queue.lock().await.recv().await;
            let Some(request) = next else {
                break;
            };

            let outcome = self.dispatch(request).await;
            if let Err(mpsc::error::SendError(outcome)) = outcomes.send(outcome).await {
                warn!(
                    worker_id,
                    entry_id = %outcome.request().entry_id,
                    "Reply publisher gone, dropping outcome"
                );
                break;
            }
        }

        debug!(worker_id, "Dispatch worker stopped");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
