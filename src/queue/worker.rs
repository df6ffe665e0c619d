//! Worker pool: N tasks, each running one request at a time.
//!
//! A worker announces it is idle by sending a [`Slot`] to the dispatch loop
//! and then waits for a request on it. The loop only pops a request from the
//! store when it has one to offer, and a request only leaves the loop when a
//! worker is there to take it.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{Instrument, debug, error, warn};

use crate::executor::Executor;
use crate::model::{Request, RequestId};
use crate::telemetry::{metrics, request::start_request_span};

/// One-shot handoff of a single request to an idle worker.
pub(super) type Slot = oneshot::Sender<Request>;

/// Loop side of the pool's channels.
pub(super) struct Handoff {
    /// Slots of idle workers. Dropping this closes the handoff.
    pub idle: mpsc::Receiver<Slot>,
    /// One message per finished request.
    pub complete: mpsc::UnboundedReceiver<RequestId>,
}

pub(super) struct WorkerPool {
    workers: JoinSet<()>,
}

impl WorkerPool {
    pub fn spawn<E: Executor>(threads: usize, executor: Arc<E>) -> (Self, Handoff) {
        let (idle_tx, idle_rx) = mpsc::channel(threads);
        let (complete_tx, complete_rx) = mpsc::unbounded_channel();

        let mut workers = JoinSet::new();
        for worker in 0..threads {
            workers.spawn(run_worker(
                worker,
                idle_tx.clone(),
                complete_tx.clone(),
                Arc::clone(&executor),
            ));
        }

        (
            Self { workers },
            Handoff {
                idle: idle_rx,
                complete: complete_rx,
            },
        )
    }

    /// Wait for every worker to exit. Call after the handoff is dropped.
    pub async fn join(mut self) {
        while let Some(res) = self.workers.join_next().await {
            if let Err(e) = res {
                warn!(error = %e, "worker task ended abnormally");
            }
        }
    }
}

async fn run_worker<E: Executor>(
    worker: usize,
    idle: mpsc::Sender<Slot>,
    complete: mpsc::UnboundedSender<RequestId>,
    executor: Arc<E>,
) {
    loop {
        let (slot, offered) = oneshot::channel();
        if idle.send(slot).await.is_err() {
            break;
        }
        // The loop drops pending slots when it exits.
        let Ok(request) = offered.await else {
            break;
        };

        let id = request.id;
        let span = start_request_span(&request, worker);
        let started = Instant::now();

        // Run on its own task so a panicking executor costs one request, not
        // the worker.
        let exec = Arc::clone(&executor);
        let outcome = tokio::spawn(async move { exec.execute(request).await }.instrument(span)).await;
        if let Err(e) = outcome {
            error!(worker, request_id = %id, error = %e, "request execution panicked");
        }

        metrics::request_duration_ms().record(started.elapsed().as_secs_f64() * 1000.0, &[]);
        if complete.send(id).is_err() {
            break;
        }
    }
    debug!(worker, "worker stopped");
}
