//! The dispatch loop.
//!
//! Each pass re-reads the backlog size and stops only when it is zero *and*
//! no request is in flight. Otherwise it waits on whichever comes first: an
//! idle worker taking the loaded request, a producer's wake-up, or a worker
//! finishing.

use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use super::Shared;
use super::worker::{Handoff, WorkerPool};
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::model::Request;
use crate::storage::Storage;
use crate::telemetry::metrics;

pub(super) async fn dispatch<S: Storage, E: Executor>(
    shared: &Shared<S>,
    threads: usize,
    executor: Arc<E>,
) -> Result<()> {
    let (pool, handoff) = WorkerPool::spawn(threads, Arc::clone(&executor));
    let result = drive(shared, executor.as_ref(), handoff).await;
    // `drive` consumed the handoff, so idle workers have already been told to stop.
    pool.join().await;
    result
}

async fn drive<S: Storage, E: Executor>(
    shared: &Shared<S>,
    executor: &E,
    mut handoff: Handoff,
) -> Result<()> {
    // Requests handed to a worker and not yet reported complete.
    let mut active: usize = 0;

    loop {
        let size = match shared.storage.queue_size().await {
            Ok(size) => size,
            Err(e) => {
                error!(error = %e, "backlog size check failed");
                return Err(e);
            }
        };
        if size == 0 && active == 0 {
            return Ok(());
        }

        let mut offer: Option<Request> = None;
        if size > 0 {
            match shared.load(executor).await {
                Ok(Some(request)) => offer = Some(request),
                Ok(None) => {
                    trace!(size, "store was empty on pop");
                    tokio::task::yield_now().await;
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "skipping request that failed to load");
                    metrics::load_skipped().add(1, &[]);
                    tokio::task::yield_now().await;
                    continue;
                }
            }
        }

        loop {
            tokio::select! {
                slot = handoff.idle.recv(), if offer.is_some() => {
                    let Some(slot) = slot else {
                        return Err(pool_exited());
                    };
                    let Some(request) = offer.take() else {
                        break;
                    };
                    let id = request.id;
                    match slot.send(request) {
                        Ok(()) => {
                            active += 1;
                            metrics::requests_dispatched().add(1, &[]);
                            debug!(request_id = %id, active, "request dispatched");
                            break;
                        }
                        // That worker is gone; wait for another one.
                        Err(request) => offer = Some(request),
                    }
                }
                _ = shared.wake.notified() => {
                    if offer.is_none() {
                        break;
                    }
                }
                done = handoff.complete.recv() => {
                    let Some(id) = done else {
                        return Err(pool_exited());
                    };
                    active -= 1;
                    metrics::requests_completed().add(1, &[]);
                    debug!(request_id = %id, active, "request completed");
                    if offer.is_none() && active == 0 {
                        break;
                    }
                }
            }
        }
    }
}

fn pool_exited() -> Error {
    Error::Other("worker pool exited while requests were pending".to_string())
}
