//! Request queue: the public API for enqueueing and draining fetch work.
//!
//! A [`Queue`] owns one storage backend and a fixed worker count. Producers
//! add requests at any time; [`Queue::run`] hands them to workers and returns
//! once the backlog is empty *and* nothing is in flight, including work that
//! was discovered and enqueued while it was running.

mod dispatch;
mod worker;

use std::sync::{Arc, Mutex, PoisonError};

use opentelemetry::KeyValue;
use tokio::sync::Notify;
use tracing::{Instrument, debug, info, warn};

use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::executor::Executor;
use crate::model::Request;
use crate::storage::{InMemoryStorage, Storage};
use crate::telemetry::{metrics, request::start_run_span};

/// Lifecycle of a queue's run loop. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Stopped,
}

/// How requests travel between the queue and its store, picked once at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transfer {
    /// Requests move as values through [`NativeStorage`](crate::storage::NativeStorage).
    Native,
    /// Requests are marshalled to bytes.
    Bytes,
}

/// State shared between the queue, its producers and the dispatch loop.
struct Shared<S> {
    storage: S,
    transfer: Transfer,
    state: Mutex<RunState>,
    /// Wakes a running dispatch loop after a request was stored.
    wake: Notify,
}

impl<S: Storage> Shared<S> {
    fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Check-and-set into `Running`. A queue runs at most once.
    fn begin_run(&self) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let previous = *state;
            if previous == RunState::NotStarted {
                *state = RunState::Running;
            }
            previous
        };
        if previous != RunState::NotStarted {
            panic!("Queue::run called on a queue that is already {previous:?}");
        }
    }

    fn finish_run(&self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = RunState::Stopped;
    }

    async fn add_request(&self, request: Request) -> Result<()> {
        let id = request.id;
        let stored = self.store(request).await;

        let result = match &stored {
            Ok(()) => "ok",
            Err(Error::QueueFull) => "full",
            Err(_) => "error",
        };
        metrics::requests_enqueued().add(1, &[KeyValue::new("result", result)]);
        stored?;

        // Wake only once the request is stored, so the loop never wakes up to
        // a backlog that doesn't contain it yet.
        if self.state() == RunState::Running {
            self.wake.notify_one();
        }
        debug!(request_id = %id, "request enqueued");
        Ok(())
    }

    async fn store(&self, request: Request) -> Result<()> {
        if self.transfer == Transfer::Native {
            if let Some(native) = self.storage.native() {
                return native.add_native(request);
            }
        }
        let data = request.marshal()?;
        self.storage.add_request(data).await
    }

    /// Pop the next request. `Ok(None)` when the store turned out empty.
    async fn load<E: Executor>(&self, executor: &E) -> Result<Option<Request>> {
        if self.transfer == Transfer::Native {
            if let Some(native) = self.storage.native() {
                return native.get_native();
            }
        }
        match self.storage.get_request().await? {
            Some(data) => executor.unmarshal_request(&data).map(Some),
            None => Ok(None),
        }
    }
}

/// Marks the run as stopped however `run` exits, including cancellation.
struct RunGuard<'a, S: Storage>(&'a Shared<S>);

impl<S: Storage> Drop for RunGuard<'_, S> {
    fn drop(&mut self) {
        self.0.finish_run();
    }
}

/// A request queue consumed by a pool of workers.
pub struct Queue<S: Storage = InMemoryStorage> {
    threads: usize,
    shared: Arc<Shared<S>>,
}

impl Queue<InMemoryStorage> {
    /// Queue backed by a bounded in-memory store
    /// ([`DEFAULT_MAX_SIZE`](crate::storage::DEFAULT_MAX_SIZE) requests).
    pub async fn new(threads: usize) -> Result<Self> {
        Self::with_storage(threads, InMemoryStorage::default()).await
    }

    /// In-memory queue sized from configuration.
    pub async fn from_config(config: &QueueConfig) -> Result<Self> {
        Self::with_storage(config.threads, InMemoryStorage::new(config.max_size)).await
    }
}

impl<S: Storage> Queue<S> {
    /// Queue on top of `storage`. Initializes the store.
    ///
    /// `threads` below 1 is raised to 1; a queue without workers could never
    /// drain.
    pub async fn with_storage(threads: usize, mut storage: S) -> Result<Self> {
        storage.init().await?;

        let threads = if threads == 0 {
            warn!("queue created with 0 threads, using 1");
            1
        } else {
            threads
        };

        let transfer = if storage.native().is_some() {
            Transfer::Native
        } else {
            Transfer::Bytes
        };
        debug!(threads, ?transfer, "queue created");

        Ok(Self {
            threads,
            shared: Arc::new(Shared {
                storage,
                transfer,
                state: Mutex::new(RunState::NotStarted),
                wake: Notify::new(),
            }),
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    pub fn state(&self) -> RunState {
        self.shared.state()
    }

    /// Cloneable handle for enqueueing from other tasks, e.g. from inside an
    /// executor while [`run`](Self::run) is active.
    pub fn producer(&self) -> Producer<S> {
        Producer {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Enqueue a request. Wakes the run loop if it is active.
    pub async fn add_request(&self, request: Request) -> Result<()> {
        self.shared.add_request(request).await
    }

    /// Enqueue a GET for `address`.
    pub async fn add_url(&self, address: &str) -> Result<()> {
        self.shared.add_request(Request::parse_get(address)?).await
    }

    /// Number of queued requests, not counting ones already on a worker.
    pub async fn size(&self) -> Result<usize> {
        self.shared.storage.queue_size().await
    }

    /// True when nothing is queued. A failing size check also reads as empty.
    pub async fn is_empty(&self) -> bool {
        self.size().await.map_or(true, |size| size == 0)
    }

    /// Run workers until the backlog is empty and no request is in flight.
    ///
    /// Returns the first storage fault hit while checking the backlog; load
    /// failures of individual requests are logged and skipped.
    ///
    /// # Panics
    ///
    /// If called more than once on the same queue.
    pub async fn run<E: Executor>(&self, executor: Arc<E>) -> Result<()> {
        self.shared.begin_run();
        let _guard = RunGuard(&self.shared);

        info!(threads = self.threads, "queue run started");
        let result = dispatch::dispatch(&self.shared, self.threads, executor)
            .instrument(start_run_span(self.threads))
            .await;
        match &result {
            Ok(()) => info!("queue run finished"),
            Err(e) => warn!(error = %e, "queue run aborted"),
        }
        result
    }
}

/// Enqueue-only handle onto a [`Queue`].
pub struct Producer<S: Storage = InMemoryStorage> {
    shared: Arc<Shared<S>>,
}

impl<S: Storage> Clone for Producer<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: Storage> Producer<S> {
    pub async fn add_request(&self, request: Request) -> Result<()> {
        self.shared.add_request(request).await
    }

    pub async fn add_url(&self, address: &str) -> Result<()> {
        self.shared.add_request(Request::parse_get(address)?).await
    }

    pub async fn size(&self) -> Result<usize> {
        self.shared.storage.queue_size().await
    }
}
