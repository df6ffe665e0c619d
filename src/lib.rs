//! # crawlq
//!
//! Bounded, pluggable request queue drained by a pool of workers.
//!
//! Producers enqueue fetch requests at any time, including from inside a
//! running request. [`Queue::run`](queue::Queue::run) blocks until the backlog
//! is empty and no request is in flight. Storage sits behind the
//! [`Storage`](storage::Storage) contract: an in-memory FIFO by default, or
//! Postgres via pgmq.

pub mod config;
pub mod error;
pub mod executor;
pub mod model;
pub mod queue;
pub mod storage;
pub mod telemetry;

pub use error::{Error, Result};
pub use executor::Executor;
pub use model::{Request, RequestId};
pub use queue::{Producer, Queue, RunState};
pub use storage::{InMemoryStorage, NativeStorage, Storage};
