//! Storage contract for queued requests.
//!
//! A backend persists serialized requests in FIFO order and reports how many
//! are left. Every operation must be safe to call from several tasks at once.
//! While [`Queue::run`](crate::queue::Queue::run) is active the queue is the
//! only caller; it owns the backend, so nothing else can reach it.

pub mod memory;
pub mod pgmq;

use std::future::Future;

use crate::error::Result;
use crate::model::Request;

pub use memory::{DEFAULT_MAX_SIZE, InMemoryStorage};
pub use pgmq::PgmqStorage;

/// Backend that holds serialized requests.
pub trait Storage: Send + Sync + 'static {
    /// One-time setup. Called exactly once, before any other operation.
    fn init(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Append a serialized request at the tail.
    ///
    /// Returns [`Error::QueueFull`](crate::error::Error::QueueFull) when a
    /// capacity bound is configured and already reached. Must not block
    /// waiting for room.
    fn add_request(&self, data: Vec<u8>) -> impl Future<Output = Result<()>> + Send;

    /// Remove and return the head, or `Ok(None)` when nothing is queued.
    ///
    /// `Err` is reserved for real faults; emptiness is never an error.
    fn get_request(&self) -> impl Future<Output = Result<Option<Vec<u8>>>> + Send;

    /// Number of requests a following `get_request` could still return.
    fn queue_size(&self) -> impl Future<Output = Result<usize>> + Send;

    /// In-process backends can hand requests over without serialization.
    fn native(&self) -> Option<&dyn NativeStorage> {
        None
    }
}

/// Zero-copy transfer of requests for backends living in the same process.
///
/// Same FIFO, same capacity rules as the byte-level contract.
pub trait NativeStorage: Send + Sync {
    fn add_native(&self, request: Request) -> Result<()>;

    fn get_native(&self) -> Result<Option<Request>>;
}
