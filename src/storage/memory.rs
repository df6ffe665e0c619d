//! Default in-process request store.
//!
//! FIFO behind one exclusive lock. `queue_size` takes the same lock as push
//! and pop so a size read is never torn from the pop that follows it.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use tracing::debug;

use super::{NativeStorage, Storage};
use crate::error::{Error, Result};
use crate::model::Request;

/// Capacity used when a queue is created without an explicit store.
pub const DEFAULT_MAX_SIZE: usize = 100_000;

/// Request store held in memory.
#[derive(Debug)]
pub struct InMemoryStorage {
    /// Maximum number of queued requests. 0 means unbounded.
    max_size: usize,
    items: Mutex<VecDeque<Request>>,
}

impl InMemoryStorage {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            items: Mutex::new(VecDeque::new()),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0)
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.items()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.items()?.is_empty())
    }

    fn items(&self) -> Result<MutexGuard<'_, VecDeque<Request>>> {
        self.items
            .lock()
            .map_err(|_| Error::Storage("in-memory queue lock poisoned".to_string()))
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl NativeStorage for InMemoryStorage {
    fn add_native(&self, request: Request) -> Result<()> {
        let mut items = self.items()?;
        if self.max_size > 0 && items.len() >= self.max_size {
            return Err(Error::QueueFull);
        }
        items.push_back(request);
        Ok(())
    }

    fn get_native(&self) -> Result<Option<Request>> {
        Ok(self.items()?.pop_front())
    }
}

impl Storage for InMemoryStorage {
    async fn init(&mut self) -> Result<()> {
        debug!(max_size = self.max_size, "in-memory storage ready");
        Ok(())
    }

    async fn add_request(&self, data: Vec<u8>) -> Result<()> {
        let request = Request::unmarshal(&data)?;
        self.add_native(request)
    }

    async fn get_request(&self) -> Result<Option<Vec<u8>>> {
        match self.get_native()? {
            Some(request) => request.marshal().map(Some),
            None => Ok(None),
        }
    }

    async fn queue_size(&self) -> Result<usize> {
        self.len()
    }

    fn native(&self) -> Option<&dyn NativeStorage> {
        Some(self)
    }
}
