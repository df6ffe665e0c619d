//! The collaborator that actually performs requests.
//!
//! The queue only decides *when* a request runs and on which worker. What
//! running it means is up to the [`Executor`].

pub mod http;

use std::future::Future;

use crate::error::Result;
use crate::model::Request;

pub use http::{HttpExecutor, HttpStats};

/// Performs one request to completion.
pub trait Executor: Send + Sync + 'static {
    /// Run `request`. Failures are the executor's business; the queue only
    /// needs to know that the request is finished.
    fn execute(&self, request: Request) -> impl Future<Output = ()> + Send;

    /// Rebuild a request read back from a byte-level store.
    fn unmarshal_request(&self, data: &[u8]) -> Result<Request> {
        Request::unmarshal(data)
    }
}

/// Executor built from an async closure. See [`from_fn`].
pub struct FnExecutor<F> {
    f: F,
}

/// Wrap a closure returning a future as an [`Executor`].
///
/// ```
/// use crawlq::executor::from_fn;
///
/// let exec = from_fn(|req| async move {
///     println!("{} {}", req.method, req.url);
/// });
/// # let _ = exec;
/// ```
pub fn from_fn<F, Fut>(f: F) -> FnExecutor<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    FnExecutor { f }
}

impl<F, Fut> Executor for FnExecutor<F>
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    fn execute(&self, request: Request) -> impl Future<Output = ()> + Send {
        (self.f)(request)
    }
}
