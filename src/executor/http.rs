//! HTTP executor: performs requests with reqwest and, optionally, feeds the
//! links it finds back into the queue.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{LazyLock, Mutex, PoisonError};
use std::time::Duration;

use regex::Regex;
use tracing::{Span, debug, info, warn};
use url::Url;

use super::Executor;
use crate::error::{Error, Result};
use crate::model::Request;
use crate::queue::Producer;
use crate::storage::{InMemoryStorage, Storage};
use crate::telemetry::request::record_status;

static HREF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)href\s*=\s*["']([^"'#]+)"#).expect("href pattern is valid")
});

/// Counters kept by an [`HttpExecutor`].
#[derive(Debug, Default)]
pub struct HttpStats {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    discovered: AtomicUsize,
}

impl HttpStats {
    /// Requests answered with a 2xx status.
    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::Relaxed)
    }

    /// Requests that errored or got a non-2xx status.
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::Relaxed)
    }

    /// Follow-up requests enqueued from discovered links.
    pub fn discovered(&self) -> usize {
        self.discovered.load(Ordering::Relaxed)
    }
}

/// Link following: where to push discovered requests and how deep to go.
struct Follow<S: Storage> {
    producer: Producer<S>,
    max_depth: u32,
    visited: Mutex<HashSet<String>>,
}

impl<S: Storage> Follow<S> {
    /// True the first time `url` is seen.
    fn visit(&self, url: &Url) -> bool {
        self.visited
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(url.as_str().to_string())
    }
}

pub struct HttpExecutor<S: Storage = InMemoryStorage> {
    client: reqwest::Client,
    follow: Option<Follow<S>>,
    stats: HttpStats,
}

impl<S: Storage> HttpExecutor<S> {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("crawlq/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("failed to build http client: {e}")))?;
        Ok(Self {
            client,
            follow: None,
            stats: HttpStats::default(),
        })
    }

    /// Enqueue same-host links found in HTML responses, up to `max_depth`
    /// hops from the seed. Each URL is followed once.
    pub fn follow_links(mut self, producer: Producer<S>, max_depth: u32) -> Self {
        self.follow = Some(Follow {
            producer,
            max_depth,
            visited: Mutex::new(HashSet::new()),
        });
        self
    }

    pub fn stats(&self) -> &HttpStats {
        &self.stats
    }

    async fn enqueue_links(&self, follow: &Follow<S>, request: &Request, body: &str) {
        for url in extract_links(&request.url, body) {
            if url.host_str() != request.url.host_str() || !follow.visit(&url) {
                continue;
            }
            match follow.producer.add_request(request.follow(url)).await {
                Ok(()) => {
                    self.stats.discovered.fetch_add(1, Ordering::Relaxed);
                }
                Err(Error::QueueFull) => {
                    warn!(url = %request.url, "queue full, dropping remaining links");
                    return;
                }
                Err(e) => warn!(error = %e, "failed to enqueue discovered link"),
            }
        }
    }
}

impl<S: Storage> Executor for HttpExecutor<S> {
    async fn execute(&self, request: Request) {
        if let Some(follow) = &self.follow {
            follow.visit(&request.url);
        }

        let method = match reqwest::Method::from_bytes(request.method.as_bytes()) {
            Ok(m) => m,
            Err(e) => {
                warn!(method = %request.method, error = %e, "unsupported method");
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let mut builder = self.client.request(method, request.url.clone());
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if !request.body.is_empty() {
            builder = builder.body(request.body.clone());
        }

        let response = match builder.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(url = %request.url, error = %e, "fetch failed");
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                return;
            }
        };

        let status = response.status();
        record_status(&Span::current(), status.as_u16());
        if !status.is_success() {
            warn!(url = %request.url, status = status.as_u16(), "fetch returned error status");
            self.stats.failed.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.stats.succeeded.fetch_add(1, Ordering::Relaxed);
        info!(url = %request.url, status = status.as_u16(), depth = request.depth, "fetched");

        let Some(follow) = &self.follow else {
            return;
        };
        if request.depth >= follow.max_depth || !is_html(&response) {
            return;
        }
        match response.text().await {
            Ok(body) => self.enqueue_links(follow, &request, &body).await,
            Err(e) => debug!(url = %request.url, error = %e, "could not read body"),
        }
    }
}

fn is_html(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/html"))
}

/// Absolute http(s) URLs of every `href` in `body`, resolved against `base`.
pub fn extract_links(base: &Url, body: &str) -> Vec<Url> {
    HREF.captures_iter(body)
        .filter_map(|c| base.join(c[1].trim()).ok())
        .filter(|u| matches!(u.scheme(), "http" | "https"))
        .collect()
}
