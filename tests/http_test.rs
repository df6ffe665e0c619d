//! HttpExecutor against a local HTTP server: link following, depth bound,
//! host filtering and stats.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crawlq::Queue;
use crawlq::executor::HttpExecutor;
use crawlq::storage::InMemoryStorage;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Paths requested from the test site, in arrival order.
type Hits = Arc<Mutex<Vec<String>>>;

/// Start the test site on an ephemeral port. Returns its base URL and the
/// hit log.
async fn start_site() -> (String, Hits) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let hits: Hits = Arc::default();

    let log = Arc::clone(&hits);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(respond(stream, port, Arc::clone(&log)));
        }
    });

    (format!("http://127.0.0.1:{port}/"), hits)
}

/// The site: `/` links to `/a` twice, `/b`, itself, a 404 and a page on
/// another host. `/a` and `/b` link one level further down to `/deep`.
fn page(path: &str, port: u16) -> (&'static str, String) {
    match path {
        "/" => (
            "200 OK",
            format!(
                r#"<html><body>
                <a href="/a">a</a>
                <a href="/b">b</a>
                <a href="/a">a again</a>
                <a href="/">home</a>
                <a href="/missing">gone</a>
                <a href="http://localhost:{port}/cross">elsewhere</a>
                </body></html>"#
            ),
        ),
        "/a" | "/b" => (
            "200 OK",
            r#"<html><body><a href="/deep">deeper</a></body></html>"#.to_string(),
        ),
        "/deep" | "/cross" => ("200 OK", "<html><body>leaf</body></html>".to_string()),
        _ => ("404 Not Found", "<html><body>not found</body></html>".to_string()),
    }
}

async fn respond(mut stream: TcpStream, port: u16, hits: Hits) {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&chunk[..n]),
        }
    }

    let path = String::from_utf8_lossy(&head)
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    hits.lock().unwrap().push(path.clone());

    let (status, body) = page(&path, port);
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

fn fetch_count(hits: &Hits, path: &str) -> usize {
    hits.lock().unwrap().iter().filter(|p| *p == path).count()
}

// ---------------------------------------------------------------------------
// Link following
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn follows_same_host_links_once_up_to_max_depth() {
    let (seed, hits) = start_site().await;

    let queue = Queue::new(2).await.unwrap();
    let exec = Arc::new(
        HttpExecutor::new(Duration::from_secs(5))
            .unwrap()
            .follow_links(queue.producer(), 1),
    );
    queue.add_url(&seed).await.unwrap();

    tokio::time::timeout(Duration::from_secs(30), queue.run(Arc::clone(&exec)))
        .await
        .expect("crawl did not finish")
        .unwrap();

    // Seed plus its same-host links, each exactly once.
    for path in ["/", "/a", "/b", "/missing"] {
        assert_eq!(fetch_count(&hits, path), 1, "{path}: {:?}", hits.lock().unwrap());
    }
    // `/deep` is only linked from depth-1 pages.
    assert_eq!(fetch_count(&hits, "/deep"), 0);
    // Different host, never followed.
    assert_eq!(fetch_count(&hits, "/cross"), 0);
    assert_eq!(hits.lock().unwrap().len(), 4);

    let stats = exec.stats();
    assert_eq!(stats.succeeded(), 3);
    assert_eq!(stats.failed(), 1);
    assert_eq!(stats.discovered(), 3);
    assert!(queue.is_empty().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn without_follow_only_the_seed_is_fetched() {
    let (seed, hits) = start_site().await;

    let queue = Queue::new(2).await.unwrap();
    let exec = Arc::new(HttpExecutor::<InMemoryStorage>::new(Duration::from_secs(5)).unwrap());
    queue.add_url(&seed).await.unwrap();
    queue.add_url(&format!("{seed}missing")).await.unwrap();

    tokio::time::timeout(Duration::from_secs(30), queue.run(Arc::clone(&exec)))
        .await
        .expect("run did not finish")
        .unwrap();

    assert_eq!(fetch_count(&hits, "/"), 1);
    assert_eq!(fetch_count(&hits, "/missing"), 1);
    assert_eq!(hits.lock().unwrap().len(), 2);

    let stats = exec.stats();
    assert_eq!(stats.succeeded(), 1);
    assert_eq!(stats.failed(), 1);
    assert_eq!(stats.discovered(), 0);
}
