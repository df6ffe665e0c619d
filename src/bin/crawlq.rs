//! crawlq CLI: fetch URLs through the request queue.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use crawlq::config::{Config, StorageKind};
use crawlq::executor::HttpExecutor;
use crawlq::queue::Queue;
use crawlq::storage::{PgmqStorage, Storage};
use crawlq::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;

#[derive(Parser)]
#[command(name = "crawlq", about = "Drain fetch requests through a worker pool")]
struct Cli {
    /// TOML config file (defaults to environment variables)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage backend, overriding the configured one
    #[arg(long, global = true)]
    storage: Option<StorageKind>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue seed URLs and fetch until the queue drains
    Fetch {
        /// Seed URLs
        #[arg(required = true)]
        urls: Vec<String>,
        /// Number of workers
        #[arg(long)]
        threads: Option<usize>,
        /// Queue capacity (0 = unbounded)
        #[arg(long)]
        max_size: Option<usize>,
        /// Follow same-host links up to this many hops from a seed
        #[arg(long, default_value_t = 0)]
        max_depth: u32,
        /// Per-request timeout in seconds
        #[arg(long, default_value_t = 30)]
        timeout: u64,
    },
    /// Enqueue URLs into the configured store without fetching
    Enqueue {
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Show the number of queued requests
    Size,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::from_toml_file(path)?,
        None => Config::from_env()?,
    };
    if let Some(kind) = cli.storage {
        config.storage = kind;
    }

    let _guard = init_telemetry(TelemetryConfig::from_config(&config))?;

    match cli.command {
        Command::Fetch {
            urls,
            threads,
            max_size,
            max_depth,
            timeout,
        } => {
            if let Some(threads) = threads {
                config.queue.threads = threads;
            }
            if let Some(max_size) = max_size {
                config.queue.max_size = max_size;
            }
            let timeout = Duration::from_secs(timeout);
            match config.storage {
                StorageKind::Memory => {
                    let queue = Queue::from_config(&config.queue).await?;
                    cmd_fetch(queue, urls, max_depth, timeout).await
                }
                StorageKind::Pgmq => {
                    let queue = Queue::with_storage(config.queue.threads, pgmq(&config).await?).await?;
                    cmd_fetch(queue, urls, max_depth, timeout).await
                }
            }
        }
        Command::Enqueue { urls } => {
            let queue = persistent_queue(&config).await?;
            for url in &urls {
                queue.add_url(url).await?;
            }
            println!("Enqueued {} request(s), {} queued", urls.len(), queue.size().await?);
            Ok(())
        }
        Command::Size => {
            let queue = persistent_queue(&config).await?;
            println!("{}", queue.size().await?);
            Ok(())
        }
    }
}

async fn pgmq(config: &Config) -> anyhow::Result<PgmqStorage> {
    let url = config
        .database_url
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required for pgmq storage"))?;
    let storage = PgmqStorage::connect(url.expose_secret(), config.pgmq_queue.as_str()).await?;
    Ok(storage.with_max_size(config.queue.max_size))
}

/// Enqueue and size only make sense against a store that outlives the process.
async fn persistent_queue(config: &Config) -> anyhow::Result<Queue<PgmqStorage>> {
    if config.storage != StorageKind::Pgmq {
        anyhow::bail!("this command needs --storage pgmq; the in-memory queue is gone when the process exits");
    }
    Ok(Queue::with_storage(config.queue.threads, pgmq(config).await?).await?)
}

async fn cmd_fetch<S: Storage>(
    queue: Queue<S>,
    urls: Vec<String>,
    max_depth: u32,
    timeout: Duration,
) -> anyhow::Result<()> {
    for url in &urls {
        queue.add_url(url).await?;
    }

    let executor = Arc::new(HttpExecutor::new(timeout)?.follow_links(queue.producer(), max_depth));
    let started = Instant::now();
    queue.run(Arc::clone(&executor)).await?;

    let stats = executor.stats();
    println!(
        "Done in {:.1}s: {} ok, {} failed, {} discovered ({} threads)",
        started.elapsed().as_secs_f64(),
        stats.succeeded(),
        stats.failed(),
        stats.discovered(),
        queue.threads(),
    );
    Ok(())
}
