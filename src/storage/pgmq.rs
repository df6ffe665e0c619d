//! Postgres-backed request store on top of pgmq.
//!
//! Calls pgmq's SQL functions directly via SQLx: pgmq.create, pgmq.send,
//! pgmq.pop, pgmq.metrics. Requests are stored as their JSON form.

use opentelemetry::KeyValue;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{debug, info};

use super::Storage;
use crate::error::{Error, Result};
use crate::telemetry::metrics;

/// Request store kept in a pgmq queue.
pub struct PgmqStorage {
    pool: PgPool,
    queue_name: String,
    /// Maximum queue length. 0 means unbounded.
    max_size: usize,
}

impl PgmqStorage {
    /// Connect to Postgres and create a connection pool.
    pub async fn connect(url: &str, queue_name: impl Into<String>) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await?;
        Ok(Self::from_pool(pool, queue_name))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, queue_name: impl Into<String>) -> Self {
        Self {
            pool,
            queue_name: queue_name.into(),
            max_size: 0,
        }
    }

    /// Bound the queue length. The check runs before each send, so concurrent
    /// producers may overshoot the bound by at most their own count.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Health check: runs `SELECT 1`.
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Drop the pgmq queue and everything in it.
    pub async fn drop_queue(&self) -> Result<()> {
        sqlx::query("SELECT pgmq.drop_queue($1)")
            .bind(&self.queue_name)
            .execute(&self.pool)
            .await?;
        self.record("drop");
        Ok(())
    }

    fn record(&self, operation: &'static str) {
        metrics::storage_operations().add(
            1,
            &[
                KeyValue::new("queue", self.queue_name.clone()),
                KeyValue::new("operation", operation),
            ],
        );
    }
}

impl Storage for PgmqStorage {
    async fn init(&mut self) -> Result<()> {
        sqlx::query("CREATE EXTENSION IF NOT EXISTS pgmq")
            .execute(&self.pool)
            .await?;
        sqlx::query("SELECT pgmq.create($1)")
            .bind(&self.queue_name)
            .execute(&self.pool)
            .await?;
        self.record("create");
        info!(queue = %self.queue_name, "pgmq storage ready");
        Ok(())
    }

    async fn add_request(&self, data: Vec<u8>) -> Result<()> {
        if self.max_size > 0 && self.queue_size().await? >= self.max_size {
            return Err(Error::QueueFull);
        }
        let payload: serde_json::Value = serde_json::from_slice(&data)?;
        let row: (i64,) = sqlx::query_as("SELECT pgmq.send($1, $2)")
            .bind(&self.queue_name)
            .bind(&payload)
            .fetch_one(&self.pool)
            .await?;
        debug!(queue = %self.queue_name, msg_id = row.0, "request sent");
        self.record("send");
        Ok(())
    }

    async fn get_request(&self) -> Result<Option<Vec<u8>>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT message FROM pgmq.pop($1)")
                .bind(&self.queue_name)
                .fetch_optional(&self.pool)
                .await?;

        self.record(if row.is_some() { "pop" } else { "pop_empty" });

        match row {
            Some((message,)) => Ok(Some(serde_json::to_vec(&message)?)),
            None => Ok(None),
        }
    }

    async fn queue_size(&self) -> Result<usize> {
        let row: (i64,) = sqlx::query_as("SELECT queue_length FROM pgmq.metrics($1)")
            .bind(&self.queue_name)
            .fetch_one(&self.pool)
            .await?;
        usize::try_from(row.0)
            .map_err(|_| Error::Storage(format!("negative queue length: {}", row.0)))
    }
}
