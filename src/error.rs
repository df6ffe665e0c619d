//! Error types for crawlq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A bounded store already holds its configured maximum.
    #[error("queue is full")]
    QueueFull,

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
