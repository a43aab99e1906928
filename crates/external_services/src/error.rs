//! Error types for external services.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The request never produced an HTTP answer (DNS, connect, timeout, ...).
    #[error("HTTP transport failed: {0}")]
    Transport(String),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
