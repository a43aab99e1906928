//! Service error types.

use thiserror::Error;

/// Service error type.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Invalid service configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Tracker(#[from] tracker::Error),

    #[error(transparent)]
    External(#[from] external_services::Error),
}

/// Result type for service setup.
pub type Result<T> = std::result::Result<T, ServiceError>;
