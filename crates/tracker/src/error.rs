//! Error types for tracking resolution.

use serde::Serialize;
use thiserror::Error;

/// Result type alias for tracker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// One failed provider attempt, kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderAttempt {
    pub provider: String,
    pub error: String,
}

/// Tracker errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration. Fatal at construction.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Credentials rejected or the token endpoint failed.
    #[error("{provider} authentication failed: {message}")]
    Authentication { provider: String, message: String },

    /// No HTTP answer, or a non-2xx answer.
    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    /// The carrier answered but returned nothing usable.
    #[error("{provider} returned no tracking data")]
    EmptyResponse { provider: String },

    /// Every candidate provider failed.
    #[error(
        "No provider supports tracking number: {tracking_number}. Tried: {}",
        describe_attempts(.attempts)
    )]
    NoProviderSupportsTracking {
        tracking_number: String,
        attempts: Vec<ProviderAttempt>,
    },

    /// Provider key not registered.
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error(transparent)]
    External(#[from] external_services::Error),
}

impl Error {
    pub fn authentication(provider: &str, message: impl Into<String>) -> Self {
        Self::Authentication {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn transport(provider: &str, message: impl Into<String>) -> Self {
        Self::Transport {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    pub fn empty_response(provider: &str) -> Self {
        Self::EmptyResponse {
            provider: provider.to_string(),
        }
    }

    /// Whether the resolver treats this as one adapter failing rather than a
    /// problem with the resolution itself.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(
            self,
            Error::Authentication { .. }
                | Error::Transport { .. }
                | Error::EmptyResponse { .. }
                | Error::External(_)
        )
    }
}

fn describe_attempts(attempts: &[ProviderAttempt]) -> String {
    if attempts.is_empty() {
        return "none".to_string();
    }
    attempts
        .iter()
        .map(|a| format!("{} ({})", a.provider, a.error))
        .collect::<Vec<_>>()
        .join(", ")
}
