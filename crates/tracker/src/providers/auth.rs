//! Access token acquisition shared by token-based carriers.
//!
//! Tokens live in the shared cache under a carrier-specific key for one hour.
//! Cache failures only cost an extra token request.

use std::sync::Arc;
use std::time::Duration;

use external_services::{send_with_retry, Cache, HttpRequest, HttpTransport};
use normalizer::value;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Lifetime of a cached access token.
pub const TOKEN_TTL: Duration = Duration::from_secs(60 * 60);

/// Attempts per token request.
pub const AUTH_ATTEMPTS: u32 = 3;

/// Fixed pause between token request attempts.
pub const AUTH_BACKOFF: Duration = Duration::from_millis(100);

/// A carrier's access token slot in the shared cache.
pub struct TokenCache {
    cache: Arc<dyn Cache>,
    key: &'static str,
    provider: &'static str,
}

impl TokenCache {
    pub fn new(cache: Arc<dyn Cache>, key: &'static str, provider: &'static str) -> Self {
        Self {
            cache,
            key,
            provider,
        }
    }

    pub async fn get(&self) -> Option<String> {
        match self.cache.get(self.key).await {
            Ok(token) => token,
            Err(e) => {
                warn!(provider = self.provider, error = %e, "Token cache read failed");
                None
            }
        }
    }

    pub async fn put(&self, token: &str) {
        if let Err(e) = self.cache.put(self.key, token, TOKEN_TTL).await {
            warn!(provider = self.provider, error = %e, "Token cache write failed");
        }
    }

    /// Drop a token the carrier has rejected.
    pub async fn forget(&self) {
        if let Err(e) = self.cache.forget(self.key).await {
            warn!(provider = self.provider, error = %e, "Token cache eviction failed");
        }
    }
}

/// Send a token request and read the token at `token_path`.
///
/// Any failure is an `Authentication` error.
pub async fn request_token(
    transport: &dyn HttpTransport,
    request: HttpRequest,
    provider: &str,
    token_path: &str,
) -> Result<String> {
    let response = send_with_retry(transport, request, AUTH_ATTEMPTS, AUTH_BACKOFF)
        .await
        .map_err(|e| Error::authentication(provider, e.to_string()))?;

    if !response.is_success() {
        return Err(Error::authentication(provider, response.describe_failure()));
    }

    let token = value::string_at(&response.body, token_path).ok_or_else(|| {
        Error::authentication(
            provider,
            response
                .error_message()
                .unwrap_or_else(|| format!("access token missing at {token_path}")),
        )
    })?;

    debug!(provider, "Obtained access token");
    Ok(token)
}
