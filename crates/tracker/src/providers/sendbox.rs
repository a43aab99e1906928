//! Sendbox adapter.
//!
//! Authenticates with an app id and client key exchanged for an access token,
//! then tracks with `POST /shipping/tracking`.

use std::sync::Arc;

use async_trait::async_trait;
use external_services::{Cache, HttpRequest, HttpTransport};
use normalizer::{CarrierFormat, SendboxFormat, TrackingResult};
use serde_json::json;
use tracing::{debug, info};

use super::auth::{request_token, TokenCache};
use super::{ensure_success, format_error, probe, transport_error};
use crate::config::{require, SendboxConfig};
use crate::error::{Error, Result};
use crate::traits::ShippingProvider;

/// Provider key.
pub const NAME: &str = normalizer::sendbox::NAME;

/// Shared cache key of the access token.
pub const TOKEN_CACHE_KEY: &str = "sendbox_access_token";

/// Sendbox provider adapter.
pub struct SendboxProvider {
    base_url: String,
    app_id: String,
    client_key: String,
    transport: Arc<dyn HttpTransport>,
    token: TokenCache,
    format: SendboxFormat,
}

impl SendboxProvider {
    /// Validate credentials and obtain an access token.
    ///
    /// # Errors
    ///
    /// `Configuration` when `SENDBOX_APP_ID` or `SENDBOX_APP_CLIENT_KEY` is
    /// missing, `Authentication` when no token can be obtained.
    pub async fn connect(
        config: &SendboxConfig,
        transport: Arc<dyn HttpTransport>,
        cache: Arc<dyn Cache>,
    ) -> Result<Self> {
        let provider = Self {
            base_url: config.base_url.clone(),
            app_id: require(&config.app_id, "SENDBOX_APP_ID")?,
            client_key: require(&config.client_key, "SENDBOX_APP_CLIENT_KEY")?,
            transport,
            token: TokenCache::new(cache, TOKEN_CACHE_KEY, NAME),
            format: SendboxFormat::new(),
        };

        provider.access_token().await?;
        info!(base_url = %provider.base_url, "Sendbox provider ready");

        Ok(provider)
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token.get().await {
            return Ok(token);
        }

        let request = HttpRequest::get(format!(
            "{}/oauth/access/{}/refresh",
            self.base_url, self.app_id
        ))
        .query("app_id", &self.app_id)
        .query("client_secret", &self.client_key);

        let token = request_token(self.transport.as_ref(), request, NAME, "access_token").await?;
        self.token.put(&token).await;
        Ok(token)
    }
}

#[async_trait]
impl ShippingProvider for SendboxProvider {
    fn provider_key(&self) -> &str {
        NAME
    }

    async fn track(&self, tracking_number: &str) -> Result<TrackingResult> {
        let token = self.access_token().await?;
        debug!(tracking_number, "Tracking with Sendbox");

        let request = HttpRequest::post(format!("{}/shipping/tracking", self.base_url))
            .header("Authorization", token)
            .header("app-id", &self.app_id)
            .json(json!({ "code": tracking_number }));

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| transport_error(NAME, e))?;

        let response = match ensure_success(NAME, response) {
            Err(err @ Error::Authentication { .. }) => {
                self.token.forget().await;
                return Err(err);
            }
            other => other?,
        };

        self.format
            .format(&response.body)
            .map(|result| result.with_fallback_tracking_number(tracking_number))
            .map_err(|e| format_error(NAME, e))
    }

    fn required_webhook_fields(&self) -> &'static [&'static str] {
        &["code", "status.code"]
    }

    async fn check_health(&self) -> Option<bool> {
        Some(probe(self.transport.as_ref(), NAME, &self.base_url).await)
    }
}

impl std::fmt::Debug for SendboxProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SendboxProvider")
            .field("base_url", &self.base_url)
            .field("app_id", &self.app_id)
            .finish()
    }
}
