//! Cargoplug adapter.

use std::sync::Arc;

use async_trait::async_trait;
use external_services::{Cache, HttpRequest, HttpTransport};
use normalizer::{value, CargoplugFormat, CarrierFormat, TrackingResult};
use serde_json::{json, Value};
use tracing::{debug, info};

use super::auth::{request_token, TokenCache};
use super::{ensure_success, format_error, probe, transport_error};
use crate::config::{require, CargoplugConfig};
use crate::error::{Error, Result};
use crate::traits::ShippingProvider;

/// Provider key.
pub const NAME: &str = normalizer::cargoplug::NAME;

/// Shared cache key of the access token.
pub const TOKEN_CACHE_KEY: &str = "cargoplug_access_token";

/// Cargoplug provider adapter.
///
/// Exchanges a secret key and client key for a bearer token at
/// `POST /user/authenticate`.
pub struct CargoplugProvider {
    base_url: String,
    secret_key: String,
    client_key: String,
    transport: Arc<dyn HttpTransport>,
    token: TokenCache,
    format: CargoplugFormat,
}

impl CargoplugProvider {
    /// Validate credentials and obtain an access token.
    pub async fn connect(
        config: &CargoplugConfig,
        transport: Arc<dyn HttpTransport>,
        cache: Arc<dyn Cache>,
    ) -> Result<Self> {
        let provider = Self {
            base_url: config.base_url.clone(),
            secret_key: require(&config.secret_key, "CARGOPLUG_SECRET_KEY")?,
            client_key: require(&config.client_key, "CARGOPLUG_CLIENT_KEY")?,
            transport,
            token: TokenCache::new(cache, TOKEN_CACHE_KEY, NAME),
            format: CargoplugFormat::new(),
        };

        provider.access_token().await?;
        info!(base_url = %provider.base_url, "Cargoplug provider ready");

        Ok(provider)
    }

    async fn access_token(&self) -> Result<String> {
        if let Some(token) = self.token.get().await {
            return Ok(token);
        }

        let request = HttpRequest::post(format!("{}/user/authenticate", self.base_url)).json(json!({
            "secret_key": self.secret_key,
            "client_key": self.client_key,
        }));

        let token =
            request_token(self.transport.as_ref(), request, NAME, "data.access_token").await?;
        self.token.put(&token).await;
        Ok(token)
    }
}

#[async_trait]
impl ShippingProvider for CargoplugProvider {
    fn provider_key(&self) -> &str {
        NAME
    }

    async fn track(&self, tracking_number: &str) -> Result<TrackingResult> {
        let token = self.access_token().await?;
        debug!(tracking_number, "Tracking with Cargoplug");

        let request = HttpRequest::post(format!("{}/shipment/tracking/external", self.base_url))
            .header("Authorization", format!("Bearer {token}"))
            .json(json!({ "tracking_number": tracking_number }));

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

        if !value::is_present(&response.body, "data") {
            return Err(Error::empty_response(NAME));
        }

        let result = value::lookup(&response.body, "data.0.result")
            .cloned()
            .unwrap_or(Value::Null);

        self.format
            .format(&result)
            .map(|result| result.with_fallback_tracking_number(tracking_number))
            .map_err(|e| format_error(NAME, e))
    }

    fn required_webhook_fields(&self) -> &'static [&'static str] {
        &["tracking_number", "status"]
    }

    async fn check_health(&self) -> Option<bool> {
        Some(probe(self.transport.as_ref(), NAME, &self.base_url).await)
    }
}

impl std::fmt::Debug for CargoplugProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CargoplugProvider")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use external_services::mock::ScriptedTransport;
    use external_services::{MemoryCache, Method};
    use normalizer::CanonicalStatus;

    const AUTH_URL: &str = "https://cargoplug.test/user/authenticate";
    const TRACK_URL: &str = "https://cargoplug.test/shipment/tracking/external";

    fn config() -> CargoplugConfig {
        CargoplugConfig {
            base_url: "https://cargoplug.test".to_string(),
            secret_key: Some("secret".to_string()),
            client_key: Some("client".to_string()),
        }
    }

    async fn connected(transport: Arc<ScriptedTransport>) -> CargoplugProvider {
        transport
            .respond(
                Method::Post,
                AUTH_URL,
                200,
                json!({"data": {"access_token": "cp-token"}}),
            )
            .await;
        CargoplugProvider::connect(&config(), transport, Arc::new(MemoryCache::new()))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_sends_credentials() {
        let transport = Arc::new(ScriptedTransport::new());
        connected(transport.clone()).await;

        let auth = transport.requests_to(AUTH_URL).await;
        assert_eq!(
            auth[0].body,
            Some(json!({"secret_key": "secret", "client_key": "client"}))
        );
    }

    #[tokio::test]
    async fn test_connect_reuses_cached_token() {
        let transport = Arc::new(ScriptedTransport::new());
        let cache = Arc::new(MemoryCache::new());
        cache
            .put(TOKEN_CACHE_KEY, "cached", std::time::Duration::from_secs(60))
            .await
            .unwrap();

        CargoplugProvider::connect(&config(), transport.clone(), cache)
            .await
            .unwrap();

        assert!(transport.requests().await.is_empty());
    }

    #[tokio::test]
    async fn test_track_unwraps_first_result() {
        let transport = Arc::new(ScriptedTransport::new());
        let provider = connected(transport.clone()).await;
        transport
            .respond(
                Method::Post,
                TRACK_URL,
                200,
                json!({"data": [{"result": {
                    "tracking_number": "CP123",
                    "status": "awaiting_pickup",
                    "history": [{"status": "initiated", "order_updated": "2025-05-01 08:00:00"}]
                }}]}),
            )
            .await;

        let result = provider.track("CP123").await.unwrap();

        assert_eq!(result.tracking_number.as_deref(), Some("CP123"));
        assert_eq!(result.status, CanonicalStatus::Pending);
        assert_eq!(result.events.len(), 1);

        let sent = transport.requests_to(TRACK_URL).await;
        assert_eq!(sent[0].header_value("authorization"), Some("Bearer cp-token"));
        assert_eq!(sent[0].body, Some(json!({"tracking_number": "CP123"})));
    }

    #[tokio::test]
    async fn test_track_empty_data() {
        let transport = Arc::new(ScriptedTransport::new());
        let provider = connected(transport.clone()).await;
        transport
            .respond(Method::Post, TRACK_URL, 200, json!({"data": [], "message": "Not found"}))
            .await;

        let err = provider.track("CP404").await.unwrap_err();
        assert!(matches!(err, Error::EmptyResponse { .. }));
    }

    #[tokio::test]
    async fn test_track_server_error_is_transport() {
        let transport = Arc::new(ScriptedTransport::new());
        let provider = connected(transport.clone()).await;
        transport
            .respond(Method::Post, TRACK_URL, 500, json!({"message": "Upstream down"}))
            .await;

        let err = provider.track("CP1").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "cargoplug request failed: tracking failed: Upstream down"
        );
    }

    #[tokio::test]
    async fn test_webhook_requirements() {
        let provider = connected(Arc::new(ScriptedTransport::new())).await;

        assert_eq!(
            provider.missing_webhook_fields(&json!({"status": "completed"})),
            vec!["tracking_number"]
        );
    }
}
