//! DHL Shipment Tracking (unified API) adapter.

use std::sync::Arc;

use async_trait::async_trait;
use external_services::{HttpRequest, HttpTransport};
use normalizer::{value, CarrierFormat, DhlFormat, TrackingResult};
use serde_json::Value;
use tracing::{debug, info};

use super::{ensure_success, format_error, probe, transport_error};
use crate::config::{require, DhlConfig};
use crate::error::Result;
use crate::traits::ShippingProvider;

/// Provider key.
pub const NAME: &str = normalizer::dhl::NAME;

/// Header carrying the static API key.
const API_KEY_HEADER: &str = "DHL-API-Key";

/// DHL provider adapter. Authenticates with a static API key header.
pub struct DhlProvider {
    base_url: String,
    api_key: String,
    transport: Arc<dyn HttpTransport>,
    format: DhlFormat,
}

impl DhlProvider {
    /// Create the adapter. Fails with `Configuration` without `DHL_API_KEY`.
    pub fn new(config: &DhlConfig, transport: Arc<dyn HttpTransport>) -> Result<Self> {
        let provider = Self {
            base_url: config.base_url.clone(),
            api_key: require(&config.api_key, "DHL_API_KEY")?,
            transport,
            format: DhlFormat::new(),
        };

        info!(base_url = %provider.base_url, "DHL provider ready");
        Ok(provider)
    }
}

/// DHL numbers are 10 to 39 ASCII letters or digits.
fn is_dhl_tracking_number(tracking_number: &str) -> bool {
    (10..=39).contains(&tracking_number.len())
        && tracking_number.bytes().all(|b| b.is_ascii_alphanumeric())
}

#[async_trait]
impl ShippingProvider for DhlProvider {
    fn provider_key(&self) -> &str {
        NAME
    }

    fn supports(&self, tracking_number: &str) -> bool {
        is_dhl_tracking_number(tracking_number)
    }

    async fn track(&self, tracking_number: &str) -> Result<TrackingResult> {
        debug!(tracking_number, "Tracking with DHL");

        let request = HttpRequest::get(format!("{}/track/shipments", self.base_url))
            .header(API_KEY_HEADER, &self.api_key)
            .query("trackingNumber", tracking_number);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| transport_error(NAME, e))?;
        let response = ensure_success(NAME, response)?;

        let shipment = value::lookup(&response.body, "shipments.0")
            .cloned()
            .unwrap_or(Value::Null);

        self.format
            .format(&shipment)
            .map(|result| result.with_fallback_tracking_number(tracking_number))
            .map_err(|e| format_error(NAME, e))
    }

    fn required_webhook_fields(&self) -> &'static [&'static str] {
        &["shipments.0.id", "shipments.0.status.statusCode"]
    }

    async fn check_health(&self) -> Option<bool> {
        Some(probe(self.transport.as_ref(), NAME, &self.base_url).await)
    }
}

impl std::fmt::Debug for DhlProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhlProvider")
            .field("base_url", &self.base_url)
            .finish()
    }
}
