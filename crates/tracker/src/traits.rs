//! Provider adapter trait for carrier integrations.
//!
//! Each carrier (Sendbox, Cargoplug, DHL, ...) implements this trait so the
//! resolver and the webhook boundary can treat them uniformly.

use async_trait::async_trait;
use normalizer::{value, TrackingResult};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::Result;

/// Trait for carrier-specific tracking.
///
/// # Example
///
/// ```ignore
/// #[async_trait]
/// impl ShippingProvider for GiglProvider {
///     fn provider_key(&self) -> &str {
///         "gigl"
///     }
///
///     async fn track(&self, tracking_number: &str) -> Result<TrackingResult> {
///         // Implementation
///     }
/// }
/// ```
#[async_trait]
pub trait ShippingProvider: Send + Sync {
    /// Registry key (e.g., "sendbox", "dhl"). Lowercase.
    fn provider_key(&self) -> &str;

    /// Cheap local pre-filter on the number's shape.
    ///
    /// `true` is not a promise that tracking will succeed. Carriers with no
    /// known format accept everything.
    fn supports(&self, _tracking_number: &str) -> bool {
        true
    }

    /// Look the shipment up remotely.
    ///
    /// # Errors
    ///
    /// - `Authentication` when credentials are rejected
    /// - `Transport` when the call fails or the carrier answers non-2xx
    /// - `EmptyResponse` when the carrier answers with nothing usable
    async fn track(&self, tracking_number: &str) -> Result<TrackingResult>;

    /// Dotted payload paths that must be present in every webhook.
    fn required_webhook_fields(&self) -> &'static [&'static str] {
        &[]
    }

    /// Required fields absent (or empty) in `payload`.
    fn missing_webhook_fields(&self, payload: &Value) -> Vec<&'static str> {
        self.required_webhook_fields()
            .iter()
            .copied()
            .filter(|field| !value::is_present(payload, field))
            .collect()
    }

    /// Validate and log a webhook the caller has already persisted.
    ///
    /// Never persists anything itself.
    fn handle_webhook(&self, payload: &Value) {
        let missing = self.missing_webhook_fields(payload);
        if missing.is_empty() {
            info!(provider = self.provider_key(), "Webhook received");
        } else {
            warn!(
                provider = self.provider_key(),
                ?missing,
                payload = %payload,
                "Invalid webhook payload"
            );
        }
    }

    /// Reachability probe. `None` when the carrier has no probe.
    async fn check_health(&self) -> Option<bool> {
        None
    }
}
