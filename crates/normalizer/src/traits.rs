//! Core trait for carrier formats (plugin interface).
//!
//! To add a new carrier, implement the `CarrierFormat` trait and register
//! its status table in [`crate::status`].

use crate::error::Result;
use crate::schema::{CanonicalStatus, TrackingResult, WebhookUpdate};
use serde_json::Value;

/// Translation of one carrier's payloads into the canonical schema.
///
/// Implementations are stateless and object safe so that registries can hold
/// them as `Arc<dyn CarrierFormat>`.
pub trait CarrierFormat: Send + Sync + 'static {
    /// Provider key (e.g., "sendbox", "dhl").
    fn name(&self) -> &'static str;

    /// Format a tracking API response.
    ///
    /// Fails with `EmptyResponse` on an empty payload. Every other field is
    /// optional; malformed events are skipped.
    fn format(&self, payload: &Value) -> Result<TrackingResult>;

    /// Extract the shipment observation carried by a webhook.
    ///
    /// Fails with `MissingField` when the tracking number or the raw status
    /// cannot be found.
    fn parse_webhook(&self, payload: &Value) -> Result<WebhookUpdate>;

    /// Normalize a raw status using this carrier's table.
    fn normalize_status(&self, raw: &str) -> CanonicalStatus {
        crate::status::normalize(self.name(), raw)
    }
}
