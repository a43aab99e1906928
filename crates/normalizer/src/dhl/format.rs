//! DHL payload translation.

use super::NAME;
use crate::error::{Error, Result};
use crate::schema::{HistoryUpdate, TrackingEvent, TrackingResult, WebhookUpdate};
use crate::traits::CarrierFormat;
use crate::value::{array_at, first_string_at, is_empty_payload, lookup, string_at, timestamp_at};
use serde_json::Value;
use tracing::debug;

/// Raw status lookup order on a shipment or event.
const STATUS_PATHS: &[&str] = &["statusCode", "status", "description"];
const SHIPMENT_STATUS_PATHS: &[&str] = &["status.statusCode", "status.status", "status.description"];
const LOCATION_PATHS: &[&str] = &["location.address.addressLocality", "location.address.countryCode"];

/// DHL carrier format.
///
/// `format` expects a single entry of the `shipments` array returned by
/// `GET /track/shipments`. `parse_webhook` expects the full push payload.
#[derive(Debug, Default, Clone)]
pub struct DhlFormat;

impl DhlFormat {
    /// Create a new DHL format.
    pub fn new() -> Self {
        Self
    }

    fn event(&self, raw: &Value) -> Option<TrackingEvent> {
        if !raw.is_object() {
            debug!(carrier = NAME, event = %raw, "Skipping malformed event");
            return None;
        }

        Some(TrackingEvent {
            status: first_string_at(raw, STATUS_PATHS)
                .map(|status| self.normalize_status(&status))
                .unwrap_or_default(),
            description: string_at(raw, "description"),
            location: first_string_at(raw, LOCATION_PATHS),
            timestamp: timestamp_at(raw, "timestamp"),
        })
    }
}

impl CarrierFormat for DhlFormat {
    fn name(&self) -> &'static str {
        NAME
    }

    fn format(&self, payload: &Value) -> Result<TrackingResult> {
        if is_empty_payload(payload) {
            return Err(Error::EmptyResponse { carrier: NAME });
        }

        Ok(TrackingResult {
            tracking_number: string_at(payload, "id"),
            status: first_string_at(payload, SHIPMENT_STATUS_PATHS)
                .map(|raw| self.normalize_status(&raw))
                .unwrap_or_default(),
            provider: NAME.to_string(),
            description: string_at(payload, "status.description"),
            estimated_delivery: timestamp_at(payload, "estimatedTimeOfDelivery")
                .or_else(|| timestamp_at(payload, "estimatedDeliveryDate")),
            events: array_at(payload, "events")
                .iter()
                .filter_map(|raw| self.event(raw))
                .collect(),
            raw: payload.clone(),
        })
    }

    fn parse_webhook(&self, payload: &Value) -> Result<WebhookUpdate> {
        if is_empty_payload(payload) {
            return Err(Error::EmptyResponse { carrier: NAME });
        }

        let shipment = lookup(payload, "shipments.0").ok_or(Error::MissingField {
            carrier: NAME,
            field: "shipments.0",
        })?;
        let tracking_number = string_at(shipment, "id").ok_or(Error::MissingField {
            carrier: NAME,
            field: "shipments.0.id",
        })?;
        let raw_status = string_at(shipment, "status.statusCode").ok_or(Error::MissingField {
            carrier: NAME,
            field: "shipments.0.status.statusCode",
        })?;
        let status = self.normalize_status(&raw_status);
        let location = string_at(shipment, "status.location.address.addressLocality");

        // The latest event is the shipment's current status block.
        let latest = TrackingEvent {
            status,
            description: string_at(shipment, "status.description"),
            location: location.clone(),
            timestamp: timestamp_at(shipment, "status.timestamp"),
        };

        Ok(WebhookUpdate {
            tracking_number,
            status,
            location,
            estimated_delivery: timestamp_at(shipment, "estimatedDeliveryDate"),
            history: HistoryUpdate::AppendIfNew(latest),
        })
    }
}
