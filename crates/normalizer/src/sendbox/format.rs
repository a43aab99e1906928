//! Sendbox payload translation.

use super::NAME;
use crate::error::{Error, Result};
use crate::schema::{HistoryUpdate, TrackingEvent, TrackingResult, WebhookUpdate};
use crate::traits::CarrierFormat;
use crate::value::{array_at, is_empty_payload, string_at, timestamp_at};
use serde_json::Value;
use tracing::debug;

/// Sendbox carrier format.
///
/// Handles `POST /shipping/tracking` responses and shipment status callbacks.
#[derive(Debug, Default, Clone)]
pub struct SendboxFormat;

impl SendboxFormat {
    /// Create a new Sendbox format.
    pub fn new() -> Self {
        Self
    }

    fn events(&self, payload: &Value) -> Vec<TrackingEvent> {
        array_at(payload, "events")
            .iter()
            .filter_map(|raw| self.event(raw))
            .collect()
    }

    fn event(&self, raw: &Value) -> Option<TrackingEvent> {
        if !raw.is_object() {
            debug!(carrier = NAME, event = %raw, "Skipping malformed event");
            return None;
        }

        Some(TrackingEvent {
            status: string_at(raw, "status.code")
                .map(|code| self.normalize_status(&code))
                .unwrap_or_default(),
            description: string_at(raw, "description"),
            location: string_at(raw, "location_description"),
            timestamp: timestamp_at(raw, "date_created").or_else(|| timestamp_at(raw, "timestamp")),
        })
    }
}

impl CarrierFormat for SendboxFormat {
    fn name(&self) -> &'static str {
        NAME
    }

    fn format(&self, payload: &Value) -> Result<TrackingResult> {
        if is_empty_payload(payload) {
            return Err(Error::EmptyResponse { carrier: NAME });
        }

        Ok(TrackingResult {
            tracking_number: string_at(payload, "code"),
            status: string_at(payload, "status_code")
                .map(|raw| self.normalize_status(&raw))
                .unwrap_or_default(),
            provider: NAME.to_string(),
            description: string_at(payload, "description"),
            estimated_delivery: timestamp_at(payload, "delivery_eta"),
            events: self.events(payload),
            raw: payload.clone(),
        })
    }

    fn parse_webhook(&self, payload: &Value) -> Result<WebhookUpdate> {
        if is_empty_payload(payload) {
            return Err(Error::EmptyResponse { carrier: NAME });
        }

        let tracking_number = string_at(payload, "code").ok_or(Error::MissingField {
            carrier: NAME,
            field: "code",
        })?;
        let raw_status = string_at(payload, "status.code").ok_or(Error::MissingField {
            carrier: NAME,
            field: "status.code",
        })?;

        Ok(WebhookUpdate {
            tracking_number,
            status: self.normalize_status(&raw_status),
            location: string_at(payload, "events.0.location_description"),
            estimated_delivery: timestamp_at(payload, "delivery_eta"),
            history: HistoryUpdate::Replace(self.events(payload)),
        })
    }
}
