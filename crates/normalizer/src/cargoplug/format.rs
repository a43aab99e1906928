//! Cargoplug payload translation.

use super::NAME;
use crate::error::{Error, Result};
use crate::schema::{HistoryUpdate, TrackingEvent, TrackingResult, WebhookUpdate};
use crate::traits::CarrierFormat;
use crate::value::{array_at, is_empty_payload, string_at, timestamp_at};
use serde_json::Value;
use tracing::debug;

/// Cargoplug carrier format.
#[derive(Debug, Default, Clone)]
pub struct CargoplugFormat;

impl CargoplugFormat {
    /// Create a new Cargoplug format.
    pub fn new() -> Self {
        Self
    }

    fn history(&self, payload: &Value) -> Vec<TrackingEvent> {
        array_at(payload, "history")
            .iter()
            .filter_map(|raw| {
                if !raw.is_object() {
                    debug!(carrier = NAME, event = %raw, "Skipping malformed history entry");
                    return None;
                }
                Some(TrackingEvent {
                    status: string_at(raw, "status")
                        .map(|status| self.normalize_status(&status))
                        .unwrap_or_default(),
                    description: string_at(raw, "description"),
                    location: string_at(raw, "location"),
                    timestamp: timestamp_at(raw, "order_updated"),
                })
            })
            .collect()
    }
}

impl CarrierFormat for CargoplugFormat {
    fn name(&self) -> &'static str {
        NAME
    }

    fn format(&self, payload: &Value) -> Result<TrackingResult> {
        if is_empty_payload(payload) {
            return Err(Error::EmptyResponse { carrier: NAME });
        }

        Ok(TrackingResult {
            tracking_number: string_at(payload, "tracking_number"),
            status: string_at(payload, "status")
                .map(|raw| self.normalize_status(&raw))
                .unwrap_or_default(),
            provider: NAME.to_string(),
            description: string_at(payload, "description"),
            estimated_delivery: timestamp_at(payload, "expected_delivery_date"),
            events: self.history(payload),
            raw: payload.clone(),
        })
    }

    fn parse_webhook(&self, payload: &Value) -> Result<WebhookUpdate> {
        if is_empty_payload(payload) {
            return Err(Error::EmptyResponse { carrier: NAME });
        }

        let tracking_number = string_at(payload, "tracking_number").ok_or(Error::MissingField {
            carrier: NAME,
            field: "tracking_number",
        })?;
        let raw_status = string_at(payload, "status").ok_or(Error::MissingField {
            carrier: NAME,
            field: "status",
        })?;

        Ok(WebhookUpdate {
            tracking_number,
            status: self.normalize_status(&raw_status),
            location: string_at(payload, "location"),
            estimated_delivery: timestamp_at(payload, "expected_delivery_date"),
            history: HistoryUpdate::Replace(self.history(payload)),
        })
    }
}
