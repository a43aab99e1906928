//! Canonical shipment tracking schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified status vocabulary all carrier statuses normalize into.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalStatus {
    /// Shipment created, not yet handed to the carrier.
    Pending,
    /// Collected by the carrier. Only some carriers report this.
    PickedUp,
    /// Moving through the carrier network.
    InTransit,
    /// Held by the carrier (customs, address problems, ...).
    OnHold,
    Delivered,
    Cancelled,
    Failed,
    /// The carrier reported something we have no mapping for.
    #[default]
    Unknown,
}

impl CanonicalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalStatus::Pending => "pending",
            CanonicalStatus::PickedUp => "picked_up",
            CanonicalStatus::InTransit => "in_transit",
            CanonicalStatus::OnHold => "on_hold",
            CanonicalStatus::Delivered => "delivered",
            CanonicalStatus::Cancelled => "cancelled",
            CanonicalStatus::Failed => "failed",
            CanonicalStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for CanonicalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One point-in-time status observation.
///
/// Events keep the order the carrier reported them in, which is not
/// necessarily timestamp order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackingEvent {
    pub status: CanonicalStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TrackingEvent {
    /// Create an event carrying only a status.
    pub fn new(status: CanonicalStatus) -> Self {
        Self {
            status,
            description: None,
            location: None,
            timestamp: None,
        }
    }
}

/// Normalized outcome of a single track operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TrackingResult {
    /// Tracking number as reported by the carrier, if it reported one.
    pub tracking_number: Option<String>,
    /// Current aggregate status.
    pub status: CanonicalStatus,
    /// Key of the provider that produced this result.
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_delivery: Option<DateTime<Utc>>,
    #[serde(default)]
    pub events: Vec<TrackingEvent>,
    /// Original carrier payload, kept for diagnostics only.
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl TrackingResult {
    /// Empty result attributed to `provider`, status `Unknown`.
    pub fn new(provider: impl Into<String>) -> Self {
        Self {
            tracking_number: None,
            status: CanonicalStatus::Unknown,
            provider: provider.into(),
            description: None,
            estimated_delivery: None,
            events: Vec::new(),
            raw: serde_json::Value::Null,
        }
    }

    /// Fill in the caller-supplied number when the carrier omitted one.
    pub fn with_fallback_tracking_number(mut self, tracking_number: &str) -> Self {
        if self.tracking_number.is_none() {
            self.tracking_number = Some(tracking_number.to_string());
        }
        self
    }

    /// Location of the most recent event that reported one.
    ///
    /// Carriers list their newest event first.
    pub fn latest_location(&self) -> Option<&str> {
        self.events.iter().find_map(|e| e.location.as_deref())
    }
}

/// How an observation changes the stored history.
///
/// Carrier event lists are newest first. Stored history is oldest first, so
/// the newest event is always the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryUpdate {
    /// The carrier sends its full history every time, newest first. It
    /// replaces what is stored.
    Replace(Vec<TrackingEvent>),
    /// The carrier sends only its latest event; append it unless it equals
    /// the last stored event.
    AppendIfNew(TrackingEvent),
}

impl HistoryUpdate {
    /// Merge this update into previously stored (oldest first) history.
    pub fn merge_into(self, mut existing: Vec<TrackingEvent>) -> Vec<TrackingEvent> {
        match self {
            HistoryUpdate::Replace(events) => events.into_iter().rev().collect(),
            HistoryUpdate::AppendIfNew(event) => {
                if existing.last() != Some(&event) {
                    existing.push(event);
                }
                existing
            }
        }
    }
}

/// Shipment observation extracted from a carrier webhook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookUpdate {
    pub tracking_number: String,
    pub status: CanonicalStatus,
    pub location: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub history: HistoryUpdate,
}
