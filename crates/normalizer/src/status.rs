//! Carrier status tables.
//!
//! Each carrier keeps its own flat table of raw status strings. Raw keys are
//! matched exactly, in the carrier's own casing; the provider key is matched
//! case-insensitively. Anything not listed normalizes to
//! [`CanonicalStatus::Unknown`].

use crate::schema::CanonicalStatus;

/// Raw carrier status to canonical status.
pub type StatusTable = &'static [(&'static str, CanonicalStatus)];

pub const SENDBOX: StatusTable = &[
    ("pending", CanonicalStatus::Pending),
    ("pickup_started", CanonicalStatus::Pending),
    ("pickup_completed", CanonicalStatus::PickedUp),
    ("in_transit", CanonicalStatus::InTransit),
    ("delivery_started", CanonicalStatus::InTransit),
    ("on_hold", CanonicalStatus::OnHold),
    ("delivered", CanonicalStatus::Delivered),
    ("cancelled", CanonicalStatus::Cancelled),
    ("failed", CanonicalStatus::Failed),
];

pub const CARGOPLUG: StatusTable = &[
    ("initiated", CanonicalStatus::Pending),
    ("awaiting_pickup", CanonicalStatus::Pending),
    ("Paid", CanonicalStatus::Pending),
    ("on_the_way", CanonicalStatus::InTransit),
    ("in_transit", CanonicalStatus::InTransit),
    ("completed", CanonicalStatus::Delivered),
    ("delivered", CanonicalStatus::Delivered),
    ("cancelled", CanonicalStatus::Failed),
    ("Disapproved", CanonicalStatus::Cancelled),
];

pub const DHL: StatusTable = &[
    ("pre-transit", CanonicalStatus::Pending),
    ("transit", CanonicalStatus::InTransit),
    ("delivered", CanonicalStatus::Delivered),
    ("failure", CanonicalStatus::Failed),
    ("unknown", CanonicalStatus::Unknown),
];

/// Tables by lowercase provider key.
const TABLES: &[(&str, StatusTable)] = &[
    ("sendbox", SENDBOX),
    ("cargoplug", CARGOPLUG),
    ("dhl", DHL),
];

/// Look up the table registered for `provider`.
pub fn table(provider: &str) -> Option<StatusTable> {
    TABLES
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(provider))
        .map(|(_, table)| *table)
}

/// Normalize a raw carrier status. Never fails.
pub fn normalize(provider: &str, raw: &str) -> CanonicalStatus {
    table(provider)
        .and_then(|table| table.iter().find(|(key, _)| *key == raw))
        .map(|(_, status)| *status)
        .unwrap_or_default()
}
