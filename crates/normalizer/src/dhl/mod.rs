//! DHL Shipment Tracking (unified API) format.
//!
//! DHL webhooks carry only the latest event of a shipment, so they are
//! merged with append-if-different semantics instead of replacing history.

mod format;

pub use format::DhlFormat;

/// Provider key.
pub const NAME: &str = "dhl";
