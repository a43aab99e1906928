//! Normalization of carrier tracking payloads into one canonical schema.
//!
//! Every shipping carrier reports shipments in its own shape and with its own
//! status vocabulary. This crate owns the canonical types and the per-carrier
//! translation into them. To add support for a new carrier, add its status
//! table to [`status`] and implement the [`CarrierFormat`] trait.
//!
//! # Architecture
//!
//! ```text
//! Raw carrier payload --> CarrierFormat --> TrackingResult / WebhookUpdate
//!                         (parse & normalize via status tables)
//! ```
//!
//! # Adding a New Carrier
//!
//! ```ignore
//! use normalizer::{CarrierFormat, TrackingResult, WebhookUpdate, Result};
//!
//! pub struct GiglFormat;
//!
//! impl CarrierFormat for GiglFormat {
//!     fn name(&self) -> &'static str {
//!         "gigl"
//!     }
//!
//!     fn format(&self, payload: &serde_json::Value) -> Result<TrackingResult> {
//!         // Translate a GIGL tracking response
//!     }
//!
//!     fn parse_webhook(&self, payload: &serde_json::Value) -> Result<WebhookUpdate> {
//!         // Extract the shipment observation from a GIGL callback
//!     }
//! }
//! ```

pub mod cargoplug;
pub mod dhl;
pub mod error;
pub mod schema;
pub mod sendbox;
pub mod status;
pub mod traits;
pub mod value;

// Re-export core types
pub use error::{Error, Result};
pub use schema::{CanonicalStatus, HistoryUpdate, TrackingEvent, TrackingResult, WebhookUpdate};
pub use status::normalize;
pub use traits::CarrierFormat;

// Re-export carrier formats
pub use cargoplug::CargoplugFormat;
pub use dhl::DhlFormat;
pub use sendbox::SendboxFormat;

/// All carrier formats shipped with this crate, in their default order.
pub fn default_formats() -> Vec<std::sync::Arc<dyn CarrierFormat>> {
    vec![
        std::sync::Arc::new(SendboxFormat),
        std::sync::Arc::new(CargoplugFormat),
        std::sync::Arc::new(DhlFormat),
    ]
}
