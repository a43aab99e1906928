//! Shipping service: tracking lookups and carrier webhook ingress over HTTP.
//!
//! This service:
//! - Resolves tracking numbers across the configured carriers
//! - Accepts carrier webhooks, stores them raw, and queues them
//! - Reconciles queued webhooks into shipment state in the background
//!
//! ## Architecture
//!
//! ```text
//! GET /track/{n}            POST /webhooks/{provider}
//!       ↓                          ↓
//! TrackingResolver          RateLimiter → WebhookStore
//!       ↓                          ↓
//! ProviderRegistry          ReconcileQueue → worker
//!       ↓                          ↓
//! Reconciler::record ──→ ShipmentStore ←── Reconciler::reconcile
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod rate_limit;

pub use api::{create_router, AppState, ErrorResponse};
pub use config::ServiceConfig;
pub use error::{Result, ServiceError};
pub use rate_limit::RateLimiter;
