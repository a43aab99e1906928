//! Shipment tracking across carrier integrations.
//!
//! This crate provides:
//! - `ShippingProvider` trait for carrier-specific tracking
//! - `SendboxProvider`, `CargoplugProvider` and `DhlProvider` adapters
//! - `ProviderRegistry` holding adapters in fallback order
//! - `TrackingResolver` for pinned, remembered and fallback resolution
//!
//! # Architecture
//!
//! ```text
//!                  TRACKING NUMBER
//!                         │
//!                         ▼
//!                  TrackingResolver
//!                         │
//!            ┌────────────┴────────────┐
//!            │                         │
//!      AffinityCache            ProviderRegistry
//!   (shared Cache, 7 days)             │
//!                          ┌───────────┼───────────┐
//!                          ▼           ▼           ▼
//!                       Sendbox    Cargoplug      DHL
//!                          │           │           │
//!                          └─── HttpTransport ─────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tracker::{providers, TrackerConfig, TrackingResolver};
//! use std::sync::Arc;
//!
//! let config = TrackerConfig::from_env()?;
//! let registry = providers::connect_all(&config, transport, cache.clone()).await?;
//!
//! let resolver = TrackingResolver::new(Arc::new(registry), cache)
//!     .with_default_provider(config.default_provider.clone());
//!
//! let result = resolver.track("JD014600006281230701").await?;
//! ```

pub mod affinity;
pub mod config;
pub mod error;
pub mod providers;
pub mod registry;
pub mod resolver;
pub mod traits;

pub use affinity::AffinityCache;
pub use config::TrackerConfig;
pub use error::{Error, ProviderAttempt, Result};
pub use providers::{CargoplugProvider, DhlProvider, SendboxProvider};
pub use registry::ProviderRegistry;
pub use resolver::{TrackOptions, TrackingResolver};
pub use traits::ShippingProvider;
