//! Capabilities the shipment tracker consumes from the outside world.
//!
//! - HTTP transport: a small request/response abstraction over `reqwest`
//! - Cache: string key/value with TTL, for auth tokens and provider affinity
//! - Stores: durable shipments and write-once raw webhooks
//!
//! Every capability has an in-memory implementation and a Redis-backed one
//! on [`SharedRedisClient`].
//!
//! # Example
//!
//! ```ignore
//! use external_services::{Cache, HttpRequest, HttpTransport, ReqwestTransport, SharedRedisClient, TransportConfig};
//! use std::time::Duration;
//!
//! let transport = ReqwestTransport::new(TransportConfig::default())?;
//! let response = transport.send(HttpRequest::get("https://api-eu.dhl.com")).await?;
//!
//! let redis = SharedRedisClient::new("redis://localhost:6379")?;
//! redis.put("some-key", "value", Duration::from_secs(60)).await?;
//! ```

pub mod cache;
pub mod error;
pub mod mock;
pub mod redis_client;
pub mod store;
pub mod transport;

pub use cache::{Cache, MemoryCache};
pub use error::{Error, Result};
pub use redis_client::SharedRedisClient;
pub use store::{
    MemoryShipmentStore, MemoryWebhookStore, Shipment, ShipmentStore, ShipmentUpdate,
    ShippingWebhook, WebhookStore,
};
pub use transport::{
    send_with_retry, HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport,
    TransportConfig,
};
