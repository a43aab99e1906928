//! Shared Redis client backing the cache and both stores.
//!
//! One client is created per process and shared by reference between the
//! tracker (tokens, affinity) and the reconciler (shipments, webhooks).

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::store::{Shipment, ShipmentStore, ShipmentUpdate, ShippingWebhook, WebhookStore};
use async_trait::async_trait;
use chrono::Utc;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Redis key prefix for shipments: shipment:{provider}:{tracking_number}
pub const SHIPMENT_KEY_PREFIX: &str = "shipment:";

/// Redis key prefix for the tracking number index: shipment_index:{tracking_number}
pub const SHIPMENT_INDEX_KEY_PREFIX: &str = "shipment_index:";

/// Redis key prefix for raw webhooks: shipping_webhook:{id}
pub const WEBHOOK_KEY_PREFIX: &str = "shipping_webhook:";

/// Shared Redis client wrapper.
#[derive(Clone)]
pub struct SharedRedisClient {
    client: Arc<redis::Client>,
}

impl SharedRedisClient {
    /// Create a new shared Redis client.
    pub fn new(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client: Arc::new(client),
        })
    }

    /// Get an async connection.
    pub async fn get_connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        let conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn)
    }

    fn shipment_key(provider: &str, tracking_number: &str) -> String {
        format!("{}{}:{}", SHIPMENT_KEY_PREFIX, provider, tracking_number)
    }

    fn index_key(tracking_number: &str) -> String {
        format!("{}{}", SHIPMENT_INDEX_KEY_PREFIX, tracking_number)
    }

    fn webhook_key(id: Uuid) -> String {
        format!("{}{}", WEBHOOK_KEY_PREFIX, id)
    }
}

// =========================================================================
// Cache
// =========================================================================

#[async_trait]
impl Cache for SharedRedisClient {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.get_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.get_connection().await?;
        // SET EX rejects a zero expiry.
        let seconds = ttl.as_secs().max(1);

        conn.set_ex::<_, _, ()>(key, value, seconds).await?;
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        let mut conn = self.get_connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

// =========================================================================
// Shipments
// =========================================================================

#[async_trait]
impl ShipmentStore for SharedRedisClient {
    async fn upsert(
        &self,
        provider: &str,
        tracking_number: &str,
        update: ShipmentUpdate,
    ) -> Result<Shipment> {
        let existing = self.find(provider, tracking_number).await?;
        let now = Utc::now();

        let shipment = Shipment {
            provider: provider.to_string(),
            tracking_number: tracking_number.to_string(),
            status: update.status,
            location: update.location,
            estimated_delivery: update.estimated_delivery,
            history: update.history,
            created_at: existing.map(|s| s.created_at).unwrap_or(now),
            updated_at: now,
        };

        let mut conn = self.get_connection().await?;
        let json = serde_json::to_string(&shipment)?;

        let _: () = redis::pipe()
            .atomic()
            .set(Self::shipment_key(provider, tracking_number), &json)
            .ignore()
            .set(Self::index_key(tracking_number), provider)
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!(
            provider,
            tracking_number,
            status = %shipment.status,
            events = shipment.history.len(),
            "Stored shipment in Redis"
        );

        Ok(shipment)
    }

    async fn find(&self, provider: &str, tracking_number: &str) -> Result<Option<Shipment>> {
        let mut conn = self.get_connection().await?;
        let json: Option<String> = conn.get(Self::shipment_key(provider, tracking_number)).await?;

        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }

    async fn find_by_tracking_number(&self, tracking_number: &str) -> Result<Option<Shipment>> {
        let mut conn = self.get_connection().await?;
        let provider: Option<String> = conn.get(Self::index_key(tracking_number)).await?;

        match provider {
            Some(provider) => self.find(&provider, tracking_number).await,
            None => Ok(None),
        }
    }
}

// =========================================================================
// Webhooks
// =========================================================================

#[async_trait]
impl WebhookStore for SharedRedisClient {
    async fn record(&self, webhook: &ShippingWebhook) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let json = serde_json::to_string(webhook)?;

        let created: bool = conn.set_nx(Self::webhook_key(webhook.id), &json).await?;
        if !created {
            return Err(Error::Store(format!(
                "webhook {} is already recorded",
                webhook.id
            )));
        }

        debug!(id = %webhook.id, provider = %webhook.provider, "Stored webhook in Redis");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<ShippingWebhook>> {
        let mut conn = self.get_connection().await?;
        let json: Option<String> = conn.get(Self::webhook_key(id)).await?;

        match json {
            Some(j) => Ok(Some(serde_json::from_str(&j)?)),
            None => Ok(None),
        }
    }
}
