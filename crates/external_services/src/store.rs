//! Durable shipment and webhook records.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use normalizer::{CanonicalStatus, TrackingEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Durable shipment state, unique per (provider, tracking_number).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Shipment {
    pub provider: String,
    pub tracking_number: String,
    pub status: CanonicalStatus,
    pub location: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    /// Oldest first in carrier-reported sequence, not sorted by timestamp.
    pub history: Vec<TrackingEvent>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipment {
    fn create(provider: &str, tracking_number: &str, update: ShipmentUpdate) -> Self {
        let now = Utc::now();
        Self {
            provider: provider.to_string(),
            tracking_number: tracking_number.to_string(),
            status: update.status,
            location: update.location,
            estimated_delivery: update.estimated_delivery,
            history: update.history,
            created_at: now,
            updated_at: now,
        }
    }

    fn apply(&mut self, update: ShipmentUpdate) {
        self.status = update.status;
        self.location = update.location;
        self.estimated_delivery = update.estimated_delivery;
        self.history = update.history;
        self.updated_at = Utc::now();
    }
}

/// Mutable attributes written by an upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct ShipmentUpdate {
    pub status: CanonicalStatus,
    pub location: Option<String>,
    pub estimated_delivery: Option<DateTime<Utc>>,
    pub history: Vec<TrackingEvent>,
}

/// Shipment persistence.
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    /// Create or update the shipment keyed on (provider, tracking_number).
    async fn upsert(
        &self,
        provider: &str,
        tracking_number: &str,
        update: ShipmentUpdate,
    ) -> Result<Shipment>;

    async fn find(&self, provider: &str, tracking_number: &str) -> Result<Option<Shipment>>;

    /// Point lookup by tracking number alone. When several providers know the
    /// number, the most recently updated shipment wins.
    async fn find_by_tracking_number(&self, tracking_number: &str) -> Result<Option<Shipment>>;
}

/// Raw inbound callback, kept as the reconciler's input and as an audit trail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShippingWebhook {
    pub id: Uuid,
    pub provider: String,
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl ShippingWebhook {
    pub fn new(provider: impl Into<String>, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider: provider.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// Write-once webhook persistence.
#[async_trait]
pub trait WebhookStore: Send + Sync {
    /// Persist a webhook. Recording an id twice is a `Store` error.
    async fn record(&self, webhook: &ShippingWebhook) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<ShippingWebhook>>;
}

// ============================================================================
// In-memory implementations
// ============================================================================

/// Shipment store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryShipmentStore {
    /// (provider, tracking_number) -> Shipment
    shipments: DashMap<(String, String), Shipment>,
}

impl MemoryShipmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.shipments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shipments.is_empty()
    }
}

#[async_trait]
impl ShipmentStore for MemoryShipmentStore {
    async fn upsert(
        &self,
        provider: &str,
        tracking_number: &str,
        update: ShipmentUpdate,
    ) -> Result<Shipment> {
        let key = (provider.to_string(), tracking_number.to_string());

        let shipment = match self.shipments.entry(key) {
            Entry::Occupied(mut slot) => {
                slot.get_mut().apply(update);
                slot.get().clone()
            }
            Entry::Vacant(slot) => slot
                .insert(Shipment::create(provider, tracking_number, update))
                .value()
                .clone(),
        };

        Ok(shipment)
    }

    async fn find(&self, provider: &str, tracking_number: &str) -> Result<Option<Shipment>> {
        let key = (provider.to_string(), tracking_number.to_string());
        Ok(self.shipments.get(&key).map(|entry| entry.value().clone()))
    }

    async fn find_by_tracking_number(&self, tracking_number: &str) -> Result<Option<Shipment>> {
        Ok(self
            .shipments
            .iter()
            .filter(|entry| entry.key().1 == tracking_number)
            .max_by_key(|entry| entry.value().updated_at)
            .map(|entry| entry.value().clone()))
    }
}

/// Webhook store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryWebhookStore {
    webhooks: DashMap<Uuid, ShippingWebhook>,
}

impl MemoryWebhookStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.webhooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.webhooks.is_empty()
    }
}

#[async_trait]
impl WebhookStore for MemoryWebhookStore {
    async fn record(&self, webhook: &ShippingWebhook) -> Result<()> {
        match self.webhooks.entry(webhook.id) {
            Entry::Occupied(_) => Err(Error::Store(format!(
                "webhook {} is already recorded",
                webhook.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(webhook.clone());
                Ok(())
            }
        }
    }

    async fn get(&self, id: Uuid) -> Result<Option<ShippingWebhook>> {
        Ok(self.webhooks.get(&id).map(|entry| entry.value().clone()))
    }
}
