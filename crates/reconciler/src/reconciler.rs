//! Merges webhook observations and tracking results into stored shipments.

use std::collections::HashMap;
use std::sync::Arc;

use external_services::{Shipment, ShipmentStore, ShipmentUpdate, ShippingWebhook};
use metrics::counter;
use normalizer::{CarrierFormat, HistoryUpdate, TrackingResult};
use tracing::{debug, error, info, warn};

use crate::error::Result;

/// What a reconciliation did.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The shipment was created or updated.
    Updated(Shipment),
    /// The payload named no shipment or no status. Nothing was written.
    Skipped,
    /// No format is registered for the webhook's provider.
    UnknownProvider,
}

impl Outcome {
    fn label(&self) -> &'static str {
        match self {
            Outcome::Updated(_) => "updated",
            Outcome::Skipped => "skipped",
            Outcome::UnknownProvider => "unknown_provider",
        }
    }
}

/// Webhook Reconciler.
///
/// Dispatches a stored webhook to its carrier format by provider key and
/// upserts the shipment keyed on (provider, tracking number). Full-history
/// carriers replace the stored history; latest-event carriers append only
/// when the event differs from the last stored one, so redelivery is safe.
pub struct Reconciler {
    /// Provider key -> format
    formats: HashMap<String, Arc<dyn CarrierFormat>>,
    shipments: Arc<dyn ShipmentStore>,
}

impl Reconciler {
    /// Create a reconciler with no formats registered.
    pub fn new(shipments: Arc<dyn ShipmentStore>) -> Self {
        Self {
            formats: HashMap::new(),
            shipments,
        }
    }

    /// Create a reconciler knowing every bundled carrier format.
    pub fn with_defaults(shipments: Arc<dyn ShipmentStore>) -> Self {
        let mut reconciler = Self::new(shipments);
        for format in normalizer::default_formats() {
            reconciler.register(format);
        }
        reconciler
    }

    pub fn register(&mut self, format: Arc<dyn CarrierFormat>) {
        let key = format.name().to_ascii_lowercase();
        debug!("Registering webhook format: {}", key);
        self.formats.insert(key, format);
    }

    pub fn providers(&self) -> Vec<&str> {
        self.formats.keys().map(|s| s.as_str()).collect()
    }

    pub fn shipments(&self) -> &Arc<dyn ShipmentStore> {
        &self.shipments
    }

    /// Reconcile one stored webhook.
    ///
    /// Unknown providers and payloads without a tracking number or status are
    /// logged and skipped. Only store failures are errors; they are safe to
    /// retry.
    pub async fn reconcile(&self, webhook: &ShippingWebhook) -> Result<Outcome> {
        let outcome = self.reconcile_inner(webhook).await;

        let label = match &outcome {
            Ok(outcome) => outcome.label(),
            Err(_) => "error",
        };
        counter!(
            "webhook_reconciliations_total",
            "provider" => webhook.provider.to_ascii_lowercase(),
            "outcome" => label
        )
        .increment(1);

        outcome
    }

    async fn reconcile_inner(&self, webhook: &ShippingWebhook) -> Result<Outcome> {
        let Some(format) = self.formats.get(&webhook.provider.to_ascii_lowercase()) else {
            warn!(
                webhook_id = %webhook.id,
                provider = %webhook.provider,
                "No webhook handler for provider"
            );
            return Ok(Outcome::UnknownProvider);
        };
        let provider = format.name();

        let update = match format.parse_webhook(&webhook.payload) {
            Ok(update) => update,
            Err(e) => {
                warn!(
                    webhook_id = %webhook.id,
                    provider,
                    error = %e,
                    payload = %webhook.payload,
                    "Webhook cannot be reconciled"
                );
                return Ok(Outcome::Skipped);
            }
        };

        let stored = match &update.history {
            HistoryUpdate::Replace(_) => Vec::new(),
            HistoryUpdate::AppendIfNew(_) => {
                let stored = self
                    .shipments
                    .find(provider, &update.tracking_number)
                    .await
                    .map_err(|e| {
                        error!(
                            webhook_id = %webhook.id,
                            provider,
                            tracking_number = %update.tracking_number,
                            error = %e,
                            payload = %webhook.payload,
                            "Failed to load shipment history"
                        );
                        e
                    })?;
                stored.map(|s| s.history).unwrap_or_default()
            }
        };
        let history = update.history.merge_into(stored);

        let shipment = self
            .shipments
            .upsert(
                provider,
                &update.tracking_number,
                ShipmentUpdate {
                    status: update.status,
                    location: update.location,
                    estimated_delivery: update.estimated_delivery,
                    history,
                },
            )
            .await
            .map_err(|e| {
                error!(
                    webhook_id = %webhook.id,
                    provider,
                    tracking_number = %update.tracking_number,
                    error = %e,
                    payload = %webhook.payload,
                    "Failed to save shipment"
                );
                e
            })?;

        info!(
            webhook_id = %webhook.id,
            provider,
            tracking_number = %shipment.tracking_number,
            status = %shipment.status,
            events = shipment.history.len(),
            "Shipment reconciled from webhook"
        );

        Ok(Outcome::Updated(shipment))
    }

    /// Record a successful tracking result as the shipment's current state.
    ///
    /// The result's events (newest first) replace the stored history, which
    /// is kept oldest first. Returns `None` when the result carries no
    /// tracking number.
    pub async fn record_tracking_result(&self, result: &TrackingResult) -> Result<Option<Shipment>> {
        let Some(tracking_number) = result.tracking_number.as_deref() else {
            debug!(provider = %result.provider, "Tracking result without number, not recorded");
            return Ok(None);
        };

        let shipment = self
            .shipments
            .upsert(
                &result.provider.to_ascii_lowercase(),
                tracking_number,
                ShipmentUpdate {
                    status: result.status,
                    location: result.latest_location().map(str::to_string),
                    estimated_delivery: result.estimated_delivery,
                    history: HistoryUpdate::Replace(result.events.clone()).merge_into(Vec::new()),
                },
            )
            .await?;

        debug!(
            provider = %shipment.provider,
            tracking_number = %shipment.tracking_number,
            "Shipment recorded from tracking result"
        );

        Ok(Some(shipment))
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("providers", &self.providers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use external_services::{MemoryShipmentStore, ShipmentStore};
    use normalizer::{CanonicalStatus, TrackingEvent};
    use serde_json::{json, Value};

    fn reconciler() -> (Reconciler, Arc<MemoryShipmentStore>) {
        let store = Arc::new(MemoryShipmentStore::new());
        (Reconciler::with_defaults(store.clone()), store)
    }

    fn dhl_payload(description: &str) -> Value {
        json!({"shipments": [{
            "id": "JD014600006281230701",
            "status": {
                "statusCode": "transit",
                "status": "transit",
                "description": description,
                "timestamp": "2025-05-02T09:30:00Z",
                "location": {"address": {"addressLocality": "Leipzig"}}
            }
        }]})
    }

    #[tokio::test]
    async fn test_cargoplug_status_is_normalized() {
        let (reconciler, store) = reconciler();
        let webhook = ShippingWebhook::new(
            "cargoplug",
            json!({"tracking_number": "CP1", "status": "awaiting_pickup"}),
        );

        let outcome = reconciler.reconcile(&webhook).await.unwrap();

        assert!(matches!(outcome, Outcome::Updated(_)));
        let shipment = store.find("cargoplug", "CP1").await.unwrap().unwrap();
        assert_eq!(shipment.status, CanonicalStatus::Pending);
    }

    #[tokio::test]
    async fn test_dhl_redelivery_is_idempotent() {
        let (reconciler, store) = reconciler();

        for _ in 0..2 {
            let webhook = ShippingWebhook::new("dhl", dhl_payload("Arrived at hub"));
            reconciler.reconcile(&webhook).await.unwrap();
        }

        let shipment = store
            .find("dhl", "JD014600006281230701")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(shipment.history.len(), 1);
        assert_eq!(shipment.status, CanonicalStatus::InTransit);
        assert_eq!(shipment.location.as_deref(), Some("Leipzig"));
    }

    #[tokio::test]
    async fn test_dhl_new_event_is_appended() {
        let (reconciler, store) = reconciler();

        reconciler
            .reconcile(&ShippingWebhook::new("dhl", dhl_payload("Arrived at hub")))
            .await
            .unwrap();
        reconciler
            .reconcile(&ShippingWebhook::new("DHL", dhl_payload("Departed hub")))
            .await
            .unwrap();

        let shipment = store
            .find("dhl", "JD014600006281230701")
            .await
            .unwrap()
            .unwrap();
        let descriptions: Vec<_> = shipment
            .history
            .iter()
            .filter_map(|e| e.description.as_deref())
            .collect();
        assert_eq!(descriptions, vec!["Arrived at hub", "Departed hub"]);
    }

    #[tokio::test]
    async fn test_webhook_event_follows_tracked_history() {
        let (reconciler, store) = reconciler();
        let event = |status, description: &str| TrackingEvent {
            description: Some(description.to_string()),
            ..TrackingEvent::new(status)
        };
        let mut result = TrackingResult::new("dhl");
        result.tracking_number = Some("JD014600006281230701".to_string());
        result.status = CanonicalStatus::InTransit;
        result.events = vec![
            event(CanonicalStatus::InTransit, "Arrived at hub"),
            event(CanonicalStatus::Pending, "Picked up"),
        ];
        reconciler.record_tracking_result(&result).await.unwrap();

        reconciler
            .reconcile(&ShippingWebhook::new("dhl", dhl_payload("Departed hub")))
            .await
            .unwrap();

        let shipment = store
            .find("dhl", "JD014600006281230701")
            .await
            .unwrap()
            .unwrap();
        let descriptions: Vec<_> = shipment
            .history
            .iter()
            .filter_map(|e| e.description.as_deref())
            .collect();
        assert_eq!(descriptions, vec!["Picked up", "Arrived at hub", "Departed hub"]);
    }

    #[tokio::test]
    async fn test_sendbox_history_is_replaced() {
        let (reconciler, store) = reconciler();
        store
            .upsert(
                "sendbox",
                "SB1",
                ShipmentUpdate {
                    status: CanonicalStatus::Pending,
                    location: None,
                    estimated_delivery: None,
                    history: vec![
                        TrackingEvent::new(CanonicalStatus::Pending),
                        TrackingEvent::new(CanonicalStatus::Pending),
                        TrackingEvent::new(CanonicalStatus::Pending),
                    ],
                },
            )
            .await
            .unwrap();

        let webhook = ShippingWebhook::new(
            "sendbox",
            json!({
                "code": "SB1",
                "status": {"code": "delivered"},
                "events": [{"status": {"code": "delivered"}, "location_description": "Lagos"}]
            }),
        );
        reconciler.reconcile(&webhook).await.unwrap();

        let shipment = store.find("sendbox", "SB1").await.unwrap().unwrap();
        assert_eq!(shipment.status, CanonicalStatus::Delivered);
        assert_eq!(shipment.history.len(), 1);
        assert_eq!(shipment.location.as_deref(), Some("Lagos"));
    }

    #[tokio::test]
    async fn test_unknown_provider_is_ignored() {
        let (reconciler, store) = reconciler();
        let webhook = ShippingWebhook::new("gigl", json!({"waybill": "G1"}));

        let outcome = reconciler.reconcile(&webhook).await.unwrap();

        assert_eq!(outcome, Outcome::UnknownProvider);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_status_is_skipped() {
        let (reconciler, store) = reconciler();
        let webhook = ShippingWebhook::new("cargoplug", json!({"tracking_number": "CP1"}));

        let outcome = reconciler.reconcile(&webhook).await.unwrap();

        assert_eq!(outcome, Outcome::Skipped);
        assert!(store.is_empty());
    }

    struct BrokenStore;

    #[async_trait::async_trait]
    impl ShipmentStore for BrokenStore {
        async fn upsert(
            &self,
            _provider: &str,
            _tracking_number: &str,
            _update: ShipmentUpdate,
        ) -> external_services::Result<Shipment> {
            Err(external_services::Error::Store("disk full".to_string()))
        }

        async fn find(
            &self,
            _provider: &str,
            _tracking_number: &str,
        ) -> external_services::Result<Option<Shipment>> {
            Ok(None)
        }

        async fn find_by_tracking_number(
            &self,
            _tracking_number: &str,
        ) -> external_services::Result<Option<Shipment>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_raised() {
        let reconciler = Reconciler::with_defaults(Arc::new(BrokenStore));
        let webhook = ShippingWebhook::new(
            "cargoplug",
            json!({"tracking_number": "CP1", "status": "completed"}),
        );

        let err = reconciler.reconcile(&webhook).await.unwrap_err();

        assert!(matches!(err, Error::Store(_)));
    }

    #[tokio::test]
    async fn test_record_tracking_result() {
        let (reconciler, store) = reconciler();
        let mut result = TrackingResult::new("DHL");
        result.tracking_number = Some("JD1".to_string());
        result.status = CanonicalStatus::InTransit;
        result.events = vec![
            TrackingEvent::new(CanonicalStatus::InTransit),
            TrackingEvent {
                location: Some("Leipzig".to_string()),
                ..TrackingEvent::new(CanonicalStatus::Pending)
            },
        ];

        let shipment = reconciler
            .record_tracking_result(&result)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(shipment.provider, "dhl");
        assert_eq!(shipment.location.as_deref(), Some("Leipzig"));
        assert_eq!(shipment.history.len(), 2);
        assert_eq!(shipment.history[0].status, CanonicalStatus::Pending);
        assert!(store.find("dhl", "JD1").await.unwrap().is_some());

        assert!(reconciler
            .record_tracking_result(&TrackingResult::new("dhl"))
            .await
            .unwrap()
            .is_none());
    }
}
