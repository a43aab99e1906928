//! HTTP API for the shipping service.
//!
//! Endpoints:
//! - `GET /health` - Provider reachability
//! - `GET /track/{tracking_number}?provider=` - Resolve one tracking number
//! - `POST /track/batch` - Resolve many tracking numbers
//! - `GET /shipments/{tracking_number}` - Stored shipment state
//! - `POST /webhooks/{provider}` - Carrier webhook ingress (rate limited)

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use external_services::{ShippingWebhook, WebhookStore};
use metrics::counter;
use normalizer::TrackingResult;
use reconciler::{ReconcileQueue, Reconciler};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracker::{Error as TrackerError, ProviderAttempt, TrackOptions, TrackingResolver};

use crate::rate_limit::{webhook_rate_limit, RateLimiter};

/// Application state shared across handlers.
pub struct AppState {
    pub resolver: TrackingResolver,
    pub reconciler: Arc<Reconciler>,
    pub webhooks: Arc<dyn WebhookStore>,
    pub queue: ReconcileQueue,
    pub rate_limiter: RateLimiter,
}

/// Create the HTTP router.
pub fn create_router(state: Arc<AppState>) -> Router {
    let webhook_routes = Router::new()
        .route("/webhooks/{provider}", post(webhook_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            webhook_rate_limit,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/track/batch", post(batch_track_handler))
        .route("/track/{tracking_number}", get(track_handler))
        .route("/shipments/{tracking_number}", get(shipment_handler))
        .merge(webhook_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// API error response. Carries only a human-readable message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl ErrorResponse {
    pub fn new(message: impl ToString) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

fn error_response(status: StatusCode, message: impl ToString) -> Response {
    (status, Json(ErrorResponse::new(message))).into_response()
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    providers: BTreeMap<String, &'static str>,
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let providers = state
        .resolver
        .registry()
        .health_check()
        .await
        .into_iter()
        .map(|(key, healthy)| {
            let label = match healthy {
                Some(true) => "ok",
                Some(false) => "failed",
                None => "unsupported",
            };
            (key, label)
        })
        .collect();

    Json(HealthResponse {
        status: "ok",
        providers,
    })
}

#[derive(Debug, Deserialize)]
struct TrackQuery {
    provider: Option<String>,
}

/// Every provider failed.
#[derive(Serialize)]
struct ExhaustedResponse<'a> {
    error: String,
    attempts: &'a [ProviderAttempt],
}

fn tracking_error_response(err: &TrackerError) -> Response {
    match err {
        TrackerError::UnknownProvider(_) => error_response(StatusCode::BAD_REQUEST, err),
        TrackerError::NoProviderSupportsTracking { attempts, .. } => (
            StatusCode::NOT_FOUND,
            Json(ExhaustedResponse {
                error: err.to_string(),
                attempts,
            }),
        )
            .into_response(),
        _ => {
            error!("Tracking failed: {}", err);
            error_response(StatusCode::BAD_GATEWAY, "Tracking failed")
        }
    }
}

/// Persist a successful result. Failures are logged, never surfaced.
async fn record(state: &AppState, result: &TrackingResult) {
    if let Err(e) = state.reconciler.record_tracking_result(result).await {
        error!(
            provider = %result.provider,
            tracking_number = ?result.tracking_number,
            error = %e,
            "Failed to record tracking result"
        );
    }
}

/// Track one shipment.
/// GET /track/{tracking_number}
async fn track_handler(
    State(state): State<Arc<AppState>>,
    Path(tracking_number): Path<String>,
    Query(query): Query<TrackQuery>,
) -> Response {
    let options = TrackOptions {
        provider: query.provider.filter(|p| !p.trim().is_empty()),
    };

    match state.resolver.track_with(&tracking_number, &options).await {
        Ok(result) => {
            record(&state, &result).await;
            Json(result).into_response()
        }
        Err(e) => tracking_error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
struct BatchTrackRequest {
    tracking_numbers: Vec<String>,
}

/// Outcome for one number of a batch.
#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum BatchEntry {
    Ok { result: TrackingResult },
    Error { error: String },
}

/// Track many shipments. One failure never fails the batch.
/// POST /track/batch
async fn batch_track_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BatchTrackRequest>, JsonRejection>,
) -> Response {
    let Ok(Json(request)) = payload else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "Body must be {\"tracking_numbers\": [...]}",
        );
    };
    if request.tracking_numbers.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "tracking_numbers must not be empty");
    }

    let mut entries = BTreeMap::new();
    for (number, outcome) in state.resolver.track_multiple(request.tracking_numbers).await {
        let entry = match outcome {
            Ok(result) => {
                record(&state, &result).await;
                BatchEntry::Ok { result }
            }
            Err(e) => BatchEntry::Error {
                error: e.to_string(),
            },
        };
        entries.insert(number, entry);
    }

    Json(entries).into_response()
}

/// Stored shipment for a tracking number.
/// GET /shipments/{tracking_number}
async fn shipment_handler(
    State(state): State<Arc<AppState>>,
    Path(tracking_number): Path<String>,
) -> Response {
    match state
        .reconciler
        .shipments()
        .find_by_tracking_number(&tracking_number)
        .await
    {
        Ok(Some(shipment)) => Json(shipment).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Shipment not found"),
        Err(e) => {
            error!(tracking_number = %tracking_number, error = %e, "Shipment lookup failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Shipment lookup failed")
        }
    }
}

/// Carrier webhook ingress.
/// POST /webhooks/{provider}
async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let Some(adapter) = state.resolver.registry().get(&provider) else {
        warn!(provider = %provider, "Webhook for unsupported provider");
        counter!("webhooks_rejected_total", "reason" => "unknown_provider").increment(1);
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Unsupported provider: {provider}"),
        );
    };
    let provider = adapter.provider_key().to_string();

    let Ok(Json(payload)) = payload else {
        counter!("webhooks_rejected_total", "reason" => "invalid_json").increment(1);
        return error_response(StatusCode::BAD_REQUEST, "Invalid JSON payload");
    };

    let missing = adapter.missing_webhook_fields(&payload);
    if !missing.is_empty() {
        warn!(provider = %provider, ?missing, payload = %payload, "Webhook missing required fields");
        counter!("webhooks_rejected_total", "reason" => "missing_fields").increment(1);
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Missing required fields: {}", missing.join(", ")),
        );
    }

    let webhook = ShippingWebhook::new(provider.clone(), payload);
    if let Err(e) = state.webhooks.record(&webhook).await {
        error!(provider = %provider, error = %e, "Failed to store webhook");
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to store webhook");
    }

    adapter.handle_webhook(&webhook.payload);
    counter!("webhooks_received_total", "provider" => provider.clone()).increment(1);

    let webhook_id = webhook.id;
    if let Err(e) = state.queue.enqueue(webhook).await {
        error!(provider = %provider, webhook_id = %webhook_id, error = %e, "Failed to queue webhook");
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Webhook stored but could not be queued",
        );
    }

    info!(provider = %provider, webhook_id = %webhook_id, "Webhook accepted");
    (
        StatusCode::OK,
        Json(serde_json::json!({"message": "Webhook received"})),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use external_services::{MemoryCache, MemoryShipmentStore, MemoryWebhookStore, ShipmentStore};
    use normalizer::CanonicalStatus;
    use reconciler::{worker, RetryPolicy};
    use serde_json::json;
    use std::time::Duration;
    use tower::ServiceExt;
    use tracker::{ProviderRegistry, ShippingProvider};

    /// Knows exactly one tracking number.
    struct FakeCarrier {
        key: &'static str,
        known: &'static str,
    }

    #[async_trait]
    impl ShippingProvider for FakeCarrier {
        fn provider_key(&self) -> &str {
            self.key
        }

        async fn track(&self, tracking_number: &str) -> tracker::Result<TrackingResult> {
            if tracking_number != self.known {
                return Err(TrackerError::empty_response(self.key));
            }
            let mut result = TrackingResult::new(self.key);
            result.tracking_number = Some(tracking_number.to_string());
            result.status = CanonicalStatus::InTransit;
            Ok(result)
        }

        fn required_webhook_fields(&self) -> &'static [&'static str] {
            &["tracking_number", "status"]
        }

        async fn check_health(&self) -> Option<bool> {
            Some(true)
        }
    }

    struct Harness {
        app: Router,
        shipments: Arc<MemoryShipmentStore>,
    }

    fn harness(rate_limit: u32) -> Harness {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(FakeCarrier {
            key: "cargoplug",
            known: "CP1",
        }));
        registry.register(Arc::new(FakeCarrier {
            key: "dhl",
            known: "JD1",
        }));

        let shipments = Arc::new(MemoryShipmentStore::new());
        let reconciler = Arc::new(Reconciler::with_defaults(shipments.clone()));
        let (queue, _worker) = worker::spawn(
            reconciler.clone(),
            RetryPolicy::new(vec![Duration::from_millis(5)], 2),
            16,
        );

        let state = Arc::new(AppState {
            resolver: TrackingResolver::new(Arc::new(registry), Arc::new(MemoryCache::new())),
            reconciler,
            webhooks: Arc::new(MemoryWebhookStore::new()),
            queue,
            rate_limiter: RateLimiter::per_minute(rate_limit),
        });

        Harness {
            app: create_router(state),
            shipments,
        }
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health_reports_providers() {
        let h = harness(100);

        let (status, body) = send(&h.app, get("/health")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["providers"], json!({"cargoplug": "ok", "dhl": "ok"}));
    }

    #[tokio::test]
    async fn test_track_records_shipment() {
        let h = harness(100);

        let (status, body) = send(&h.app, get("/track/JD1")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["provider"], "dhl");
        assert_eq!(body["status"], "in_transit");

        let (status, body) = send(&h.app, get("/shipments/JD1")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["provider"], "dhl");
    }

    #[tokio::test]
    async fn test_track_exhaustion_lists_attempts() {
        let h = harness(100);

        let (status, body) = send(&h.app, get("/track/NOPE")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["attempts"].as_array().unwrap().len(), 2);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("No provider supports tracking number: NOPE"));
    }

    #[tokio::test]
    async fn test_track_unknown_pinned_provider() {
        let h = harness(100);

        let (status, body) = send(&h.app, get("/track/CP1?provider=gigl")).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Unknown provider: gigl");
    }

    #[tokio::test]
    async fn test_batch_tracking() {
        let h = harness(100);

        let (status, body) = send(
            &h.app,
            post_json("/track/batch", json!({"tracking_numbers": ["CP1", "NOPE"]})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["CP1"]["status"], "ok");
        assert_eq!(body["CP1"]["result"]["provider"], "cargoplug");
        assert_eq!(body["NOPE"]["status"], "error");
    }

    #[tokio::test]
    async fn test_missing_shipment() {
        let h = harness(100);

        let (status, body) = send(&h.app, get("/shipments/CP404")).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Shipment not found");
    }

    #[tokio::test]
    async fn test_webhook_is_accepted_and_reconciled() {
        let h = harness(100);

        let (status, body) = send(
            &h.app,
            post_json(
                "/webhooks/CargoPlug",
                json!({"tracking_number": "CP1", "status": "awaiting_pickup"}),
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"message": "Webhook received"}));

        let mut shipment = None;
        for _ in 0..50 {
            shipment = h.shipments.find("cargoplug", "CP1").await.unwrap();
            if shipment.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(shipment.unwrap().status, CanonicalStatus::Pending);
    }

    #[tokio::test]
    async fn test_webhook_unknown_provider() {
        let h = harness(100);

        let (status, body) = send(&h.app, post_json("/webhooks/gigl", json!({"a": 1}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Unsupported provider: gigl");
    }

    #[tokio::test]
    async fn test_webhook_missing_fields() {
        let h = harness(100);

        let (status, body) = send(
            &h.app,
            post_json("/webhooks/cargoplug", json!({"tracking_number": "CP1", "status": ""})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Missing required fields: status");
        assert!(h.shipments.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_rate_limit() {
        let h = harness(1);
        let payload = json!({"tracking_number": "CP1", "status": "completed"});

        let (first, _) = send(&h.app, post_json("/webhooks/cargoplug", payload.clone())).await;
        let (second, body) = send(&h.app, post_json("/webhooks/cargoplug", payload)).await;

        assert_eq!(first, StatusCode::OK);
        assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body, json!({"message": "Too many requests"}));

        // Tracking routes are not limited.
        let (status, _) = send(&h.app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
