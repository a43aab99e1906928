//! Background reconciliation worker.
//!
//! Accepted webhooks are queued on a bounded channel and drained by a single
//! task. A failed unit is retried on its own task, so the worker keeps
//! draining while it waits. The worker stops once every [`ReconcileQueue`]
//! handle is dropped and the pending retries have finished.

use std::sync::Arc;
use std::time::Duration;

use external_services::ShippingWebhook;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::reconciler::Reconciler;
use crate::retry::{RetryDecision, RetryPolicy};

/// Default queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// One unit of reconciliation work.
#[derive(Debug, Clone)]
struct Job {
    webhook: ShippingWebhook,
    /// 1-based attempt this run will be.
    attempt: u32,
}

/// Handle for submitting webhooks to the worker.
#[derive(Debug, Clone)]
pub struct ReconcileQueue {
    tx: mpsc::Sender<Job>,
}

impl ReconcileQueue {
    /// Queue a persisted webhook for reconciliation.
    ///
    /// Waits while the queue is full.
    pub async fn enqueue(&self, webhook: ShippingWebhook) -> Result<()> {
        debug!(webhook_id = %webhook.id, provider = %webhook.provider, "Queueing webhook");
        self.tx
            .send(Job {
                webhook,
                attempt: 1,
            })
            .await
            .map_err(|_| Error::QueueClosed)
    }
}

/// Spawn the worker. Returns the queue handle and the worker's join handle.
pub fn spawn(
    reconciler: Arc<Reconciler>,
    policy: RetryPolicy,
    capacity: usize,
) -> (ReconcileQueue, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(run(reconciler, Arc::new(policy), rx));

    (ReconcileQueue { tx }, handle)
}

async fn run(reconciler: Arc<Reconciler>, policy: Arc<RetryPolicy>, mut rx: mpsc::Receiver<Job>) {
    info!(
        max_attempts = policy.max_attempts,
        backoff = ?policy.backoff,
        "Reconciliation worker started"
    );

    let mut retries = JoinSet::new();

    loop {
        tokio::select! {
            job = rx.recv() => {
                let Some(job) = job else { break };
                if let Err(e) = reconciler.reconcile(&job.webhook).await {
                    if let Some(delay) = next_delay(&policy, &job, e) {
                        retries.spawn(retry_later(reconciler.clone(), policy.clone(), job, delay));
                    }
                }
            }
            Some(_) = retries.join_next(), if !retries.is_empty() => {}
        }
    }

    if !retries.is_empty() {
        info!(pending = retries.len(), "Waiting for pending retries");
    }
    while retries.join_next().await.is_some() {}

    info!("Reconciliation worker stopped");
}

/// Run a failed unit again after `delay`, until it succeeds or the policy
/// gives up.
async fn retry_later(
    reconciler: Arc<Reconciler>,
    policy: Arc<RetryPolicy>,
    mut job: Job,
    mut delay: Duration,
) {
    loop {
        tokio::time::sleep(delay).await;
        job.attempt += 1;

        match reconciler.reconcile(&job.webhook).await {
            Ok(_) => {
                info!(
                    webhook_id = %job.webhook.id,
                    attempt = job.attempt,
                    "Reconciliation succeeded after retry"
                );
                return;
            }
            Err(e) => match next_delay(&policy, &job, e) {
                Some(next) => delay = next,
                None => return,
            },
        }
    }
}

/// Log a failed attempt and return the pause before the next one, if any.
fn next_delay(policy: &RetryPolicy, job: &Job, err: Error) -> Option<Duration> {
    match policy.decide(job.attempt) {
        RetryDecision::Retry { delay } => {
            warn!(
                webhook_id = %job.webhook.id,
                provider = %job.webhook.provider,
                attempt = job.attempt,
                retry_in = ?delay,
                error = %err,
                "Reconciliation failed, will retry"
            );
            Some(delay)
        }
        RetryDecision::GiveUp { reason } => {
            let exhausted = Error::RetriesExhausted {
                webhook_id: job.webhook.id.to_string(),
                attempts: job.attempt,
                last_error: err.to_string(),
            };
            counter!("webhook_reconciliations_exhausted_total").increment(1);
            error!(
                provider = %job.webhook.provider,
                payload = %job.webhook.payload,
                reason = %reason,
                "{}",
                exhausted
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use external_services::{MemoryShipmentStore, Shipment, ShipmentStore, ShipmentUpdate};
    use normalizer::CanonicalStatus;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` upserts, then delegates.
    struct FlakyStore {
        inner: MemoryShipmentStore,
        failures: usize,
        upserts: AtomicUsize,
    }

    impl FlakyStore {
        fn new(failures: usize) -> Arc<Self> {
            Arc::new(Self {
                inner: MemoryShipmentStore::new(),
                failures,
                upserts: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ShipmentStore for FlakyStore {
        async fn upsert(
            &self,
            provider: &str,
            tracking_number: &str,
            update: ShipmentUpdate,
        ) -> external_services::Result<Shipment> {
            if self.upserts.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(external_services::Error::Store("connection reset".to_string()));
            }
            self.inner.upsert(provider, tracking_number, update).await
        }

        async fn find(
            &self,
            provider: &str,
            tracking_number: &str,
        ) -> external_services::Result<Option<Shipment>> {
            self.inner.find(provider, tracking_number).await
        }

        async fn find_by_tracking_number(
            &self,
            tracking_number: &str,
        ) -> external_services::Result<Option<Shipment>> {
            self.inner.find_by_tracking_number(tracking_number).await
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(vec![Duration::from_millis(5)], max_attempts)
    }

    fn webhook() -> ShippingWebhook {
        ShippingWebhook::new(
            "cargoplug",
            json!({"tracking_number": "CP1", "status": "completed"}),
        )
    }

    async fn drain(queue: ReconcileQueue, handle: JoinHandle<()>) {
        drop(queue);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_processes_queued_webhooks() {
        let store = Arc::new(MemoryShipmentStore::new());
        let reconciler = Arc::new(Reconciler::with_defaults(store.clone()));
        let (queue, handle) = spawn(reconciler, fast_policy(3), 16);

        queue.enqueue(webhook()).await.unwrap();
        drain(queue, handle).await;

        let shipment = store.find("cargoplug", "CP1").await.unwrap().unwrap();
        assert_eq!(shipment.status, CanonicalStatus::Delivered);
    }

    #[tokio::test]
    async fn test_failed_unit_is_retried() {
        let store = FlakyStore::new(2);
        let reconciler = Arc::new(Reconciler::with_defaults(store.clone()));
        let (queue, handle) = spawn(reconciler, fast_policy(3), 16);

        queue.enqueue(webhook()).await.unwrap();
        drain(queue, handle).await;

        assert_eq!(store.upserts.load(Ordering::SeqCst), 3);
        assert!(store.inner.find("cargoplug", "CP1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let store = FlakyStore::new(usize::MAX);
        let reconciler = Arc::new(Reconciler::with_defaults(store.clone()));
        let (queue, handle) = spawn(reconciler, fast_policy(3), 16);

        queue.enqueue(webhook()).await.unwrap();
        drain(queue, handle).await;

        assert_eq!(store.upserts.load(Ordering::SeqCst), 3);
        assert!(store.inner.is_empty());
    }

    #[tokio::test]
    async fn test_skipped_webhooks_are_not_retried() {
        let store = FlakyStore::new(usize::MAX);
        let reconciler = Arc::new(Reconciler::with_defaults(store.clone()));
        let (queue, handle) = spawn(reconciler, fast_policy(3), 16);

        queue
            .enqueue(ShippingWebhook::new("cargoplug", json!({"status": "completed"})))
            .await
            .unwrap();
        queue
            .enqueue(ShippingWebhook::new("gigl", json!({"waybill": "G1"})))
            .await
            .unwrap();
        drain(queue, handle).await;

        assert_eq!(store.upserts.load(Ordering::SeqCst), 0);
    }
}
