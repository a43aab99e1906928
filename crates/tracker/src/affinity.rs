//! Remembers which provider last resolved a tracking number.
//!
//! Entries are hints. A failed read or write only costs a longer fallback
//! walk, so cache errors are logged and swallowed.

use std::sync::Arc;
use std::time::Duration;

use external_services::Cache;
use tracing::{debug, warn};

/// Cache key prefix, followed by the tracking number.
pub const AFFINITY_KEY_PREFIX: &str = "shipping_tracker_provider_";

/// How long a successful provider stays preferred.
pub const AFFINITY_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Tracking number -> provider key hints.
#[derive(Clone)]
pub struct AffinityCache {
    cache: Arc<dyn Cache>,
}

impl AffinityCache {
    pub fn new(cache: Arc<dyn Cache>) -> Self {
        Self { cache }
    }

    fn key(tracking_number: &str) -> String {
        format!("{}{}", AFFINITY_KEY_PREFIX, tracking_number)
    }

    /// Provider that last resolved `tracking_number`, if remembered.
    pub async fn lookup(&self, tracking_number: &str) -> Option<String> {
        match self.cache.get(&Self::key(tracking_number)).await {
            Ok(provider) => provider,
            Err(e) => {
                warn!(tracking_number, error = %e, "Affinity lookup failed");
                None
            }
        }
    }

    pub async fn remember(&self, tracking_number: &str, provider: &str) {
        debug!(tracking_number, provider, "Remembering provider affinity");
        if let Err(e) = self
            .cache
            .put(&Self::key(tracking_number), provider, AFFINITY_TTL)
            .await
        {
            warn!(tracking_number, provider, error = %e, "Affinity write failed");
        }
    }

    /// Drop a hint that no longer resolves.
    pub async fn evict(&self, tracking_number: &str) {
        debug!(tracking_number, "Evicting provider affinity");
        if let Err(e) = self.cache.forget(&Self::key(tracking_number)).await {
            warn!(tracking_number, error = %e, "Affinity eviction failed");
        }
    }
}

impl std::fmt::Debug for AffinityCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AffinityCache")
            .field("key_prefix", &AFFINITY_KEY_PREFIX)
            .finish()
    }
}
