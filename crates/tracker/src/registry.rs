//! Ordered set of provider adapters keyed by provider key.
//!
//! Registration order is the fallback order.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::info;

use crate::traits::ShippingProvider;

/// Provider adapters in fallback order.
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn ShippingProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider. A provider with the same key is replaced in place.
    pub fn register(&mut self, provider: Arc<dyn ShippingProvider>) {
        let key = provider.provider_key().to_ascii_lowercase();
        info!("Registering shipping provider: {}", key);

        match self
            .providers
            .iter()
            .position(|p| p.provider_key().eq_ignore_ascii_case(&key))
        {
            Some(index) => self.providers[index] = provider,
            None => self.providers.push(provider),
        }
    }

    /// Get provider by key, case-insensitively.
    pub fn get(&self, key: &str) -> Option<Arc<dyn ShippingProvider>> {
        self.providers
            .iter()
            .find(|p| p.provider_key().eq_ignore_ascii_case(key))
            .cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Registered keys in fallback order.
    pub fn keys(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.provider_key()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ShippingProvider>> {
        self.providers.iter()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Probe every provider concurrently. `None` for providers without a probe.
    pub async fn health_check(&self) -> BTreeMap<String, Option<bool>> {
        let probes = self.providers.iter().map(|provider| async move {
            (
                provider.provider_key().to_string(),
                provider.check_health().await,
            )
        });

        join_all(probes).await.into_iter().collect()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.keys())
            .finish()
    }
}
