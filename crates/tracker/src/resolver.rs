//! Tracking resolution across registered providers.
//!
//! A resolution walks the candidates in this order, trying each provider at
//! most once:
//!
//! 1. The pinned provider (per call, else the resolver default)
//! 2. The provider remembered for this tracking number
//! 3. Every remaining provider in registration order
//!
//! The first success wins. A fallback win is remembered for seven days; a
//! remembered provider that fails is forgotten. Errors that are not a single
//! provider failing end the resolution immediately.

use std::collections::BTreeMap;
use std::sync::Arc;

use external_services::Cache;
use futures::stream::{self, StreamExt};
use metrics::counter;
use normalizer::TrackingResult;
use tracing::{debug, info, warn};

use crate::affinity::AffinityCache;
use crate::error::{Error, ProviderAttempt, Result};
use crate::registry::ProviderRegistry;
use crate::traits::ShippingProvider;

/// Concurrent resolutions per batch.
const BATCH_CONCURRENCY: usize = 8;

/// Per-call resolution options.
#[derive(Debug, Clone, Default)]
pub struct TrackOptions {
    /// Provider tried before any other. Overrides the resolver default.
    pub provider: Option<String>,
}

impl TrackOptions {
    pub fn pinned(provider: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.into()),
        }
    }
}

/// Where the winning provider came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Pinned,
    Affinity,
    Fallback,
}

impl Source {
    fn as_str(&self) -> &'static str {
        match self {
            Source::Pinned => "pinned",
            Source::Affinity => "affinity",
            Source::Fallback => "fallback",
        }
    }
}

/// State of one resolution. Never shared between calls.
struct Resolution<'a> {
    tracking_number: &'a str,
    attempts: Vec<ProviderAttempt>,
}

impl<'a> Resolution<'a> {
    fn new(tracking_number: &'a str) -> Self {
        Self {
            tracking_number,
            attempts: Vec::new(),
        }
    }

    fn attempted(&self, key: &str) -> bool {
        self.attempts
            .iter()
            .any(|a| a.provider.eq_ignore_ascii_case(key))
    }

    /// Try one provider, recording the failure on error.
    ///
    /// `Ok(None)` means the provider failed and the next one may be tried.
    async fn attempt(
        &mut self,
        provider: &Arc<dyn ShippingProvider>,
        source: Source,
    ) -> Result<Option<TrackingResult>> {
        let key = provider.provider_key().to_string();
        debug!(
            tracking_number = self.tracking_number,
            provider = %key,
            source = source.as_str(),
            "Trying provider"
        );

        match provider.track(self.tracking_number).await {
            Ok(result) => {
                counter!("tracker_track_attempts_total", "provider" => key.clone(), "outcome" => "success")
                    .increment(1);
                counter!("tracker_resolutions_total", "provider" => key.clone(), "source" => source.as_str())
                    .increment(1);
                info!(
                    tracking_number = self.tracking_number,
                    provider = %key,
                    source = source.as_str(),
                    "Tracking resolved"
                );
                Ok(Some(result))
            }
            Err(e) if !e.is_fallback_eligible() => {
                counter!("tracker_track_attempts_total", "provider" => key.clone(), "outcome" => "failure")
                    .increment(1);
                warn!(
                    tracking_number = self.tracking_number,
                    provider = %key,
                    error = %e,
                    "Provider failed, not falling back"
                );
                Err(e)
            }
            Err(e) => {
                counter!("tracker_track_attempts_total", "provider" => key.clone(), "outcome" => "failure")
                    .increment(1);
                warn!(
                    tracking_number = self.tracking_number,
                    provider = %key,
                    error = %e,
                    "Provider failed to track"
                );
                self.attempts.push(ProviderAttempt {
                    provider: key,
                    error: e.to_string(),
                });
                Ok(None)
            }
        }
    }

    fn exhausted(self) -> Error {
        counter!("tracker_exhausted_total").increment(1);
        warn!(
            tracking_number = self.tracking_number,
            attempted = self.attempts.len(),
            "No provider could track shipment"
        );
        Error::NoProviderSupportsTracking {
            tracking_number: self.tracking_number.to_string(),
            attempts: self.attempts,
        }
    }
}

/// Tracking Resolver.
///
/// # Example
///
/// ```ignore
/// let resolver = TrackingResolver::new(Arc::new(registry), cache)
///     .with_default_provider(config.default_provider.clone());
///
/// let result = resolver.track("JD014600006281230701").await?;
/// let pinned = resolver.track_with("SB-1", &TrackOptions::pinned("sendbox")).await?;
/// ```
pub struct TrackingResolver {
    registry: Arc<ProviderRegistry>,
    affinity: AffinityCache,
    default_provider: Option<String>,
}

impl TrackingResolver {
    pub fn new(registry: Arc<ProviderRegistry>, cache: Arc<dyn Cache>) -> Self {
        Self {
            registry,
            affinity: AffinityCache::new(cache),
            default_provider: None,
        }
    }

    /// Provider pinned for calls that do not pin one themselves.
    pub fn with_default_provider(mut self, provider: Option<String>) -> Self {
        self.default_provider = provider;
        self
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    /// Resolve with the default options.
    pub async fn track(&self, tracking_number: &str) -> Result<TrackingResult> {
        self.track_with(tracking_number, &TrackOptions::default())
            .await
    }

    /// Resolve `tracking_number`.
    ///
    /// # Errors
    ///
    /// - `UnknownProvider` when the pinned key is not registered
    /// - `NoProviderSupportsTracking` when every candidate failed
    /// - any error that is not fallback-eligible, as soon as it occurs
    pub async fn track_with(
        &self,
        tracking_number: &str,
        options: &TrackOptions,
    ) -> Result<TrackingResult> {
        let mut resolution = Resolution::new(tracking_number);

        // 1. Pinned
        if let Some(key) = options.provider.as_ref().or(self.default_provider.as_ref()) {
            let provider = self
                .registry
                .get(key)
                .ok_or_else(|| Error::UnknownProvider(key.clone()))?;

            if let Some(result) = resolution.attempt(&provider, Source::Pinned).await? {
                return Ok(result);
            }
        }

        // 2. Affinity
        if let Some(key) = self.affinity.lookup(tracking_number).await {
            match self.registry.get(&key) {
                Some(provider) if !resolution.attempted(&key) => {
                    if let Some(result) = resolution.attempt(&provider, Source::Affinity).await? {
                        return Ok(result);
                    }
                    self.affinity.evict(tracking_number).await;
                }
                // Already failed as the pinned provider.
                Some(_) => self.affinity.evict(tracking_number).await,
                None => {
                    debug!(tracking_number, provider = %key, "Remembered provider is not registered");
                    self.affinity.evict(tracking_number).await;
                }
            }
        }

        // 3. Fallback
        for provider in self.fallback_candidates(&resolution) {
            if let Some(result) = resolution.attempt(&provider, Source::Fallback).await? {
                self.affinity
                    .remember(tracking_number, provider.provider_key())
                    .await;
                return Ok(result);
            }
        }

        // 4. Exhaustion
        Err(resolution.exhausted())
    }

    /// Providers not yet attempted, in registration order.
    fn fallback_candidates(&self, resolution: &Resolution<'_>) -> Vec<Arc<dyn ShippingProvider>> {
        self.registry
            .iter()
            .filter(|p| !resolution.attempted(p.provider_key()))
            .inspect(|p| {
                if !p.supports(resolution.tracking_number) {
                    debug!(
                        tracking_number = resolution.tracking_number,
                        provider = p.provider_key(),
                        "Number does not match provider format, trying anyway"
                    );
                }
            })
            .cloned()
            .collect()
    }

    /// Resolve many numbers independently.
    ///
    /// Every distinct input number gets exactly one entry, a result or the
    /// error that ended its resolution.
    pub async fn track_multiple<I, S>(
        &self,
        tracking_numbers: I,
    ) -> BTreeMap<String, Result<TrackingResult>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut numbers: Vec<String> = Vec::new();
        for number in tracking_numbers {
            let number = number.into();
            if !numbers.contains(&number) {
                numbers.push(number);
            }
        }

        stream::iter(numbers)
            .map(|number| async move {
                let result = self.track(&number).await;
                (number, result)
            })
            .buffer_unordered(BATCH_CONCURRENCY)
            .collect()
            .await
    }
}

impl std::fmt::Debug for TrackingResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackingResolver")
            .field("providers", &self.registry.keys())
            .field("default_provider", &self.default_provider)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::affinity::AFFINITY_KEY_PREFIX;
    use async_trait::async_trait;
    use external_services::mock::UnavailableCache;
    use external_services::MemoryCache;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Stub {
        key: &'static str,
        succeeds: bool,
        supports: bool,
        calls: AtomicUsize,
    }

    impl Stub {
        fn new(key: &'static str, succeeds: bool) -> Arc<Self> {
            Arc::new(Self {
                key,
                succeeds,
                supports: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn declining(key: &'static str, succeeds: bool) -> Arc<Self> {
            Arc::new(Self {
                key,
                succeeds,
                supports: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ShippingProvider for Stub {
        fn provider_key(&self) -> &str {
            self.key
        }

        fn supports(&self, _tracking_number: &str) -> bool {
            self.supports
        }

        async fn track(&self, tracking_number: &str) -> Result<TrackingResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeeds {
                Ok(TrackingResult::new(self.key).with_fallback_tracking_number(tracking_number))
            } else {
                Err(Error::empty_response(self.key))
            }
        }
    }

    fn registry(stubs: &[Arc<Stub>]) -> Arc<ProviderRegistry> {
        let mut registry = ProviderRegistry::new();
        for stub in stubs {
            registry.register(stub.clone());
        }
        Arc::new(registry)
    }

    fn affinity_key(number: &str) -> String {
        format!("{}{}", AFFINITY_KEY_PREFIX, number)
    }

    #[tokio::test]
    async fn test_falls_back_to_third_and_remembers_it() {
        let (a, b, c) = (Stub::new("a", false), Stub::new("b", false), Stub::new("c", true));
        let cache = Arc::new(MemoryCache::new());
        let resolver = TrackingResolver::new(registry(&[a.clone(), b.clone(), c.clone()]), cache.clone());

        let result = resolver.track("N1").await.unwrap();

        assert_eq!(result.provider, "c");
        assert_eq!(result.tracking_number.as_deref(), Some("N1"));
        assert_eq!(
            cache.get(&affinity_key("N1")).await.unwrap().as_deref(),
            Some("c")
        );

        // Second call goes straight to the remembered provider.
        resolver.track("N1").await.unwrap();
        assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 2));
    }

    #[tokio::test]
    async fn test_stale_affinity_is_evicted() {
        let (a, b, c) = (Stub::new("a", false), Stub::new("b", true), Stub::new("c", false));
        let cache = Arc::new(MemoryCache::new());
        cache
            .put(&affinity_key("N1"), "c", Duration::from_secs(60))
            .await
            .unwrap();
        let resolver = TrackingResolver::new(registry(&[a.clone(), b.clone(), c.clone()]), cache.clone());

        let result = resolver.track("N1").await.unwrap();

        assert_eq!(result.provider, "b");
        // c tried once from affinity, not again during fallback.
        assert_eq!((a.calls(), b.calls(), c.calls()), (1, 1, 1));
        assert_eq!(
            cache.get(&affinity_key("N1")).await.unwrap().as_deref(),
            Some("b")
        );
    }

    #[tokio::test]
    async fn test_unregistered_affinity_is_evicted() {
        let a = Stub::new("a", false);
        let cache = Arc::new(MemoryCache::new());
        cache
            .put(&affinity_key("N1"), "gone", Duration::from_secs(60))
            .await
            .unwrap();
        let resolver = TrackingResolver::new(registry(&[a]), cache.clone());

        assert!(resolver.track("N1").await.is_err());
        assert!(cache.get(&affinity_key("N1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_exhaustion_names_every_provider() {
        let stubs = [Stub::new("a", false), Stub::new("b", false), Stub::new("c", false)];
        let resolver = TrackingResolver::new(registry(&stubs), Arc::new(MemoryCache::new()));

        let err = resolver.track("N1").await.unwrap_err();

        match err {
            Error::NoProviderSupportsTracking {
                tracking_number,
                attempts,
            } => {
                assert_eq!(tracking_number, "N1");
                let tried: Vec<_> = attempts.iter().map(|a| a.provider.as_str()).collect();
                assert_eq!(tried, vec!["a", "b", "c"]);
                assert_eq!(attempts[0].error, "a returned no tracking data");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_pinned_provider_is_tried_first() {
        let (a, b) = (Stub::new("a", true), Stub::new("b", true));
        let cache = Arc::new(MemoryCache::new());
        let resolver = TrackingResolver::new(registry(&[a.clone(), b.clone()]), cache.clone());

        let result = resolver
            .track_with("N1", &TrackOptions::pinned("B"))
            .await
            .unwrap();

        assert_eq!(result.provider, "b");
        assert_eq!(a.calls(), 0);
        // Pinned wins are not remembered.
        assert!(cache.get(&affinity_key("N1")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_pin_falls_through_without_retrying_it() {
        let (a, b) = (Stub::new("a", true), Stub::new("b", false));
        let resolver = TrackingResolver::new(registry(&[a.clone(), b.clone()]), Arc::new(MemoryCache::new()))
            .with_default_provider(Some("b".to_string()));

        let result = resolver.track("N1").await.unwrap();

        assert_eq!(result.provider, "a");
        assert_eq!((a.calls(), b.calls()), (1, 1));
    }

    #[tokio::test]
    async fn test_unknown_pin_is_rejected() {
        let resolver = TrackingResolver::new(registry(&[Stub::new("a", true)]), Arc::new(MemoryCache::new()));

        let err = resolver
            .track_with("N1", &TrackOptions::pinned("gigl"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnknownProvider(key) if key == "gigl"));
    }

    #[tokio::test]
    async fn test_fallback_follows_registration_order() {
        let (a, b) = (Stub::declining("a", true), Stub::new("b", true));
        let resolver = TrackingResolver::new(registry(&[a.clone(), b.clone()]), Arc::new(MemoryCache::new()));

        let result = resolver.track("N1").await.unwrap();

        assert_eq!(result.provider, "a");
        assert_eq!((a.calls(), b.calls()), (1, 0));
    }

    #[tokio::test]
    async fn test_affinity_matching_failed_pin_is_evicted() {
        let (a, b) = (Stub::new("a", false), Stub::new("b", false));
        let cache = Arc::new(MemoryCache::new());
        cache
            .put(&affinity_key("N1"), "a", Duration::from_secs(60))
            .await
            .unwrap();
        let resolver = TrackingResolver::new(registry(&[a.clone(), b.clone()]), cache.clone())
            .with_default_provider(Some("a".to_string()));

        assert!(resolver.track("N1").await.is_err());
        assert_eq!((a.calls(), b.calls()), (1, 1));
        assert!(cache.get(&affinity_key("N1")).await.unwrap().is_none());
    }

    struct Misconfigured;

    #[async_trait]
    impl ShippingProvider for Misconfigured {
        fn provider_key(&self) -> &str {
            "broken"
        }

        async fn track(&self, _tracking_number: &str) -> Result<TrackingResult> {
            Err(Error::Configuration("BROKEN_API_KEY is not set".to_string()))
        }
    }

    #[tokio::test]
    async fn test_non_provider_error_stops_resolution() {
        let b = Stub::new("b", true);
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(Misconfigured));
        registry.register(b.clone());
        let resolver = TrackingResolver::new(Arc::new(registry), Arc::new(MemoryCache::new()));

        let err = resolver.track("N1").await.unwrap_err();

        assert!(matches!(err, Error::Configuration(_)));
        assert_eq!(b.calls(), 0);
    }

    #[tokio::test]
    async fn test_declining_providers_are_still_tried() {
        let (a, b) = (Stub::new("a", false), Stub::declining("b", true));
        let resolver = TrackingResolver::new(registry(&[a.clone(), b.clone()]), Arc::new(MemoryCache::new()));

        let result = resolver.track("N1").await.unwrap();

        assert_eq!(result.provider, "b");
    }

    #[tokio::test]
    async fn test_unavailable_cache_does_not_break_resolution() {
        let resolver = TrackingResolver::new(
            registry(&[Stub::new("a", false), Stub::new("b", true)]),
            Arc::new(UnavailableCache),
        );

        let result = resolver.track("N1").await.unwrap();
        assert_eq!(result.provider, "b");
    }

    struct OnlyKnows {
        number: &'static str,
    }

    #[async_trait]
    impl ShippingProvider for OnlyKnows {
        fn provider_key(&self) -> &str {
            "only"
        }

        async fn track(&self, tracking_number: &str) -> Result<TrackingResult> {
            if tracking_number == self.number {
                Ok(TrackingResult::new("only"))
            } else {
                Err(Error::transport("only", "HTTP status 404"))
            }
        }
    }

    #[tokio::test]
    async fn test_track_multiple_captures_each_outcome() {
        let mut registry = ProviderRegistry::new();
        registry.register(Arc::new(OnlyKnows { number: "A" }));
        let resolver = TrackingResolver::new(Arc::new(registry), Arc::new(MemoryCache::new()));

        let results = resolver.track_multiple(["A", "B", "A"]).await;

        assert_eq!(results.len(), 2);
        assert!(results["A"].is_ok());
        assert!(matches!(
            results["B"],
            Err(Error::NoProviderSupportsTracking { .. })
        ));
    }
}
