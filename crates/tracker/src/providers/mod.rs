//! Reference carrier adapters.
//!
//! Each module contains:
//!
//! - Authentication (token exchange or static API key)
//! - The tracking request and its error mapping
//! - Webhook field requirements and a health probe

pub mod auth;
pub mod cargoplug;
pub mod dhl;
pub mod sendbox;

pub use cargoplug::CargoplugProvider;
pub use dhl::DhlProvider;
pub use sendbox::SendboxProvider;

use std::sync::Arc;

use external_services::{Cache, HttpRequest, HttpResponse, HttpTransport};
use tracing::{debug, info};

use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::registry::ProviderRegistry;
use crate::traits::ShippingProvider;

/// Connect every provider listed in the configuration, in listed order.
///
/// Fails on the first provider that is misconfigured or cannot authenticate.
pub async fn connect_all(
    config: &TrackerConfig,
    transport: Arc<dyn HttpTransport>,
    cache: Arc<dyn Cache>,
) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();

    for key in &config.providers {
        let provider: Arc<dyn ShippingProvider> = match key.as_str() {
            sendbox::NAME => Arc::new(
                SendboxProvider::connect(&config.sendbox, transport.clone(), cache.clone()).await?,
            ),
            cargoplug::NAME => Arc::new(
                CargoplugProvider::connect(&config.cargoplug, transport.clone(), cache.clone())
                    .await?,
            ),
            dhl::NAME => Arc::new(DhlProvider::new(&config.dhl, transport.clone())?),
            other => return Err(Error::UnknownProvider(other.to_string())),
        };
        registry.register(provider);
    }

    info!(providers = ?registry.keys(), "Shipping providers connected");
    Ok(registry)
}

/// Map a tracking answer's status onto the error taxonomy.
///
/// 401/403 mean the credentials were rejected.
pub(crate) fn ensure_success(provider: &str, response: HttpResponse) -> Result<HttpResponse> {
    match response.status {
        200..=299 => Ok(response),
        401 | 403 => Err(Error::authentication(provider, response.describe_failure())),
        _ => Err(Error::transport(
            provider,
            format!("tracking failed: {}", response.describe_failure()),
        )),
    }
}

/// Map a transport failure onto the error taxonomy.
pub(crate) fn transport_error(provider: &str, err: external_services::Error) -> Error {
    Error::transport(provider, err.to_string())
}

/// Formatting only fails when the carrier sent nothing usable.
pub(crate) fn format_error(provider: &str, err: normalizer::Error) -> Error {
    debug!(provider, error = %err, "Tracking response rejected by formatter");
    Error::empty_response(provider)
}

/// GET the carrier's base URL. Any answer below 500 counts as reachable.
pub(crate) async fn probe(transport: &dyn HttpTransport, provider: &str, url: &str) -> bool {
    match transport.send(HttpRequest::get(url)).await {
        Ok(response) => {
            debug!(provider, status = response.status, "Health probe answered");
            !response.is_server_error()
        }
        Err(e) => {
            debug!(provider, error = %e, "Health probe failed");
            false
        }
    }
}
