//! Carrier configuration loaded from the environment.

use std::time::Duration;

use crate::error::{Error, Result};

pub const DEFAULT_PROVIDERS: &str = "sendbox,cargoplug,dhl";
pub const DEFAULT_SENDBOX_API_URL: &str = "https://live.sendbox.co";
pub const DEFAULT_CARGOPLUG_API_URL: &str = "https://api.getcargoplug.com/api/v1";
pub const DEFAULT_DHL_BASE_URL: &str = "https://api-eu.dhl.com";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendboxConfig {
    pub base_url: String,
    pub app_id: Option<String>,
    pub client_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CargoplugConfig {
    pub base_url: String,
    pub secret_key: Option<String>,
    pub client_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhlConfig {
    pub base_url: String,
    pub api_key: Option<String>,
}

/// Provider selection and per-carrier settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    /// Provider keys in fallback order.
    pub providers: Vec<String>,
    /// Provider pinned for calls that do not pin one themselves.
    pub default_provider: Option<String>,
    pub http_timeout: Duration,
    pub sendbox: SendboxConfig,
    pub cargoplug: CargoplugConfig,
    pub dhl: DhlConfig,
}

impl TrackerConfig {
    /// Create from environment variables.
    ///
    /// Optional (with defaults):
    /// - `SHIPPING_PROVIDERS` - Comma-separated keys (default: sendbox,cargoplug,dhl)
    /// - `SHIPPING_DEFAULT_PROVIDER` - Key pinned by default
    /// - `SHIPPING_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 30)
    /// - `SENDBOX_API_URL`, `SENDBOX_APP_ID`, `SENDBOX_APP_CLIENT_KEY`
    /// - `CARGOPLUG_API_URL`, `CARGOPLUG_SECRET_KEY`, `CARGOPLUG_CLIENT_KEY`
    /// - `DHL_BASE_URL`, `DHL_API_KEY`
    ///
    /// Credentials are checked when the listed providers connect.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let providers: Vec<String> = var("SHIPPING_PROVIDERS")
            .unwrap_or_else(|| DEFAULT_PROVIDERS.to_string())
            .split(',')
            .map(|key| key.trim().to_ascii_lowercase())
            .filter(|key| !key.is_empty())
            .fold(Vec::new(), |mut keys, key| {
                if !keys.contains(&key) {
                    keys.push(key);
                }
                keys
            });

        if providers.is_empty() {
            return Err(Error::Configuration(
                "SHIPPING_PROVIDERS lists no providers".to_string(),
            ));
        }

        let default_provider = var("SHIPPING_DEFAULT_PROVIDER").map(|key| key.to_ascii_lowercase());
        if let Some(key) = &default_provider {
            if !providers.contains(key) {
                return Err(Error::Configuration(format!(
                    "SHIPPING_DEFAULT_PROVIDER '{}' is not listed in SHIPPING_PROVIDERS",
                    key
                )));
            }
        }

        let timeout_secs = match var("SHIPPING_HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.parse::<u64>().map_err(|_| {
                Error::Configuration(format!("SHIPPING_HTTP_TIMEOUT_SECS is not a number: {raw}"))
            })?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Ok(Self {
            providers,
            default_provider,
            http_timeout: Duration::from_secs(timeout_secs),
            sendbox: SendboxConfig {
                base_url: trim_url(var("SENDBOX_API_URL"), DEFAULT_SENDBOX_API_URL),
                app_id: var("SENDBOX_APP_ID"),
                client_key: var("SENDBOX_APP_CLIENT_KEY"),
            },
            cargoplug: CargoplugConfig {
                base_url: trim_url(var("CARGOPLUG_API_URL"), DEFAULT_CARGOPLUG_API_URL),
                secret_key: var("CARGOPLUG_SECRET_KEY"),
                client_key: var("CARGOPLUG_CLIENT_KEY"),
            },
            dhl: DhlConfig {
                base_url: trim_url(var("DHL_BASE_URL"), DEFAULT_DHL_BASE_URL),
                api_key: var("DHL_API_KEY"),
            },
        })
    }
}

fn trim_url(value: Option<String>, default: &str) -> String {
    value
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

/// Required credential, or a `Configuration` error naming the variable.
pub(crate) fn require(value: &Option<String>, variable: &str) -> Result<String> {
    value
        .clone()
        .ok_or_else(|| Error::Configuration(format!("{variable} is not configured")))
}
