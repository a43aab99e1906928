//! Service configuration loaded from the environment.

use std::str::FromStr;
use std::time::Duration;

use reconciler::retry::{DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS};
use reconciler::RetryPolicy;

use crate::error::{Result, ServiceError};

const DEFAULT_HTTP_PORT: u16 = 8080;
const DEFAULT_METRICS_PORT: u16 = 9090;
const DEFAULT_WEBHOOK_RATE_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub http_port: u16,
    pub metrics_port: u16,
    /// Redis for cache and stores. In-memory when unset.
    pub redis_url: Option<String>,
    /// Webhooks accepted per client IP per minute.
    pub webhook_rate_limit_per_minute: u32,
    pub webhook_retry_backoff: Vec<Duration>,
    pub webhook_max_attempts: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            metrics_port: DEFAULT_METRICS_PORT,
            redis_url: None,
            webhook_rate_limit_per_minute: DEFAULT_WEBHOOK_RATE_LIMIT,
            webhook_retry_backoff: DEFAULT_BACKOFF.to_vec(),
            webhook_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ServiceConfig {
    /// Create from environment variables.
    ///
    /// Optional (with defaults):
    /// - `HTTP_PORT` (default: 8080)
    /// - `METRICS_PORT` (default: 9090)
    /// - `REDIS_URL` (default: in-memory cache and stores)
    /// - `WEBHOOK_RATE_LIMIT_PER_MINUTE` (default: 100)
    /// - `WEBHOOK_RETRY_BACKOFF_SECS` - Comma-separated (default: 60,300,600)
    /// - `WEBHOOK_MAX_ATTEMPTS` (default: 3)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let webhook_retry_backoff = match var("WEBHOOK_RETRY_BACKOFF_SECS") {
            Some(raw) => raw
                .split(',')
                .map(|secs| parse::<u64>("WEBHOOK_RETRY_BACKOFF_SECS", secs.trim()))
                .map(|secs| secs.map(Duration::from_secs))
                .collect::<Result<Vec<_>>>()?,
            None => defaults.webhook_retry_backoff,
        };

        let webhook_max_attempts = match var("WEBHOOK_MAX_ATTEMPTS") {
            Some(raw) => parse("WEBHOOK_MAX_ATTEMPTS", &raw)?,
            None => defaults.webhook_max_attempts,
        };
        if webhook_max_attempts == 0 {
            return Err(ServiceError::Config(
                "WEBHOOK_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            http_port: var("HTTP_PORT")
                .map(|raw| parse("HTTP_PORT", &raw))
                .transpose()?
                .unwrap_or(defaults.http_port),
            metrics_port: var("METRICS_PORT")
                .map(|raw| parse("METRICS_PORT", &raw))
                .transpose()?
                .unwrap_or(defaults.metrics_port),
            redis_url: var("REDIS_URL"),
            webhook_rate_limit_per_minute: var("WEBHOOK_RATE_LIMIT_PER_MINUTE")
                .map(|raw| parse("WEBHOOK_RATE_LIMIT_PER_MINUTE", &raw))
                .transpose()?
                .unwrap_or(defaults.webhook_rate_limit_per_minute),
            webhook_retry_backoff,
            webhook_max_attempts,
        })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.webhook_retry_backoff.clone(), self.webhook_max_attempts)
    }
}

fn parse<T: FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| ServiceError::Config(format!("{name} must be a number, got '{raw}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ServiceConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServiceConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config, ServiceConfig::default());
        assert_eq!(config.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("HTTP_PORT", "3000"),
            ("REDIS_URL", "redis://cache:6379"),
            ("WEBHOOK_RATE_LIMIT_PER_MINUTE", "20"),
            ("WEBHOOK_RETRY_BACKOFF_SECS", "5, 10"),
            ("WEBHOOK_MAX_ATTEMPTS", "4"),
        ])
        .unwrap();

        assert_eq!(config.http_port, 3000);
        assert_eq!(config.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.webhook_rate_limit_per_minute, 20);
        assert_eq!(
            config.webhook_retry_backoff,
            vec![Duration::from_secs(5), Duration::from_secs(10)]
        );
        assert_eq!(config.webhook_max_attempts, 4);
    }

    #[test]
    fn test_invalid_number() {
        let err = load(&[("METRICS_PORT", "ninety")]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Configuration error: METRICS_PORT must be a number, got 'ninety'"
        );
    }

    #[test]
    fn test_zero_attempts_rejected() {
        assert!(load(&[("WEBHOOK_MAX_ATTEMPTS", "0")]).is_err());
    }
}
