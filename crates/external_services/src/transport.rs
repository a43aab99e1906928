//! HTTP transport capability consumed by carrier adapters.
//!
//! A transport error means no HTTP answer was received. Non-2xx answers are
//! returned as responses so callers can read the carrier's error message.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

/// Outgoing request.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    /// JSON body, sent for POST requests.
    pub body: Option<Value>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((name.into(), value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Value of the first header with this name (case-insensitive).
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Answer from the remote side, whatever its status.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    /// Parsed JSON body. Non-JSON bodies are kept as a string, empty bodies
    /// are `Null`.
    pub body: Value,
}

impl HttpResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_server_error(&self) -> bool {
        self.status >= 500
    }

    /// Human-readable error message carried by the body, if any.
    pub fn error_message(&self) -> Option<String> {
        const PATHS: &[&[&str]] = &[
            &["message"],
            &["error", "message"],
            &["error"],
            &["detail"],
            &["title"],
        ];

        if let Value::String(text) = &self.body {
            return (!text.trim().is_empty()).then(|| text.clone());
        }

        PATHS.iter().find_map(|path| {
            let mut current = &self.body;
            for segment in *path {
                current = current.get(segment)?;
            }
            current.as_str().map(str::to_string)
        })
    }

    /// Error message, or a generic one naming the status.
    pub fn describe_failure(&self) -> String {
        self.error_message()
            .unwrap_or_else(|| format!("HTTP status {}", self.status))
    }
}

/// Request/response capability.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send one request. Fails only when no HTTP answer was received.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

// ============================================================================
// Reqwest
// ============================================================================

/// Configuration for [`ReqwestTransport`].
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Timeout for a single request.
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: "shipment-tracker/0.1".to_string(),
        }
    }
}

/// [`HttpTransport`] backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: TransportConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| Error::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        debug!(method = request.method.as_str(), url = %request.url, "Sending request");

        let mut builder = match request.method {
            Method::Get => self.http.get(&request.url),
            Method::Post => self.http.post(&request.url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        debug!(status, url = %request.url, "Received response");
        Ok(HttpResponse { status, body })
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Send with a fixed backoff between attempts.
///
/// Retries transport failures and 5xx answers. Any other answer, including
/// 4xx, is returned as is. The last failure is returned once `attempts` is
/// used up.
pub async fn send_with_retry(
    transport: &dyn HttpTransport,
    request: HttpRequest,
    attempts: u32,
    backoff: Duration,
) -> Result<HttpResponse> {
    let attempts = attempts.max(1);
    let mut attempt = 1;

    loop {
        let outcome = transport.send(request.clone()).await;
        let retryable = match &outcome {
            Ok(response) => response.is_server_error(),
            Err(_) => true,
        };

        if !retryable || attempt >= attempts {
            return outcome;
        }

        warn!(
            url = %request.url,
            attempt,
            max_attempts = attempts,
            "Request failed, retrying"
        );
        attempt += 1;
        tokio::time::sleep(backoff).await;
    }
}
