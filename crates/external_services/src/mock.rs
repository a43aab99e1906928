//! Scripted stand-ins for tests.
//!
//! [`ScriptedTransport`] answers from a per-route script and records every
//! request it receives. Each route replays its script in order; the last
//! entry repeats once the script is exhausted.

use crate::cache::Cache;
use crate::error::{Error, Result};
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Clone)]
enum Scripted {
    Respond(HttpResponse),
    Fail(String),
}

/// Transport answering from scripted responses, keyed by (method, url).
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<Scripted>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an HTTP answer for the route.
    pub async fn respond(&self, method: Method, url: &str, status: u16, body: Value) {
        self.push(method, url, Scripted::Respond(HttpResponse::new(status, body)))
            .await;
    }

    /// Queue a transport failure for the route.
    pub async fn fail(&self, method: Method, url: &str, message: &str) {
        self.push(method, url, Scripted::Fail(message.to_string()))
            .await;
    }

    /// Every request sent so far, in order.
    pub async fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().await.clone()
    }

    /// Requests sent to one URL.
    pub async fn requests_to(&self, url: &str) -> Vec<HttpRequest> {
        self.requests
            .lock()
            .await
            .iter()
            .filter(|request| request.url == url)
            .cloned()
            .collect()
    }

    async fn push(&self, method: Method, url: &str, scripted: Scripted) {
        self.routes
            .lock()
            .await
            .entry((method, url.to_string()))
            .or_default()
            .push_back(scripted);
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let key = (request.method, request.url.clone());
        self.requests.lock().await.push(request);

        let mut routes = self.routes.lock().await;
        let script = routes.get_mut(&key).ok_or_else(|| {
            Error::Transport(format!("no scripted response for {} {}", key.0.as_str(), key.1))
        })?;

        let scripted = if script.len() > 1 {
            script.pop_front()
        } else {
            script.front().cloned()
        };

        match scripted {
            Some(Scripted::Respond(response)) => Ok(response),
            Some(Scripted::Fail(message)) => Err(Error::Transport(message)),
            None => Err(Error::Transport(format!(
                "no scripted response for {} {}",
                key.0.as_str(),
                key.1
            ))),
        }
    }
}

/// Cache whose every operation fails, for exercising advisory cache paths.
#[derive(Debug, Default)]
pub struct UnavailableCache;

#[async_trait]
impl Cache for UnavailableCache {
    async fn get(&self, _key: &str) -> Result<Option<String>> {
        Err(Error::Store("cache unavailable".to_string()))
    }

    async fn put(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
        Err(Error::Store("cache unavailable".to_string()))
    }

    async fn forget(&self, _key: &str) -> Result<()> {
        Err(Error::Store("cache unavailable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_script_replays_then_repeats_last() {
        let transport = ScriptedTransport::new();
        transport.respond(Method::Get, "https://a.test", 500, Value::Null).await;
        transport.respond(Method::Get, "https://a.test", 200, json!({"n": 1})).await;

        let first = transport.send(HttpRequest::get("https://a.test")).await.unwrap();
        let second = transport.send(HttpRequest::get("https://a.test")).await.unwrap();
        let third = transport.send(HttpRequest::get("https://a.test")).await.unwrap();

        assert_eq!(first.status, 500);
        assert_eq!(second.status, 200);
        assert_eq!(third.status, 200);
        assert_eq!(transport.requests().await.len(), 3);
    }

    #[tokio::test]
    async fn test_unscripted_route_is_a_transport_error() {
        let transport = ScriptedTransport::new();

        let err = transport
            .send(HttpRequest::post("https://nowhere.test"))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert_eq!(transport.requests_to("https://nowhere.test").await.len(), 1);
    }
}
