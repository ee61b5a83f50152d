use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use url::Url;

use super::retry::{is_retryable_network_error, retry_fetch, RetryConfig};
use super::FetchError;
use crate::config::ExplorerConfig;

/// GET a URL and decode the body as JSON.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get_json(&self, url: &Url) -> Result<Value, FetchError>;
}

pub struct HttpTransport {
    client: Client,
    retry: RetryConfig,
}

impl HttpTransport {
    pub fn new(cfg: &ExplorerConfig) -> Result<Self> {
        let mut builder = Client::builder();
        if let Some(secs) = cfg.http_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            retry: RetryConfig::with_retries(cfg.http_retries),
        })
    }

    async fn get_once(&self, url: &Url) -> Result<Value, FetchError> {
        let resp = self.client.get(url.clone()).send().await.map_err(map_send_error)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::http(status.as_u16()));
        }
        resp.json::<Value>().await.map_err(|e| {
            if e.is_decode() {
                FetchError::decode(&format!("response body is not valid JSON: {}", e))
            } else {
                map_send_error(e)
            }
        })
    }
}

fn map_send_error(e: reqwest::Error) -> FetchError {
    if is_retryable_network_error(&e) {
        FetchError::network(&e.to_string())
    } else {
        FetchError::request(&e.to_string())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get_json(&self, url: &Url) -> Result<Value, FetchError> {
        retry_fetch(&self.retry, url.path(), || self.get_once(url)).await
    }
}

#[derive(Debug, Clone)]
enum Route {
    Json(Value),
    Status(u16),
    Malformed,
}

/// In-process transport answering by URL path. Unrouted paths are 404s.
/// Every requested URL is recorded.
#[derive(Default)]
pub struct MemoryTransport {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<Url>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_json(self, path: &str, body: Value) -> Self {
        self.set(path, Route::Json(body));
        self
    }

    pub fn with_status(self, path: &str, status: u16) -> Self {
        self.set(path, Route::Status(status));
        self
    }

    /// Path answers 200 with a body that is not JSON.
    pub fn with_malformed(self, path: &str) -> Self {
        self.set(path, Route::Malformed);
        self
    }

    pub fn set_json(&self, path: &str, body: Value) {
        self.set(path, Route::Json(body));
    }

    fn set(&self, path: &str, route: Route) {
        if let Ok(mut routes) = self.routes.lock() {
            routes.insert(path.to_string(), route);
        }
    }

    pub fn requests(&self) -> Vec<Url> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self, path: &str) -> usize {
        self.requests().iter().filter(|u| u.path() == path).count()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn get_json(&self, url: &Url) -> Result<Value, FetchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.clone());
        }
        let route = self
            .routes
            .lock()
            .map_err(|_| FetchError::request("memory transport lock poisoned"))?
            .get(url.path())
            .cloned();
        match route {
            Some(Route::Json(body)) => Ok(body),
            Some(Route::Status(status)) => Err(FetchError::http(status)),
            Some(Route::Malformed) => Err(FetchError::decode("response body is not valid JSON")),
            None => Err(FetchError::http(404)),
        }
    }
}
