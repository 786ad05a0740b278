//! Batch-scoped HTTP sessions that route each request through a proxy

use crate::proxy::ProxyHandle;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Proxy};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection timeout")]
    Timeout,

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Invalid proxy: {0}")]
    Proxy(String),

    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("Failed to read body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            TransportError::Body(e.to_string())
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

/// One GET to issue, possibly several times
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
    /// Overrides the fetcher's attempt budget for this request
    pub max_attempts: Option<u32>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            params: Vec::new(),
            max_attempts: None,
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((name.into(), value.into()));
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }
}

/// Fully read response, whatever its status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub url: String,
    pub status: u16,
    pub body: Bytes,
}

impl RawResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            body: body.into(),
        }
    }
}

/// Issues requests through a given proxy
///
/// A session lives for one batch and is shared by all of its tasks.
#[async_trait]
pub trait Session: Send + Sync {
    async fn get(
        &self,
        request: &FetchRequest,
        proxy: &ProxyHandle,
    ) -> Result<RawResponse, TransportError>;
}

/// Opens a fresh session at the start of every batch
pub trait Connector: Send + Sync {
    fn open(&self) -> Arc<dyn Session>;
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: "chemfetch/0.1.0".to_string(),
        }
    }
}

/// Connector producing reqwest-backed sessions
#[derive(Debug, Clone, Default)]
pub struct HttpConnector {
    config: HttpConfig,
}

impl HttpConnector {
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }
}

impl Connector for HttpConnector {
    fn open(&self) -> Arc<dyn Session> {
        Arc::new(HttpSession::new(self.config.clone()))
    }
}

/// reqwest session keeping one pooled client per proxy
///
/// reqwest binds proxies at client build time, so clients are built lazily
/// the first time a proxy is seen and reused for the rest of the batch.
/// Dropping the session closes every pooled connection.
///
/// The map holds one client per distinct proxy seen during the batch and is
/// never pruned. Against a pool that hands out a fresh proxy on most
/// acquisitions this means roughly one client build per attempt, and memory
/// grows with the number of distinct proxies. Sessions are per batch, so the
/// map is bounded by the batch's total attempt count.
pub struct HttpSession {
    config: HttpConfig,
    clients: Mutex<HashMap<ProxyHandle, Client>>,
}

impl HttpSession {
    pub fn new(config: HttpConfig) -> Self {
        Self {
            config,
            clients: Mutex::new(HashMap::new()),
        }
    }

    fn client_for(&self, proxy: &ProxyHandle) -> Result<Client, TransportError> {
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(proxy) {
            return Ok(client.clone());
        }

        let route = Proxy::all(proxy.as_url()).map_err(|e| TransportError::Proxy(e.to_string()))?;
        let client = Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .timeout(self.config.request_timeout)
            .user_agent(&self.config.user_agent)
            .proxy(route)
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        debug!(%proxy, pooled = clients.len() + 1, "Built client for proxy");
        clients.insert(proxy.clone(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl Session for HttpSession {
    async fn get(
        &self,
        request: &FetchRequest,
        proxy: &ProxyHandle,
    ) -> Result<RawResponse, TransportError> {
        let client = self.client_for(proxy)?;

        let mut builder = client.get(&request.url);
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Body(e.to_string()))?;

        debug!(url = %request.url, %proxy, status, size = body.len(), "Response received");

        Ok(RawResponse {
            url: request.url.clone(),
            status,
            body,
        })
    }
}
