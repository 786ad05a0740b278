use super::ProxyHandle;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ProxySourceError {
    #[error("Invalid proxy pool URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to build proxy pool client: {0}")]
    Client(String),
}

/// Supplies proxy addresses on demand
///
/// Implementations never retry internally; an empty answer is a consumed
/// attempt for the caller.
#[async_trait]
pub trait ProxySource: Send + Sync {
    /// Get a proxy to route the next request through, if one is available
    async fn acquire(&self) -> Option<ProxyHandle>;

    /// Hand a proxy back to the source for recycling
    ///
    /// The fetch engine does not call this; it is a hook for callers that
    /// want to evict proxies themselves.
    async fn release(&self, _proxy: &ProxyHandle) {}
}

#[derive(Debug, Deserialize)]
struct PoolReply {
    #[serde(default)]
    proxy: String,
}

/// Client for an external proxy-pool service
///
/// The service answers `GET /get/` with a JSON object carrying a `proxy`
/// field and accepts `GET /delete/?proxy=<addr>` to drop a proxy.
#[derive(Debug, Clone)]
pub struct PoolServiceSource {
    client: Client,
    get_url: Url,
    delete_url: Url,
}

impl PoolServiceSource {
    pub fn new(pool_url: &str, timeout: Duration) -> Result<Self, ProxySourceError> {
        let invalid = |reason: String| ProxySourceError::InvalidUrl {
            url: pool_url.to_string(),
            reason,
        };

        let mut base = Url::parse(pool_url).map_err(|e| invalid(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let get_url = base.join("get/").map_err(|e| invalid(e.to_string()))?;
        let delete_url = base.join("delete/").map_err(|e| invalid(e.to_string()))?;

        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| ProxySourceError::Client(e.to_string()))?;

        Ok(Self {
            client,
            get_url,
            delete_url,
        })
    }

    pub fn get_url(&self) -> &Url {
        &self.get_url
    }
}

#[async_trait]
impl ProxySource for PoolServiceSource {
    async fn acquire(&self) -> Option<ProxyHandle> {
        let response = match self.client.get(self.get_url.clone()).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %self.get_url, error = %e, "Proxy pool request failed");
                return None;
            }
        };

        let body = match response.bytes().await {
            Ok(body) => body,
            Err(e) => {
                warn!(url = %self.get_url, error = %e, "Failed to read proxy pool response");
                return None;
            }
        };

        match serde_json::from_slice::<PoolReply>(&body) {
            Ok(reply) => {
                let proxy = reply.proxy.trim();
                if proxy.is_empty() {
                    debug!("Proxy pool has no proxy available");
                    None
                } else {
                    Some(ProxyHandle::new(proxy))
                }
            }
            Err(e) => {
                warn!(url = %self.get_url, error = %e, "Malformed proxy pool response");
                None
            }
        }
    }

    async fn release(&self, proxy: &ProxyHandle) {
        let request = self
            .client
            .get(self.delete_url.clone())
            .query(&[("proxy", proxy.as_str())]);

        match request.send().await {
            Ok(response) => debug!(%proxy, status = response.status().as_u16(), "Proxy released"),
            Err(e) => warn!(%proxy, error = %e, "Failed to release proxy"),
        }
    }
}

/// Round-robin over a fixed proxy list
#[derive(Debug, Default)]
pub struct StaticProxySource {
    proxies: Vec<ProxyHandle>,
    next: AtomicUsize,
}

impl StaticProxySource {
    pub fn new<I, P>(proxies: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ProxyHandle>,
    {
        Self {
            proxies: proxies.into_iter().map(Into::into).collect(),
            next: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }
}

#[async_trait]
impl ProxySource for StaticProxySource {
    async fn acquire(&self) -> Option<ProxyHandle> {
        if self.is_empty() {
            return None;
        }
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.len();
        Some(self.proxies[index].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_source_round_robin() {
        let source = StaticProxySource::new(["a:1", "b:2"]);

        assert_eq!(source.acquire().await, Some(ProxyHandle::new("a:1")));
        assert_eq!(source.acquire().await, Some(ProxyHandle::new("b:2")));
        assert_eq!(source.acquire().await, Some(ProxyHandle::new("a:1")));
    }

    #[tokio::test]
    async fn test_empty_static_source_has_nothing() {
        let source = StaticProxySource::new(Vec::<String>::new());
        assert!(source.is_empty());
        assert_eq!(source.acquire().await, None);
    }

    #[test]
    fn test_pool_urls_are_joined_under_base_path() {
        let source =
            PoolServiceSource::new("http://127.0.0.1:5010/pool", Duration::from_secs(1)).unwrap();
        assert_eq!(source.get_url().as_str(), "http://127.0.0.1:5010/pool/get/");
        assert_eq!(source.delete_url.as_str(), "http://127.0.0.1:5010/pool/delete/");
    }

    #[test]
    fn test_pool_url_must_parse() {
        let result = PoolServiceSource::new("not a url", Duration::from_secs(1));
        assert!(matches!(result, Err(ProxySourceError::InvalidUrl { .. })));
    }
}
