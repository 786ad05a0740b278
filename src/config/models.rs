use crate::batch::{BatchOptions, ResultOrder};
use crate::fetch::{ExhaustionPolicy, HttpConfig, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// Where proxies come from
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProxyConfig {
    /// Base URL of the proxy-pool service (`/get/`, `/delete/`)
    #[serde(default = "default_pool_url")]
    pub pool_url: String,
    /// Fixed proxy list; when non-empty the pool service is not used
    #[serde(default, rename = "static")]
    pub static_proxies: Vec<String>,
    #[serde(default = "default_acquire_timeout_ms")]
    pub acquire_timeout_ms: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            pool_url: default_pool_url(),
            static_proxies: Vec::new(),
            acquire_timeout_ms: default_acquire_timeout_ms(),
        }
    }
}

fn default_pool_url() -> String {
    "http://127.0.0.1:5010".to_string()
}

fn default_acquire_timeout_ms() -> u64 {
    5_000
}

/// Per-request retry and HTTP client settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default)]
    pub retry_backoff_ms: u64,
    #[serde(default)]
    pub exhaustion: ExhaustionPolicy,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_backoff_ms: 0,
            exhaustion: ExhaustionPolicy::default(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            user_agent: default_user_agent(),
        }
    }
}

impl FetchConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            backoff: Duration::from_millis(self.retry_backoff_ms),
            exhaustion: self.exhaustion,
        }
    }

    pub fn http_config(&self) -> HttpConfig {
        HttpConfig {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            request_timeout: Duration::from_millis(self.request_timeout_ms),
            user_agent: self.user_agent.clone(),
        }
    }
}

fn default_max_attempts() -> u32 {
    10
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_user_agent() -> String {
    "chemfetch/0.1.0".to_string()
}

/// Batch dispatch settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BatchConfig {
    /// Fetches in flight at once, 0 for unbounded
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Identifiers per request for chunked lookups
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub order: ResultOrder,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            chunk_size: default_chunk_size(),
            timeout_secs: None,
            order: ResultOrder::default(),
        }
    }
}

impl BatchConfig {
    pub fn options(&self) -> BatchOptions {
        BatchOptions {
            max_concurrency: Some(self.max_concurrency).filter(|n| *n > 0),
            order: self.order,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

fn default_max_concurrency() -> usize {
    32
}

fn default_chunk_size() -> usize {
    50
}

/// Target API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    "https://pubchem.ncbi.nlm.nih.gov/rest".to_string()
}
