//! Proxy acquisition and usage bookkeeping
//!
//! A [`ProxySource`] hands out forward-proxy addresses on demand. Selection is
//! entirely up to the source; the fetch engine only records how often each
//! proxy was used in [`UsageCounters`].

mod source;
mod usage;

pub use source::{PoolServiceSource, ProxySource, ProxySourceError, StaticProxySource};
pub use usage::UsageCounters;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque proxy address as handed out by a proxy source
///
/// Usually `host:port`; a full URL with scheme is kept as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProxyHandle(String);

impl ProxyHandle {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Proxy URL suitable for `reqwest::Proxy::all`
    pub fn as_url(&self) -> String {
        if self.0.contains("://") {
            self.0.clone()
        } else {
            format!("http://{}", self.0)
        }
    }
}

impl fmt::Display for ProxyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProxyHandle {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ProxyHandle {
    fn from(value: String) -> Self {
        Self(value)
    }
}
