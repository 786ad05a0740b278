use super::ProxyHandle;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};

/// Per-proxy request counters
///
/// Purely observational: nothing reads these to pick or evict proxies.
/// Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct UsageCounters {
    counts: Arc<Mutex<HashMap<ProxyHandle, u64>>>,
}

impl UsageCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one use of `proxy`, returning its new total
    pub fn record(&self, proxy: &ProxyHandle) -> u64 {
        let mut counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        let count = counts.entry(proxy.clone()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn get(&self, proxy: &ProxyHandle) -> u64 {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.get(proxy).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.values().sum()
    }

    /// Sorted copy of the current counts
    pub fn snapshot(&self) -> BTreeMap<ProxyHandle, u64> {
        let counts = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        counts.iter().map(|(k, v)| (k.clone(), *v)).collect()
    }
}
