//! Tracing setup and fetch counters

use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber, filtered by `RUST_LOG` (default `info`)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Counters for fetch attempts and their outcomes
#[derive(Debug, Default)]
pub struct Metrics {
    attempts: AtomicU64,
    successes: AtomicU64,
    exhausted: AtomicU64,
    no_proxy: AtomicU64,
    transport_errors: AtomicU64,
    http_errors: AtomicU64,
    extraction_errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempt(&self) {
        self.attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success(&self) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "successes", "Metric incremented");
    }

    pub fn exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "exhausted", "Metric incremented");
    }

    pub fn no_proxy(&self) {
        self.no_proxy.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "no_proxy", "Metric incremented");
    }

    pub fn transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "transport_errors", "Metric incremented");
    }

    pub fn http_error(&self) {
        self.http_errors.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "http_errors", "Metric incremented");
    }

    pub fn extraction_error(&self) {
        self.extraction_errors.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(counter = "extraction_errors", "Metric incremented");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            no_proxy: self.no_proxy.load(Ordering::Relaxed),
            transport_errors: self.transport_errors.load(Ordering::Relaxed),
            http_errors: self.http_errors.load(Ordering::Relaxed),
            extraction_errors: self.extraction_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub exhausted: u64,
    pub no_proxy: u64,
    pub transport_errors: u64,
    pub http_errors: u64,
    pub extraction_errors: u64,
}
