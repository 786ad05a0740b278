use super::extract::Extractor;
use super::http::{FetchRequest, Session};
use super::outcome::{AttemptOutcome, ExhaustionPolicy, FetchError, FetchOutcome};
use crate::observability::Metrics;
use crate::proxy::{ProxySource, UsageCounters};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Retry settings for a fetcher
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Pause between failed attempts, zero for none
    pub backoff: Duration,
    pub exhaustion: ExhaustionPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            backoff: Duration::ZERO,
            exhaustion: ExhaustionPolicy::Last,
        }
    }
}

/// Fetches URLs through rotating proxies, retrying transient failures
///
/// Missing proxies, transport errors and non-200 statuses are all retried
/// the same way with a freshly acquired proxy. Extraction failures are not.
pub struct Fetcher {
    proxies: Arc<dyn ProxySource>,
    usage: UsageCounters,
    policy: RetryPolicy,
    metrics: Arc<Metrics>,
}

impl Fetcher {
    pub fn new(proxies: Arc<dyn ProxySource>, policy: RetryPolicy) -> Self {
        Self {
            proxies,
            usage: UsageCounters::new(),
            policy,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn usage(&self) -> &UsageCounters {
        &self.usage
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch `request` until a 200 is extracted or the attempt budget runs out
    pub async fn fetch<E>(
        &self,
        session: &dyn Session,
        request: &FetchRequest,
        extractor: &E,
    ) -> FetchOutcome<E::Output>
    where
        E: Extractor + ?Sized,
    {
        let max_attempts = request
            .max_attempts
            .unwrap_or(self.policy.max_attempts)
            .max(1);
        let mut retained: Option<FetchError> = None;

        for attempt in 1..=max_attempts {
            match self.attempt(session, request, extractor).await {
                AttemptOutcome::Success(payload) => {
                    self.metrics.success();
                    if attempt > 1 {
                        debug!(url = %request.url, attempt, "Fetch succeeded after retry");
                    }
                    return FetchOutcome::success(&request.url, payload, attempt);
                }
                AttemptOutcome::Fatal(error) => {
                    warn!(url = %request.url, attempt, %error, "Fetch failed, not retrying");
                    return FetchOutcome::failure(&request.url, error, attempt);
                }
                AttemptOutcome::Retryable(error) => {
                    debug!(url = %request.url, attempt, max_attempts, %error, "Attempt failed");
                    retained = Some(match retained.take() {
                        Some(previous) => self.policy.exhaustion.retain(previous, error),
                        None => error,
                    });

                    if attempt < max_attempts && !self.policy.backoff.is_zero() {
                        tokio::time::sleep(self.policy.backoff).await;
                    }
                }
            }
        }

        self.metrics.exhausted();
        // max_attempts >= 1, so at least one failure was retained
        let error = retained.unwrap_or(FetchError::NoProxyAvailable);
        warn!(url = %request.url, attempts = max_attempts, %error, "Fetch failed after retries");
        FetchOutcome::failure(&request.url, error, max_attempts)
    }

    async fn attempt<E>(
        &self,
        session: &dyn Session,
        request: &FetchRequest,
        extractor: &E,
    ) -> AttemptOutcome<E::Output>
    where
        E: Extractor + ?Sized,
    {
        self.metrics.attempt();

        let Some(proxy) = self.proxies.acquire().await else {
            self.metrics.no_proxy();
            return AttemptOutcome::Retryable(FetchError::NoProxyAvailable);
        };

        let uses = self.usage.record(&proxy);
        trace!(%proxy, uses, url = %request.url, "Proxy acquired");

        let response = match session.get(request, &proxy).await {
            Ok(response) => response,
            Err(source) => {
                self.metrics.transport_error();
                return AttemptOutcome::Retryable(FetchError::Transport { proxy, source });
            }
        };

        if response.status != 200 {
            self.metrics.http_error();
            return AttemptOutcome::Retryable(FetchError::HttpStatus(response.status));
        }

        match extractor.extract(&response) {
            Ok(payload) => AttemptOutcome::Success(payload),
            Err(e) => {
                self.metrics.extraction_error();
                AttemptOutcome::Fatal(FetchError::Extraction(e))
            }
        }
    }
}
