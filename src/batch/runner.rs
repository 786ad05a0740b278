use super::chunk::chunk;
use super::result::{BatchResult, Failure, FieldRecord, ResultOrder, Success};
use crate::config::Config;
use crate::fetch::{
    Connector, ExtractionError, Extractor, FetchError, FetchOutcome, FetchRequest, Fetcher,
    FieldExtractor, HttpConnector, RawResponse,
};
use crate::proxy::{PoolServiceSource, ProxySource, ProxySourceError, StaticProxySource};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-batch dispatch settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// Fetches allowed in flight at once; `None` or zero for no limit
    pub max_concurrency: Option<usize>,
    pub order: ResultOrder,
    /// Deadline for the whole batch; unfinished items fail when it passes
    pub timeout: Option<Duration>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrency: Some(32),
            order: ResultOrder::Input,
            timeout: None,
        }
    }
}

/// Fans work items out to concurrent fetches and gathers the results
///
/// Every batch opens its own session from the connector and drops it once
/// all of its tasks are done. A batch always yields a result: items whose
/// fetch failed, timed out or was cancelled land in `failed`.
#[derive(Clone)]
pub struct BatchRunner {
    fetcher: Arc<Fetcher>,
    connector: Arc<dyn Connector>,
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(fetcher: Arc<Fetcher>, connector: Arc<dyn Connector>, options: BatchOptions) -> Self {
        Self {
            fetcher,
            connector,
            options,
        }
    }

    /// Wire up proxy source, fetcher and HTTP connector from configuration
    pub fn from_config(config: &Config) -> Result<Self, ProxySourceError> {
        let proxies: Arc<dyn ProxySource> = if config.proxy.static_proxies.is_empty() {
            Arc::new(PoolServiceSource::new(
                &config.proxy.pool_url,
                Duration::from_millis(config.proxy.acquire_timeout_ms),
            )?)
        } else {
            let source = StaticProxySource::new(config.proxy.static_proxies.clone());
            info!(proxies = source.len(), "Using static proxy list");
            Arc::new(source)
        };

        let fetcher = Fetcher::new(proxies, config.fetch.retry_policy());
        let connector = HttpConnector::new(config.fetch.http_config());

        Ok(Self::new(
            Arc::new(fetcher),
            Arc::new(connector),
            config.batch.options(),
        ))
    }

    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    pub fn options(&self) -> &BatchOptions {
        &self.options
    }

    /// Same fetcher and connector, different dispatch settings
    pub fn with_options(&self, options: BatchOptions) -> Self {
        Self {
            fetcher: Arc::clone(&self.fetcher),
            connector: Arc::clone(&self.connector),
            options,
        }
    }

    /// One fetch per item
    pub async fn run<W, E, F>(
        &self,
        items: Vec<W>,
        build: F,
        extractor: Arc<E>,
    ) -> BatchResult<W, E::Output>
    where
        E: Extractor + 'static,
        F: Fn(&W) -> FetchRequest,
    {
        self.run_cancellable(items, build, extractor, &CancellationToken::new())
            .await
    }

    /// One fetch per group of at most `chunk_size` identifiers
    pub async fn run_chunked<I, E, F>(
        &self,
        ids: Vec<I>,
        chunk_size: usize,
        build: F,
        extractor: Arc<E>,
    ) -> BatchResult<Vec<I>, E::Output>
    where
        I: Clone,
        E: Extractor + 'static,
        F: Fn(&[I]) -> FetchRequest,
    {
        let chunks = chunk(&ids, chunk_size);
        debug!(ids = ids.len(), chunks = chunks.len(), chunk_size, "Chunked batch input");
        self.run(chunks, |group: &Vec<I>| build(group.as_slice()), extractor)
            .await
    }

    /// Like [`run`](Self::run), stopping early when `cancel` fires
    ///
    /// Cancellation aborts every in-flight fetch; their items are reported
    /// as failed with [`FetchError::Cancelled`].
    pub async fn run_cancellable<W, E, F>(
        &self,
        items: Vec<W>,
        build: F,
        extractor: Arc<E>,
        cancel: &CancellationToken,
    ) -> BatchResult<W, E::Output>
    where
        E: Extractor + 'static,
        F: Fn(&W) -> FetchRequest,
    {
        let requests = items.iter().map(&build).collect();
        let finished = self.dispatch(requests, extractor, cancel).await;

        let mut result = BatchResult {
            succeeded: Vec::new(),
            failed: Vec::new(),
        };
        for (item, outcome) in pair_up(items, finished, self.options.order) {
            match outcome.payload {
                Some(payload) => result.succeeded.push(Success { item, payload }),
                None => result.failed.push(Failure {
                    item,
                    status_code: outcome.status_code,
                    error: outcome.error,
                }),
            }
        }
        result
    }

    /// One fetch per item, then keyed extraction of `fields` from each response
    ///
    /// Every record carries every requested field. Items whose fetch failed
    /// get empty lists for all of them, as do fields the extractor could not
    /// find.
    pub async fn run_fields<W, X, F>(
        &self,
        items: Vec<W>,
        fields: &[String],
        build: F,
        extractor: Arc<X>,
    ) -> Vec<FieldRecord<W>>
    where
        X: FieldExtractor + 'static,
        F: Fn(&W) -> FetchRequest,
    {
        let keyed = Arc::new(FieldsExtractor {
            inner: extractor,
            fields: fields.to_vec(),
        });

        let requests = items.iter().map(&build).collect();
        let finished = self
            .dispatch(requests, keyed, &CancellationToken::new())
            .await;

        pair_up(items, finished, self.options.order)
            .into_iter()
            .map(|(item, outcome)| match outcome.payload {
                Some(values) => FieldRecord {
                    item,
                    fields: values,
                    status_code: outcome.status_code,
                    error: None,
                },
                None => FieldRecord::empty(item, fields, outcome.status_code, outcome.error),
            })
            .collect()
    }

    /// Spawn one task per request and wait for all of them
    ///
    /// Returns `(index, outcome)` pairs in completion order, followed by
    /// failures for every request that never finished.
    async fn dispatch<E>(
        &self,
        requests: Vec<FetchRequest>,
        extractor: Arc<E>,
        cancel: &CancellationToken,
    ) -> Vec<(usize, FetchOutcome<E::Output>)>
    where
        E: Extractor + 'static,
    {
        let batch_id = Uuid::new_v4();
        let total = requests.len();
        let started = Instant::now();
        info!(
            %batch_id,
            total,
            concurrency = ?self.options.max_concurrency,
            max_attempts = self.fetcher.policy().max_attempts,
            "Batch started"
        );

        let session = self.connector.open();
        let limiter = self
            .options
            .max_concurrency
            .filter(|limit| *limit > 0)
            .map(|limit| Arc::new(Semaphore::new(limit)));

        let urls: Vec<String> = requests.iter().map(|r| r.url.clone()).collect();
        let mut tasks = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let session = Arc::clone(&session);
            let extractor = Arc::clone(&extractor);
            let limiter = limiter.clone();

            tasks.spawn(async move {
                let _permit = match limiter {
                    Some(limiter) => limiter.acquire_owned().await.ok(),
                    None => None,
                };
                let outcome = fetcher
                    .fetch(session.as_ref(), &request, extractor.as_ref())
                    .await;
                (index, outcome)
            });
        }

        let timeout = self.options.timeout;
        let deadline = async move {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let mut finished = Vec::with_capacity(total);
        let mut interrupted = None;

        while !tasks.is_empty() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    interrupted = Some(FetchError::Cancelled);
                    break;
                }
                _ = &mut deadline => {
                    interrupted = Some(FetchError::BatchTimedOut);
                    break;
                }
                joined = tasks.join_next() => match joined {
                    Some(Ok(pair)) => finished.push(pair),
                    Some(Err(e)) => warn!(%batch_id, error = %e, "Fetch task failed"),
                    None => break,
                },
            }
        }

        tasks.abort_all();
        drop(tasks);

        if finished.len() < total {
            let error = interrupted
                .unwrap_or_else(|| FetchError::Aborted("fetch task did not complete".to_string()));
            warn!(%batch_id, unfinished = total - finished.len(), %error, "Batch interrupted");

            let mut done = vec![false; total];
            for (index, _) in &finished {
                done[*index] = true;
            }
            for (index, url) in urls.iter().enumerate() {
                if !done[index] {
                    finished.push((index, FetchOutcome::failure(url, error.clone(), 0)));
                }
            }
        }

        let succeeded = finished.iter().filter(|(_, o)| o.is_success()).count();
        info!(
            %batch_id,
            total,
            succeeded,
            failed = total - succeeded,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch finished"
        );

        finished
    }
}

/// Match outcomes back to their items in the requested order
fn pair_up<W, T>(
    items: Vec<W>,
    mut finished: Vec<(usize, FetchOutcome<T>)>,
    order: ResultOrder,
) -> Vec<(W, FetchOutcome<T>)> {
    if order == ResultOrder::Input {
        finished.sort_by_key(|(index, _)| *index);
    }

    let mut slots: Vec<Option<W>> = items.into_iter().map(Some).collect();
    finished
        .into_iter()
        .filter_map(|(index, outcome)| {
            slots
                .get_mut(index)
                .and_then(Option::take)
                .map(|item| (item, outcome))
        })
        .collect()
}

/// Parses once, then pulls every requested field out of the document
struct FieldsExtractor<X> {
    inner: Arc<X>,
    fields: Vec<String>,
}

impl<X: FieldExtractor> Extractor for FieldsExtractor<X> {
    type Output = BTreeMap<String, Vec<String>>;

    fn extract(&self, response: &RawResponse) -> Result<Self::Output, ExtractionError> {
        let document = self.inner.parse(response)?;

        let values: BTreeMap<String, Vec<String>> = self
            .fields
            .iter()
            .map(|field| {
                let value = self
                    .inner
                    .extract_field(&document, field)
                    .unwrap_or_else(|e| {
                        debug!(url = %response.url, field = %field, error = %e, "Field not extracted");
                        Vec::new()
                    });
                (field.clone(), value)
            })
            .collect();

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{FixedProxy, NoProxies, Route, RoutedSession, SharedConnector};
    use crate::fetch::{JsonExtractor, RetryPolicy, Session, TextExtractor};

    fn runner(session: Arc<dyn Session>, proxies: Arc<dyn ProxySource>, options: BatchOptions) -> BatchRunner {
        let fetcher = Fetcher::new(
            proxies,
            RetryPolicy {
                max_attempts: 3,
                ..RetryPolicy::default()
            },
        );
        BatchRunner::new(Arc::new(fetcher), Arc::new(SharedConnector(session)), options)
    }

    fn url(item: &str) -> FetchRequest {
        FetchRequest::new(format!("http://api.test/{item}"))
    }

    #[tokio::test]
    async fn test_partial_failure() {
        let session = Arc::new(
            RoutedSession::new()
                .route("http://api.test/a", Route::ok("1"))
                .route("http://api.test/b", Route::status(500))
                .route("http://api.test/c", Route::ok("3")),
        );
        let runner = runner(session.clone(), Arc::new(FixedProxy::new("p:1")), BatchOptions::default());

        let items = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let result = runner
            .run(items, |item| url(item), Arc::new(TextExtractor::new()))
            .await;

        assert_eq!(result.len(), 3);
        let payloads: Vec<&String> = result.payloads().collect();
        assert_eq!(payloads, vec!["1", "3"]);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].item, "b");
        assert_eq!(result.failed[0].status_code, 500);
        // b retried three times, a and c once each
        assert_eq!(session.calls(), 5);
    }

    /// Panics on a body of `boom`, echoes anything else
    struct PanicsOnBoom;

    impl Extractor for PanicsOnBoom {
        type Output = String;

        fn extract(&self, response: &RawResponse) -> Result<String, ExtractionError> {
            let text = String::from_utf8_lossy(&response.body).into_owned();
            assert_ne!(text, "boom", "extractor blew up");
            Ok(text)
        }
    }

    #[tokio::test]
    async fn test_panicking_task_fails_only_its_item() {
        let session = Arc::new(
            RoutedSession::new()
                .route("http://api.test/a", Route::ok("1"))
                .route("http://api.test/b", Route::ok("boom"))
                .route("http://api.test/c", Route::ok("3")),
        );
        let runner = runner(session, Arc::new(FixedProxy::new("p:1")), BatchOptions::default());

        let result = runner
            .run(vec!["a", "b", "c"], |item| url(item), Arc::new(PanicsOnBoom))
            .await;

        let payloads: Vec<&String> = result.payloads().collect();
        assert_eq!(payloads, vec!["1", "3"]);

        let failed: Vec<&&str> = result.failed_items().collect();
        assert_eq!(failed, vec![&"b"]);
        assert_eq!(result.failed[0].status_code, -1);
        assert!(matches!(result.failed[0].error, Some(FetchError::Aborted(_))));
    }

    #[tokio::test]
    async fn test_extraction_failure_stays_with_its_item() {
        let session = Arc::new(
            RoutedSession::new()
                .route("http://api.test/a", Route::ok(r#"{"CID": 1}"#))
                .route("http://api.test/b", Route::ok("<html>"))
                .route("http://api.test/c", Route::ok(r#"{"CID": 3}"#)),
        );
        let runner = runner(session.clone(), Arc::new(FixedProxy::new("p:1")), BatchOptions::default());

        let result = runner
            .run(
                vec!["a", "b", "c"],
                |item| url(item),
                Arc::new(JsonExtractor::<serde_json::Value>::new()),
            )
            .await;

        assert_eq!(result.succeeded.len(), 2);
        assert_eq!(result.succeeded[0].payload["CID"], 1);
        assert_eq!(result.succeeded[1].payload["CID"], 3);

        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].item, "b");
        assert_eq!(result.failed[0].status_code, -2);
        assert!(matches!(result.failed[0].error, Some(FetchError::Extraction(_))));
        // b is not retried
        assert_eq!(session.calls(), 3);
    }

    #[tokio::test]
    async fn test_no_proxy_fails_every_item() {
        let session = Arc::new(RoutedSession::new().route("http://api.test/a", Route::ok("1")));
        let runner = runner(session.clone(), Arc::new(NoProxies::default()), BatchOptions::default());

        let result = runner
            .run(vec!["a", "b"], |item| url(item), Arc::new(TextExtractor::new()))
            .await;

        assert!(result.succeeded.is_empty());
        assert_eq!(result.failed.len(), 2);
        assert!(result.failed.iter().all(|f| f.status_code == -1));
        assert_eq!(session.calls(), 0);
    }

    #[tokio::test]
    async fn test_input_order_preserved() {
        let session = Arc::new(
            RoutedSession::new()
                .route("http://api.test/slow", Route::ok("slow").delayed(Duration::from_millis(80)))
                .route("http://api.test/fast", Route::ok("fast")),
        );
        let runner = runner(session, Arc::new(FixedProxy::new("p:1")), BatchOptions::default());

        let result = runner
            .run(vec!["slow", "fast"], |item| url(item), Arc::new(TextExtractor::new()))
            .await;

        let payloads: Vec<&String> = result.payloads().collect();
        assert_eq!(payloads, vec!["slow", "fast"]);
    }

    #[tokio::test]
    async fn test_completion_order_when_requested() {
        let session = Arc::new(
            RoutedSession::new()
                .route("http://api.test/slow", Route::ok("slow").delayed(Duration::from_millis(150)))
                .route("http://api.test/fast", Route::ok("fast")),
        );
        let options = BatchOptions {
            order: ResultOrder::Completion,
            ..BatchOptions::default()
        };
        let runner = runner(session, Arc::new(FixedProxy::new("p:1")), options);

        let result = runner
            .run(vec!["slow", "fast"], |item| url(item), Arc::new(TextExtractor::new()))
            .await;

        let payloads: Vec<&String> = result.payloads().collect();
        assert_eq!(payloads, vec!["fast", "slow"]);
    }

    #[tokio::test]
    async fn test_completes_once_all_fetches_terminate() {
        let mut session = RoutedSession::new();
        let names = ["a", "b", "c", "d"];
        for (i, name) in names.iter().enumerate() {
            let route = Route::ok("x").delayed(Duration::from_millis(10 * (i as u64 + 1)));
            session = session.route(&format!("http://api.test/{name}"), route);
        }
        let runner = runner(Arc::new(session), Arc::new(FixedProxy::new("p:1")), BatchOptions::default());

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            runner.run(names.to_vec(), |item| url(item), Arc::new(TextExtractor::new())),
        )
        .await
        .expect("batch should not hang");

        assert_eq!(result.succeeded.len(), 4);
    }

    #[tokio::test]
    async fn test_concurrency_cap_respected() {
        let mut session = RoutedSession::new();
        let names: Vec<String> = (0..8).map(|i| format!("item{i}")).collect();
        for name in &names {
            let route = Route::ok("x").delayed(Duration::from_millis(20));
            session = session.route(&format!("http://api.test/{name}"), route);
        }
        let session = Arc::new(session);
        let options = BatchOptions {
            max_concurrency: Some(2),
            ..BatchOptions::default()
        };
        let runner = runner(session.clone(), Arc::new(FixedProxy::new("p:1")), options);

        let result = runner
            .run(names, |item| url(item), Arc::new(TextExtractor::new()))
            .await;

        assert_eq!(result.succeeded.len(), 8);
        assert!(session.peak_in_flight() <= 2);
        assert!(session.peak_in_flight() >= 1);
    }

    #[tokio::test]
    async fn test_batch_timeout_fails_stragglers() {
        let session = Arc::new(
            RoutedSession::new()
                .route("http://api.test/fast", Route::ok("fast"))
                .route("http://api.test/stuck", Route::ok("late").delayed(Duration::from_secs(30))),
        );
        let options = BatchOptions {
            timeout: Some(Duration::from_millis(200)),
            ..BatchOptions::default()
        };
        let runner = runner(session, Arc::new(FixedProxy::new("p:1")), options);

        let started = Instant::now();
        let result = runner
            .run(vec!["fast", "stuck"], |item| url(item), Arc::new(TextExtractor::new()))
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(result.succeeded.len(), 1);
        assert_eq!(result.failed.len(), 1);
        assert_eq!(result.failed[0].item, "stuck");
        assert_eq!(result.failed[0].error, Some(FetchError::BatchTimedOut));
    }

    #[tokio::test]
    async fn test_cancellation_fails_unfinished_items() {
        let session = Arc::new(
            RoutedSession::new()
                .route("http://api.test/a", Route::ok("a").delayed(Duration::from_secs(30)))
                .route("http://api.test/b", Route::ok("b").delayed(Duration::from_secs(30))),
        );
        let runner = runner(session, Arc::new(FixedProxy::new("p:1")), BatchOptions::default());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let result = runner
            .run_cancellable(vec!["a", "b"], |item| url(item), Arc::new(TextExtractor::new()), &cancel)
            .await;

        assert!(result.succeeded.is_empty());
        assert_eq!(result.failed.len(), 2);
        assert_eq!(result.failed[0].item, "a");
        assert!(result.failed.iter().all(|f| f.error == Some(FetchError::Cancelled)));
    }

    #[tokio::test]
    async fn test_run_chunked_keeps_failed_ids() {
        let session = Arc::new(
            RoutedSession::new()
                .route("http://api.test/1,2", Route::ok("first"))
                .route("http://api.test/5", Route::ok("third")),
        );
        let runner = runner(session, Arc::new(FixedProxy::new("p:1")), BatchOptions::default());

        let result = runner
            .run_chunked(
                vec![1u64, 2, 3, 4, 5],
                2,
                |ids| {
                    let joined: Vec<String> = ids.iter().map(u64::to_string).collect();
                    url(&joined.join(","))
                },
                Arc::new(TextExtractor::new()),
            )
            .await;

        assert_eq!(result.succeeded.len(), 2);
        assert_eq!(result.succeeded[0].item, vec![1, 2]);
        assert_eq!(result.failed_ids(), vec![3, 4]);
    }

    struct LineFields;

    impl FieldExtractor for LineFields {
        type Document = Vec<(String, String)>;

        fn parse(&self, response: &RawResponse) -> Result<Self::Document, ExtractionError> {
            let text = std::str::from_utf8(&response.body)
                .map_err(|e| ExtractionError::Decode(e.to_string()))?;
            Ok(text
                .lines()
                .filter_map(|line| line.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect())
        }

        fn extract_field(
            &self,
            document: &Self::Document,
            field: &str,
        ) -> Result<Vec<String>, ExtractionError> {
            let values: Vec<String> = document
                .iter()
                .filter(|(k, _)| k == field)
                .map(|(_, v)| v.clone())
                .collect();
            if values.is_empty() {
                return Err(ExtractionError::Missing(field.to_string()));
            }
            Ok(values)
        }
    }

    #[tokio::test]
    async fn test_run_fields_fills_every_field() {
        let session = Arc::new(
            RoutedSession::new()
                .route("http://api.test/2244", Route::ok("Density=1.40 g/cm3\nOdor=Odorless"))
                .route("http://api.test/999", Route::status(404)),
        );
        let runner = runner(session, Arc::new(FixedProxy::new("p:1")), BatchOptions::default());
        let fields = vec!["Density".to_string(), "Odor".to_string(), "pH".to_string()];

        let records = runner
            .run_fields(
                vec![2244u64, 999],
                &fields,
                |cid| url(&cid.to_string()),
                Arc::new(LineFields),
            )
            .await;

        assert_eq!(records.len(), 2);

        assert_eq!(records[0].item, 2244);
        assert_eq!(records[0].status_code, 200);
        assert_eq!(records[0].fields["Density"], vec!["1.40 g/cm3"]);
        assert_eq!(records[0].fields["Odor"], vec!["Odorless"]);
        assert_eq!(records[0].fields["pH"], Vec::<String>::new());

        assert_eq!(records[1].item, 999);
        assert_eq!(records[1].status_code, 404);
        assert_eq!(records[1].fields.len(), 3);
        assert!(records[1].fields.values().all(Vec::is_empty));
    }
}
