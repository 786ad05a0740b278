//! In-memory proxy sources and sessions for unit tests

use super::http::{Connector, FetchRequest, RawResponse, Session, TransportError};
use crate::proxy::{ProxyHandle, ProxySource};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Never has a proxy
#[derive(Debug, Default)]
pub struct NoProxies {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ProxySource for NoProxies {
    async fn acquire(&self) -> Option<ProxyHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        None
    }
}

/// Always hands out the same proxy
#[derive(Debug)]
pub struct FixedProxy(ProxyHandle);

impl FixedProxy {
    pub fn new(address: &str) -> Self {
        Self(ProxyHandle::new(address))
    }
}

#[async_trait]
impl ProxySource for FixedProxy {
    async fn acquire(&self) -> Option<ProxyHandle> {
        Some(self.0.clone())
    }
}

/// Hands out a fixed sequence of answers, then nothing
#[derive(Debug)]
pub struct SequenceProxies(Mutex<VecDeque<Option<ProxyHandle>>>);

impl SequenceProxies {
    pub fn new(answers: Vec<Option<&str>>) -> Self {
        Self(Mutex::new(
            answers.into_iter().map(|a| a.map(ProxyHandle::new)).collect(),
        ))
    }
}

#[async_trait]
impl ProxySource for SequenceProxies {
    async fn acquire(&self) -> Option<ProxyHandle> {
        self.0.lock().unwrap().pop_front().flatten()
    }
}

/// Replays scripted replies in order, repeating the fallback afterwards
pub struct ScriptedSession {
    script: Mutex<VecDeque<Result<RawResponse, TransportError>>>,
    fallback: Result<RawResponse, TransportError>,
    calls: AtomicUsize,
}

impl ScriptedSession {
    pub fn new(script: Vec<Result<RawResponse, TransportError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Err(TransportError::Request("script exhausted".to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn always(response: RawResponse) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: Ok(response),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for ScriptedSession {
    async fn get(
        &self,
        _request: &FetchRequest,
        _proxy: &ProxyHandle,
    ) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

/// Canned reply for one URL
#[derive(Debug, Clone)]
pub struct Route {
    pub status: u16,
    pub body: &'static str,
    pub delay: Duration,
}

impl Route {
    pub fn ok(body: &'static str) -> Self {
        Self {
            status: 200,
            body,
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: "",
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// Answers by URL, tracking how many requests are in flight at once
///
/// Unknown URLs get a 404.
#[derive(Default)]
pub struct RoutedSession {
    routes: HashMap<String, Route>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl RoutedSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, route: Route) -> Self {
        self.routes.insert(url.to_string(), route);
        self
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Session for RoutedSession {
    async fn get(
        &self,
        request: &FetchRequest,
        _proxy: &ProxyHandle,
    ) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let route = self
            .routes
            .get(&request.url)
            .cloned()
            .unwrap_or_else(|| Route::status(404));
        if !route.delay.is_zero() {
            tokio::time::sleep(route.delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(RawResponse::new(request.url.clone(), route.status, route.body))
    }
}

/// Connector handing every batch the same shared session
pub struct SharedConnector(pub Arc<dyn Session>);

impl Connector for SharedConnector {
    fn open(&self) -> Arc<dyn Session> {
        Arc::clone(&self.0)
    }
}
