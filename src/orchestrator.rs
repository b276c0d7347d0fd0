// src/orchestrator.rs
//! Fetch orchestrator: cache-first lookup, single-flight network calls,
//! per-call timeout, failure normalization.
//!
//! Per fingerprint at most one network call is in flight. The call runs on
//! its own task, so a caller that loses interest does not cancel it for the
//! others; everyone waiting on it receives the same outcome. No retries here:
//! a retry is the caller calling `fetch` again (see `retry`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use metrics::{counter, histogram};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, CacheState, CacheStore};
use crate::error::FetchError;
use crate::projection::{self, DomainObject};
use crate::registry::EndpointDescriptor;
use crate::request::{self, Params, RequestSpec};
use crate::transport::Transport;

type Outcome = Result<Arc<Value>, FetchError>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Freshness window; the orchestrator default when `None`.
    pub ttl: Option<Duration>,
    /// Skip the cache lookup (an in-flight call is still joined).
    pub force_refresh: bool,
    /// Per-call timeout; the orchestrator default when `None`.
    pub timeout: Option<Duration>,
    /// On failure, answer with the last good payload marked stale.
    pub serve_stale_on_error: bool,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn force_refresh(mut self) -> Self {
        self.force_refresh = true;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn serve_stale_on_error(mut self) -> Self {
        self.serve_stale_on_error = true;
        self
    }
}

/// Where an answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Served from the cache, no network call.
    Cache,
    /// This call started the network request.
    Network,
    /// Joined a request some other caller had already started.
    Joined,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub endpoint: String,
    pub fingerprint: String,
    pub origin: Origin,
    /// Set when the data is a fallback after this error.
    pub stale: Option<FetchError>,
    pub data: T,
}

impl<T> Fetched<T> {
    pub fn is_stale(&self) -> bool {
        self.stale.is_some()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Fetched<U> {
        Fetched {
            endpoint: self.endpoint,
            fingerprint: self.fingerprint,
            origin: self.origin,
            stale: self.stale,
            data: f(self.data),
        }
    }

    pub fn try_map<U, E>(self, f: impl FnOnce(T) -> Result<U, E>) -> Result<Fetched<U>, E> {
        Ok(Fetched {
            endpoint: self.endpoint,
            fingerprint: self.fingerprint,
            origin: self.origin,
            stale: self.stale,
            data: f(self.data)?,
        })
    }
}

#[derive(Clone)]
pub struct FetchOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    cache: CacheStore,
    inflight: Mutex<HashMap<String, watch::Receiver<Option<Outcome>>>>,
    default_ttl: Duration,
    default_timeout: Duration,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl FetchOrchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        cache: CacheStore,
        default_ttl: Duration,
        default_timeout: Duration,
    ) -> Self {
        crate::metrics::describe_client_metrics();
        Self {
            inner: Arc::new(Inner {
                transport,
                cache,
                inflight: Mutex::new(HashMap::new()),
                default_ttl,
                default_timeout,
            }),
        }
    }

    pub fn cache(&self) -> &CacheStore {
        &self.inner.cache
    }

    /// Number of network calls currently running.
    pub fn in_flight(&self) -> usize {
        lock(&self.inner.inflight).len()
    }

    pub fn default_ttl(&self) -> Duration {
        self.inner.default_ttl
    }

    pub async fn fetch(
        &self,
        descriptor: &EndpointDescriptor,
        params: &Params,
        options: &FetchOptions,
    ) -> Result<Fetched<DomainObject>, FetchError> {
        let spec = request::build(descriptor, params)?;
        let ttl = options.ttl.unwrap_or(self.inner.default_ttl);
        let fingerprint = spec.fingerprint.clone();

        if !options.force_refresh {
            if let Some(payload) = self.cached(&fingerprint, ttl) {
                counter!("client_cache_hits_total", "endpoint" => descriptor.name.clone())
                    .increment(1);
                debug!(endpoint = %descriptor.name, %fingerprint, "cache hit");
                return self.projected(descriptor, &fingerprint, Origin::Cache, payload, None);
            }
        }

        let (origin, outcome) = self.flight(spec, ttl, options).await;
        match outcome {
            Ok(payload) => self.projected(descriptor, &fingerprint, origin, payload, None),
            Err(err) => {
                if options.serve_stale_on_error {
                    if let Some(prev) = self.inner.cache.peek(&fingerprint).and_then(|e| e.payload) {
                        warn!(
                            endpoint = %descriptor.name, %fingerprint, error = %err,
                            "serving last good payload after failure"
                        );
                        return self.projected(
                            descriptor,
                            &fingerprint,
                            Origin::Cache,
                            prev,
                            Some(err),
                        );
                    }
                }
                Err(err)
            }
        }
    }

    /// Payload of a fresh entry; an expired Fresh entry is marked Stale.
    fn cached(&self, fingerprint: &str, ttl: Duration) -> Option<Arc<Value>> {
        let entry = self.inner.cache.get(fingerprint)?;
        if CacheStore::is_fresh(&entry, ttl) {
            return entry.payload;
        }
        if entry.state == CacheState::Fresh {
            self.inner.cache.mark_stale(fingerprint);
        }
        None
    }

    /// Join the running call for this fingerprint or start one.
    async fn flight(
        &self,
        spec: RequestSpec,
        ttl: Duration,
        options: &FetchOptions,
    ) -> (Origin, Outcome) {
        let fingerprint = spec.fingerprint.clone();
        let (origin, mut rx) = {
            let mut inflight = lock(&self.inner.inflight);
            // A dropped sender means the flight task died without reporting.
            let running = inflight
                .get(&fingerprint)
                .filter(|rx| rx.has_changed().is_ok())
                .cloned();
            match running {
                Some(rx) => (Origin::Joined, rx),
                None => {
                    // A call may have finished between the first lookup and taking the lock.
                    if !options.force_refresh {
                        if let Some(payload) = self.cached(&fingerprint, ttl) {
                            return (Origin::Cache, Ok(payload));
                        }
                    }
                    let (tx, rx) = watch::channel(None);
                    inflight.insert(fingerprint.clone(), rx.clone());

                    let previous = self.inner.cache.peek(&fingerprint);
                    self.inner.cache.put(
                        &fingerprint,
                        CacheEntry::pending(&fingerprint, &spec.endpoint, previous.as_ref()),
                    );

                    let timeout = options.timeout.unwrap_or(self.inner.default_timeout);
                    tokio::spawn(run_flight(Arc::clone(&self.inner), spec, timeout, tx));
                    (Origin::Network, rx)
                }
            }
        };

        if origin == Origin::Joined {
            counter!("client_joined_total").increment(1);
            debug!(%fingerprint, "joined in-flight request");
        }

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(value) => (*value)
                .clone()
                .unwrap_or_else(|| Err(FetchError::Network("in-flight request vanished".into()))),
            Err(_) => Err(FetchError::Network("in-flight request aborted".into())),
        };
        (origin, outcome)
    }

    fn projected(
        &self,
        descriptor: &EndpointDescriptor,
        fingerprint: &str,
        origin: Origin,
        payload: Arc<Value>,
        stale: Option<FetchError>,
    ) -> Result<Fetched<DomainObject>, FetchError> {
        let data = projection::project(descriptor, &payload).map_err(|e| {
            warn!(endpoint = %descriptor.name, %fingerprint, error = %e, "upstream schema drift");
            e
        })?;
        Ok(Fetched {
            endpoint: descriptor.name.clone(),
            fingerprint: fingerprint.to_string(),
            origin,
            stale,
            data,
        })
    }
}

async fn run_flight(
    inner: Arc<Inner>,
    spec: RequestSpec,
    timeout: Duration,
    tx: watch::Sender<Option<Outcome>>,
) {
    let fingerprint = spec.fingerprint.as_str();
    let endpoint = spec.endpoint.as_str();
    let timeout_ms = timeout.as_millis() as u64;
    let t0 = Instant::now();

    counter!("client_network_calls_total", "endpoint" => endpoint.to_string()).increment(1);
    // The only whole-call deadline; a transport-level Timeout passes through as reported.
    let result = match tokio::time::timeout(timeout, inner.transport.send(&spec)).await {
        Ok(r) => r,
        Err(_) => Err(FetchError::Timeout {
            after_ms: timeout_ms,
        }),
    };
    let elapsed_ms = t0.elapsed().as_secs_f64() * 1_000.0;
    histogram!("client_fetch_ms").record(elapsed_ms);

    let outcome = match result {
        Ok(body) => {
            let payload = Arc::new(body);
            inner
                .cache
                .put(fingerprint, CacheEntry::fresh(fingerprint, endpoint, Arc::clone(&payload)));
            info!(endpoint, fingerprint, elapsed_ms, transport = inner.transport.name(), "fetched");
            Ok(payload)
        }
        Err(err) => {
            let previous = inner.cache.peek(fingerprint);
            inner.cache.put(
                fingerprint,
                CacheEntry::failed(fingerprint, endpoint, err.clone(), previous.as_ref()),
            );
            counter!(
                "client_fetch_failures_total",
                "endpoint" => endpoint.to_string(),
                "kind" => err.kind()
            )
            .increment(1);
            warn!(endpoint, fingerprint, elapsed_ms, kind = err.kind(), error = %err, "fetch failed");
            Err(err)
        }
    };

    lock(&inner.inflight).remove(fingerprint);
    // No receivers left is fine: the cache already has the result.
    let _ = tx.send(Some(outcome));
}
