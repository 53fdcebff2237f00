//! Gateway - selection, retry and fallback over a set of backends
//!
//! # Request flow
//!
//! ```text
//! complete(prompt, options)
//!     │
//!     ├─ cache lookup ──── hit ───────────────────────────────► response (cached)
//!     │
//!     ▼ miss
//! select backend
//!     │  preferred (if healthy) → first healthy in order → degraded
//!     ▼
//! attempt ── transient error ── backoff ── attempt ...  (max_retries + 1 total)
//!     │
//!     ├─ success ──────────────────────────► store in cache ──► response
//!     │
//!     ▼ terminal error / retries exhausted
//! degraded backend, once
//!     │
//!     ├─ success ──────────────────────────► store in cache ──► response
//!     └─ failure ──────────────────────────► AllBackendsFailed
//! ```
//!
//! Intermediate failures never reach the caller: they are logged and counted,
//! and the caller sees either a response (check `backend_used` to spot a
//! degraded one) or a single [`BifrostError::AllBackendsFailed`].
//!
//! Identical requests in flight at the same time are not coalesced; each
//! may miss the cache and call a backend.

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use crate::backends::retry::with_retry;
use crate::backends::{Backend, RetryConfig};
use crate::cache::{CacheStats, CacheStore, CachedResponse, EntryMetadata, fingerprint};
use crate::health::HealthMonitor;
use crate::stats::{MetricsCollector, MetricsSnapshot};
use crate::telemetry;
use crate::types::{
    AnalysisOptions, AnalysisResponse, BackendStatus, CompletionOptions, CompletionResponse,
    HealthData, ProbeReport,
};
use crate::{BifrostError, Result};

const OP_COMPLETE: &str = "complete";
const OP_ANALYZE: &str = "analyze";

/// A real backend plus the retry policy applied to it.
pub(crate) struct RegisteredBackend {
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) retry: RetryConfig,
}

/// Everything [`BifrostBuilder`](crate::BifrostBuilder) hands over.
pub(crate) struct GatewayParts {
    pub(crate) backends: Vec<RegisteredBackend>,
    pub(crate) degraded: Arc<dyn Backend>,
    pub(crate) cache: CacheStore<CachedResponse>,
    pub(crate) health: HealthMonitor,
}

enum Selection<'a> {
    Backend(&'a RegisteredBackend),
    Degraded,
}

/// Output of a successful dispatch: the value and who produced it.
struct Served<T> {
    value: T,
    backend: String,
}

/// The orchestrator context object.
///
/// Owns the cache, health monitor and metrics, and the background tasks
/// that maintain them. Built by [`Bifrost::builder()`](crate::Bifrost::builder);
/// call [`start()`](Self::start) to begin scheduled health checks and cache
/// sweeps, and [`shutdown()`](Self::shutdown) to stop them.
pub struct Gateway {
    backends: Vec<RegisteredBackend>,
    by_name: HashMap<String, usize>,
    degraded: Arc<dyn Backend>,
    cache: Arc<CacheStore<CachedResponse>>,
    health: Arc<HealthMonitor>,
    stats: MetricsCollector,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Gateway {
    pub(crate) fn new(parts: GatewayParts) -> Self {
        let by_name = parts
            .backends
            .iter()
            .enumerate()
            .map(|(i, registered)| (registered.backend.name().to_string(), i))
            .collect();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Self {
            backends: parts.backends,
            by_name,
            degraded: parts.degraded,
            cache: Arc::new(parts.cache),
            health: Arc::new(parts.health),
            stats: MetricsCollector::new(),
            shutdown_tx,
            shutdown_rx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Spawn the scheduled health check and cache sweep.
    ///
    /// Idempotent; does nothing after [`shutdown()`](Self::shutdown). Must be
    /// called from within a Tokio runtime.
    pub fn start(&self) {
        if self.is_shut_down() {
            warn!("start() called after shutdown, ignoring");
            return;
        }
        let mut tasks = self.tasks.lock();
        if !tasks.is_empty() {
            return;
        }
        tasks.push(self.health.spawn_periodic(self.shutdown_rx.clone()));
        tasks.push(self.cache.spawn_sweeper(self.shutdown_rx.clone()));
        info!(backends = ?self.backend_names(), "gateway started");
    }

    /// Stop background tasks and drop cached responses.
    ///
    /// Every later call to `complete`, `analyze_health_data` or
    /// `run_health_check_now` fails immediately with [`BifrostError::ShutDown`];
    /// requests sleeping in a retry backoff are woken with the same error.
    pub fn shutdown(&self) {
        if self.shutdown_tx.send_replace(true) {
            return;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.cache.clear();
        info!("gateway shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    fn ensure_running(&self) -> Result<()> {
        if self.is_shut_down() {
            Err(BifrostError::ShutDown)
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Free-text completion.
    #[instrument(skip(self, prompt, options), fields(operation = OP_COMPLETE))]
    pub async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse> {
        self.ensure_running()?;
        let start = Instant::now();

        let key = options
            .cache_enabled()
            .then(|| fingerprint::completion(prompt, options));
        if let Some(key) = &key {
            if let Some(CachedResponse::Completion(mut hit)) = self.cache.get(key) {
                self.record_cache_hit(OP_COMPLETE);
                hit.cached = true;
                hit.latency_ms = start.elapsed().as_millis() as u64;
                return Ok(hit);
            }
            record_cache_miss(OP_COMPLETE);
        }

        let result = self
            .execute(OP_COMPLETE, options.provider.as_deref(), |backend| async move {
                backend.complete(prompt, options).await
            })
            .await;

        let served = self.resolve(OP_COMPLETE, start, result)?;
        let mut response = served.value;
        response.backend_used = served.backend;
        response.cached = false;
        response.latency_ms = start.elapsed().as_millis() as u64;

        if let Some(key) = key {
            let ttl = self.cache.config().ttl;
            self.store(key, CachedResponse::Completion(response.clone()), ttl);
        }
        Ok(response)
    }

    /// Structured analysis of health data.
    ///
    /// Runs through the same selection, retry and fallback as
    /// [`complete()`](Self::complete); cached results live for the longer
    /// [`CacheConfig::analysis_ttl`](crate::CacheConfig::analysis_ttl).
    #[instrument(skip(self, data, options), fields(operation = OP_ANALYZE))]
    pub async fn analyze_health_data(
        &self,
        data: &HealthData,
        options: &AnalysisOptions,
    ) -> Result<AnalysisResponse> {
        self.ensure_running()?;
        let start = Instant::now();

        let key = options.cache_enabled().then(|| fingerprint::analysis(data));
        if let Some(key) = &key {
            if let Some(CachedResponse::Analysis(mut hit)) = self.cache.get(key) {
                self.record_cache_hit(OP_ANALYZE);
                hit.cached = true;
                hit.latency_ms = start.elapsed().as_millis() as u64;
                return Ok(hit);
            }
            record_cache_miss(OP_ANALYZE);
        }

        let result = self
            .execute(OP_ANALYZE, options.provider.as_deref(), |backend| async move {
                backend.analyze(data).await
            })
            .await;

        let served = self.resolve(OP_ANALYZE, start, result)?;
        let response = AnalysisResponse {
            analysis: served.value,
            backend_used: served.backend,
            cached: false,
            latency_ms: start.elapsed().as_millis() as u64,
        };

        if let Some(key) = key {
            let ttl = self.cache.config().analysis_ttl;
            self.store(key, CachedResponse::Analysis(response.clone()), ttl);
        }
        Ok(response)
    }

    /// Last known state of every backend, the degraded one included.
    pub fn backend_status(&self) -> BTreeMap<String, BackendStatus> {
        let mut status: BTreeMap<String, BackendStatus> = self
            .backends
            .iter()
            .map(|registered| {
                let backend = &registered.backend;
                let record = self.health.record(backend.name());
                let entry = BackendStatus {
                    available: backend.is_initialized(),
                    healthy: record.is_some_and(|r| r.healthy),
                    last_checked_at: record.map(|r| r.checked_at_wall),
                };
                (backend.name().to_string(), entry)
            })
            .collect();

        let record = self.health.record(self.degraded.name());
        status.insert(
            self.degraded.name().to_string(),
            BackendStatus {
                available: true,
                healthy: record.is_none_or(|r| r.healthy),
                last_checked_at: record.map(|r| r.checked_at_wall),
            },
        );
        status
    }

    /// Probe every backend now and wait for the results.
    #[instrument(skip(self))]
    pub async fn run_health_check_now(&self) -> Result<BTreeMap<String, ProbeReport>> {
        self.ensure_running()?;
        Ok(self.health.check_all().await)
    }

    /// Request statistics since construction.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.stats.snapshot()
    }

    /// Drop every cached response.
    pub fn clear_cache(&self) {
        self.cache.clear();
        debug!("response cache cleared");
    }

    /// Live cache entries with their remaining TTL.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Direct access to the response cache, for diagnostics.
    pub fn cache(&self) -> &Arc<CacheStore<CachedResponse>> {
        &self.cache
    }

    /// The health monitor shared with the background probe task.
    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Real backend names in preference order, followed by the degraded one.
    pub fn backend_names(&self) -> Vec<String> {
        self.backends
            .iter()
            .map(|registered| registered.backend.name())
            .chain(std::iter::once(self.degraded.name()))
            .map(str::to_string)
            .collect()
    }

    // ========================================================================
    // Selection, retry and fallback
    // ========================================================================

    fn select(&self, preferred: Option<&str>) -> Selection<'_> {
        if let Some(name) = preferred {
            if name == self.degraded.name() {
                return Selection::Degraded;
            }
            match self.by_name.get(name) {
                Some(&i) if self.health.is_considered_healthy(name) => {
                    return Selection::Backend(&self.backends[i]);
                }
                Some(_) => {
                    self.health.refresh_if_stale(name);
                    debug!(backend = name, "preferred backend unhealthy, using preference order");
                }
                None => warn!(backend = name, "preferred backend is not registered"),
            }
        }

        for registered in &self.backends {
            let name = registered.backend.name();
            self.health.refresh_if_stale(name);
            if self.health.is_considered_healthy(name) {
                return Selection::Backend(registered);
            }
        }
        Selection::Degraded
    }

    /// Run `call` against the selected backend with retries, then against
    /// the degraded backend once if that fails.
    async fn execute<T, F, Fut>(
        &self,
        operation: &'static str,
        preferred: Option<&str>,
        call: F,
    ) -> Result<Served<T>>
    where
        F: Fn(Arc<dyn Backend>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let last_error = match self.select(preferred) {
            Selection::Backend(registered) => {
                let name = registered.backend.name();
                debug!(backend = name, operation, "selected backend");
                let attempt = || invoke(operation, Arc::clone(&registered.backend), &call);
                match with_retry(&registered.retry, name, operation, &self.shutdown_rx, attempt)
                    .await
                {
                    Ok(value) => {
                        return Ok(Served {
                            value,
                            backend: name.to_string(),
                        });
                    }
                    Err(BifrostError::ShutDown) => return Err(BifrostError::ShutDown),
                    Err(e) => {
                        warn!(backend = name, operation, error = %e, "falling back to degraded backend");
                        e
                    }
                }
            }
            Selection::Degraded => {
                debug!(operation, "no healthy backend, routing to degraded backend");
                BifrostError::NoHealthyBackend
            }
        };

        metrics::counter!(telemetry::FALLBACKS_TOTAL, "operation" => operation).increment(1);
        let degraded = self.degraded.name().to_string();
        match invoke(operation, Arc::clone(&self.degraded), &call).await {
            Ok(value) => Ok(Served {
                value,
                backend: degraded,
            }),
            Err(fallback_error) => {
                error!(
                    operation,
                    last_error = %last_error,
                    fallback_error = %fallback_error,
                    "degraded backend failed"
                );
                Err(BifrostError::AllBackendsFailed {
                    last_error: Box::new(last_error),
                    fallback_error: Box::new(fallback_error),
                })
            }
        }
    }

    /// Account for a resolved (non-cached) request.
    fn resolve<T>(
        &self,
        operation: &'static str,
        start: Instant,
        result: Result<Served<T>>,
    ) -> Result<Served<T>> {
        match &result {
            Ok(served) => {
                self.stats.record_success(&served.backend, start.elapsed());
                record_request(operation, true);
            }
            Err(_) => {
                self.stats.record_failure();
                record_request(operation, false);
            }
        }
        result
    }

    fn record_cache_hit(&self, operation: &'static str) {
        self.stats.record_cache_hit();
        metrics::counter!(telemetry::CACHE_HITS_TOTAL, "operation" => operation).increment(1);
        record_request(operation, true);
    }

    fn store(&self, key: String, value: CachedResponse, ttl: Duration) {
        let metadata = EntryMetadata {
            operation: Some(value.operation().to_string()),
            backend: Some(value.backend_used().to_string()),
        };
        self.cache.insert(key, value, Some(ttl), metadata);
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send_replace(true);
        for task in self.tasks.get_mut().drain(..) {
            task.abort();
        }
    }
}

/// One backend call, with per-call telemetry.
async fn invoke<T, F, Fut>(operation: &'static str, backend: Arc<dyn Backend>, call: &F) -> Result<T>
where
    F: Fn(Arc<dyn Backend>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let name = backend.name().to_string();
    let start = Instant::now();
    let result = call(backend).await;
    let status = if result.is_ok() { "ok" } else { "error" };

    metrics::counter!(telemetry::BACKEND_CALLS_TOTAL,
        "backend" => name.clone(),
        "operation" => operation,
        "status" => status,
    )
    .increment(1);
    if result.is_ok() {
        metrics::histogram!(telemetry::REQUEST_DURATION_SECONDS,
            "backend" => name,
            "operation" => operation,
        )
        .record(start.elapsed().as_secs_f64());
    }
    result
}

fn record_request(operation: &'static str, ok: bool) {
    metrics::counter!(telemetry::REQUESTS_TOTAL,
        "operation" => operation,
        "status" => if ok { "ok" } else { "error" },
    )
    .increment(1);
}

fn record_cache_miss(operation: &'static str) {
    metrics::counter!(telemetry::CACHE_MISSES_TOTAL, "operation" => operation).increment(1);
}
