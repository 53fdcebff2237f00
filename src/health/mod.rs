//! Backend health tracking.
//!
//! [`HealthMonitor`] keeps one record per backend: the outcome of the most
//! recent [`Backend::probe()`] and when it ran. Records are written only by
//! probes, which run on a fixed schedule ([`HealthMonitor::spawn_periodic()`]),
//! on demand ([`HealthMonitor::check_all()`]) and opportunistically when
//! selection runs into a stale record ([`HealthMonitor::refresh_if_stale()`]).
//!
//! A record older than the staleness window is no longer a positive signal.
//! A backend with no record at all is treated as healthy so that selection
//! works before the first probe has completed.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::backends::Backend;
use crate::telemetry;
use crate::types::ProbeReport;

/// Longest accepted probe interval.
pub const MAX_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Health monitoring configuration.
///
/// ```rust
/// # use bifrost::HealthConfig;
/// # use std::time::Duration;
/// let config = HealthConfig::new().interval(Duration::from_secs(60));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthConfig {
    /// Period of the scheduled full probe. Default: 5 minutes.
    pub interval: Duration,
    /// Maximum age of a trusted record. Default: 10 minutes.
    pub staleness: Duration,
    /// Upper bound on a single probe. Default: 30s.
    pub probe_timeout: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
            staleness: Duration::from_secs(10 * 60),
            probe_timeout: Duration::from_secs(30),
        }
    }
}

impl HealthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the probe interval, clamped to 1ms..=[`MAX_INTERVAL`].
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval.clamp(Duration::from_millis(1), MAX_INTERVAL);
        self
    }

    pub fn staleness(mut self, staleness: Duration) -> Self {
        self.staleness = staleness;
        self
    }

    pub fn probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }
}

/// Last known health of one backend.
#[derive(Debug, Clone, Copy)]
pub struct HealthRecord {
    pub healthy: bool,
    /// Monotonic time of the probe, used for staleness.
    pub checked_at: Instant,
    /// Wall-clock time of the probe, for display.
    pub checked_at_wall: SystemTime,
}

/// Tracks probe results for a fixed set of backends.
pub struct HealthMonitor {
    backends: Vec<Arc<dyn Backend>>,
    records: DashMap<String, HealthRecord>,
    /// Backends with an opportunistic re-probe in flight.
    refreshing: DashMap<String, ()>,
    config: HealthConfig,
}

impl HealthMonitor {
    /// Create a monitor for `backends`. No probe runs until asked.
    pub fn new(backends: Vec<Arc<dyn Backend>>, config: HealthConfig) -> Self {
        Self {
            backends,
            records: DashMap::new(),
            refreshing: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &HealthConfig {
        &self.config
    }

    /// Names of the monitored backends, in registration order.
    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Latest record for a backend, if it was ever probed.
    pub fn record(&self, name: &str) -> Option<HealthRecord> {
        self.records.get(name).map(|entry| *entry.value())
    }

    /// Whether selection may pick `name`.
    ///
    /// `true` when there is no record yet, or the record is healthy and no
    /// older than the staleness window.
    pub fn is_considered_healthy(&self, name: &str) -> bool {
        match self.records.get(name) {
            None => true,
            Some(record) => record.healthy && !self.is_stale(&record),
        }
    }

    /// Whether the record for `name` exists and has outlived the staleness window.
    pub fn is_record_stale(&self, name: &str) -> bool {
        self.records
            .get(name)
            .is_some_and(|record| self.is_stale(&record))
    }

    fn is_stale(&self, record: &HealthRecord) -> bool {
        record.checked_at.elapsed() > self.config.staleness
    }

    /// Store a probe outcome, logging transitions.
    pub fn record_result(&self, name: &str, healthy: bool) {
        let previous = self.records.insert(
            name.to_string(),
            HealthRecord {
                healthy,
                checked_at: Instant::now(),
                checked_at_wall: SystemTime::now(),
            },
        );
        match previous {
            Some(prev) if prev.healthy && !healthy => {
                warn!(backend = name, "backend became unhealthy");
            }
            Some(prev) if !prev.healthy && healthy => {
                info!(backend = name, "backend recovered");
            }
            None if !healthy => warn!(backend = name, "backend unhealthy on first probe"),
            _ => debug!(backend = name, healthy, "health record updated"),
        }
    }

    /// Probe every backend concurrently and record the outcomes.
    pub async fn check_all(&self) -> BTreeMap<String, ProbeReport> {
        let probes = self.backends.iter().map(|backend| async move {
            let name = backend.name().to_string();
            let report = probe_one(Arc::clone(backend), self.config.probe_timeout).await;
            self.record_result(&name, report.healthy);
            (name, report)
        });
        join_all(probes).await.into_iter().collect()
    }

    /// Start a background re-probe of `name` when its record is stale.
    ///
    /// At most one refresh per backend is in flight; callers never wait on it.
    pub fn refresh_if_stale(self: &Arc<Self>, name: &str) {
        if !self.is_record_stale(name) || self.refreshing.insert(name.to_string(), ()).is_some() {
            return;
        }
        let Some(backend) = self.backends.iter().find(|b| b.name() == name).cloned() else {
            self.refreshing.remove(name);
            return;
        };

        debug!(backend = name, "health record stale, re-probing");
        let monitor = Arc::clone(self);
        let name = name.to_string();
        tokio::spawn(async move {
            let report = probe_one(backend, monitor.config.probe_timeout).await;
            monitor.record_result(&name, report.healthy);
            monitor.refreshing.remove(&name);
        });
    }

    /// Spawn the scheduled full probe. The first round runs immediately; the
    /// task ends once `shutdown` turns `true` (or its sender is dropped).
    pub fn spawn_periodic(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        tokio::spawn(async move {
            let period = monitor
                .config
                .interval
                .clamp(Duration::from_millis(1), MAX_INTERVAL);
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                // the select output holds a watch guard, so probe outside it
                let stop = tokio::select! {
                    _ = ticker.tick() => false,
                    _ = shutdown.wait_for(|stopped| *stopped) => true,
                };
                if stop {
                    break;
                }
                let reports = monitor.check_all().await;
                let healthy = reports.values().filter(|r| r.healthy).count();
                debug!(healthy, total = reports.len(), "scheduled health check complete");
            }
            debug!("health monitor stopped");
        })
    }
}

/// Run one probe, isolated in its own task and bounded by `timeout`.
///
/// A panic or timeout counts as unhealthy.
async fn probe_one(backend: Arc<dyn Backend>, timeout: Duration) -> ProbeReport {
    let name = backend.name().to_string();
    let start = Instant::now();
    let mut task = tokio::spawn(async move { backend.probe().await });
    let healthy = match tokio::time::timeout(timeout, &mut task).await {
        Ok(Ok(healthy)) => healthy,
        Ok(Err(e)) => {
            warn!(backend = %name, error = %e, "probe panicked");
            false
        }
        Err(_) => {
            task.abort();
            warn!(backend = %name, timeout_ms = timeout.as_millis() as u64, "probe timed out");
            false
        }
    };

    metrics::counter!(telemetry::HEALTH_CHECKS_TOTAL,
        "backend" => name,
        "status" => if healthy { "ok" } else { "error" },
    )
    .increment(1);

    ProbeReport {
        healthy,
        response_time_ms: start.elapsed().as_millis() as u64,
    }
}
