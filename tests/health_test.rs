//! Tests for [`HealthMonitor`]: probe recording, staleness and scheduling.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use bifrost::health::MAX_INTERVAL;
use bifrost::{
    Backend, BifrostError, CompletionOptions, CompletionResponse, HealthAnalysis, HealthConfig,
    HealthData, HealthMonitor, Result,
};

// ============================================================================
// Mock backends
// ============================================================================

#[derive(Clone, Copy)]
enum ProbeBehaviour {
    Report,
    Panic,
    Hang,
}

struct ProbeBackend {
    name: &'static str,
    healthy: AtomicBool,
    behaviour: ProbeBehaviour,
    probes: AtomicU32,
}

impl ProbeBackend {
    fn new(name: &'static str, healthy: bool) -> Arc<Self> {
        Self::with_behaviour(name, healthy, ProbeBehaviour::Report)
    }

    fn with_behaviour(name: &'static str, healthy: bool, behaviour: ProbeBehaviour) -> Arc<Self> {
        Arc::new(Self {
            name,
            healthy: AtomicBool::new(healthy),
            behaviour,
            probes: AtomicU32::new(0),
        })
    }

    fn probe_count(&self) -> u32 {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for ProbeBackend {
    fn name(&self) -> &str {
        self.name
    }

    async fn probe(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            ProbeBehaviour::Report => self.healthy.load(Ordering::SeqCst),
            ProbeBehaviour::Panic => panic!("probe exploded"),
            ProbeBehaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                true
            }
        }
    }

    async fn complete(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<CompletionResponse> {
        Err(BifrostError::BackendNotInitialized {
            backend: self.name.into(),
        })
    }

    async fn analyze(&self, _data: &HealthData) -> Result<HealthAnalysis> {
        Err(BifrostError::BackendNotInitialized {
            backend: self.name.into(),
        })
    }
}

fn monitor(backends: Vec<Arc<ProbeBackend>>, config: HealthConfig) -> Arc<HealthMonitor> {
    let backends = backends
        .into_iter()
        .map(|b| b as Arc<dyn Backend>)
        .collect();
    Arc::new(HealthMonitor::new(backends, config))
}

// ============================================================================
// Records
// ============================================================================

#[tokio::test]
async fn unprobed_backend_is_considered_healthy() {
    let health = monitor(vec![ProbeBackend::new("a", false)], HealthConfig::default());

    assert!(health.record("a").is_none());
    assert!(health.is_considered_healthy("a"));
    assert!(!health.is_record_stale("a"));
}

#[tokio::test]
async fn check_all_records_every_backend() {
    let health = monitor(
        vec![ProbeBackend::new("a", true), ProbeBackend::new("b", false)],
        HealthConfig::default(),
    );

    let reports = health.check_all().await;

    assert_eq!(reports.len(), 2);
    assert!(reports["a"].healthy);
    assert!(!reports["b"].healthy);
    assert!(health.is_considered_healthy("a"));
    assert!(!health.is_considered_healthy("b"));
    assert!(health.record("b").is_some());
}

#[tokio::test(start_paused = true)]
async fn healthy_record_goes_stale() {
    let health = monitor(vec![ProbeBackend::new("a", true)], HealthConfig::default());
    health.check_all().await;

    tokio::time::advance(Duration::from_secs(9 * 60)).await;
    assert!(health.is_considered_healthy("a"));

    tokio::time::advance(Duration::from_secs(2 * 60)).await;
    assert!(health.is_record_stale("a"));
    assert!(!health.is_considered_healthy("a"));
}

#[tokio::test]
async fn record_result_overwrites_previous() {
    let health = monitor(vec![ProbeBackend::new("a", true)], HealthConfig::default());

    health.record_result("a", true);
    health.record_result("a", false);

    assert!(!health.record("a").unwrap().healthy);
}

// ============================================================================
// Probe isolation
// ============================================================================

#[tokio::test]
async fn panicking_probe_counts_as_unhealthy() {
    let health = monitor(
        vec![
            ProbeBackend::with_behaviour("boom", true, ProbeBehaviour::Panic),
            ProbeBackend::new("fine", true),
        ],
        HealthConfig::default(),
    );

    let reports = health.check_all().await;

    assert!(!reports["boom"].healthy);
    assert!(reports["fine"].healthy);
}

#[tokio::test(start_paused = true)]
async fn hanging_probe_times_out_as_unhealthy() {
    let health = monitor(
        vec![ProbeBackend::with_behaviour("slow", true, ProbeBehaviour::Hang)],
        HealthConfig::new().probe_timeout(Duration::from_secs(5)),
    );
    let start = tokio::time::Instant::now();

    let reports = health.check_all().await;

    assert!(!reports["slow"].healthy);
    assert_eq!(start.elapsed(), Duration::from_secs(5));
}

// ============================================================================
// Refresh and scheduling
// ============================================================================

#[tokio::test(start_paused = true)]
async fn stale_record_triggers_single_refresh() {
    let backend = ProbeBackend::new("a", true);
    let health = monitor(vec![backend.clone()], HealthConfig::default());
    health.check_all().await;
    assert_eq!(backend.probe_count(), 1);

    // fresh record: nothing to do
    health.refresh_if_stale("a");
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(backend.probe_count(), 1);

    tokio::time::advance(Duration::from_secs(11 * 60)).await;
    health.refresh_if_stale("a");
    health.refresh_if_stale("a");
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert_eq!(backend.probe_count(), 2);
    assert!(health.is_considered_healthy("a"));
}

#[tokio::test(start_paused = true)]
async fn periodic_probe_runs_immediately_then_on_interval() {
    let backend = ProbeBackend::new("a", true);
    let health = monitor(
        vec![backend.clone()],
        HealthConfig::new().interval(Duration::from_secs(60)),
    );
    let (tx, rx) = watch::channel(false);
    let handle = health.spawn_periodic(rx);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(backend.probe_count(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(backend.probe_count(), 2);

    tx.send(true).unwrap();
    handle.await.unwrap();

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(backend.probe_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn periodic_probe_tracks_recovery() {
    let backend = ProbeBackend::new("a", false);
    let health = monitor(
        vec![backend.clone()],
        HealthConfig::new().interval(Duration::from_secs(30)),
    );
    let (tx, rx) = watch::channel(false);
    let handle = health.spawn_periodic(rx);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert!(!health.is_considered_healthy("a"));

    backend.healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(health.is_considered_healthy("a"));

    tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn periodic_probe_runs_on_worker_threads() {
    let backend = ProbeBackend::new("a", true);
    let health = monitor(
        vec![backend.clone()],
        HealthConfig::new().interval(Duration::from_millis(20)),
    );
    let (tx, rx) = watch::channel(false);
    let handle = health.spawn_periodic(rx);

    while backend.probe_count() < 3 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    assert!(health.is_considered_healthy("a"));

    tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn oversized_interval_is_capped() {
    let config = HealthConfig::new().interval(Duration::MAX);
    assert_eq!(config.interval, MAX_INTERVAL);

    let backend = ProbeBackend::new("a", true);
    let health = monitor(vec![backend.clone()], config);
    let (tx, rx) = watch::channel(false);
    let handle = health.spawn_periodic(rx);

    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(backend.probe_count(), 1);

    tx.send(true).unwrap();
    handle.await.unwrap();
}
