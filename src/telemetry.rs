//! Telemetry metric name constants.
//!
//! Centralised metric names for bifrost operations. Consumers install
//! their own `metrics` recorder (e.g. prometheus, statsd); without a
//! recorder installed, all metric calls are no-ops.
//!
//! These run alongside the in-process [`MetricsCollector`](crate::stats::MetricsCollector),
//! which is what [`Gateway::metrics()`](crate::Gateway::metrics) reports.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `bifrost_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `backend`: backend name (e.g. "anthropic", "degraded")
//! - `operation`: "complete" or "analyze"
//! - `status`: outcome: "ok" or "error"

/// Total requests resolved by the gateway, cache hits included.
///
/// Labels: `operation`, `status` ("ok" | "error").
pub const REQUESTS_TOTAL: &str = "bifrost_requests_total";

/// Total individual backend invocations (each retry attempt counts).
///
/// Labels: `backend`, `operation`, `status` ("ok" | "error").
pub const BACKEND_CALLS_TOTAL: &str = "bifrost_backend_calls_total";

/// Backend call duration in seconds, successful calls only.
///
/// Labels: `backend`, `operation`.
pub const REQUEST_DURATION_SECONDS: &str = "bifrost_request_duration_seconds";

/// Total retry attempts (not counting the initial request).
///
/// Labels: `backend`, `operation`.
pub const RETRIES_TOTAL: &str = "bifrost_retries_total";

/// Total activations of the degraded fallback.
///
/// Labels: `operation`.
pub const FALLBACKS_TOTAL: &str = "bifrost_fallbacks_total";

/// Total cache hits.
///
/// Labels: `operation`.
pub const CACHE_HITS_TOTAL: &str = "bifrost_cache_hits_total";

/// Total cache misses.
///
/// Labels: `operation`.
pub const CACHE_MISSES_TOTAL: &str = "bifrost_cache_misses_total";

/// Total backend liveness probes.
///
/// Labels: `backend`, `status` ("ok" | "error").
pub const HEALTH_CHECKS_TOTAL: &str = "bifrost_health_checks_total";
