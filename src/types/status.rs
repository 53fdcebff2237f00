//! Backend status and probe report types

use std::time::SystemTime;

use serde::Serialize;

/// Point-in-time view of one backend, as returned by
/// [`Gateway::backend_status`](crate::Gateway::backend_status).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    /// Registered with the gateway.
    pub available: bool,
    /// Result of the most recent probe; `false` before the first probe.
    pub healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_checked_at: Option<SystemTime>,
}

/// Outcome of a single on-demand probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeReport {
    pub healthy: bool,
    pub response_time_ms: u64,
}
