//! The capability set every backend implements.
//!
//! Backends are opaque to the gateway: it only ever talks to them through
//! [`Backend`] and tells them apart by [`Backend::name()`]. Concrete types are
//! registered in the gateway's lookup table and never branched on.
//!
//! # Failure contract
//!
//! - `probe()` reports liveness as a plain `bool`. Operational problems
//!   (missing key, unreachable host) are `false`, not errors.
//! - `complete()` / `analyze()` return classified [`BifrostError`](crate::BifrostError)s
//!   so the gateway can decide between retry and fallback:
//!   `BackendCallFailed` with a transient kind is retried, everything else
//!   moves straight to the degraded backend.
//!
//! # Example
//!
//! ```ignore
//! async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<CompletionResponse> {
//!     let Some(key) = &self.api_key else {
//!         return Err(BifrostError::BackendNotInitialized { backend: self.name().into() });
//!     };
//!     // ... call the remote API
//! }
//! ```

use async_trait::async_trait;

use crate::Result;
use crate::types::{CompletionOptions, CompletionResponse, HealthAnalysis, HealthData};

/// A remote (or local) text-generation backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend identity, unique within a gateway.
    fn name(&self) -> &str;

    /// Whether the backend has what it needs (credentials, client) to serve.
    ///
    /// An uninitialized backend is still registered; it just never probes healthy.
    fn is_initialized(&self) -> bool {
        true
    }

    /// Lightweight liveness check. Must not panic under normal conditions.
    async fn probe(&self) -> bool;

    /// Free-text completion.
    async fn complete(&self, prompt: &str, options: &CompletionOptions)
    -> Result<CompletionResponse>;

    /// Structured analysis of health data.
    async fn analyze(&self, data: &HealthData) -> Result<HealthAnalysis>;
}
