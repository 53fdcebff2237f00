//! Bifrost error types

use std::fmt;

/// Coarse classification of a failed backend call.
///
/// Used to decide whether the call is worth retrying. Adapters map
/// transport errors and HTTP status codes onto these kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Request exceeded the backend timeout.
    Timeout,
    /// Connection refused or reset mid-flight.
    Connection,
    /// DNS resolution failed for the backend host.
    HostNotFound,
    /// Backend asked us to slow down (HTTP 429).
    RateLimited,
    /// Backend-side 5xx.
    Server,
    /// Credentials rejected (HTTP 401/403).
    Authentication,
    /// Request rejected as malformed (other 4xx).
    InvalidRequest,
    /// Anything else.
    Other,
}

impl FailureKind {
    /// Whether this kind of failure is expected to clear up on its own.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::Timeout | Self::Connection | Self::HostNotFound | Self::RateLimited | Self::Server
        )
    }

    /// Map an HTTP status code to a failure kind.
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Authentication,
            408 => Self::Timeout,
            429 => Self::RateLimited,
            500..=599 => Self::Server,
            400..=499 => Self::InvalidRequest,
            _ => Self::Other,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection reset",
            Self::HostNotFound => "host not found",
            Self::RateLimited => "rate limit",
            Self::Server => "server error",
            Self::Authentication => "authentication",
            Self::InvalidRequest => "invalid request",
            Self::Other => "error",
        };
        f.write_str(s)
    }
}

/// Bifrost error types
#[derive(Debug, thiserror::Error)]
pub enum BifrostError {
    // Backend errors
    /// Backend is missing credentials or required configuration.
    #[error("backend '{backend}' is not initialized: missing credentials or configuration")]
    BackendNotInitialized { backend: String },

    #[error("backend '{backend}' call failed ({kind}): {message}")]
    BackendCallFailed {
        backend: String,
        kind: FailureKind,
        message: String,
    },

    /// Backend replied, but the reply could not be shaped into an analysis.
    #[error("backend '{backend}' returned an unparseable analysis: {message}")]
    AnalysisParseFailed { backend: String, message: String },

    // Routing errors
    /// No real backend is currently considered healthy.
    ///
    /// Internal routing signal: the gateway answers it by going straight
    /// to the degraded backend and never returns it to callers.
    #[error("no healthy backend available")]
    NoHealthyBackend,

    #[error("all backends failed: last error: {last_error}; fallback error: {fallback_error}")]
    AllBackendsFailed {
        last_error: Box<BifrostError>,
        fallback_error: Box<BifrostError>,
    },

    // Lifecycle errors
    #[error("gateway has been shut down")]
    ShutDown,

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BifrostError {
    /// Build a [`BifrostError::BackendCallFailed`].
    pub fn call_failed(
        backend: impl Into<String>,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self::BackendCallFailed {
            backend: backend.into(),
            kind,
            message: message.into(),
        }
    }

    /// Whether the error is explicitly tagged as transient.
    ///
    /// Only [`BackendCallFailed`](Self::BackendCallFailed) with a transient
    /// [`FailureKind`] qualifies. Message-based matching lives in
    /// [`RetryConfig::is_retryable`](crate::RetryConfig::is_retryable).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::BackendCallFailed { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }

    /// Name of the backend the error originated from, if any.
    pub fn backend(&self) -> Option<&str> {
        match self {
            Self::BackendNotInitialized { backend }
            | Self::BackendCallFailed { backend, .. }
            | Self::AnalysisParseFailed { backend, .. } => Some(backend),
            _ => None,
        }
    }
}

/// Result type alias for Bifrost operations
pub type Result<T> = std::result::Result<T, BifrostError>;
