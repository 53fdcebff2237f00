//! Retry configuration, delay calculation, and the shared retry loop.
//!
//! [`RetryConfig`] decides two things: whether a failure is worth another
//! attempt, and how long to wait before it. Delay lookup is a pure function
//! of the attempt index so it can be tested without time passing; the
//! sleeping happens only in [`with_retry()`].

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, warn};

use crate::telemetry;
use crate::{BifrostError, Result};

/// Error message fragments that mark an otherwise unclassified failure as
/// transient. Matched case-insensitively.
pub const DEFAULT_RETRYABLE_ERRORS: &[&str] = &[
    "timeout",
    "timed out",
    "econnreset",
    "connection reset",
    "enotfound",
    "rate limit",
    "429",
    "500",
    "502",
    "503",
    "504",
    "server error",
];

/// Configuration for retry behaviour on transient errors.
///
/// A request makes at most `max_retries + 1` attempts against one backend.
/// The wait before retry `n` (0-indexed) is `delays[n]`; attempts beyond the
/// end of the sequence reuse its last entry.
///
/// ```rust
/// # use bifrost::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_retries(2)
///     .exponential(Duration::from_millis(200));
/// assert_eq!(config.delay_for_attempt(1), Duration::from_millis(400));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the initial attempt. 0 = no retry. Default: 3.
    pub max_retries: u32,
    /// Precomputed backoff sequence. Default: 1s, 2s, 4s.
    pub delays: Vec<Duration>,
    /// Message fragments treated as transient. Default: [`DEFAULT_RETRYABLE_ERRORS`].
    pub retryable_errors: Vec<String>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delays: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
            ],
            retryable_errors: DEFAULT_RETRYABLE_ERRORS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Set the number of retries after the initial attempt.
    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = n;
        self
    }

    /// Replace the backoff sequence.
    pub fn delays(mut self, delays: Vec<Duration>) -> Self {
        self.delays = delays;
        self
    }

    /// Replace the backoff sequence with `unit * 2^n` for every retry.
    ///
    /// Call after [`max_retries()`](Self::max_retries); the sequence length
    /// follows the retry count at the time of the call.
    pub fn exponential(mut self, unit: Duration) -> Self {
        self.delays = (0..self.max_retries.max(1))
            .map(|n| unit.saturating_mul(2u32.saturating_pow(n)))
            .collect();
        self
    }

    /// Replace the list of retryable message fragments.
    pub fn retryable_errors<I, S>(mut self, fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.retryable_errors = fragments.into_iter().map(Into::into).collect();
        self
    }

    /// Total attempts a single backend receives.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retrying after failed attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delays
            .get(attempt as usize)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Whether `err` deserves another attempt against the same backend.
    ///
    /// Only backend call failures qualify: either their [`FailureKind`](crate::FailureKind)
    /// is transient, or their message contains one of the retryable fragments.
    /// Missing credentials, parse failures and shutdown are always terminal.
    pub fn is_retryable(&self, err: &BifrostError) -> bool {
        match err {
            BifrostError::BackendCallFailed { kind, message, .. } => {
                kind.is_transient() || self.matches_retryable(message)
            }
            _ => false,
        }
    }

    fn matches_retryable(&self, message: &str) -> bool {
        let message = message.to_lowercase();
        self.retryable_errors
            .iter()
            .any(|fragment| message.contains(&fragment.to_lowercase()))
    }
}

/// Execute an async operation with retry logic.
///
/// Retries failures that [`RetryConfig::is_retryable()`] accepts, up to
/// `config.max_retries` times, sleeping [`RetryConfig::delay_for_attempt()`]
/// between attempts. Terminal errors are returned immediately. The backoff
/// sleep aborts with [`BifrostError::ShutDown`] once `shutdown` flips to
/// `true`, so the loop never outlives the gateway.
pub(crate) async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    backend: &str,
    operation: &str,
    shutdown: &watch::Receiver<bool>,
    f: F,
) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        let err = match f().await {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        if !config.is_retryable(&err) {
            debug!(backend, operation, error = %err, "terminal error, not retrying");
            return Err(err);
        }
        if attempt >= config.max_retries {
            warn!(
                backend,
                operation,
                attempts = attempt + 1,
                error = %err,
                "retries exhausted"
            );
            return Err(err);
        }

        metrics::counter!(telemetry::RETRIES_TOTAL,
            "backend" => backend.to_owned(),
            "operation" => operation.to_owned(),
        )
        .increment(1);

        let delay = config.delay_for_attempt(attempt);
        warn!(
            backend,
            operation,
            attempt = attempt + 1,
            max_attempts = config.total_attempts(),
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "retrying after transient error"
        );

        let mut shutdown = shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.wait_for(|stopped| *stopped) => return Err(BifrostError::ShutDown),
        }
        attempt += 1;
    }
}
