use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bifrost::{
    Backend, Bifrost, BifrostError, CompletionOptions, CompletionResponse, FailureKind,
    HealthAnalysis, HealthData, Result, RetryConfig, Usage,
};

/// Mock backend that fails N times then succeeds.
struct FailThenSucceed {
    fail_count: AtomicU32,
    fail_with: fn() -> BifrostError,
    total_calls: AtomicU32,
}

impl FailThenSucceed {
    fn new(failures: u32, fail_with: fn() -> BifrostError) -> Self {
        Self {
            fail_count: AtomicU32::new(failures),
            fail_with,
            total_calls: AtomicU32::new(0),
        }
    }

    fn calls(&self) -> u32 {
        self.total_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FailThenSucceed {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn probe(&self) -> bool {
        true
    }

    async fn complete(
        &self,
        _prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<CompletionResponse> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_count.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_count.fetch_sub(1, Ordering::SeqCst);
            return Err((self.fail_with)());
        }
        Ok(CompletionResponse {
            content: "ok".into(),
            backend_used: "flaky".into(),
            model: None,
            usage: Usage::default(),
            cached: false,
            latency_ms: 0,
        })
    }

    async fn analyze(&self, _data: &HealthData) -> Result<HealthAnalysis> {
        Err(BifrostError::BackendNotInitialized {
            backend: "flaky".into(),
        })
    }
}

fn overloaded() -> BifrostError {
    BifrostError::call_failed("flaky", FailureKind::Other, "model is overloaded")
}

fn no_cache() -> CompletionOptions {
    CompletionOptions::default().use_cache(false)
}

// ============================================================================
// RetryConfig
// ============================================================================

#[test]
fn default_config_values() {
    let config = RetryConfig::default();
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.total_attempts(), 4);
    assert_eq!(
        config.delays,
        vec![
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(4)
        ]
    );
}

#[test]
fn disabled_config_makes_one_attempt() {
    assert_eq!(RetryConfig::disabled().total_attempts(), 1);
}

#[test]
fn retryable_matching_is_case_insensitive() {
    let config = RetryConfig::new();
    let err = BifrostError::call_failed("b", FailureKind::Other, "upstream: Connection Reset by peer");
    assert!(config.is_retryable(&err));
}

#[test]
fn custom_fragments_replace_defaults() {
    let config = RetryConfig::new().retryable_errors(["overloaded"]);
    assert!(config.is_retryable(&overloaded()));

    let default_match = BifrostError::call_failed("b", FailureKind::Other, "ECONNRESET");
    assert!(!config.is_retryable(&default_match));
}

// ============================================================================
// Through the gateway
// ============================================================================

#[tokio::test(start_paused = true)]
async fn custom_fragment_enables_retry() {
    let backend = Arc::new(FailThenSucceed::new(2, overloaded));
    let gateway = Bifrost::builder()
        .backend(backend.clone())
        .retry(RetryConfig::new().retryable_errors(["overloaded"]))
        .build()
        .unwrap();

    let response = gateway.complete("hi", &no_cache()).await.unwrap();

    assert_eq!(response.backend_used, "flaky");
    assert_eq!(backend.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn unmatched_message_is_not_retried() {
    let backend = Arc::new(FailThenSucceed::new(2, overloaded));
    let gateway = Bifrost::builder()
        .backend(backend.clone())
        .build()
        .unwrap();

    let response = gateway.complete("hi", &no_cache()).await.unwrap();

    assert_eq!(response.backend_used, bifrost::DEGRADED_BACKEND);
    assert_eq!(backend.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn delay_sequence_is_reused_past_its_end() {
    fn timeout() -> BifrostError {
        BifrostError::call_failed("flaky", FailureKind::Timeout, "timed out")
    }
    let backend = Arc::new(FailThenSucceed::new(3, timeout));
    let gateway = Bifrost::builder()
        .backend(backend.clone())
        .retry(
            RetryConfig::new()
                .max_retries(3)
                .delays(vec![Duration::from_millis(100)]),
        )
        .build()
        .unwrap();
    let start = tokio::time::Instant::now();

    gateway.complete("hi", &no_cache()).await.unwrap();

    assert_eq!(backend.calls(), 4);
    assert_eq!(start.elapsed(), Duration::from_millis(300));
}
