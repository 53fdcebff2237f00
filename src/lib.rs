//! Bifrost - resilient completion gateway
//!
//! This crate puts one `complete` / `analyze_health_data` interface in front
//! of several interchangeable, independently fallible text-generation
//! backends. Each request is routed to a healthy backend, transient
//! failures are retried with backoff, and when the real backends are
//! exhausted a local [`DegradedBackend`] answers instead. Responses are
//! cached by request fingerprint and every request is counted.
//!
//! # Example
//!
//! ```rust,no_run
//! use bifrost::{Bifrost, BackendConfig, CompletionOptions};
//!
//! #[tokio::main]
//! async fn main() -> bifrost::Result<()> {
//!     let gateway = Bifrost::builder()
//!         .anthropic(BackendConfig::new().api_key("sk-ant-your-key"))
//!         .openai(BackendConfig::new().api_key_env("MY_OPENAI_KEY"))
//!         .build()?;
//!     gateway.start();
//!
//!     let response = gateway
//!         .complete(
//!             "Summarise the attached lab results.",
//!             &CompletionOptions::default().temperature(0.2),
//!         )
//!         .await?;
//!
//!     println!("[{}] {}", response.backend_used, response.content);
//!     gateway.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! # Custom backends
//!
//! Anything implementing [`Backend`] can be registered with
//! [`BifrostBuilder::backend()`]; backends are tried in registration order.

pub mod backends;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod health;
pub mod stats;
pub mod telemetry;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use backends::{Backend, DEGRADED_BACKEND, DegradedBackend, RetryConfig};
pub use cache::{CacheConfig, CacheStats, CacheStore, CachedResponse};
pub use config::{BackendConfig, Config};
pub use error::{BifrostError, FailureKind, Result};
pub use gateway::{Bifrost, BifrostBuilder, Gateway};
pub use health::{HealthConfig, HealthMonitor};
pub use stats::{MetricsCollector, MetricsSnapshot};
pub use version::PKG_VERSION;

#[cfg(feature = "anthropic")]
pub use backends::AnthropicBackend;
#[cfg(feature = "openai")]
pub use backends::OpenAiBackend;

// Re-export all types
pub use types::{
    AnalysisOptions, AnalysisResponse, BackendStatus, CompletionOptions, CompletionResponse,
    Finding, HealthAnalysis, HealthData, Priority, ProbeReport, Recommendation, RiskFactor,
    RiskLevel, Severity, Usage,
};
