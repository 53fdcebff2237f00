//! Builder for configuring gateway instances

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, warn};

use super::orchestrator::{Gateway, GatewayParts, RegisteredBackend};
use crate::backends::{Backend, DegradedBackend, RetryConfig};
use crate::cache::{CacheConfig, CacheStore};
#[cfg(any(feature = "anthropic", feature = "openai"))]
use crate::config::BackendConfig;
use crate::config::Config;
use crate::health::{HealthConfig, HealthMonitor};
use crate::{BifrostError, Result};

/// Main entry point for creating gateway instances.
pub struct Bifrost;

impl Bifrost {
    /// Create a new builder for configuring the gateway.
    pub fn builder() -> BifrostBuilder {
        BifrostBuilder::new()
    }

    /// Build a gateway from a loaded [`Config`].
    pub fn from_config(config: &Config) -> Result<Gateway> {
        Self::builder().config(config).build()
    }
}

/// Where a backend's retry policy comes from.
enum RetryPolicy {
    /// The builder-wide [`RetryConfig`].
    Global,
    Fixed(RetryConfig),
    /// The builder-wide policy with per-backend overrides from config.
    #[cfg(any(feature = "anthropic", feature = "openai"))]
    Overrides(BackendConfig),
}

/// Builder for configuring gateway instances.
///
/// Real backends are tried in the order they are added. A
/// [`DegradedBackend`] is always present as the last resort.
pub struct BifrostBuilder {
    backends: Vec<(Arc<dyn Backend>, RetryPolicy)>,
    degraded: Option<Arc<dyn Backend>>,
    retry: RetryConfig,
    cache: CacheConfig,
    health: HealthConfig,
}

impl BifrostBuilder {
    pub fn new() -> Self {
        Self {
            backends: Vec::new(),
            degraded: None,
            retry: RetryConfig::default(),
            cache: CacheConfig::default(),
            health: HealthConfig::default(),
        }
    }

    /// Add a backend, retried with the builder-wide policy.
    pub fn backend(mut self, backend: Arc<dyn Backend>) -> Self {
        self.backends.push((backend, RetryPolicy::Global));
        self
    }

    /// Add a backend with its own retry policy.
    pub fn backend_with_retry(mut self, backend: Arc<dyn Backend>, retry: RetryConfig) -> Self {
        self.backends.push((backend, RetryPolicy::Fixed(retry)));
        self
    }

    /// Configure the Anthropic backend.
    ///
    /// Without a resolvable API key the backend is still registered but
    /// never probes healthy.
    #[cfg(feature = "anthropic")]
    pub fn anthropic(mut self, config: BackendConfig) -> Self {
        let backend = Arc::new(crate::backends::AnthropicBackend::new(&config));
        self.backends.push((backend, RetryPolicy::Overrides(config)));
        self
    }

    /// Configure the OpenAI backend.
    #[cfg(feature = "openai")]
    pub fn openai(mut self, config: BackendConfig) -> Self {
        let backend = Arc::new(crate::backends::OpenAiBackend::new(&config));
        self.backends.push((backend, RetryPolicy::Overrides(config)));
        self
    }

    /// Replace the built-in degraded backend.
    ///
    /// The replacement should uphold the same contract: local, deterministic,
    /// and never failing.
    pub fn degraded(mut self, backend: Arc<dyn Backend>) -> Self {
        self.degraded = Some(backend);
        self
    }

    /// Set the default retry policy.
    pub fn retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    /// Set the response cache configuration.
    pub fn cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }

    /// Set the health monitoring configuration.
    pub fn health(mut self, config: HealthConfig) -> Self {
        self.health = config;
        self
    }

    /// Apply a loaded [`Config`]: policies plus every HTTP backend in
    /// `backends.order` (default: anthropic, then openai).
    ///
    /// A backend without a config section is still registered, reading its
    /// key from the default environment variable.
    pub fn config(mut self, config: &Config) -> Self {
        self = self
            .retry(config.retry.to_retry_config())
            .cache(config.cache.to_cache_config())
            .health(config.health.to_health_config());

        let order: Vec<&str> = if config.backends.order.is_empty() {
            vec!["anthropic", "openai"]
        } else {
            config.backends.order.iter().map(String::as_str).collect()
        };

        for name in order {
            match name {
                #[cfg(feature = "anthropic")]
                "anthropic" => {
                    let section = config.backends.anthropic.clone().unwrap_or_default();
                    self = self.anthropic(section);
                }
                #[cfg(feature = "openai")]
                "openai" => {
                    let section = config.backends.openai.clone().unwrap_or_default();
                    self = self.openai(section);
                }
                other => warn!(backend = other, "backend not compiled in, skipping"),
            }
        }
        self
    }

    /// Build the gateway.
    ///
    /// Fails when two backends share a name.
    pub fn build(self) -> Result<Gateway> {
        let degraded = self
            .degraded
            .unwrap_or_else(|| Arc::new(DegradedBackend::new()));

        let mut seen = HashSet::new();
        for name in self
            .backends
            .iter()
            .map(|(backend, _)| backend.name())
            .chain(std::iter::once(degraded.name()))
        {
            if !seen.insert(name.to_string()) {
                return Err(BifrostError::Configuration(format!(
                    "duplicate backend name '{name}'"
                )));
            }
        }

        let backends: Vec<RegisteredBackend> = self
            .backends
            .into_iter()
            .map(|(backend, policy)| {
                let retry = match policy {
                    RetryPolicy::Global => self.retry.clone(),
                    RetryPolicy::Fixed(retry) => retry,
                    #[cfg(any(feature = "anthropic", feature = "openai"))]
                    RetryPolicy::Overrides(config) => config
                        .retry_override(&self.retry)
                        .unwrap_or_else(|| self.retry.clone()),
                };
                RegisteredBackend { backend, retry }
            })
            .collect();

        if backends.is_empty() {
            debug!("no real backends configured, serving from degraded backend only");
        }

        let monitored = backends
            .iter()
            .map(|registered| Arc::clone(&registered.backend))
            .chain(std::iter::once(Arc::clone(&degraded)))
            .collect();

        Ok(Gateway::new(GatewayParts {
            backends,
            degraded,
            cache: CacheStore::new(self.cache),
            health: HealthMonitor::new(monitored, self.health),
        }))
    }
}

impl Default for BifrostBuilder {
    fn default() -> Self {
        Self::new()
    }
}
