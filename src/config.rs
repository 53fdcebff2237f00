//! Configuration loading.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. explicit path (e.g. `--config <path>`)
//! 2. `~/.bifrost/config.toml` (user)
//! 3. `/etc/bifrost/config.toml` (system)
//!
//! Credentials are never required in the file: each backend section may name
//! an environment variable instead, and a backend without any credential is
//! still registered (it just reports itself unhealthy).
//!
//! ```toml
//! [retry]
//! max_retries = 2
//! delays_ms = [500, 1000]
//!
//! [cache]
//! ttl_secs = 600
//!
//! [backends]
//! order = ["openai", "anthropic"]
//!
//! [backends.anthropic]
//! default_model = "claude-3-5-sonnet-20241022"
//! timeout_secs = 60
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::backends::retry::DEFAULT_RETRYABLE_ERRORS;
use crate::cache::{CacheConfig, MAX_SWEEP_INTERVAL, MAX_TTL};
use crate::health::{HealthConfig, MAX_INTERVAL};
use crate::{BifrostError, Result, RetryConfig};

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub health: HealthSettings,
    #[serde(default)]
    pub backends: BackendsConfig,
}

/// `[retry]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_delays_ms")]
    pub delays_ms: Vec<u64>,
    #[serde(default = "default_retryable_errors")]
    pub retryable_errors: Vec<String>,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            delays_ms: default_delays_ms(),
            retryable_errors: default_retryable_errors(),
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_retries(self.max_retries)
            .delays(self.delays_ms.iter().copied().map(Duration::from_millis).collect())
            .retryable_errors(self.retryable_errors.iter().cloned())
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_delays_ms() -> Vec<u64> {
    vec![1_000, 2_000, 4_000]
}

fn default_retryable_errors() -> Vec<String> {
    DEFAULT_RETRYABLE_ERRORS
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

/// `[cache]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    /// TTL for completions (default: 3600).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
    /// TTL for structured analyses (default: 7200).
    #[serde(default = "default_analysis_ttl_secs")]
    pub analysis_ttl_secs: u64,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    /// Occupancy eviction shrinks the cache to, as a fraction of `max_entries`.
    #[serde(default = "default_target_occupancy")]
    pub target_occupancy: f64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            analysis_ttl_secs: default_analysis_ttl_secs(),
            max_entries: default_max_entries(),
            target_occupancy: default_target_occupancy(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl CacheSettings {
    pub fn to_cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .ttl(Duration::from_secs(self.ttl_secs))
            .analysis_ttl(Duration::from_secs(self.analysis_ttl_secs))
            .max_entries(self.max_entries)
            .target_occupancy(self.target_occupancy)
            .sweep_interval(Duration::from_secs(self.sweep_interval_secs))
    }
}

fn default_ttl_secs() -> u64 {
    3_600
}

fn default_analysis_ttl_secs() -> u64 {
    7_200
}

fn default_max_entries() -> usize {
    1_000
}

fn default_target_occupancy() -> f64 {
    0.8
}

fn default_sweep_interval_secs() -> u64 {
    60
}

/// `[health]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            staleness_secs: default_staleness_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl HealthSettings {
    pub fn to_health_config(&self) -> HealthConfig {
        HealthConfig::new()
            .interval(Duration::from_secs(self.interval_secs))
            .staleness(Duration::from_secs(self.staleness_secs))
            .probe_timeout(Duration::from_secs(self.probe_timeout_secs))
    }
}

fn default_interval_secs() -> u64 {
    300
}

fn default_staleness_secs() -> u64 {
    600
}

fn default_probe_timeout_secs() -> u64 {
    30
}

/// `[backends]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BackendsConfig {
    /// Preference order by backend name. Empty = anthropic, then openai.
    #[serde(default)]
    pub order: Vec<String>,
    #[serde(default)]
    pub anthropic: Option<BackendConfig>,
    #[serde(default)]
    pub openai: Option<BackendConfig>,
}

/// Per-backend configuration, shared by all HTTP backends.
#[derive(Clone, Deserialize)]
pub struct BackendConfig {
    /// Inline API key. Prefer `api_key_env` outside of tests.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    /// Override the API base URL (proxies, tests).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Per-request timeout in seconds (default: 30).
    #[serde(default = "default_backend_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub default_model: Option<String>,
    /// Overrides the global `[retry] max_retries` for this backend.
    #[serde(default)]
    pub max_retries: Option<u32>,
    /// Overrides the global backoff with `retry_delay_ms * 2^n`.
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
}

fn default_backend_timeout_secs() -> u64 {
    30
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: None,
            base_url: None,
            timeout_secs: default_backend_timeout_secs(),
            default_model: None,
            max_retries: None,
            retry_delay_ms: None,
        }
    }
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("api_key_env", &self.api_key_env)
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("default_model", &self.default_model)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_ms", &self.retry_delay_ms)
            .finish()
    }
}

impl BackendConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn api_key_env(mut self, var: impl Into<String>) -> Self {
        self.api_key_env = Some(var.into());
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout. Stored in whole seconds: sub-second parts
    /// round up, so the effective timeout is never shorter than asked.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = u64::try_from(timeout.as_millis().div_ceil(1_000))
            .unwrap_or(u64::MAX)
            .max(1);
        self
    }

    pub fn default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    pub fn retry_delay(mut self, unit: Duration) -> Self {
        self.retry_delay_ms = Some(u64::try_from(unit.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Request timeout as a [`Duration`].
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve the API key: inline key first, then the environment variable
    /// (`api_key_env`, or `default_env` when unset). Empty values count as
    /// missing.
    pub fn resolve_api_key(&self, default_env: &str) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                let var = self.api_key_env.as_deref().unwrap_or(default_env);
                std::env::var(var).ok().filter(|key| !key.trim().is_empty())
            })
    }

    /// Per-backend retry policy, if this section overrides the global one.
    pub fn retry_override(&self, base: &RetryConfig) -> Option<RetryConfig> {
        if self.max_retries.is_none() && self.retry_delay_ms.is_none() {
            return None;
        }
        let mut config = base.clone();
        if let Some(n) = self.max_retries {
            config = config.max_retries(n);
        }
        if let Some(ms) = self.retry_delay_ms {
            config = config.exponential(Duration::from_millis(ms));
        }
        Some(config)
    }
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// Resolution order:
    /// 1. Explicit path (if provided)
    /// 2. `~/.bifrost/config.toml`
    /// 3. `/etc/bifrost/config.toml`
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let path = Self::resolve_config_path(explicit_path)?;
        let content = fs::read_to_string(&path).map_err(|e| {
            BifrostError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        Self::from_toml_str(&content).map_err(|e| match e {
            BifrostError::Configuration(msg) => {
                BifrostError::Configuration(format!("{path:?}: {msg}"))
            }
            other => other,
        })
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| BifrostError::Configuration(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.cache.max_entries == 0 {
            return Err(BifrostError::Configuration(
                "cache.max_entries must be at least 1".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.cache.target_occupancy) {
            return Err(BifrostError::Configuration(
                "cache.target_occupancy must be within 0.0..=1.0".into(),
            ));
        }
        if self.cache.ttl_secs == 0 || self.cache.analysis_ttl_secs == 0 {
            return Err(BifrostError::Configuration(
                "cache TTLs must be greater than zero".into(),
            ));
        }
        let max_ttl = MAX_TTL.as_secs();
        if self.cache.ttl_secs > max_ttl || self.cache.analysis_ttl_secs > max_ttl {
            return Err(BifrostError::Configuration(format!(
                "cache TTLs must be at most {max_ttl} seconds"
            )));
        }
        if self.cache.sweep_interval_secs > MAX_SWEEP_INTERVAL.as_secs() {
            return Err(BifrostError::Configuration(format!(
                "cache.sweep_interval_secs must be at most {}",
                MAX_SWEEP_INTERVAL.as_secs()
            )));
        }
        if self.health.interval_secs == 0 {
            return Err(BifrostError::Configuration(
                "health.interval_secs must be greater than zero".into(),
            ));
        }
        if self.health.interval_secs > MAX_INTERVAL.as_secs() {
            return Err(BifrostError::Configuration(format!(
                "health.interval_secs must be at most {}",
                MAX_INTERVAL.as_secs()
            )));
        }
        for name in &self.backends.order {
            if !matches!(name.as_str(), "anthropic" | "openai") {
                return Err(BifrostError::Configuration(format!(
                    "unknown backend '{name}' in backends.order"
                )));
            }
        }
        Ok(())
    }

    /// Resolve the config file path.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(path.to_path_buf());
            }
            return Err(BifrostError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".bifrost").join("config.toml");
            if user_config.exists() {
                return Ok(user_config);
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/bifrost/config.toml");
        if system_config.exists() {
            return Ok(system_config);
        }

        Err(BifrostError::Configuration(
            "No config file found. Create ~/.bifrost/config.toml or /etc/bifrost/config.toml"
                .to_string(),
        ))
    }
}
