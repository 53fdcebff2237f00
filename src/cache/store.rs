//! In-memory TTL cache keyed by request fingerprint.
//!
//! # Expiry
//!
//! Every entry carries an absolute `expires_at`. An entry past it is
//! logically absent: `get`/`has` treat it as a miss and remove it on the
//! spot. Entries nobody reads again are reclaimed by [`CacheStore::sweep()`],
//! which the gateway runs on a fixed interval via
//! [`CacheStore::spawn_sweeper()`].
//!
//! # Capacity
//!
//! Inserting a new key into a full store first drops expired entries, then
//! evicts the live entries *nearest to expiry* until occupancy is back at
//! `target_occupancy * max_entries`. This is not LRU: a hot entry that is
//! about to expire goes before a cold one with a long TTL.
//!
//! # Concurrency
//!
//! Backed by a sharded [`DashMap`]; concurrent writers to the same key are
//! last-writer-wins.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::debug;

/// Longest TTL an entry can carry; larger TTLs are capped to it.
pub const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Longest accepted sweep interval.
pub const MAX_SWEEP_INTERVAL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Configuration for the response cache.
///
/// ```rust
/// # use bifrost::CacheConfig;
/// # use std::time::Duration;
/// let config = CacheConfig::new()
///     .max_entries(10_000)
///     .ttl(Duration::from_secs(600));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Default TTL, used for completions. Default: 1 hour.
    pub ttl: Duration,
    /// TTL for structured analyses. Default: 2 hours.
    pub analysis_ttl: Duration,
    /// Maximum number of entries. Default: 1,000.
    pub max_entries: usize,
    /// Fraction of `max_entries` to shrink to on overflow. Default: 0.8.
    pub target_occupancy: f64,
    /// How often expired entries are swept. Default: 60s.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3_600),
            analysis_ttl: Duration::from_secs(7_200),
            max_entries: 1_000,
            target_occupancy: 0.8,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl CacheConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn analysis_ttl(mut self, ttl: Duration) -> Self {
        self.analysis_ttl = ttl;
        self
    }

    /// Set the maximum number of entries (at least 1).
    pub fn max_entries(mut self, n: usize) -> Self {
        self.max_entries = n.max(1);
        self
    }

    /// Set the post-eviction occupancy, clamped to `0.0..=1.0`.
    pub fn target_occupancy(mut self, fraction: f64) -> Self {
        self.target_occupancy = fraction.clamp(0.0, 1.0);
        self
    }

    /// Set the sweep interval, clamped to 1ms..=[`MAX_SWEEP_INTERVAL`].
    pub fn sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval.clamp(Duration::from_millis(1), MAX_SWEEP_INTERVAL);
        self
    }

    /// Entry count eviction shrinks to; always leaves room for one insert.
    fn target_len(&self) -> usize {
        let target = (self.max_entries as f64 * self.target_occupancy).floor() as usize;
        target.min(self.max_entries.saturating_sub(1))
    }
}

/// Descriptive tags stored alongside a cached value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryMetadata {
    pub operation: Option<String>,
    pub backend: Option<String>,
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: Instant,
    expires_at: Instant,
    metadata: EntryMetadata,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        now > self.expires_at
    }
}

/// Snapshot returned by [`CacheStore::stats()`]. Expired entries are omitted.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub max_entries: usize,
    pub entries: Vec<CacheEntryInfo>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheEntryInfo {
    pub key: String,
    pub expires_in_ms: u64,
    pub age_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
}

/// Thread-safe TTL cache with nearest-expiry eviction.
pub struct CacheStore<V> {
    entries: DashMap<String, CacheEntry<V>>,
    config: CacheConfig,
}

impl<V: Clone> CacheStore<V> {
    /// Create a new empty store with the given configuration.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a live entry.
    ///
    /// Returns `None` on miss; an expired entry is removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key)
            && !entry.is_expired(now)
        {
            return Some(entry.value.clone());
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        None
    }

    /// Metadata of a live entry.
    pub fn metadata(&self, key: &str) -> Option<EntryMetadata> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.metadata.clone())
    }

    /// Insert (or overwrite) a value. `ttl` defaults to [`CacheConfig::ttl`].
    ///
    /// Returns `false` and stores nothing when the TTL is zero.
    pub fn set(&self, key: impl Into<String>, value: V, ttl: Option<Duration>) -> bool {
        self.insert(key, value, ttl, EntryMetadata::default())
    }

    /// Insert (or overwrite) a value with metadata.
    pub fn insert(
        &self,
        key: impl Into<String>,
        value: V,
        ttl: Option<Duration>,
        metadata: EntryMetadata,
    ) -> bool {
        let ttl = ttl.unwrap_or(self.config.ttl).min(MAX_TTL);
        if ttl.is_zero() {
            return false;
        }
        let key = key.into();
        if !self.entries.contains_key(&key) && self.entries.len() >= self.config.max_entries {
            self.evict();
        }
        let now = Instant::now();
        self.entries.insert(
            key,
            CacheEntry {
                value,
                inserted_at: now,
                expires_at: now + ttl,
                metadata,
            },
        );
        true
    }

    /// Whether a live entry exists. Same expiry semantics as [`get()`](Self::get).
    pub fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key)
            && !entry.is_expired(now)
        {
            return true;
        }
        self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        false
    }

    /// Remove an entry. Returns whether anything was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Evict all entries.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every expired entry. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Snapshot of live entries, sorted by key.
    pub fn stats(&self) -> CacheStats {
        let now = Instant::now();
        let mut entries: Vec<CacheEntryInfo> = self
            .entries
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| CacheEntryInfo {
                key: entry.key().clone(),
                expires_in_ms: entry.expires_at.saturating_duration_since(now).as_millis() as u64,
                age_ms: now.saturating_duration_since(entry.inserted_at).as_millis() as u64,
                operation: entry.metadata.operation.clone(),
                backend: entry.metadata.backend.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.key.cmp(&b.key));

        CacheStats {
            size: entries.len(),
            max_entries: self.config.max_entries,
            entries,
        }
    }

    /// Make room for one insert: drop expired entries, then the live ones
    /// nearest to expiry until the target occupancy is reached.
    fn evict(&self) {
        let swept = self.sweep();
        let len = self.entries.len();
        if len < self.config.max_entries {
            if swept > 0 {
                debug!(swept, "cache full, expired entries reclaimed");
            }
            return;
        }

        let mut by_expiry: Vec<(String, Instant)> = self
            .entries
            .iter()
            .map(|entry| (entry.key().clone(), entry.expires_at))
            .collect();
        by_expiry.sort_by_key(|(_, expires_at)| *expires_at);

        let excess = len.saturating_sub(self.config.target_len());
        for (key, _) in by_expiry.into_iter().take(excess) {
            self.entries.remove(&key);
        }
        debug!(
            evicted = excess,
            swept,
            max_entries = self.config.max_entries,
            "cache full, evicted entries nearest to expiry"
        );
    }
}

impl<V: Clone + Send + Sync + 'static> CacheStore<V> {
    /// Spawn the periodic sweep. The task ends once `shutdown` turns `true`
    /// (or its sender is dropped).
    pub fn spawn_sweeper(self: &Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        let store = Arc::clone(self);
        let period = self
            .config
            .sweep_interval
            .clamp(Duration::from_millis(1), MAX_SWEEP_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = store.sweep();
                        if removed > 0 {
                            debug!(removed, "swept expired cache entries");
                        }
                    }
                    _ = shutdown.wait_for(|stopped| *stopped) => break,
                }
            }
            debug!("cache sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_entries: usize) -> CacheStore<String> {
        CacheStore::new(CacheConfig::new().max_entries(max_entries))
    }

    #[test]
    fn target_len_leaves_room_for_insert() {
        assert_eq!(CacheConfig::new().max_entries(10).target_len(), 8);
        assert_eq!(
            CacheConfig::new()
                .max_entries(10)
                .target_occupancy(1.0)
                .target_len(),
            9
        );
        assert_eq!(CacheConfig::new().max_entries(1).target_len(), 0);
    }

    #[test]
    fn zero_ttl_is_rejected() {
        let cache = store(10);
        assert!(!cache.set("k", "v".into(), Some(Duration::ZERO)));
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn overwrite_does_not_evict() {
        let cache = store(2);
        cache.set("a", "1".into(), None);
        cache.set("b", "2".into(), None);
        cache.set("a", "3".into(), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").as_deref(), Some("3"));
    }

    #[test]
    fn delete_reports_removal() {
        let cache = store(10);
        cache.set("k", "v".into(), None);
        assert!(cache.delete("k"));
        assert!(!cache.delete("k"));
    }

    #[test]
    fn metadata_round_trips() {
        let cache = store(10);
        let metadata = EntryMetadata {
            operation: Some("complete".into()),
            backend: Some("anthropic".into()),
        };
        cache.insert("k", "v".into(), None, metadata.clone());
        assert_eq!(cache.metadata("k"), Some(metadata));
    }
}
