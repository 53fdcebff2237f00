//! Response caching.
//!
//! - [`CacheStore`] is a generic in-memory TTL store with nearest-expiry
//!   eviction and a periodic sweeper.
//! - [`fingerprint`] derives the keys: a stable hash of exactly the request
//!   fields that shape a backend's output.
//!
//! The gateway stores [`CachedResponse`] values and consults the cache
//! before selecting a backend, so a hit never touches retry, health or
//! fallback logic.

pub mod fingerprint;
pub mod store;

pub use store::{
    CacheConfig, CacheEntryInfo, CacheStats, CacheStore, EntryMetadata, MAX_SWEEP_INTERVAL, MAX_TTL,
};

use crate::types::{AnalysisResponse, CompletionResponse};

/// A value held in the gateway's response cache.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedResponse {
    Completion(CompletionResponse),
    Analysis(AnalysisResponse),
}

impl CachedResponse {
    /// Operation label used in entry metadata.
    pub fn operation(&self) -> &'static str {
        match self {
            Self::Completion(_) => "complete",
            Self::Analysis(_) => "analyze",
        }
    }

    /// Name of the backend that produced the value.
    pub fn backend_used(&self) -> &str {
        match self {
            Self::Completion(r) => &r.backend_used,
            Self::Analysis(r) => &r.backend_used,
        }
    }
}
