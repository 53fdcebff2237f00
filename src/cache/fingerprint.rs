//! Request fingerprints used as cache keys.
//!
//! A fingerprint is the hex SHA-256 of a canonical JSON rendering of the
//! request: object keys are sorted recursively, so two requests that differ
//! only in key order hash identically.
//!
//! Only fields that influence the backend's output participate. The
//! preferred `provider`, `use_cache` and caller `metadata` are routing or
//! bookkeeping hints and are left out.

use serde_json::{Map, Value, json};
use sha2::{Digest, Sha256};

use crate::types::{CompletionOptions, HealthData};

/// Fingerprint a completion request.
pub fn completion(prompt: &str, options: &CompletionOptions) -> String {
    digest(&json!({
        "op": "complete",
        "prompt": prompt,
        "model": options.model,
        "temperature": options.temperature,
        "maxTokens": options.max_tokens,
        "topP": options.top_p,
        "systemPrompt": options.system_prompt,
    }))
}

/// Fingerprint an analysis request.
pub fn analysis(data: &HealthData) -> String {
    digest(&json!({
        "op": "analyze",
        "data": data,
    }))
}

fn digest(value: &Value) -> String {
    let canonical = canonicalize(value).to_string();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Rebuild `value` with every object's keys in sorted order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
