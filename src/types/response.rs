//! Response types

use serde::{Deserialize, Serialize};

use super::analysis::HealthAnalysis;

/// Completion response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub content: String,
    /// Backend that actually produced the content.
    pub backend_used: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Usage,
    /// `true` when served from the response cache.
    #[serde(default)]
    pub cached: bool,
    pub latency_ms: u64,
}

/// Token usage statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens.saturating_add(completion_tokens),
        }
    }
}

/// Structured analysis response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub analysis: HealthAnalysis,
    pub backend_used: String,
    #[serde(default)]
    pub cached: bool,
    pub latency_ms: u64,
}
