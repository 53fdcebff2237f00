//! Always-available local backend used when every real backend is out.
//!
//! Never touches the network and never fails. Output is deterministic for a
//! given input so degraded responses are reproducible (and cacheable).

use async_trait::async_trait;
use serde_json::json;

use super::traits::Backend;
use crate::Result;
use crate::types::{
    CompletionOptions, CompletionResponse, Finding, HealthAnalysis, HealthData, Priority,
    Recommendation, RiskFactor, RiskLevel, Severity, Usage,
};

/// Default identity of the degraded backend.
pub const DEGRADED_BACKEND: &str = "degraded";

const DEGRADED_MODEL: &str = "degraded-v1";

const CANNED_RESPONSES: &[&str] = &[
    "The service is operating in degraded mode; this is a placeholder response.",
    "The analysis has been completed with limited capabilities.",
    "Based on the provided data, no further detail is available in degraded mode.",
    "The results could not be generated by a remote backend; please retry later.",
];

/// Deterministic stand-in backend.
#[derive(Debug, Clone)]
pub struct DegradedBackend {
    name: String,
}

impl DegradedBackend {
    pub fn new() -> Self {
        Self::named(DEGRADED_BACKEND)
    }

    /// Create a degraded backend with a custom identity.
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn pick_response(prompt: &str) -> &'static str {
        let index = prompt.bytes().map(usize::from).sum::<usize>() % CANNED_RESPONSES.len();
        CANNED_RESPONSES[index]
    }
}

impl Default for DegradedBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn word_count(text: &str) -> u32 {
    u32::try_from(text.split_whitespace().count()).unwrap_or(u32::MAX)
}

#[async_trait]
impl Backend for DegradedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn probe(&self) -> bool {
        true
    }

    async fn complete(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<CompletionResponse> {
        let content = Self::pick_response(prompt);
        Ok(CompletionResponse {
            content: content.to_string(),
            backend_used: self.name.clone(),
            model: Some(DEGRADED_MODEL.to_string()),
            usage: Usage::new(word_count(prompt), word_count(content)),
            cached: false,
            latency_ms: 0,
        })
    }

    async fn analyze(&self, data: &HealthData) -> Result<HealthAnalysis> {
        let has_lab_results = data.get("labResults").is_some();
        let has_symptoms = data.get("symptoms").is_some();

        let mut findings = vec![Finding {
            category: "General".into(),
            description: "Automated review unavailable; values not interpreted".into(),
            severity: Severity::Low,
            value: None,
            reference: None,
        }];
        if has_lab_results {
            findings.push(Finding {
                category: "Lab Results".into(),
                description: "Lab results received; manual review recommended".into(),
                severity: Severity::Medium,
                value: None,
                reference: None,
            });
        }

        let recommendations = vec![
            Recommendation {
                priority: Priority::High,
                category: "Follow-up".into(),
                description: "Re-run the analysis once a full backend is available".into(),
                timeframe: Some("Immediate".into()),
            },
            Recommendation {
                priority: Priority::Medium,
                category: "Review".into(),
                description: "Have a practitioner review the submitted data".into(),
                timeframe: Some("1-2 weeks".into()),
            },
        ];

        let mut risk_factors = Vec::new();
        if has_symptoms {
            risk_factors.push(RiskFactor {
                name: "Unreviewed Symptoms".into(),
                level: RiskLevel::Low,
                description: "Reported symptoms have not been assessed".into(),
                mitigation_strategies: vec!["Practitioner review".into()],
            });
        }

        let summary = match (has_lab_results, has_symptoms) {
            (true, true) => "Degraded analysis: lab results and symptoms received but not interpreted.",
            (true, false) => "Degraded analysis: lab results received but not interpreted.",
            (false, true) => "Degraded analysis: symptoms received but not interpreted.",
            (false, false) => "Degraded analysis: no recognised health data supplied.",
        };

        let mut metadata = serde_json::Map::new();
        metadata.insert("backend".into(), json!(self.name));
        metadata.insert("degraded".into(), json!(true));

        Ok(HealthAnalysis {
            summary: summary.to_string(),
            findings,
            recommendations,
            risk_factors,
            confidence: 50,
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn completion_is_deterministic() {
        let backend = DegradedBackend::new();
        let options = CompletionOptions::default();
        let a = backend.complete("hello there", &options).await.unwrap();
        let b = backend.complete("hello there", &options).await.unwrap();
        assert_eq!(a.content, b.content);
        assert_eq!(a.backend_used, DEGRADED_BACKEND);
        assert_eq!(a.usage.prompt_tokens, 2);
    }

    #[tokio::test]
    async fn probe_is_always_healthy() {
        assert!(DegradedBackend::new().probe().await);
    }

    #[tokio::test]
    async fn analysis_adapts_to_input_keys() {
        let backend = DegradedBackend::new();
        let bare = backend.analyze(&json!({})).await.unwrap();
        let full = backend
            .analyze(&json!({"labResults": {"glucose": 105}, "symptoms": ["fatigue"]}))
            .await
            .unwrap();

        assert_eq!(bare.findings.len(), 1);
        assert!(bare.risk_factors.is_empty());
        assert_eq!(full.findings.len(), 2);
        assert_eq!(full.risk_factors.len(), 1);
        assert_eq!(full.metadata.get("degraded"), Some(&json!(true)));
    }

    #[tokio::test]
    async fn custom_name_is_reported() {
        let backend = DegradedBackend::named("offline");
        let response = backend
            .complete("x", &CompletionOptions::default())
            .await
            .unwrap();
        assert_eq!(response.backend_used, "offline");
    }
}
