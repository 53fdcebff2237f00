//! Anthropic Messages API backend.
//!
//! See: <https://docs.anthropic.com/en/api/messages>

use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{self, ANALYSIS_SYSTEM_PROMPT};
use super::traits::Backend;
use crate::config::BackendConfig;
use crate::types::{CompletionOptions, CompletionResponse, HealthAnalysis, HealthData, Usage};
use crate::{BifrostError, FailureKind, Result};

/// Default base URL for the Anthropic API
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

const API_VERSION: &str = "2023-06-01";

/// Environment variable consulted when the config names none.
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Backend for Anthropic's Messages API.
///
/// Construction never fails: without an API key (or when the HTTP client
/// cannot be built) the backend probes unhealthy and every call returns
/// [`BifrostError::BackendNotInitialized`].
#[derive(Clone)]
pub struct AnthropicBackend {
    api_key: Option<String>,
    http: Option<Client>,
    base_url: String,
    default_model: String,
}

impl AnthropicBackend {
    pub const NAME: &'static str = "anthropic";

    pub fn new(config: &BackendConfig) -> Self {
        let api_key = config.resolve_api_key(API_KEY_ENV);
        if api_key.is_none() {
            debug!(backend = Self::NAME, "no API key configured");
        }
        Self {
            api_key,
            http: http::build_client(Self::NAME, config.timeout_duration()),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            default_model: config
                .default_model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    fn client(&self) -> Result<(&Client, &str)> {
        match (&self.http, &self.api_key) {
            (Some(http), Some(key)) => Ok((http, key)),
            _ => Err(BifrostError::BackendNotInitialized {
                backend: Self::NAME.to_string(),
            }),
        }
    }

    async fn send(&self, request: &MessagesRequest<'_>) -> Result<MessagesResponse> {
        let (http, api_key) = self.client()?;
        let url = format!("{}/v1/messages", self.base_url);

        let response = http
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, &e))?;

        let response = http::ensure_success(Self::NAME, response).await?;
        response
            .json()
            .await
            .map_err(|e| http::transport_error(Self::NAME, &e))
    }
}

#[async_trait]
impl Backend for AnthropicBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_initialized(&self) -> bool {
        self.client().is_ok()
    }

    async fn probe(&self) -> bool {
        if self.client().is_err() {
            return false;
        }
        let request = MessagesRequest {
            model: &self.default_model,
            max_tokens: 1,
            messages: vec![MessageParam {
                role: "user",
                content: "ping",
            }],
            system: None,
            temperature: None,
            top_p: None,
        };
        match self.send(&request).await {
            Ok(_) => true,
            Err(e) => {
                debug!(backend = Self::NAME, error = %e, "probe failed");
                false
            }
        }
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &CompletionOptions,
    ) -> Result<CompletionResponse> {
        let start = Instant::now();
        let model = options.model.as_deref().unwrap_or(&self.default_model);
        let request = MessagesRequest {
            model,
            max_tokens: options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: vec![MessageParam {
                role: "user",
                content: prompt,
            }],
            system: options.system_prompt.as_deref(),
            temperature: options.temperature,
            top_p: options.top_p,
        };

        let response = self.send(&request).await?;
        let content = response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n");
        if content.is_empty() {
            return Err(BifrostError::call_failed(
                Self::NAME,
                FailureKind::Other,
                "empty response from model",
            ));
        }

        Ok(CompletionResponse {
            content,
            backend_used: Self::NAME.to_string(),
            model: Some(response.model.unwrap_or_else(|| model.to_string())),
            usage: Usage::new(response.usage.input_tokens, response.usage.output_tokens),
            cached: false,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn analyze(&self, data: &HealthData) -> Result<HealthAnalysis> {
        let prompt = http::analysis_prompt(data)?;
        let options = CompletionOptions::default()
            .system_prompt(ANALYSIS_SYSTEM_PROMPT)
            .temperature(0.3)
            .max_tokens(DEFAULT_MAX_TOKENS);
        let response = self.complete(&prompt, &options).await?;
        http::parse_analysis(Self::NAME, &response.content)
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<MessageParam<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Serialize)]
struct MessageParam<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: AnthropicUsage,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize, Default)]
struct AnthropicUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}
