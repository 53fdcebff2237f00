//! OpenAI Chat Completions backend.
//!
//! Works against any endpoint speaking the OpenAI wire format.

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

/// Default base URL for the OpenAI API
const DEFAULT_BASE_URL: &str = "https://api.openai.com";

const DEFAULT_MODEL: &str = "gpt-4-turbo-preview";

/// Environment variable consulted when the config names none.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Backend for OpenAI's Chat Completions API.
///
/// Same construction contract as [`AnthropicBackend`](super::AnthropicBackend):
/// missing credentials make it permanently unhealthy, never a panic.
#[derive(Clone)]
pub struct OpenAiBackend {
    api_key: Option<String>,
    http: Option<Client>,
    base_url: String,
    default_model: String,
}

impl OpenAiBackend {
    pub const NAME: &'static str = "openai";

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
}

#[async_trait]
impl Backend for OpenAiBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn is_initialized(&self) -> bool {
        self.client().is_ok()
    }

    /// Lists models; any successful response counts as alive.
    async fn probe(&self) -> bool {
        let Ok((http, api_key)) = self.client() else {
            return false;
        };
        let url = format!("{}/v1/models", self.base_url);
        let result = match http.get(&url).bearer_auth(api_key).send().await {
            Ok(response) => http::ensure_success(Self::NAME, response).await.map(|_| ()),
            Err(e) => Err(http::transport_error(Self::NAME, &e)),
        };
        match result {
            Ok(()) => true,
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
        let (http, api_key) = self.client()?;
        let start = Instant::now();
        let model = options.model.as_deref().unwrap_or(&self.default_model);

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = options.system_prompt.as_deref() {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model,
            messages,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            top_p: options.top_p,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = http
            .post(&url)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| http::transport_error(Self::NAME, &e))?;
        let response = http::ensure_success(Self::NAME, response).await?;
        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| http::transport_error(Self::NAME, &e))?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                BifrostError::call_failed(Self::NAME, FailureKind::Other, "empty response from model")
            })?;

        let usage = body.usage.unwrap_or_default();
        Ok(CompletionResponse {
            content,
            backend_used: Self::NAME.to_string(),
            model: Some(body.model.unwrap_or_else(|| model.to_string())),
            usage: Usage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            },
            cached: false,
            latency_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn analyze(&self, data: &HealthData) -> Result<HealthAnalysis> {
        let prompt = http::analysis_prompt(data)?;
        let options = CompletionOptions::default()
            .system_prompt(ANALYSIS_SYSTEM_PROMPT)
            .temperature(0.3)
            .max_tokens(4096);
        let response = self.complete(&prompt, &options).await?;
        http::parse_analysis(Self::NAME, &response.content)
    }
}

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}
