//! Plumbing shared by the HTTP backends: client construction, error
//! classification, and shaping replies into [`HealthAnalysis`].

use std::error::Error as StdError;
use std::time::Duration;

use reqwest::{Client, Response};
use tracing::warn;

use crate::types::{HealthAnalysis, HealthData};
use crate::{BifrostError, FailureKind, Result};

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

pub(crate) const ANALYSIS_SYSTEM_PROMPT: &str = "You are a clinical data analyst. \
Analyse the supplied health data and reply with a single JSON object and nothing else. \
The object must have the fields: summary (string), findings (array of {category, description, \
severity: low|medium|high|critical, value?, reference?}), recommendations (array of {priority: \
high|medium|low, category, description, timeframe?}), riskFactors (array of {name, level: \
low|moderate|high|critical, description, mitigationStrategies: string[]}), confidence (0-100).";

/// Build an HTTP client with the backend's timeout.
///
/// Returns `None` instead of failing so a misconfigured backend can still be
/// constructed; it then reports itself as unhealthy.
pub(crate) fn build_client(backend: &str, timeout: Duration) -> Option<Client> {
    match Client::builder()
        .timeout(timeout)
        .user_agent(crate::version::user_agent())
        .build()
    {
        Ok(client) => Some(client),
        Err(e) => {
            warn!(backend, error = %e, "failed to build HTTP client");
            None
        }
    }
}

/// Render an error and all of its sources on one line.
fn error_chain(err: &dyn StdError) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

/// Classify a transport-level reqwest failure.
pub(crate) fn transport_error(backend: &str, err: &reqwest::Error) -> BifrostError {
    let message = error_chain(err);
    let lowered = message.to_lowercase();
    let kind = if err.is_timeout() {
        FailureKind::Timeout
    } else if lowered.contains("dns error") || lowered.contains("failed to lookup address") {
        FailureKind::HostNotFound
    } else if err.is_connect() || lowered.contains("connection reset") {
        FailureKind::Connection
    } else if let Some(status) = err.status() {
        FailureKind::from_status(status.as_u16())
    } else {
        FailureKind::Other
    };
    BifrostError::call_failed(backend, kind, message)
}

/// Pass successful responses through; turn error statuses into
/// [`BifrostError::BackendCallFailed`] classified by status code.
pub(crate) async fn ensure_success(backend: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();
    Err(BifrostError::call_failed(
        backend,
        FailureKind::from_status(status.as_u16()),
        format!("HTTP {}: {}", status.as_u16(), body),
    ))
}

/// User prompt for an analysis request.
pub(crate) fn analysis_prompt(data: &HealthData) -> Result<String> {
    let payload = serde_json::to_string_pretty(data)?;
    Ok(format!(
        "Analyse the following health data and return the JSON object described in the \
         instructions.\n\n{payload}"
    ))
}

/// Extract the outermost JSON object from a model reply and deserialize it.
///
/// Models often wrap JSON in prose or code fences; everything outside the
/// first `{` and the last `}` is ignored.
pub(crate) fn parse_analysis(backend: &str, content: &str) -> Result<HealthAnalysis> {
    let parse_failed = |message: String| BifrostError::AnalysisParseFailed {
        backend: backend.to_string(),
        message,
    };

    let (Some(start), Some(end)) = (content.find('{'), content.rfind('}')) else {
        return Err(parse_failed("no JSON object in response".into()));
    };
    if end < start {
        return Err(parse_failed("no JSON object in response".into()));
    }

    let mut analysis: HealthAnalysis = serde_json::from_str(&content[start..=end])
        .map_err(|e| parse_failed(e.to_string()))?;
    analysis
        .metadata
        .entry("backend")
        .or_insert_with(|| serde_json::Value::String(backend.to_string()));
    Ok(analysis)
}
