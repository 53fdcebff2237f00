//! Structured health analysis types
//!
//! Field names use camelCase on the wire: backends are asked to reply with
//! a JSON object in exactly this shape.
//!
//! Deserialization is forgiving, since the JSON comes from a language model:
//!
//! - enum labels match case-insensitively; anything else reads as the lowest level
//! - missing text fields get placeholders and `null` collections read as empty
//! - `confidence` accepts any number or numeric string, rounded into `0..=100`

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Free-form structured input for an analysis (lab results, symptoms, ...).
pub type HealthData = Value;

/// Result of analysing a [`HealthData`] payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthAnalysis {
    #[serde(default = "default_summary", deserialize_with = "text_or_summary")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub findings: Vec<Finding>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub recommendations: Vec<Recommendation>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub risk_factors: Vec<RiskFactor>,
    /// Backend's self-reported confidence, 0..=100.
    #[serde(default = "default_confidence", deserialize_with = "confidence")]
    pub confidence: u8,
    #[serde(default, deserialize_with = "null_as_default")]
    pub metadata: serde_json::Map<String, Value>,
}

const DEFAULT_CONFIDENCE: u8 = 85;

fn default_confidence() -> u8 {
    DEFAULT_CONFIDENCE
}

fn default_summary() -> String {
    "Health analysis completed".to_string()
}

fn default_category() -> String {
    "General".to_string()
}

fn default_name() -> String {
    "Unknown".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    #[serde(default = "default_category", deserialize_with = "text_or_category")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default, deserialize_with = "scalar_text", skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, deserialize_with = "scalar_text", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Label")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_category", deserialize_with = "text_or_category")]
    pub category: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "scalar_text", skip_serializing_if = "Option::is_none")]
    pub timeframe: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Label")]
pub enum Priority {
    High,
    Medium,
    #[default]
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactor {
    #[serde(default = "default_name", deserialize_with = "text_or_name")]
    pub name: String,
    #[serde(default)]
    pub level: RiskLevel,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub mitigation_strategies: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "Label")]
pub enum RiskLevel {
    #[default]
    Low,
    Moderate,
    High,
    Critical,
}

/// Any JSON value standing in for an enum label.
#[derive(Deserialize)]
#[serde(transparent)]
struct Label(Value);

impl Label {
    fn normalized(&self) -> String {
        match &self.0 {
            Value::String(s) => s.trim().to_ascii_lowercase(),
            _ => String::new(),
        }
    }
}

impl From<Label> for Severity {
    fn from(label: Label) -> Self {
        match label.normalized().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl From<Label> for Priority {
    fn from(label: Label) -> Self {
        match label.normalized().as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            _ => Self::Low,
        }
    }
}

impl From<Label> for RiskLevel {
    fn from(label: Label) -> Self {
        match label.normalized().as_str() {
            "critical" => Self::Critical,
            "high" => Self::High,
            "moderate" => Self::Moderate,
            _ => Self::Low,
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Render a scalar as text; `null` and empty strings become `None`.
fn scalar_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    })
}

fn text_or<'de, D>(deserializer: D, fallback: fn() -> String) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(scalar_text(deserializer)?.unwrap_or_else(fallback))
}

fn text_or_summary<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    text_or(deserializer, default_summary)
}

fn text_or_category<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    text_or(deserializer, default_category)
}

fn text_or_name<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    text_or(deserializer, default_name)
}

fn confidence<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let number = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok(),
        _ => None,
    };
    Ok(match number {
        Some(n) if n.is_finite() => n.round().clamp(0.0, 100.0) as u8,
        _ => DEFAULT_CONFIDENCE,
    })
}
