use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use url::Url;

/// What every extraction produces. Always returned, even on total failure
/// (empty content, low confidence, `error` set).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentResult {
    pub content: ExtractedContent,
    pub meta: ResultMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedContent {
    pub title: String,
    /// Whitespace-normalized plain text.
    pub text: String,
    /// Canonical rich form of the same content.
    pub markdown: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultMeta {
    pub url: String,
    pub final_url: String,
    /// Stable strategy identifier, e.g. `api:openapi`, `parse:static`.
    pub strategy: String,
    pub strategies_attempted: Vec<String>,
    pub timing_ms: u64,
    pub confidence: Confidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl ContentResult {
    /// The all-strategies-exhausted shape: empty content, low confidence.
    pub fn empty(url: &str, attempted: Vec<String>, timing_ms: u64, error: String) -> Self {
        Self {
            content: ExtractedContent::default(),
            meta: ResultMeta {
                url: url.to_string(),
                final_url: url.to_string(),
                strategy: String::new(),
                strategies_attempted: attempted,
                timing_ms,
                confidence: Confidence::Low,
            },
            warnings: Vec::new(),
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HttpMethod {
    #[serde(rename = "GET")]
    Get,
    #[serde(rename = "POST")]
    Post,
    #[serde(rename = "PUT")]
    Put,
    #[serde(rename = "DELETE")]
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }
}

impl Default for HttpMethod {
    fn default() -> Self {
        Self::Get
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    #[default]
    Json,
    Xml,
    Text,
    Html,
}

impl ResponseFormat {
    pub fn accept_header(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml, text/xml",
            Self::Text => "text/plain",
            Self::Html => "text/html",
        }
    }
}

/// Per-call options for the pooled HTTP client.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub method: HttpMethod,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
    /// Force a fresh connection outside the shared pool.
    pub skip_pooling: bool,
}

#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub url: Url,
    pub final_url: Url,
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub content_type: Option<String>,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
    pub response_time_ms: u64,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Emitted by the orchestrator on every successful `api:*` strategy; consumed
/// by the pattern registry to learn a replayable recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionEvent {
    pub source_url: String,
    pub api_url: String,
    pub strategy: String,
    pub response_time_ms: u64,
    pub method: HttpMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HashMap<String, String>>,
    pub content: ExtractedContent,
}

/// Cost class ordering strategies by expected latency and externality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CostTier {
    Intelligence,
    Lightweight,
    Playwright,
}
