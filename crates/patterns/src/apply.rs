//! Applying a learned pattern: dispatch the expanded endpoint, validate the
//! response against the pattern's contract, and map it into content.

use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::debug;
use url::Url;

use siphon_client::PooledClient;
use siphon_core::dotted_path;
use siphon_core::{ExtractError, ExtractedContent, FailureCategory, FetchOptions, ResponseFormat};
use siphon_parse::markdown::{html_to_markdown, html_to_text, normalize_text};

use crate::model::LearnedPattern;

#[derive(Debug)]
pub struct AppliedPattern {
    pub content: ExtractedContent,
    pub api_url: String,
    pub final_url: String,
    pub status: u16,
    pub response_time_ms: u64,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub struct ApplyFailure {
    pub category: FailureCategory,
    pub reason: String,
    pub status_code: Option<u16>,
    pub response_time_ms: u64,
}

impl ApplyFailure {
    fn new(category: FailureCategory, reason: impl Into<String>) -> Self {
        Self { category, reason: reason.into(), status_code: None, response_time_ms: 0 }
    }
}

static HTML_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[a-zA-Z][^>]*>").unwrap());
static XML_TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<title[^>]*>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</title>").unwrap());
static XML_DESC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<description[^>]*>\s*(?:<!\[CDATA\[)?(.*?)(?:\]\]>)?\s*</description>").unwrap()
});

/// Execute `pattern` against its expanded `endpoint`. `fallback_title` comes
/// from the page the orchestrator already parsed, used when the mapping's
/// title path is empty or resolves to nothing.
pub async fn apply_pattern(
    client: &PooledClient,
    pattern: &LearnedPattern,
    endpoint: &str,
    timeout: Option<Duration>,
    cancel: Option<tokio_util::sync::CancellationToken>,
    fallback_title: Option<&str>,
) -> Result<AppliedPattern, ApplyFailure> {
    let url = Url::parse(endpoint)
        .map_err(|e| ApplyFailure::new(FailureCategory::ParseError, format!("bad endpoint: {}", e)))?;

    let mut headers = pattern.headers.clone();
    headers
        .entry("Accept".to_string())
        .or_insert_with(|| pattern.response_format.accept_header().to_string());

    let opts = FetchOptions {
        method: pattern.method,
        headers,
        timeout,
        cancel,
        ..Default::default()
    };

    let response = match client.fetch(&url, &opts).await {
        Ok(r) => r,
        Err(ExtractError::Timeout(ms)) => {
            return Err(ApplyFailure {
                category: FailureCategory::Timeout,
                reason: format!("timeout after {}ms", ms),
                status_code: None,
                response_time_ms: ms,
            })
        }
        Err(ExtractError::Cancelled) => {
            return Err(ApplyFailure::new(FailureCategory::Cancelled, "cancelled"))
        }
        Err(e) => return Err(ApplyFailure::new(FailureCategory::Unknown, e.to_string())),
    };

    if !response.is_success() {
        return Err(ApplyFailure {
            category: FailureCategory::from_status(response.status),
            reason: format!("HTTP {}", response.status),
            status_code: Some(response.status),
            response_time_ms: response.response_time_ms,
        });
    }

    let body = response.body_text();
    let parsed = parse_body(&body, pattern.response_format).map_err(|reason| ApplyFailure {
        category: FailureCategory::ParseError,
        reason,
        status_code: Some(response.status),
        response_time_ms: response.response_time_ms,
    })?;

    // Contract check: every required dotted path must resolve to a non-null.
    for field in &pattern.validation.required_fields {
        if !dotted_path::exists(&parsed, field) {
            return Err(ApplyFailure {
                category: FailureCategory::SchemaMismatch,
                reason: format!("required field `{}` missing", field),
                status_code: Some(response.status),
                response_time_ms: response.response_time_ms,
            });
        }
    }

    let mut warnings = Vec::new();
    let content = map_content(pattern, &parsed, &body, fallback_title, &mut warnings);

    if content.text.len() < pattern.validation.min_content_length {
        return Err(ApplyFailure {
            category: FailureCategory::Empty,
            reason: format!(
                "content {} chars below minimum {}",
                content.text.len(),
                pattern.validation.min_content_length
            ),
            status_code: Some(response.status),
            response_time_ms: response.response_time_ms,
        });
    }

    debug!(pattern = %pattern.id, endpoint, chars = content.text.len(), "pattern applied");

    Ok(AppliedPattern {
        content,
        api_url: endpoint.to_string(),
        final_url: response.final_url.to_string(),
        status: response.status,
        response_time_ms: response.response_time_ms,
        warnings,
    })
}

fn parse_body(body: &str, format: ResponseFormat) -> Result<Value, String> {
    match format {
        ResponseFormat::Json => {
            serde_json::from_str(body).map_err(|e| format!("invalid json: {}", e))
        }
        ResponseFormat::Xml => {
            let title = XML_TITLE_RE.captures(body).map(|c| c[1].trim().to_string());
            let description = XML_DESC_RE.captures(body).map(|c| c[1].trim().to_string());
            if title.is_none() && description.is_none() {
                return Err("no recognizable xml fields".into());
            }
            Ok(serde_json::json!({ "title": title, "description": description }))
        }
        ResponseFormat::Text | ResponseFormat::Html => Ok(Value::String(body.to_string())),
    }
}

fn map_content(
    pattern: &LearnedPattern,
    parsed: &Value,
    raw_body: &str,
    fallback_title: Option<&str>,
    warnings: &mut Vec<String>,
) -> ExtractedContent {
    let mapping = &pattern.content_mapping;

    let title = if mapping.title.is_empty() {
        None
    } else {
        dotted_path::lookup_string(parsed, &mapping.title)
    };
    let title = match title.or_else(|| fallback_title.map(str::to_string)) {
        Some(t) => t,
        None => {
            // Missing title is a warning, never invalidation.
            warnings.push("no title resolved from mapping or page".to_string());
            String::new()
        }
    };

    let description = mapping
        .description
        .as_deref()
        .and_then(|path| dotted_path::lookup_string(parsed, path));
    let body = mapping
        .body
        .as_deref()
        .and_then(|path| dotted_path::lookup_string(parsed, path));

    // Body, else description, else the raw payload for text-ish formats.
    let main = body.clone().or_else(|| description.clone()).unwrap_or_else(|| {
        match pattern.response_format {
            ResponseFormat::Text | ResponseFormat::Html => raw_body.to_string(),
            _ => String::new(),
        }
    });

    let (text, markdown) = if HTML_TAG_RE.is_match(&main) {
        (html_to_text(&main), html_to_markdown(&main))
    } else {
        (normalize_text(&main), main.clone())
    };

    // Markdown keeps the description as a lead paragraph when it isn't
    // already the body.
    let markdown = match (&description, &body) {
        (Some(d), Some(_)) if !markdown.contains(d.as_str()) => {
            format!("{}\n\n{}", d, markdown)
        }
        _ => markdown,
    };

    let structured = match pattern.response_format {
        ResponseFormat::Json => Some(parsed.clone()),
        _ => None,
    };

    ExtractedContent { title, text, markdown, structured }
}
