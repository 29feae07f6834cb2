//! Content heuristics over arbitrary JSON payloads (framework state,
//! predicted API responses, GraphQL data).

use serde_json::Value;

use siphon_core::ExtractedContent;
use siphon_parse::markdown::{html_to_markdown, html_to_text, normalize_text};

const TITLE_KEYS: &[&str] = &["title", "name", "headline", "subject"];
const BODY_KEYS: &[&str] = &[
    "body", "content", "text", "articleBody", "body_markdown", "selftext", "description",
    "summary", "extract",
];
const MAX_DEPTH: usize = 4;

fn collect_strings<'v>(value: &'v Value, depth: usize, out: &mut Vec<(String, &'v str)>) {
    if depth > MAX_DEPTH {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if let Value::String(s) = child {
                    out.push((key.clone(), s.as_str()));
                } else {
                    collect_strings(child, depth + 1, out);
                }
            }
        }
        Value::Array(items) => {
            for child in items.iter().take(25) {
                collect_strings(child, depth + 1, out);
            }
        }
        _ => {}
    }
}

fn looks_like_html(s: &str) -> bool {
    s.contains('<') && s.contains('>')
}

/// Best-effort title + body from a JSON payload. None when the payload has
/// no plausible human text.
pub fn content_from_json(value: &Value) -> Option<ExtractedContent> {
    let mut strings = Vec::new();
    collect_strings(value, 0, &mut strings);
    if strings.is_empty() {
        return None;
    }

    let title = TITLE_KEYS
        .iter()
        .find_map(|key| {
            strings
                .iter()
                .find(|(k, v)| k == key && !v.trim().is_empty() && v.len() < 300)
                .map(|(_, v)| v.to_string())
        })
        .unwrap_or_default();

    // Prefer a conventional body key; fall back to the longest string.
    let body = BODY_KEYS
        .iter()
        .filter_map(|key| {
            strings
                .iter()
                .filter(|(k, _)| k == key)
                .max_by_key(|(_, v)| v.len())
        })
        .max_by_key(|(_, v)| v.len())
        .map(|(_, v)| *v)
        .or_else(|| {
            strings
                .iter()
                .filter(|(_, v)| v.len() > 80)
                .max_by_key(|(_, v)| v.len())
                .map(|(_, v)| *v)
        })?;

    let (text, markdown) = if looks_like_html(body) {
        (html_to_text(body), html_to_markdown(body))
    } else {
        (normalize_text(body), body.to_string())
    };
    if text.is_empty() {
        return None;
    }

    Some(ExtractedContent {
        title,
        text,
        markdown,
        structured: Some(value.clone()),
    })
}
