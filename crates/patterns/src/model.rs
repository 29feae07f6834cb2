use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use siphon_core::{FailureCategory, HttpMethod, ResponseFormat};

/// A generalized, replayable recipe for extracting content from a family of
/// URLs. Persisted as pretty JSON under `patterns/<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedPattern {
    /// `<source>:<domain>:<opaque>`; stable across restarts.
    pub id: String,
    pub template_type: TemplateType,
    /// Ordered regexes matching candidate URLs; validated at registration.
    pub url_patterns: Vec<String>,
    /// URL template with `{name}` placeholders filled from extractors.
    pub endpoint_template: String,
    #[serde(default)]
    pub extractors: Vec<VariableExtractor>,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub response_format: ResponseFormat,
    pub content_mapping: ContentMapping,
    #[serde(default)]
    pub validation: PatternValidation,
    pub metrics: PatternMetrics,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TemplateType {
    RestResource,
    QueryApi,
    RssFeed,
    RestListing,
    Graphql,
    Openapi,
    Custom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableExtractor {
    pub name: String,
    pub source: VariableSource,
    /// Regex with at least `group` capture groups.
    pub pattern: String,
    #[serde(default = "default_group")]
    pub group: usize,
    #[serde(default)]
    pub transform: Transform,
    /// Which header to read when `source` is `header`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_name: Option<String>,
}

fn default_group() -> usize {
    1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableSource {
    Path,
    Query,
    Host,
    Hash,
    Header,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transform {
    #[default]
    None,
    Lowercase,
    Uppercase,
    Urlencode,
    Urldecode,
}

/// Dotted paths into the parsed response. An empty title path is legal; the
/// application then falls back to `<title>` / `og:title` / first H1.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentMapping {
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternValidation {
    #[serde(default)]
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub min_content_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternMetrics {
    pub success_count: u64,
    pub failure_count: u64,
    /// Stored decayed value; recomputed on every metric update.
    pub confidence: f64,
    #[serde(default)]
    pub domains: Vec<String>,
    /// Epoch ms of the most recent success; 0 when never succeeded.
    #[serde(default)]
    pub last_success: i64,
    #[serde(default)]
    pub avg_response_ms: f64,
}

impl PatternMetrics {
    pub fn seed(success_count: u64, confidence: f64) -> Self {
        Self {
            success_count,
            failure_count: 0,
            confidence,
            domains: Vec::new(),
            last_success: siphon_core::now_ms(),
            avg_response_ms: 0.0,
        }
    }

    /// `raw = k / (k + m)`, 0 when unobserved.
    pub fn raw_confidence(&self) -> f64 {
        let total = self.success_count + self.failure_count;
        if total == 0 {
            return 0.0;
        }
        self.success_count as f64 / total as f64
    }

    /// Decayed confidence: `raw * exp(-lambda * days_since_last_success)`.
    pub fn decayed_confidence(&self, lambda: f64, now_ms: i64) -> f64 {
        let raw = self.raw_confidence();
        if self.last_success <= 0 {
            return raw;
        }
        let days = siphon_core::days_between(self.last_success, now_ms).max(0.0);
        raw * (-lambda * days).exp()
    }
}

/// One recorded failure; ring-buffered per `(domain, category)` and persisted
/// under `failures/<domain>/<category>/<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub id: String,
    pub domain: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    pub category: FailureCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    pub reason: String,
    pub timestamp: i64,
    pub response_time_ms: u64,
}

/// Domain-scoped suppression rule derived from recurrent failures. At most
/// one active per `(domain, category)`; a newer one replaces the older.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AntiPattern {
    pub id: String,
    pub failure_category: FailureCategory,
    pub domains: Vec<String>,
    /// Empty means "any URL on these domains".
    #[serde(default)]
    pub url_patterns: Vec<String>,
    pub recommended_action: RecommendedAction,
    pub reason: String,
    pub suppression_duration_ms: i64,
    pub created_at: i64,
    /// 0 = permanent.
    pub expires_at: i64,
}

impl AntiPattern {
    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at != 0 && self.expires_at < now_ms
    }

    /// Permanent skip-domain rules short-circuit the whole orchestrator.
    pub fn is_decisive(&self) -> bool {
        self.recommended_action == RecommendedAction::SkipDomain && self.expires_at == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedAction {
    None,
    Retry,
    Backoff,
    SkipDomain,
    IncreaseTimeout,
}

/// Suppression policy per failure category: action and window.
pub fn suppression_for(category: FailureCategory) -> (RecommendedAction, i64) {
    match category {
        FailureCategory::RateLimited => (RecommendedAction::Backoff, 60_000),
        FailureCategory::Timeout => (RecommendedAction::Retry, 5_000),
        FailureCategory::ServerError => (RecommendedAction::Backoff, 10_000),
        FailureCategory::AuthRequired => (RecommendedAction::None, 3_600_000),
        FailureCategory::WrongEndpoint => (RecommendedAction::SkipDomain, 3_600_000),
        FailureCategory::Blocked => (RecommendedAction::SkipDomain, 24 * 3_600_000),
        FailureCategory::SchemaMismatch => (RecommendedAction::SkipDomain, 0),
        _ => (RecommendedAction::None, 300_000),
    }
}

/// `<source>:<domain>:<opaque>` where the opaque part hashes the template.
pub fn pattern_id(source: &str, domain: &str, template: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(template.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("{}:{}:{}", source, domain, &digest[..12])
}

pub fn anti_pattern_id(domain: &str, category: FailureCategory) -> String {
    format!("anti:{}:{}", domain, category)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_raw_and_decay() {
        let mut metrics = PatternMetrics::seed(1, 0.5);
        metrics.failure_count = 1;
        assert!((metrics.raw_confidence() - 0.5).abs() < 1e-9);

        // Invariant: confidence = raw * exp(-lambda * days).
        let now = metrics.last_success + 2 * 86_400_000;
        let expected = 0.5 * (-0.05f64 * 2.0).exp();
        assert!((metrics.decayed_confidence(0.05, now) - expected).abs() < 1e-9);
    }

    #[test]
    fn ids_are_stable() {
        let a = pattern_id("openapi", "example.com", "https://example.com/users/{id}");
        let b = pattern_id("openapi", "example.com", "https://example.com/users/{id}");
        assert_eq!(a, b);
        assert!(a.starts_with("openapi:example.com:"));
    }

    #[test]
    fn suppression_table() {
        assert_eq!(
            suppression_for(FailureCategory::RateLimited),
            (RecommendedAction::Backoff, 60_000)
        );
        assert_eq!(
            suppression_for(FailureCategory::SchemaMismatch),
            (RecommendedAction::SkipDomain, 0)
        );
        assert_eq!(
            suppression_for(FailureCategory::Blocked),
            (RecommendedAction::SkipDomain, 86_400_000)
        );
        assert_eq!(
            suppression_for(FailureCategory::Unknown),
            (RecommendedAction::None, 300_000)
        );
    }

    #[test]
    fn anti_pattern_expiry() {
        let ap = AntiPattern {
            id: "anti:x:timeout".into(),
            failure_category: FailureCategory::Timeout,
            domains: vec!["x.com".into()],
            url_patterns: vec![],
            recommended_action: RecommendedAction::Retry,
            reason: "test".into(),
            suppression_duration_ms: 5000,
            created_at: 1000,
            expires_at: 6000,
        };
        assert!(!ap.is_expired(5999));
        assert!(ap.is_expired(6001));

        let permanent = AntiPattern { expires_at: 0, ..ap };
        assert!(!permanent.is_expired(i64::MAX));
    }

    #[test]
    fn pattern_serializes_camel_case() {
        let metrics = PatternMetrics::seed(1, 0.5);
        let json = serde_json::to_value(&metrics).unwrap();
        assert!(json.get("successCount").is_some());
        assert!(json.get("avgResponseMs").is_some());
    }
}
