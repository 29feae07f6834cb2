//! Turning one observed success into a replayable pattern: generalize the
//! page URL, templatize the API URL it used, and wire extractors between the
//! two.

use std::collections::HashMap;

use tracing::debug;
use url::Url;

use siphon_core::domain::registrable_domain;
use siphon_core::generalize::{generalize_url, GeneralizedUrl, Placeholder};
use siphon_core::{now_ms, ExtractError, ExtractionEvent, HttpMethod, ResponseFormat};

use crate::model::{
    pattern_id, ContentMapping, LearnedPattern, PatternMetrics, PatternValidation, TemplateType,
    VariableExtractor, VariableSource,
};
use crate::registry::PatternRegistry;

const TITLE_KEYS: &[&str] = &["title", "name", "subject"];
const DESCRIPTION_KEYS: &[&str] = &["description", "summary", "excerpt"];
const BODY_KEYS: &[&str] = &["body", "content", "text"];
const LEARNED_MIN_CONTENT: usize = 20;

impl PatternRegistry {
    /// Consume an `extraction-success` event. Idempotent on the derived
    /// pattern id: a repeat success bumps metrics instead of re-learning.
    pub async fn learn_from_extraction(
        &self,
        event: &ExtractionEvent,
    ) -> Result<Option<String>, ExtractError> {
        let source_url = Url::parse(&event.source_url)
            .map_err(|e| ExtractError::InvalidUrl(e.to_string()))?;
        let api_url = Url::parse(&event.api_url)
            .map_err(|e| ExtractError::InvalidUrl(e.to_string()))?;
        let domain = registrable_domain(&source_url);

        // A pattern that already replays this exact endpoint gets the credit
        // instead of spawning a near-duplicate.
        let existing = self.match_url(&source_url).await;
        if let Some(hit) = existing
            .candidates
            .iter()
            .find(|c| c.api_endpoint == event.api_url)
        {
            self.record_pattern_success(&hit.pattern.id, &domain, &event.api_url, event.response_time_ms)
                .await?;
            return Ok(Some(hit.pattern.id.clone()));
        }

        let generalized_source = generalize_url(&source_url);
        let (endpoint_template, extractors) =
            templatize_api_url(&api_url, &generalized_source);

        let source_name = event.strategy.strip_prefix("api:").unwrap_or("learned");
        let id = pattern_id(source_name, &domain, &endpoint_template);

        if self.pattern(&id).is_some() {
            self.record_pattern_success(&id, &domain, &event.api_url, event.response_time_ms)
                .await?;
            return Ok(Some(id));
        }

        let template_type = classify_template(event, &api_url, &generalized_source);
        let response_format = match template_type {
            TemplateType::RssFeed => ResponseFormat::Xml,
            _ => ResponseFormat::Json,
        };
        let content_mapping = derive_mapping(event);
        let required_fields = if content_mapping.title.is_empty() {
            Vec::new()
        } else {
            vec![content_mapping.title.clone()]
        };

        let now = now_ms();
        let pattern = LearnedPattern {
            id: id.clone(),
            template_type,
            url_patterns: vec![source_url_pattern(&source_url, &generalized_source)],
            endpoint_template,
            extractors,
            method: event.method,
            headers: event.headers.clone().unwrap_or_default(),
            response_format,
            content_mapping,
            validation: PatternValidation {
                required_fields,
                min_content_length: LEARNED_MIN_CONTENT,
            },
            metrics: PatternMetrics {
                domains: vec![domain.clone()],
                ..PatternMetrics::seed(1, 0.5)
            },
            created_at: now,
            updated_at: now,
        };
        debug!(id = %id, template_type = ?pattern.template_type, "learned new pattern");
        self.register(pattern).await?;
        Ok(Some(id))
    }
}

/// Anchored regex matching the family of source URLs this pattern covers.
fn source_url_pattern(url: &Url, generalized: &GeneralizedUrl) -> String {
    let authority = format!(
        "{}{}",
        url.host_str().unwrap_or(""),
        url.port().map(|p| format!(":{}", p)).unwrap_or_default()
    );
    let host = regex::escape(&authority);
    let by_index: HashMap<usize, &Placeholder> = generalized
        .placeholders
        .iter()
        .map(|p| (p.segment_index, p))
        .collect();

    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    let mut path = String::new();
    for (i, segment) in segments.iter().enumerate() {
        path.push('/');
        match by_index.get(&i) {
            Some(p) => path.push_str(p.kind.pattern()),
            None => path.push_str(&regex::escape(segment)),
        }
    }
    if path.is_empty() {
        path.push('/');
    }
    format!("^https?://{}{}(?:\\?.*)?$", host, path)
}

/// Swap api-URL segments whose value also appears in the source URL for
/// `{name}` placeholders, and build the path extractors that recover those
/// values. Values the source URL does not carry stay literal.
fn templatize_api_url(
    api_url: &Url,
    source: &GeneralizedUrl,
) -> (String, Vec<VariableExtractor>) {
    let source_by_value: HashMap<&str, &Placeholder> = source
        .placeholders
        .iter()
        .map(|p| (p.observed.as_str(), p))
        .collect();

    let generalized_api = generalize_url(api_url);
    let api_by_index: HashMap<usize, &Placeholder> = generalized_api
        .placeholders
        .iter()
        .map(|p| (p.segment_index, p))
        .collect();

    let segments: Vec<&str> = api_url.path_segments().map(|s| s.collect()).unwrap_or_default();
    let mut out_segments: Vec<String> = Vec::new();
    let mut extractors: Vec<VariableExtractor> = Vec::new();

    for (i, segment) in segments.iter().enumerate() {
        match api_by_index.get(&i).and_then(|_| source_by_value.get(segment)) {
            Some(source_placeholder) => {
                out_segments.push(format!("{{{}}}", source_placeholder.name));
                if !extractors.iter().any(|e| e.name == source_placeholder.name) {
                    extractors.push(VariableExtractor {
                        name: source_placeholder.name.clone(),
                        source: VariableSource::Path,
                        pattern: source_path_extractor_regex(source, source_placeholder),
                        group: 1,
                        transform: Default::default(),
                        header_name: None,
                    });
                }
            }
            None => out_segments.push(segment.to_string()),
        }
    }

    let origin = format!(
        "{}://{}{}",
        api_url.scheme(),
        api_url.host_str().unwrap_or(""),
        api_url.port().map(|p| format!(":{}", p)).unwrap_or_default()
    );
    let path = if out_segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", out_segments.join("/"))
    };
    (format!("{}{}", origin, path), extractors)
}

/// Anchored path regex with one capture group at the target placeholder;
/// sibling placeholders match without capturing.
fn source_path_extractor_regex(source: &GeneralizedUrl, target: &Placeholder) -> String {
    let by_index: HashMap<usize, &Placeholder> = source
        .placeholders
        .iter()
        .map(|p| (p.segment_index, p))
        .collect();

    // Reconstruct segment layout from the template (placeholders included).
    let template_path = source
        .template
        .splitn(4, '/')
        .nth(3)
        .map(|p| format!("/{}", p))
        .unwrap_or_else(|| "/".to_string());
    let segments: Vec<&str> = template_path.trim_start_matches('/').split('/').collect();

    let mut out = String::from("^");
    for (i, segment) in segments.iter().enumerate() {
        out.push('/');
        match by_index.get(&i) {
            Some(p) if p.segment_index == target.segment_index => {
                out.push('(');
                out.push_str(p.kind.pattern());
                out.push(')');
            }
            Some(p) => out.push_str(p.kind.pattern()),
            None => out.push_str(&regex::escape(segment)),
        }
    }
    out
}

fn classify_template(
    event: &ExtractionEvent,
    api_url: &Url,
    source: &GeneralizedUrl,
) -> TemplateType {
    let api_path = api_url.path();
    if event.strategy.contains("graphql") || api_path.ends_with("/graphql") {
        return TemplateType::QueryApi;
    }
    if api_path.ends_with(".xml") || api_path.ends_with(".rss") || api_path.ends_with("/feed") {
        return TemplateType::RssFeed;
    }
    match &event.content.structured {
        Some(v) if v.is_array() => TemplateType::RestListing,
        Some(v)
            if v.get("items").map(|i| i.is_array()).unwrap_or(false)
                || v.get("data").map(|d| d.is_array()).unwrap_or(false) =>
        {
            TemplateType::RestListing
        }
        Some(v) if v.is_object() && !source.placeholders.is_empty() => {
            TemplateType::RestResource
        }
        Some(_) => TemplateType::Custom,
        None => {
            if event.method == HttpMethod::Post {
                TemplateType::QueryApi
            } else {
                TemplateType::Custom
            }
        }
    }
}

/// Content mapping by conventional key names at the top level of the
/// structured payload. No structured payload means empty mapping with title
/// fallback at application time.
fn derive_mapping(event: &ExtractionEvent) -> ContentMapping {
    let Some(structured) = &event.content.structured else {
        return ContentMapping::default();
    };
    let Some(obj) = structured.as_object() else {
        return ContentMapping::default();
    };
    let pick = |keys: &[&str]| {
        keys.iter()
            .find(|k| obj.get(**k).map(|v| !v.is_null()).unwrap_or(false))
            .map(|k| k.to_string())
    };
    ContentMapping {
        title: pick(TITLE_KEYS).unwrap_or_default(),
        description: pick(DESCRIPTION_KEYS),
        body: pick(BODY_KEYS),
    }
}
