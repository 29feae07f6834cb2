//! Learned-pattern generation from a parsed OpenAPI spec. Provider-declared
//! contracts get high seed trust (confidence 0.9, success count 100).

use serde_json::Value;
use tracing::debug;
use url::Url;

use siphon_core::domain::registrable_domain_of_host;
use siphon_core::{now_ms, HttpMethod, ResponseFormat};
use siphon_patterns::{
    ContentMapping, LearnedPattern, PatternMetrics, PatternValidation, TemplateType, Transform,
    VariableExtractor, VariableSource,
};
use siphon_patterns::model::pattern_id;

use crate::openapi::{OpenApiEndpoint, ParsedOpenApiSpec};

pub const MAX_ENDPOINTS_PER_SPEC: usize = 50;
const MAX_REQUIRED_PARAMS: usize = 3;
const MAX_REQUIRED_FIELDS: usize = 5;
const GENERATED_MIN_CONTENT: usize = 20;

const TITLE_KEYS: &[&str] = &["title", "name", "subject"];
const DESCRIPTION_KEYS: &[&str] = &["description", "summary", "excerpt"];
const BODY_KEYS: &[&str] = &["body", "content", "text"];

#[derive(Debug, Default)]
pub struct GeneratedPatterns {
    pub patterns: Vec<LearnedPattern>,
    pub warnings: Vec<String>,
}

/// Convert every usable endpoint into a replayable pattern, bounded by
/// `MAX_ENDPOINTS_PER_SPEC`. Skip rules mirror what can actually be replayed
/// without caller input.
pub fn patterns_from_spec(spec: &ParsedOpenApiSpec) -> GeneratedPatterns {
    let mut out = GeneratedPatterns::default();
    let Ok(base) = Url::parse(&spec.base_url) else {
        out.warnings.push(format!("unusable base url `{}`", spec.base_url));
        return out;
    };
    let domain = registrable_domain_of_host(base.host_str().unwrap_or("unknown"));

    let mut kept = 0usize;
    for endpoint in &spec.endpoints {
        if kept >= MAX_ENDPOINTS_PER_SPEC {
            out.warnings.push(format!(
                "endpoint cap reached; dropped {} {} and any after it",
                endpoint.method, endpoint.path
            ));
            break;
        }
        let Some(method) = map_method(&endpoint.method) else {
            continue;
        };
        if endpoint.deprecated {
            continue;
        }
        let required_non_header = endpoint
            .parameters
            .iter()
            .filter(|p| p.required && p.location != "header")
            .count();
        if matches!(method, HttpMethod::Get | HttpMethod::Delete)
            && required_non_header > MAX_REQUIRED_PARAMS
        {
            debug!(path = %endpoint.path, "skipped: too many required parameters");
            continue;
        }
        if matches!(method, HttpMethod::Post | HttpMethod::Put) && endpoint.request_body.is_none() {
            debug!(path = %endpoint.path, "skipped: mutation without request body");
            continue;
        }

        out.patterns.push(pattern_for_endpoint(spec, &base, &domain, endpoint, method));
        kept += 1;
    }
    out
}

fn map_method(method: &str) -> Option<HttpMethod> {
    match method {
        "GET" => Some(HttpMethod::Get),
        "POST" => Some(HttpMethod::Post),
        "PUT" => Some(HttpMethod::Put),
        "DELETE" => Some(HttpMethod::Delete),
        _ => None,
    }
}

fn pattern_for_endpoint(
    spec: &ParsedOpenApiSpec,
    base: &Url,
    domain: &str,
    endpoint: &OpenApiEndpoint,
    method: HttpMethod,
) -> LearnedPattern {
    let placeholders = path_placeholders(&endpoint.path);
    let endpoint_template = format!("{}{}", spec.base_url, endpoint.path);
    let url_pattern = endpoint_url_pattern(base, &endpoint.path);
    let extractors = placeholders
        .iter()
        .map(|name| VariableExtractor {
            name: name.clone(),
            source: VariableSource::Path,
            pattern: extractor_regex(&endpoint.path, name),
            group: 1,
            transform: Transform::None,
            header_name: None,
        })
        .collect();

    let success_schema = endpoint
        .responses
        .iter()
        .find(|r| r.status == 200 || r.status == 201)
        .and_then(|r| r.schema.as_ref());
    let (content_mapping, required_fields) = mapping_from_schema(success_schema);

    let now = now_ms();
    LearnedPattern {
        id: pattern_id("openapi", domain, &format!("{} {}", endpoint.method, endpoint_template)),
        template_type: TemplateType::Openapi,
        url_patterns: vec![url_pattern],
        endpoint_template,
        extractors,
        method,
        headers: Default::default(),
        response_format: ResponseFormat::Json,
        content_mapping,
        validation: PatternValidation {
            required_fields,
            min_content_length: GENERATED_MIN_CONTENT,
        },
        metrics: PatternMetrics {
            domains: vec![domain.to_string()],
            ..PatternMetrics::seed(100, 0.9)
        },
        created_at: now,
        updated_at: now,
    }
}

fn path_placeholders(path: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = path;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else { break };
        let name = &rest[open + 1..open + close];
        if !name.is_empty() {
            names.push(name.to_string());
        }
        rest = &rest[open + close + 1..];
    }
    names
}

/// `{p}` placeholders become `[^/]+`; host and static segments are escaped.
fn endpoint_url_pattern(base: &Url, path: &str) -> String {
    let authority = format!(
        "{}{}",
        base.host_str().unwrap_or(""),
        base.port().map(|p| format!(":{}", p)).unwrap_or_default()
    );
    let host = regex::escape(&authority);
    let base_path = regex::escape(base.path().trim_end_matches('/'));
    let mut pattern = String::new();
    for segment in path.split('/') {
        if segment.is_empty() {
            continue;
        }
        pattern.push('/');
        if segment.starts_with('{') && segment.ends_with('}') {
            pattern.push_str("[^/]+");
        } else {
            pattern.push_str(&regex::escape(segment));
        }
    }
    format!("^https?://{}{}{}(?:\\?.*)?$", host, base_path, pattern)
}

/// Path regex capturing one placeholder; sibling placeholders match loosely.
/// Unanchored so a server base path ahead of it doesn't matter.
fn extractor_regex(path: &str, target: &str) -> String {
    let mut out = String::new();
    for segment in path.split('/') {
        if segment.is_empty() {
            continue;
        }
        out.push('/');
        if segment == format!("{{{}}}", target) {
            out.push_str("([^/]+)");
        } else if segment.starts_with('{') && segment.ends_with('}') {
            out.push_str("[^/]+");
        } else {
            out.push_str(&regex::escape(segment));
        }
    }
    out
}

/// Content mapping from the success-response schema's property names, and the
/// schema's top required fields as the validation contract.
fn mapping_from_schema(schema: Option<&Value>) -> (ContentMapping, Vec<String>) {
    let Some(schema) = schema else {
        return (ContentMapping::default(), Vec::new());
    };
    let properties = schema["properties"].as_object();
    let pick = |keys: &[&str]| {
        properties.and_then(|props| {
            keys.iter().find(|k| props.contains_key(**k)).map(|k| k.to_string())
        })
    };
    let mapping = ContentMapping {
        title: pick(TITLE_KEYS).unwrap_or_default(),
        description: pick(DESCRIPTION_KEYS),
        body: pick(BODY_KEYS),
    };
    let required_fields = schema["required"]
        .as_array()
        .map(|req| {
            req.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .take(MAX_REQUIRED_FIELDS)
                .collect()
        })
        .unwrap_or_default();
    (mapping, required_fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openapi::parse_spec;
    use serde_json::json;

    fn spec_with_paths(paths: Value) -> ParsedOpenApiSpec {
        let text = json!({
            "openapi": "3.0.0",
            "info": {"title": "T"},
            "servers": [{"url": "https://api.example.com"}],
            "paths": paths
        })
        .to_string();
        parse_spec(&text, "https://api.example.com/openapi.json").unwrap()
    }

    fn user_get_op() -> Value {
        json!({
            "get": {
                "parameters": [{"name": "id", "in": "path", "required": true,
                                "schema": {"type": "integer"}}],
                "responses": {"200": {"content": {"application/json": {"schema": {
                    "type": "object",
                    "required": ["id", "name", "email"],
                    "properties": {
                        "id": {"type": "integer"},
                        "name": {"type": "string"},
                        "email": {"type": "string"},
                        "description": {"type": "string"}
                    }
                }}}}}
            }
        })
    }

    #[test]
    fn generates_pattern_with_extractor_and_mapping() {
        let spec = spec_with_paths(json!({"/users/{id}": user_get_op()}));
        let generated = patterns_from_spec(&spec);
        assert_eq!(generated.patterns.len(), 1);

        let p = &generated.patterns[0];
        assert_eq!(p.endpoint_template, "https://api.example.com/users/{id}");
        assert_eq!(p.template_type, TemplateType::Openapi);
        assert_eq!(p.metrics.success_count, 100);
        assert!((p.metrics.confidence - 0.9).abs() < 1e-9);
        assert_eq!(p.content_mapping.title, "name");
        assert_eq!(p.content_mapping.description.as_deref(), Some("description"));
        assert_eq!(p.validation.required_fields, vec!["id", "name", "email"]);

        let re = regex::Regex::new(&p.url_patterns[0]).unwrap();
        assert!(re.is_match("https://api.example.com/users/123"));
        assert!(!re.is_match("https://api.example.com/users/123/posts"));

        assert_eq!(p.extractors[0].pattern, "/users/([^/]+)");
    }

    #[test]
    fn deprecated_and_overloaded_endpoints_skipped() {
        let spec = spec_with_paths(json!({
            "/old/{id}": {"get": {"deprecated": true, "responses": {}}},
            "/search": {"get": {
                "parameters": [
                    {"name": "a", "in": "query", "required": true, "schema": {"type": "string"}},
                    {"name": "b", "in": "query", "required": true, "schema": {"type": "string"}},
                    {"name": "c", "in": "query", "required": true, "schema": {"type": "string"}},
                    {"name": "d", "in": "query", "required": true, "schema": {"type": "string"}}
                ],
                "responses": {}
            }},
            "/posts": {"post": {"responses": {}}}
        }));
        let generated = patterns_from_spec(&spec);
        assert!(generated.patterns.is_empty());
    }

    #[test]
    fn endpoint_cap_emits_warning() {
        let mut paths = serde_json::Map::new();
        for i in 0..(MAX_ENDPOINTS_PER_SPEC + 1) {
            paths.insert(format!("/items{}/{{id}}", i), user_get_op());
        }
        let spec = spec_with_paths(Value::Object(paths));
        let generated = patterns_from_spec(&spec);
        assert_eq!(generated.patterns.len(), MAX_ENDPOINTS_PER_SPEC);
        assert_eq!(generated.warnings.len(), 1);
        assert!(generated.warnings[0].contains("cap"));
    }

    #[test]
    fn base_path_included_in_url_pattern() {
        let text = json!({
            "openapi": "3.0.0",
            "info": {"title": "T"},
            "servers": [{"url": "https://api.example.com/v2"}],
            "paths": {"/users/{id}": user_get_op()}
        })
        .to_string();
        let spec = parse_spec(&text, "https://api.example.com/openapi.json").unwrap();
        let generated = patterns_from_spec(&spec);
        let re = regex::Regex::new(&generated.patterns[0].url_patterns[0]).unwrap();
        assert!(re.is_match("https://api.example.com/v2/users/9"));
        assert!(!re.is_match("https://api.example.com/users/9"));
    }
}
