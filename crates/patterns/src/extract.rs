//! Variable-extractor semantics: pull named values out of a URL (or request
//! context) and expand them into an endpoint template.

use std::collections::HashMap;

use regex::Regex;
use url::Url;

use crate::model::{Transform, VariableExtractor, VariableSource};

/// Why a single extractor produced nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractorOutcome {
    Value(String),
    /// Source absent on this URL (no query, no fragment, ...). Skipped, not
    /// an error.
    SourceMissing,
    /// Regex did not match, matched an empty string, or the group index is
    /// out of range. Fatal when the extractor feeds the endpoint template.
    Failed(String),
}

/// Request-side context available to `header`/`body` sources.
#[derive(Debug, Default)]
pub struct ExtractorContext<'a> {
    pub headers: Option<&'a HashMap<String, String>>,
    pub body: Option<&'a str>,
}

fn source_text<'a>(
    extractor: &VariableExtractor,
    url: &'a Url,
    ctx: &'a ExtractorContext<'a>,
) -> Option<String> {
    match extractor.source {
        VariableSource::Path => Some(url.path().to_string()),
        VariableSource::Query => url.query().map(str::to_string),
        VariableSource::Host => url.host_str().map(str::to_string),
        VariableSource::Hash => url.fragment().map(str::to_string),
        VariableSource::Header => {
            let name = extractor.header_name.as_deref()?;
            ctx.headers?.get(&name.to_ascii_lowercase()).cloned()
        }
        VariableSource::Body => ctx.body.map(str::to_string),
    }
}

fn apply_transform(value: &str, transform: Transform) -> String {
    match transform {
        Transform::None => value.to_string(),
        Transform::Lowercase => value.to_lowercase(),
        Transform::Uppercase => value.to_uppercase(),
        Transform::Urlencode => {
            let mut out = String::new();
            for byte in value.bytes() {
                match byte {
                    b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                        out.push(byte as char)
                    }
                    _ => out.push_str(&format!("%{:02X}", byte)),
                }
            }
            out
        }
        Transform::Urldecode => {
            let mut out = Vec::new();
            let bytes = value.as_bytes();
            let mut i = 0;
            while i < bytes.len() {
                if bytes[i] == b'%' && i + 3 <= bytes.len() {
                    if let Some(hex) = value.get(i + 1..i + 3) {
                        if let Ok(b) = u8::from_str_radix(hex, 16) {
                            out.push(b);
                            i += 3;
                            continue;
                        }
                    }
                }
                out.push(bytes[i]);
                i += 1;
            }
            String::from_utf8_lossy(&out).into_owned()
        }
    }
}

pub fn run_extractor(
    extractor: &VariableExtractor,
    url: &Url,
    ctx: &ExtractorContext<'_>,
) -> ExtractorOutcome {
    let Some(text) = source_text(extractor, url, ctx) else {
        return ExtractorOutcome::SourceMissing;
    };
    let regex = match Regex::new(&extractor.pattern) {
        Ok(r) => r,
        Err(e) => return ExtractorOutcome::Failed(format!("invalid regex: {}", e)),
    };
    let Some(caps) = regex.captures(&text) else {
        return ExtractorOutcome::Failed(format!("no match for `{}`", extractor.pattern));
    };
    let Some(group) = caps.get(extractor.group) else {
        return ExtractorOutcome::Failed(format!("group {} out of range", extractor.group));
    };
    let value = apply_transform(group.as_str(), extractor.transform);
    if value.is_empty() {
        return ExtractorOutcome::Failed("empty extraction".into());
    }
    ExtractorOutcome::Value(value)
}

/// Placeholder names referenced by a `{name}` template.
pub fn template_placeholders(template: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}') else { break };
        let name = &rest[open + 1..open + close];
        if !name.is_empty() && !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        rest = &rest[open + close + 1..];
    }
    names
}

/// Run every extractor and expand the endpoint template. A failed or missing
/// extractor that the template references aborts with its reason; unused
/// extractors fail soft.
pub fn expand_endpoint(
    template: &str,
    extractors: &[VariableExtractor],
    url: &Url,
    ctx: &ExtractorContext<'_>,
) -> Result<String, String> {
    let required = template_placeholders(template);
    let mut values: HashMap<String, String> = HashMap::new();

    for extractor in extractors {
        match run_extractor(extractor, url, ctx) {
            ExtractorOutcome::Value(v) => {
                values.insert(extractor.name.clone(), v);
            }
            ExtractorOutcome::SourceMissing => {}
            ExtractorOutcome::Failed(reason) => {
                if required.iter().any(|r| r == &extractor.name) {
                    return Err(format!("extractor `{}`: {}", extractor.name, reason));
                }
            }
        }
    }

    let mut endpoint = template.to_string();
    for name in &required {
        match values.get(name) {
            Some(v) => endpoint = endpoint.replace(&format!("{{{}}}", name), v),
            None => return Err(format!("no value for placeholder `{}`", name)),
        }
    }
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path_extractor(name: &str, pattern: &str) -> VariableExtractor {
        VariableExtractor {
            name: name.into(),
            source: VariableSource::Path,
            pattern: pattern.into(),
            group: 1,
            transform: Transform::None,
            header_name: None,
        }
    }

    #[test]
    fn path_extraction_and_expansion() {
        let url = Url::parse("https://example.com/users/123").unwrap();
        let extractors = vec![path_extractor("id", r"/users/(\d+)")];
        let endpoint = expand_endpoint(
            "https://api.example.com/v1/users/{id}",
            &extractors,
            &url,
            &ExtractorContext::default(),
        )
        .unwrap();
        assert_eq!(endpoint, "https://api.example.com/v1/users/123");
    }

    #[test]
    fn missing_source_is_skip_but_required_aborts() {
        // No query string on the URL: source lookup fails, extractor skipped.
        let url = Url::parse("https://example.com/users/123").unwrap();
        let extractors = vec![VariableExtractor {
            name: "q".into(),
            source: VariableSource::Query,
            pattern: "q=([^&]+)".into(),
            group: 1,
            transform: Transform::None,
            header_name: None,
        }];
        // Unused by the template: expansion succeeds.
        let ok = expand_endpoint("https://api.example.com/static", &extractors, &url, &ExtractorContext::default());
        assert!(ok.is_ok());
        // Referenced by the template: abandon.
        let err = expand_endpoint("https://api.example.com/search/{q}", &extractors, &url, &ExtractorContext::default());
        assert!(err.is_err());
    }

    #[test]
    fn regex_miss_on_required_aborts() {
        let url = Url::parse("https://example.com/about").unwrap();
        let extractors = vec![path_extractor("id", r"/users/(\d+)")];
        let err = expand_endpoint("https://api.example.com/users/{id}", &extractors, &url, &ExtractorContext::default());
        assert!(err.unwrap_err().contains("no match"));
    }

    #[test]
    fn transforms() {
        assert_eq!(apply_transform("AbC", Transform::Lowercase), "abc");
        assert_eq!(apply_transform("AbC", Transform::Uppercase), "ABC");
        assert_eq!(apply_transform("a b/c", Transform::Urlencode), "a%20b%2Fc");
        assert_eq!(apply_transform("a%20b%2Fc", Transform::Urldecode), "a b/c");
    }

    #[test]
    fn header_source() {
        let url = Url::parse("https://example.com/x").unwrap();
        let mut headers = HashMap::new();
        headers.insert("x-request-id".to_string(), "abc-123".to_string());
        let ctx = ExtractorContext { headers: Some(&headers), body: None };
        let extractor = VariableExtractor {
            name: "rid".into(),
            source: VariableSource::Header,
            pattern: "([a-z]+)-(\\d+)".into(),
            group: 2,
            transform: Transform::None,
            header_name: Some("X-Request-Id".into()),
        };
        assert_eq!(run_extractor(&extractor, &url, &ctx), ExtractorOutcome::Value("123".into()));
    }

    #[test]
    fn placeholder_parsing() {
        assert_eq!(
            template_placeholders("https://x/{a}/y/{b}?z={a}"),
            vec!["a".to_string(), "b".to_string()]
        );
    }
}
