//! Static API-endpoint mining: find HTTP call sites in script text without
//! executing anything. Feeds the predicted-api strategy.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PredictedEndpoint {
    /// Absolute URL, resolved against the page.
    pub url: String,
    pub method: Option<String>,
    /// Which pattern found it.
    pub source: &'static str,
}

struct MinePattern {
    name: &'static str,
    regex: &'static Lazy<Regex>,
    url_group: usize,
    method_group: Option<usize>,
}

static FETCH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"fetch\s*\(\s*["'`]([^"'`]+)["'`]"#).unwrap());
static FETCH_METHOD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"fetch\s*\(\s*["'`]([^"'`]+)["'`]\s*,\s*\{[^}]*method:\s*["'](\w+)["']"#).unwrap()
});
static AXIOS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"axios\.(\w+)\s*\(\s*["'`]([^"'`]+)["'`]"#).unwrap());
static XHR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\.open\s*\(\s*["'](\w+)["']\s*,\s*["'`]([^"'`]+)["'`]"#).unwrap());
static GRAPHQL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'`](/graphql|/api/graphql|/gql)["'`]"#).unwrap());
static API_CONST_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?:API_URL|API_BASE|ENDPOINT|API_ENDPOINT)\s*[:=]\s*["'`]([^"'`]+)["'`]"#).unwrap()
});
static API_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'`](/api/[A-Za-z0-9_\-/{}$.]+)["'`]"#).unwrap());

static PATTERNS: &[MinePattern] = &[
    MinePattern { name: "fetch_with_method", regex: &FETCH_METHOD_RE, url_group: 1, method_group: Some(2) },
    MinePattern { name: "fetch", regex: &FETCH_RE, url_group: 1, method_group: None },
    MinePattern { name: "axios", regex: &AXIOS_RE, url_group: 2, method_group: Some(1) },
    MinePattern { name: "xhr_open", regex: &XHR_RE, url_group: 2, method_group: Some(1) },
    MinePattern { name: "graphql", regex: &GRAPHQL_RE, url_group: 1, method_group: None },
    MinePattern { name: "api_constant", regex: &API_CONST_RE, url_group: 1, method_group: None },
    MinePattern { name: "api_path", regex: &API_PATH_RE, url_group: 1, method_group: None },
];

/// Template-literal interpolations become `{slot}` placeholders so the
/// predicted-api strategy can substitute values from the page URL.
fn rewrite_template_slots(raw: &str) -> String {
    static SLOT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{[^}]*\}").unwrap());
    SLOT_RE.replace_all(raw, "{slot}").into_owned()
}

/// Mine endpoint candidates from script text. Relative paths resolve against
/// `page_url`; cross-origin absolute URLs are kept as-is.
pub fn mine_endpoints(script_text: &str, page_url: &Url) -> Vec<PredictedEndpoint> {
    let mut seen = HashSet::new();
    let mut found = Vec::new();

    for pattern in PATTERNS {
        for cap in pattern.regex.captures_iter(script_text) {
            let Some(raw) = cap.get(pattern.url_group).map(|m| m.as_str()) else {
                continue;
            };
            let raw = rewrite_template_slots(raw);
            if raw.is_empty() || raw.starts_with("data:") || raw.ends_with(".js") || raw.ends_with(".css") {
                continue;
            }
            let absolute = if raw.starts_with("http://") || raw.starts_with("https://") {
                raw.clone()
            } else if raw.starts_with('/') {
                match page_url.join(&raw) {
                    Ok(u) => u.to_string(),
                    Err(_) => continue,
                }
            } else {
                continue;
            };
            let method = pattern
                .method_group
                .and_then(|g| cap.get(g))
                .map(|m| m.as_str().to_uppercase());

            let endpoint = PredictedEndpoint { url: absolute, method, source: pattern.name };
            if seen.insert(endpoint.clone()) {
                found.push(endpoint);
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mine(script: &str) -> Vec<PredictedEndpoint> {
        mine_endpoints(script, &Url::parse("https://example.com/articles/42").unwrap())
    }

    #[test]
    fn fetch_calls() {
        let found = mine(r#"fetch("/api/article/42").then(r => r.json())"#);
        assert_eq!(found[0].url, "https://example.com/api/article/42");
        assert_eq!(found[0].method, None);
    }

    #[test]
    fn fetch_with_method() {
        let found = mine(r#"fetch("/api/vote", {method: "POST", body: "{}"})"#);
        let post = found.iter().find(|e| e.method.is_some()).unwrap();
        assert_eq!(post.method.as_deref(), Some("POST"));
    }

    #[test]
    fn axios_and_xhr() {
        let found = mine(
            r#"axios.get("/api/users/1"); var x = new XMLHttpRequest(); x.open("PUT", "/api/users/1");"#,
        );
        assert!(found.iter().any(|e| e.method.as_deref() == Some("GET")));
        assert!(found.iter().any(|e| e.method.as_deref() == Some("PUT")));
    }

    #[test]
    fn template_slots_rewritten() {
        let found = mine(r#"fetch(`/api/article/${slug}`)"#);
        assert_eq!(found[0].url, "https://example.com/api/article/{slot}");
    }

    #[test]
    fn graphql_and_assets_filtered() {
        let found = mine(r#"const g = "/graphql"; import("/bundle.js");"#);
        assert!(found.iter().any(|e| e.url.ends_with("/graphql")));
        assert!(!found.iter().any(|e| e.url.ends_with(".js")));
    }
}
