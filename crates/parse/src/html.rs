use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::markdown::{html_to_markdown, normalize_text};

/// Everything the static parser pulls out of one document.
pub struct ParsedHtml {
    pub title: Option<String>,
    pub h1: Vec<String>,
    pub body_text: String,
    pub markdown: String,
    pub links: Vec<String>,
    pub meta_description: Option<String>,
    pub canonical_url: Option<String>,
    pub language: Option<String>,
    pub open_graph: HashMap<String, String>,
    /// Parsed `application/ld+json` blocks, in document order.
    pub json_ld: Vec<Value>,
    pub framework: Option<FrameworkPayload>,
    /// Inline script text, kept for API-endpoint mining.
    pub script_text: String,
    pub script_srcs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framework {
    Next,
    Nuxt,
    Gatsby,
    Remix,
    Angular,
    Vitepress,
    Vuepress,
}

impl Framework {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Next => "next",
            Self::Nuxt => "nuxt",
            Self::Gatsby => "gatsby",
            Self::Remix => "remix",
            Self::Angular => "angular",
            Self::Vitepress => "vitepress",
            Self::Vuepress => "vuepress",
        }
    }
}

/// A server-rendered data payload embedded by a frontend framework.
#[derive(Debug, Clone)]
pub struct FrameworkPayload {
    pub framework: Framework,
    pub data: Value,
}

fn selector(s: &str) -> Option<Selector> {
    Selector::parse(s).ok()
}

pub fn parse_html(html_str: &str, base_url: &Url) -> ParsedHtml {
    let document = Html::parse_document(html_str);

    let title = selector("title")
        .and_then(|s| document.select(&s).next())
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty());

    let h1 = selector("h1")
        .map(|s| {
            document
                .select(&s)
                .map(|el| el.text().collect::<String>().trim().to_string())
                .filter(|t| !t.is_empty())
                .collect()
        })
        .unwrap_or_default();

    let body_text = selector("body")
        .and_then(|s| document.select(&s).next())
        .map(|el| normalize_text(&el.text().collect::<Vec<_>>().join(" ")))
        .unwrap_or_default();

    // Prefer the main content region for markdown when one exists.
    let content_html = ["article", "main", "[role='main']", "body"]
        .iter()
        .filter_map(|sel| selector(sel))
        .find_map(|s| document.select(&s).next().map(|el| el.html()))
        .unwrap_or_else(|| html_str.to_string());
    let markdown = html_to_markdown(&content_html);

    let links = extract_links(&document, base_url);
    let meta_description = extract_meta_content(&document, "description");
    let canonical_url = selector("link[rel='canonical']")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("href").map(str::to_string));
    let language = selector("html")
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("lang").map(str::to_string));

    let mut open_graph = HashMap::new();
    if let Some(sel) = selector("meta[property^='og:']") {
        for el in document.select(&sel) {
            if let (Some(prop), Some(content)) =
                (el.value().attr("property"), el.value().attr("content"))
            {
                open_graph.insert(prop.to_string(), content.to_string());
            }
        }
    }

    let json_ld = extract_json_ld(&document);

    let (script_text, script_srcs) = collect_scripts(&document);
    let framework = detect_framework(&document, &script_text, &script_srcs);

    ParsedHtml {
        title,
        h1,
        body_text,
        markdown,
        links,
        meta_description,
        canonical_url,
        language,
        open_graph,
        json_ld,
        framework,
        script_text,
        script_srcs,
    }
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let Some(sel) = selector("a[href]") else {
        return vec![];
    };
    document
        .select(&sel)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            if href.starts_with("javascript:")
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
                || href.starts_with("data:")
                || href.starts_with('#')
            {
                return None;
            }
            base_url.join(href).ok().map(|u| u.to_string())
        })
        .collect()
}

fn extract_meta_content(document: &Html, name: &str) -> Option<String> {
    let sel_str = format!("meta[name='{}']", name);
    selector(&sel_str)
        .and_then(|s| document.select(&s).next())
        .and_then(|el| el.value().attr("content").map(str::to_string))
}

fn extract_json_ld(document: &Html) -> Vec<Value> {
    let Some(sel) = selector("script[type='application/ld+json']") else {
        return vec![];
    };
    document
        .select(&sel)
        .filter_map(|el| {
            let raw = el.text().collect::<String>();
            serde_json::from_str::<Value>(raw.trim()).ok()
        })
        .collect()
}

fn collect_scripts(document: &Html) -> (String, Vec<String>) {
    let Some(sel) = selector("script") else {
        return (String::new(), vec![]);
    };
    let mut text = String::new();
    let mut srcs = Vec::new();
    for el in document.select(&sel) {
        match el.value().attr("src") {
            Some(src) => srcs.push(src.to_string()),
            None => {
                text.push_str(&el.text().collect::<String>());
                text.push('\n');
            }
        }
    }
    (text, srcs)
}

static REMIX_CONTEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"window\.__remixContext\s*=\s*(\{.*)").unwrap());
static NUXT_STATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"window\.__NUXT__\s*=\s*(\{.*)").unwrap());

/// Detect the rendering framework and, where the page embeds a JSON state
/// payload, parse it. Detection without a parseable payload still counts:
/// the strategy can fall back to route heuristics.
fn detect_framework(document: &Html, script_text: &str, script_srcs: &[String]) -> Option<FrameworkPayload> {
    // Next.js ships state as a dedicated JSON script tag.
    if let Some(sel) = selector("script#__NEXT_DATA__") {
        if let Some(el) = document.select(&sel).next() {
            let raw = el.text().collect::<String>();
            if let Ok(data) = serde_json::from_str::<Value>(raw.trim()) {
                return Some(FrameworkPayload { framework: Framework::Next, data });
            }
        }
    }
    // Angular Universal: transfer-state script.
    for id in ["ng-state", "serverApp-state"] {
        if let Some(sel) = selector(&format!("script#{}", id)) {
            if let Some(el) = document.select(&sel).next() {
                let raw = el.text().collect::<String>();
                if let Ok(data) = serde_json::from_str::<Value>(raw.trim()) {
                    return Some(FrameworkPayload { framework: Framework::Angular, data });
                }
            }
        }
    }
    // Remix / Nuxt inline assignments: grab the trailing object if it parses.
    if let Some(cap) = REMIX_CONTEXT_RE.captures(script_text) {
        if let Some(data) = parse_leading_json(&cap[1]) {
            return Some(FrameworkPayload { framework: Framework::Remix, data });
        }
    }
    if let Some(cap) = NUXT_STATE_RE.captures(script_text) {
        if let Some(data) = parse_leading_json(&cap[1]) {
            return Some(FrameworkPayload { framework: Framework::Nuxt, data });
        }
    }
    // Marker-only detections.
    let markers: [(Framework, &str); 4] = [
        (Framework::Gatsby, "___gatsby"),
        (Framework::Vitepress, "__VP_HASH_MAP__"),
        (Framework::Vuepress, "__VUEPRESS__"),
        (Framework::Nuxt, "__NUXT__"),
    ];
    for (framework, marker) in markers {
        if script_text.contains(marker)
            || script_srcs.iter().any(|s| s.contains(marker))
        {
            return Some(FrameworkPayload { framework, data: Value::Null });
        }
    }
    None
}

/// Parse the longest JSON object prefix of `raw` by brace balancing. Inline
/// assignments end with `;` or further statements the JSON parser rejects.
fn parse_leading_json(raw: &str) -> Option<Value> {
    let bytes = raw.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                if depth == 0 {
                    return None;
                }
                depth -= 1;
                if depth == 0 {
                    return serde_json::from_str(&raw[..=i]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(html: &str) -> ParsedHtml {
        parse_html(html, &Url::parse("https://example.com/page").unwrap())
    }

    #[test]
    fn basic_extraction() {
        let p = parse(
            r#"<html lang="en"><head><title>My Page</title>
            <meta name="description" content="Desc here">
            <meta property="og:title" content="OG Title">
            <link rel="canonical" href="https://example.com/canonical">
            </head><body><h1>Header</h1><p>Some   body  text</p>
            <a href="/next">next</a></body></html>"#,
        );
        assert_eq!(p.title.as_deref(), Some("My Page"));
        assert_eq!(p.h1, vec!["Header"]);
        assert!(p.body_text.contains("Some body text"));
        assert_eq!(p.meta_description.as_deref(), Some("Desc here"));
        assert_eq!(p.open_graph.get("og:title").map(String::as_str), Some("OG Title"));
        assert_eq!(p.canonical_url.as_deref(), Some("https://example.com/canonical"));
        assert_eq!(p.links, vec!["https://example.com/next"]);
        assert_eq!(p.language.as_deref(), Some("en"));
    }

    #[test]
    fn json_ld_blocks_parse() {
        let p = parse(
            r#"<html><head><script type="application/ld+json">
            {"@type": "Article", "headline": "Hello"}
            </script></head><body></body></html>"#,
        );
        assert_eq!(p.json_ld.len(), 1);
        assert_eq!(p.json_ld[0]["headline"], "Hello");
    }

    #[test]
    fn next_data_payload() {
        let p = parse(
            r#"<html><body>
            <script id="__NEXT_DATA__" type="application/json">
            {"props": {"pageProps": {"title": "From Next"}}}
            </script></body></html>"#,
        );
        let fw = p.framework.unwrap();
        assert_eq!(fw.framework, Framework::Next);
        assert_eq!(fw.data["props"]["pageProps"]["title"], "From Next");
    }

    #[test]
    fn remix_context_parses_despite_trailing_statement() {
        let p = parse(
            r#"<html><body><script>
            window.__remixContext = {"state": {"loaderData": {"root": 1}}};var x = 2;
            </script></body></html>"#,
        );
        let fw = p.framework.unwrap();
        assert_eq!(fw.framework, Framework::Remix);
        assert_eq!(fw.data["state"]["loaderData"]["root"], 1);
    }

    #[test]
    fn gatsby_marker_only() {
        let p = parse(r#"<html><body><script>window.___gatsby = {};</script></body></html>"#);
        let fw = p.framework.unwrap();
        assert_eq!(fw.framework, Framework::Gatsby);
        assert!(fw.data.is_null());
    }
}
