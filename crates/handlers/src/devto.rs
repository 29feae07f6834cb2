//! DEV Community articles via the public articles API.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use url::Url;

use siphon_core::ExtractError;

use crate::{fetch_json, host_is, site_content, HandlerFetcher, SiteContent, SiteHandler};

static ARTICLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/([a-z0-9_-]+)/([a-z0-9-]+)/?$").unwrap());

pub struct DevToHandler;

#[async_trait]
impl SiteHandler for DevToHandler {
    fn name(&self) -> &'static str {
        "site:devto"
    }

    fn can_handle(&self, url: &Url) -> bool {
        host_is(url, "dev.to") && ARTICLE_RE.is_match(url.path())
    }

    async fn extract(
        &self,
        url: &Url,
        fetch: &dyn HandlerFetcher,
    ) -> Result<Option<SiteContent>, ExtractError> {
        let Some(caps) = ARTICLE_RE.captures(url.path()) else {
            return Ok(None);
        };
        let api_url = Url::parse(&format!(
            "https://dev.to/api/articles/{}/{}",
            &caps[1], &caps[2]
        ))
        .map_err(|e| ExtractError::InvalidUrl(e.to_string()))?;
        let Some((value, ms)) = fetch_json(fetch, &api_url).await? else {
            return Ok(None);
        };
        let Some(title) = value["title"].as_str() else {
            return Ok(None);
        };
        let body = value["body_markdown"].as_str().unwrap_or("");
        let markdown = format!("# {}\n\n{}", title, body);
        let structured = json!({
            "tags": value["tags"],
            "user": value["user"]["username"],
            "reactions": value["public_reactions_count"],
        });
        Ok(Some(site_content(
            title.to_string(),
            markdown,
            Some(structured),
            Some(api_url.to_string()),
            ms,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::canned;

    #[tokio::test]
    async fn article_maps() {
        let body = json!({
            "title": "Understanding Ownership",
            "body_markdown": "Ownership is Rust's key feature.",
            "tags": ["rust"], "user": {"username": "alice"},
            "public_reactions_count": 12
        })
        .to_string();
        let fetcher = canned(&[("api/articles/alice/understanding-ownership", 200, &body)]);
        let url = Url::parse("https://dev.to/alice/understanding-ownership").unwrap();

        let result = DevToHandler.extract(&url, &fetcher).await.unwrap().unwrap();
        assert_eq!(result.content.title, "Understanding Ownership");
        assert!(result.content.text.contains("key feature"));
    }
}
