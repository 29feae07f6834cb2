//! Stack Overflow via the Stack Exchange API (question body included).

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use url::Url;

use siphon_core::ExtractError;
use siphon_parse::markdown::html_to_markdown;

use crate::{fetch_json, host_is, site_content, HandlerFetcher, SiteContent, SiteHandler};

static QUESTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^/questions/(\d+)").unwrap());

pub struct StackOverflowHandler;

#[async_trait]
impl SiteHandler for StackOverflowHandler {
    fn name(&self) -> &'static str {
        "site:stackoverflow"
    }

    fn can_handle(&self, url: &Url) -> bool {
        host_is(url, "stackoverflow.com") && QUESTION_RE.is_match(url.path())
    }

    async fn extract(
        &self,
        url: &Url,
        fetch: &dyn HandlerFetcher,
    ) -> Result<Option<SiteContent>, ExtractError> {
        let Some(caps) = QUESTION_RE.captures(url.path()) else {
            return Ok(None);
        };
        let api_url = Url::parse(&format!(
            "https://api.stackexchange.com/2.3/questions/{}?site=stackoverflow&filter=withbody",
            &caps[1]
        ))
        .map_err(|e| ExtractError::InvalidUrl(e.to_string()))?;
        let Some((value, ms)) = fetch_json(fetch, &api_url).await? else {
            return Ok(None);
        };
        let item = &value["items"][0];
        let Some(title) = item["title"].as_str() else {
            return Ok(None);
        };
        let body_html = item["body"].as_str().unwrap_or("");
        let markdown = format!("# {}\n\n{}", title, html_to_markdown(body_html));
        let structured = json!({
            "score": item["score"],
            "answer_count": item["answer_count"],
            "is_answered": item["is_answered"],
            "tags": item["tags"],
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
    async fn question_maps() {
        let body = json!({"items": [{
            "title": "How do lifetimes work?",
            "body": "<p>I am confused about <code>'a</code>.</p>",
            "score": 42, "answer_count": 3, "is_answered": true, "tags": ["rust"]
        }]})
        .to_string();
        let fetcher = canned(&[("questions/99", 200, &body)]);
        let url = Url::parse("https://stackoverflow.com/questions/99/how-do-lifetimes-work").unwrap();

        let result = StackOverflowHandler.extract(&url, &fetcher).await.unwrap().unwrap();
        assert_eq!(result.content.title, "How do lifetimes work?");
        assert!(result.content.text.contains("confused"));
    }

    #[tokio::test]
    async fn empty_items_is_none() {
        let fetcher = canned(&[("questions/99", 200, "{\"items\": []}")]);
        let url = Url::parse("https://stackoverflow.com/questions/99/x").unwrap();
        assert!(StackOverflowHandler.extract(&url, &fetcher).await.unwrap().is_none());
    }
}
