//! Hacker News via the Algolia items API.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use url::Url;

use siphon_core::ExtractError;
use siphon_parse::markdown::html_to_markdown;

use crate::{fetch_json, site_content, HandlerFetcher, SiteContent, SiteHandler};

static ITEM_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"id=(\d+)").unwrap());

pub struct HackerNewsHandler;

#[async_trait]
impl SiteHandler for HackerNewsHandler {
    fn name(&self) -> &'static str {
        "site:hackernews"
    }

    fn can_handle(&self, url: &Url) -> bool {
        url.host_str() == Some("news.ycombinator.com") && url.path() == "/item"
    }

    async fn extract(
        &self,
        url: &Url,
        fetch: &dyn HandlerFetcher,
    ) -> Result<Option<SiteContent>, ExtractError> {
        let Some(id) = url
            .query()
            .and_then(|q| ITEM_ID_RE.captures(q))
            .map(|c| c[1].to_string())
        else {
            return Ok(None);
        };
        let api_url = Url::parse(&format!("https://hn.algolia.com/api/v1/items/{}", id))
            .map_err(|e| ExtractError::InvalidUrl(e.to_string()))?;
        let Some((value, ms)) = fetch_json(fetch, &api_url).await? else {
            return Ok(None);
        };
        let Some(title) = value["title"].as_str() else {
            return Ok(None);
        };

        let mut markdown = format!("# {}", title);
        if let Some(text) = value["text"].as_str() {
            markdown.push_str("\n\n");
            markdown.push_str(&html_to_markdown(text));
        }
        if let Some(children) = value["children"].as_array() {
            for child in children.iter().take(15) {
                if let Some(comment) = child["text"].as_str() {
                    markdown.push_str("\n\n---\n\n");
                    markdown.push_str(&html_to_markdown(comment));
                }
            }
        }

        let structured = json!({
            "id": value["id"],
            "author": value["author"],
            "points": value["points"],
            "url": value["url"],
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
    async fn maps_story_with_comments() {
        let body = json!({
            "id": 1, "title": "Show HN: Thing", "text": null,
            "author": "pg", "points": 100, "url": "https://thing.example",
            "children": [{"text": "<p>Nice work</p>"}]
        })
        .to_string();
        let fetcher = canned(&[("items/1", 200, &body)]);
        let url = Url::parse("https://news.ycombinator.com/item?id=1").unwrap();

        let result = HackerNewsHandler.extract(&url, &fetcher).await.unwrap().unwrap();
        assert_eq!(result.content.title, "Show HN: Thing");
        assert!(result.content.markdown.contains("Nice work"));
    }

    #[tokio::test]
    async fn missing_id_is_none() {
        let fetcher = canned(&[]);
        let url = Url::parse("https://news.ycombinator.com/item?x=1").unwrap();
        assert!(HackerNewsHandler.extract(&url, &fetcher).await.unwrap().is_none());
    }
}
