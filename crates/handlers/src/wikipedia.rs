//! Wikipedia REST summary API.

use async_trait::async_trait;
use serde_json::json;
use url::Url;

use siphon_core::ExtractError;

use crate::{fetch_json, site_content, HandlerFetcher, SiteContent, SiteHandler};

pub struct WikipediaHandler;

#[async_trait]
impl SiteHandler for WikipediaHandler {
    fn name(&self) -> &'static str {
        "site:wikipedia"
    }

    fn can_handle(&self, url: &Url) -> bool {
        url.host_str()
            .map(|h| h.ends_with(".wikipedia.org"))
            .unwrap_or(false)
            && url.path().starts_with("/wiki/")
    }

    async fn extract(
        &self,
        url: &Url,
        fetch: &dyn HandlerFetcher,
    ) -> Result<Option<SiteContent>, ExtractError> {
        let Some(article) = url.path().strip_prefix("/wiki/") else {
            return Ok(None);
        };
        let host = url.host_str().unwrap_or("en.wikipedia.org");
        let api_url = Url::parse(&format!(
            "https://{}/api/rest_v1/page/summary/{}",
            host, article
        ))
        .map_err(|e| ExtractError::InvalidUrl(e.to_string()))?;
        let Some((value, ms)) = fetch_json(fetch, &api_url).await? else {
            return Ok(None);
        };
        let Some(title) = value["title"].as_str() else {
            return Ok(None);
        };
        let extract = value["extract"].as_str().unwrap_or("");
        let markdown = format!("# {}\n\n{}", title, extract);
        let structured = json!({
            "description": value["description"],
            "lang": value["lang"],
            "pageid": value["pageid"],
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
    async fn summary_maps() {
        let body = json!({
            "title": "Rust (programming language)",
            "extract": "Rust is a systems programming language.",
            "description": "language", "lang": "en", "pageid": 1
        })
        .to_string();
        let fetcher = canned(&[("page/summary/Rust_(programming_language)", 200, &body)]);
        let url = Url::parse("https://en.wikipedia.org/wiki/Rust_(programming_language)").unwrap();

        let result = WikipediaHandler.extract(&url, &fetcher).await.unwrap().unwrap();
        assert!(result.content.title.starts_with("Rust"));
        assert!(result.content.text.contains("systems programming"));
    }
}
