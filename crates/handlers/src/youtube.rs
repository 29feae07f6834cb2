//! YouTube via oEmbed. Thin metadata only; short text is expected and the
//! orchestrator's length gate decides whether it suffices.

use async_trait::async_trait;
use serde_json::json;
use url::Url;

use siphon_core::ExtractError;

use crate::{fetch_json, host_is, site_content, HandlerFetcher, SiteContent, SiteHandler};

pub struct YoutubeHandler;

#[async_trait]
impl SiteHandler for YoutubeHandler {
    fn name(&self) -> &'static str {
        "site:youtube"
    }

    fn can_handle(&self, url: &Url) -> bool {
        (host_is(url, "youtube.com") && url.path() == "/watch")
            || host_is(url, "youtu.be")
    }

    async fn extract(
        &self,
        url: &Url,
        fetch: &dyn HandlerFetcher,
    ) -> Result<Option<SiteContent>, ExtractError> {
        let api_url = Url::parse(&format!(
            "https://www.youtube.com/oembed?url={}&format=json",
            url
        ))
        .map_err(|e| ExtractError::InvalidUrl(e.to_string()))?;
        let Some((value, ms)) = fetch_json(fetch, &api_url).await? else {
            return Ok(None);
        };
        let Some(title) = value["title"].as_str() else {
            return Ok(None);
        };
        let author = value["author_name"].as_str().unwrap_or("unknown");
        let markdown = format!("# {}\n\nVideo by {}.", title, author);
        let structured = json!({
            "author_name": author,
            "provider_name": value["provider_name"],
            "thumbnail_url": value["thumbnail_url"],
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
    async fn oembed_maps() {
        let body = json!({
            "title": "Rust in 100 Seconds", "author_name": "Fireship",
            "provider_name": "YouTube"
        })
        .to_string();
        let fetcher = canned(&[("oembed", 200, &body)]);
        let url = Url::parse("https://www.youtube.com/watch?v=5C_HPTJg5ek").unwrap();

        let result = YoutubeHandler.extract(&url, &fetcher).await.unwrap().unwrap();
        assert_eq!(result.content.title, "Rust in 100 Seconds");
        assert!(result.content.text.contains("Fireship"));
    }

    #[test]
    fn short_link_claimed() {
        assert!(YoutubeHandler.can_handle(&Url::parse("https://youtu.be/abc").unwrap()));
    }
}
