//! Medium posts via the `?format=json` endpoint. Responses carry an
//! anti-hijacking prefix that has to be stripped before parsing.

use async_trait::async_trait;
use serde_json::{json, Value};
use url::Url;

use siphon_core::{ExtractError, FetchOptions};

use crate::{host_is, site_content, HandlerFetcher, SiteContent, SiteHandler};

const JSON_HIJACK_PREFIX: &str = "])}while(1);</x>";

pub struct MediumHandler;

#[async_trait]
impl SiteHandler for MediumHandler {
    fn name(&self) -> &'static str {
        "site:medium"
    }

    fn can_handle(&self, url: &Url) -> bool {
        host_is(url, "medium.com") && url.path().len() > 1
    }

    async fn extract(
        &self,
        url: &Url,
        fetch: &dyn HandlerFetcher,
    ) -> Result<Option<SiteContent>, ExtractError> {
        let mut api_url = url.clone();
        api_url.set_query(Some("format=json"));

        let response = fetch.fetch(&api_url, &FetchOptions::default()).await?;
        if !response.is_success() {
            return Err(ExtractError::Status {
                status: response.status,
                url: api_url.to_string(),
            });
        }
        let body = response.body_text();
        let stripped = body.strip_prefix(JSON_HIJACK_PREFIX).unwrap_or(&body);
        let Ok(value) = serde_json::from_str::<Value>(stripped) else {
            return Ok(None);
        };

        let post = &value["payload"]["value"];
        let Some(title) = post["title"].as_str() else {
            return Ok(None);
        };

        // Paragraph stream: name + text per block.
        let mut markdown = format!("# {}", title);
        if let Some(paragraphs) = post["content"]["bodyModel"]["paragraphs"].as_array() {
            for paragraph in paragraphs {
                if let Some(text) = paragraph["text"].as_str() {
                    if text == title {
                        continue;
                    }
                    markdown.push_str("\n\n");
                    markdown.push_str(text);
                }
            }
        }

        let structured = json!({
            "creator": post["creator"]["name"],
            "subtitle": post["content"]["subtitle"],
        });
        Ok(Some(site_content(
            title.to_string(),
            markdown,
            Some(structured),
            Some(api_url.to_string()),
            response.response_time_ms,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::canned;

    #[tokio::test]
    async fn hijack_prefix_stripped() {
        let payload = json!({"payload": {"value": {
            "title": "On Writing",
            "content": {"subtitle": "notes", "bodyModel": {"paragraphs": [
                {"text": "On Writing"},
                {"text": "First paragraph of the essay."}
            ]}},
            "creator": {"name": "bob"}
        }}})
        .to_string();
        let body = format!("])}}while(1);</x>{}", payload);
        let fetcher = canned(&[("format=json", 200, &body)]);
        let url = Url::parse("https://medium.com/@bob/on-writing-abc123").unwrap();

        let result = MediumHandler.extract(&url, &fetcher).await.unwrap().unwrap();
        assert_eq!(result.content.title, "On Writing");
        assert!(result.content.text.contains("First paragraph"));
        // Title paragraph deduplicated.
        assert_eq!(result.content.markdown.matches("On Writing").count(), 1);
    }

    #[tokio::test]
    async fn html_answer_is_none() {
        let fetcher = canned(&[("format=json", 200, "<html>login wall</html>")]);
        let url = Url::parse("https://medium.com/@bob/post").unwrap();
        assert!(MediumHandler.extract(&url, &fetcher).await.unwrap().is_none());
    }
}
