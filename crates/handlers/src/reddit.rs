//! Reddit: append `.json` to the post URL and read the listing payload.

use async_trait::async_trait;
use serde_json::json;
use url::Url;

use siphon_core::ExtractError;

use crate::{fetch_json, host_is, site_content, HandlerFetcher, SiteContent, SiteHandler};

pub struct RedditHandler;

#[async_trait]
impl SiteHandler for RedditHandler {
    fn name(&self) -> &'static str {
        "site:reddit"
    }

    fn can_handle(&self, url: &Url) -> bool {
        host_is(url, "reddit.com") && url.path().contains("/comments/")
    }

    async fn extract(
        &self,
        url: &Url,
        fetch: &dyn HandlerFetcher,
    ) -> Result<Option<SiteContent>, ExtractError> {
        let api_url = {
            let mut u = url.clone();
            let path = u.path().trim_end_matches('/').to_string();
            u.set_path(&format!("{}.json", path));
            u.set_query(None);
            u
        };
        let Some((value, ms)) = fetch_json(fetch, &api_url).await? else {
            return Ok(None);
        };

        // Listing shape: [post listing, comment listing].
        let post = &value[0]["data"]["children"][0]["data"];
        let Some(title) = post["title"].as_str() else {
            return Ok(None);
        };

        let selftext = post["selftext"].as_str().unwrap_or("");
        let mut markdown = format!("# {}\n\n{}", title, selftext);

        // Top-level comments enrich link posts that have no selftext.
        if let Some(comments) = value[1]["data"]["children"].as_array() {
            for comment in comments.iter().take(10) {
                if let Some(body) = comment["data"]["body"].as_str() {
                    markdown.push_str("\n\n---\n\n");
                    markdown.push_str(body);
                }
            }
        }

        let structured = json!({
            "subreddit": post["subreddit"],
            "author": post["author"],
            "score": post["score"],
            "url": post["url"],
            "num_comments": post["num_comments"],
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
