//! GitHub repos and issues via api.github.com.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use url::Url;

use siphon_core::ExtractError;

use crate::{fetch_json, host_is, site_content, HandlerFetcher, SiteContent, SiteHandler};

static REPO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/([^/]+)/([^/]+?)/?$").unwrap());
static ISSUE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/([^/]+)/([^/]+)/(?:issues|pull)/(\d+)/?$").unwrap());

pub struct GithubHandler;

#[async_trait]
impl SiteHandler for GithubHandler {
    fn name(&self) -> &'static str {
        "site:github"
    }

    fn can_handle(&self, url: &Url) -> bool {
        host_is(url, "github.com")
            && (REPO_RE.is_match(url.path()) || ISSUE_RE.is_match(url.path()))
    }

    async fn extract(
        &self,
        url: &Url,
        fetch: &dyn HandlerFetcher,
    ) -> Result<Option<SiteContent>, ExtractError> {
        let path = url.path();

        if let Some(caps) = ISSUE_RE.captures(path) {
            let api_url = Url::parse(&format!(
                "https://api.github.com/repos/{}/{}/issues/{}",
                &caps[1], &caps[2], &caps[3]
            ))
            .map_err(|e| ExtractError::InvalidUrl(e.to_string()))?;
            let Some((value, ms)) = fetch_json(fetch, &api_url).await? else {
                return Ok(None);
            };
            let Some(title) = value["title"].as_str() else {
                return Ok(None);
            };
            let body = value["body"].as_str().unwrap_or("");
            let markdown = format!("# {}\n\n{}", title, body);
            let structured = json!({
                "state": value["state"],
                "user": value["user"]["login"],
                "comments": value["comments"],
                "labels": value["labels"],
            });
            return Ok(Some(site_content(
                title.to_string(),
                markdown,
                Some(structured),
                Some(api_url.to_string()),
                ms,
            )));
        }

        let Some(caps) = REPO_RE.captures(path) else {
            return Ok(None);
        };
        let api_url = Url::parse(&format!(
            "https://api.github.com/repos/{}/{}",
            &caps[1], &caps[2]
        ))
        .map_err(|e| ExtractError::InvalidUrl(e.to_string()))?;
        let Some((value, ms)) = fetch_json(fetch, &api_url).await? else {
            return Ok(None);
        };
        let Some(full_name) = value["full_name"].as_str() else {
            return Ok(None);
        };
        let description = value["description"].as_str().unwrap_or("");
        let markdown = format!(
            "# {}\n\n{}\n\n- Language: {}\n- Stars: {}\n- Forks: {}",
            full_name,
            description,
            value["language"].as_str().unwrap_or("unknown"),
            value["stargazers_count"].as_u64().unwrap_or(0),
            value["forks_count"].as_u64().unwrap_or(0),
        );
        Ok(Some(site_content(
            full_name.to_string(),
            markdown,
            Some(value.clone()),
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
    async fn repo_page_maps() {
        let body = json!({
            "full_name": "rust-lang/rust", "description": "The Rust language",
            "language": "Rust", "stargazers_count": 90000, "forks_count": 12000
        })
        .to_string();
        let fetcher = canned(&[("repos/rust-lang/rust", 200, &body)]);
        let url = Url::parse("https://github.com/rust-lang/rust").unwrap();

        let result = GithubHandler.extract(&url, &fetcher).await.unwrap().unwrap();
        assert_eq!(result.content.title, "rust-lang/rust");
        assert!(result.content.markdown.contains("Stars: 90000"));
    }

    #[tokio::test]
    async fn issue_page_maps() {
        let body = json!({
            "title": "Segfault on nightly", "body": "Repro steps here",
            "state": "open", "user": {"login": "alice"}, "comments": 3, "labels": []
        })
        .to_string();
        let fetcher = canned(&[("issues/42", 200, &body)]);
        let url = Url::parse("https://github.com/rust-lang/rust/issues/42").unwrap();

        let result = GithubHandler.extract(&url, &fetcher).await.unwrap().unwrap();
        assert_eq!(result.content.title, "Segfault on nightly");
        assert!(result.content.markdown.contains("Repro steps"));
    }

    #[test]
    fn only_repo_and_issue_paths_claimed() {
        let h = GithubHandler;
        assert!(h.can_handle(&Url::parse("https://github.com/a/b").unwrap()));
        assert!(h.can_handle(&Url::parse("https://github.com/a/b/issues/1").unwrap()));
        assert!(!h.can_handle(&Url::parse("https://github.com/a/b/tree/main/src").unwrap()));
        assert!(!h.can_handle(&Url::parse("https://github.com/features").unwrap()));
    }
}
