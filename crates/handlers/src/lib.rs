//! Per-site handlers behind one uniform capability: `can_handle` plus
//! `extract`. The dispatcher invokes the first handler that claims a URL and
//! never falls through to another — handler domains are mutually exclusive
//! by construction. A handler returns `Ok(None)` when the API answered with
//! an unfamiliar shape; that sends the orchestrator on to the next strategy.

pub mod devto;
pub mod github;
pub mod hackernews;
pub mod medium;
pub mod npm;
pub mod pypi;
pub mod reddit;
pub mod stackoverflow;
pub mod wikipedia;
pub mod youtube;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use siphon_core::{ExtractError, ExtractedContent, FetchOptions, FetchResponse};

/// Fetch seam injected by the orchestrator: carries cookies, pooling, the
/// request's headers and cancellation.
#[async_trait]
pub trait HandlerFetcher: Send + Sync {
    async fn fetch(&self, url: &Url, opts: &FetchOptions) -> Result<FetchResponse, ExtractError>;
}

/// What a handler hands back on success.
#[derive(Debug, Clone)]
pub struct SiteContent {
    pub content: ExtractedContent,
    /// The API URL that actually served the content, when one was used.
    pub api_url: Option<String>,
    pub response_time_ms: u64,
}

#[async_trait]
pub trait SiteHandler: Send + Sync {
    /// Stable strategy identifier, e.g. `site:reddit`.
    fn name(&self) -> &'static str;
    fn can_handle(&self, url: &Url) -> bool;
    async fn extract(
        &self,
        url: &Url,
        fetch: &dyn HandlerFetcher,
    ) -> Result<Option<SiteContent>, ExtractError>;
}

/// The canonical ordered handler list.
pub fn default_handlers() -> Vec<Box<dyn SiteHandler>> {
    vec![
        Box::new(reddit::RedditHandler),
        Box::new(hackernews::HackerNewsHandler),
        Box::new(github::GithubHandler),
        Box::new(wikipedia::WikipediaHandler),
        Box::new(stackoverflow::StackOverflowHandler),
        Box::new(npm::NpmHandler),
        Box::new(pypi::PypiHandler),
        Box::new(devto::DevToHandler),
        Box::new(medium::MediumHandler),
        Box::new(youtube::YoutubeHandler),
    ]
}

pub struct HandlerDispatch {
    handlers: Vec<Box<dyn SiteHandler>>,
}

impl Default for HandlerDispatch {
    fn default() -> Self {
        Self { handlers: default_handlers() }
    }
}

impl HandlerDispatch {
    pub fn new(handlers: Vec<Box<dyn SiteHandler>>) -> Self {
        Self { handlers }
    }

    /// The handler that would claim this URL, if any.
    pub fn handler_for(&self, url: &Url) -> Option<&dyn SiteHandler> {
        self.handlers.iter().find(|h| h.can_handle(url)).map(|h| h.as_ref())
    }

    /// First-match dispatch. `Ok(None)` covers both "no handler claims this
    /// URL" and "the claiming handler bowed out".
    pub async fn dispatch(
        &self,
        url: &Url,
        fetch: &dyn HandlerFetcher,
    ) -> Result<Option<(&'static str, SiteContent)>, ExtractError> {
        let Some(handler) = self.handler_for(url) else {
            return Ok(None);
        };
        tracing::debug!(handler = handler.name(), url = %url, "handler claimed url");
        let result = handler.extract(url, fetch).await?;
        Ok(result.map(|content| (handler.name(), content)))
    }
}

// --- shared helpers for the handler implementations ---

/// GET a JSON API. Non-2xx propagates (the orchestrator classifies it);
/// an unparseable body reads as "unfamiliar shape" and returns None.
pub(crate) async fn fetch_json(
    fetch: &dyn HandlerFetcher,
    url: &Url,
) -> Result<Option<(Value, u64)>, ExtractError> {
    let opts = FetchOptions {
        headers: [("Accept".to_string(), "application/json".to_string())].into(),
        ..Default::default()
    };
    let response = fetch.fetch(url, &opts).await?;
    if !response.is_success() {
        return Err(ExtractError::Status { status: response.status, url: url.to_string() });
    }
    match serde_json::from_slice::<Value>(&response.body) {
        Ok(value) => Ok(Some((value, response.response_time_ms))),
        Err(_) => Ok(None),
    }
}

/// Host check that also accepts `www.`-style subdomains.
pub(crate) fn host_is(url: &Url, domain: &str) -> bool {
    url.host_str()
        .map(|h| h == domain || h.ends_with(&format!(".{}", domain)))
        .unwrap_or(false)
}

/// Assemble a SiteContent from markdown-ish body text.
pub(crate) fn site_content(
    title: String,
    body_markdown: String,
    structured: Option<Value>,
    api_url: Option<String>,
    response_time_ms: u64,
) -> SiteContent {
    let text = siphon_parse::markdown::normalize_text(&body_markdown);
    SiteContent {
        content: ExtractedContent {
            title,
            text,
            markdown: body_markdown,
            structured,
        },
        api_url,
        response_time_ms,
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_is_first_match_only() {
        let dispatch = HandlerDispatch::default();
        let url = Url::parse("https://www.reddit.com/r/rust/comments/abc/title/").unwrap();
        assert_eq!(dispatch.handler_for(&url).unwrap().name(), "site:reddit");

        let url = Url::parse("https://example.com/article").unwrap();
        assert!(dispatch.handler_for(&url).is_none());
    }

    #[test]
    fn handler_domains_are_disjoint() {
        let handlers = default_handlers();
        let samples = [
            "https://www.reddit.com/r/rust/comments/abc/x/",
            "https://news.ycombinator.com/item?id=1",
            "https://github.com/rust-lang/rust",
            "https://en.wikipedia.org/wiki/Rust",
            "https://stackoverflow.com/questions/1/x",
            "https://www.npmjs.com/package/react",
            "https://pypi.org/project/requests/",
            "https://dev.to/user/post-1",
            "https://medium.com/@user/post-1",
            "https://www.youtube.com/watch?v=abc",
        ];
        for sample in samples {
            let url = Url::parse(sample).unwrap();
            let claiming: Vec<&'static str> = handlers
                .iter()
                .filter(|h| h.can_handle(&url))
                .map(|h| h.name())
                .collect();
            assert_eq!(claiming.len(), 1, "{} claimed by {:?}", sample, claiming);
        }
    }
}
