//! Per-request state shared across the strategy chain: the budget clock,
//! the cancellation token, and the page snapshot (fetched once, reused by
//! every intelligence-tier strategy).

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use siphon_client::PooledClient;
use siphon_core::domain::registrable_domain;
use siphon_core::{ExtractError, FailureCategory, FetchOptions, FetchResponse};
use siphon_handlers::HandlerFetcher;
use siphon_parse::{parse_html, ParsedHtml};

use crate::options::ExtractOptions;
use crate::Engine;

pub struct PageSnapshot {
    pub response: FetchResponse,
    pub parsed: ParsedHtml,
}

impl PageSnapshot {
    /// The page-based strategies only make sense over HTML; JSON/XML bodies
    /// belong to the API tiers.
    pub fn is_html(&self) -> bool {
        if let Some(ct) = &self.response.content_type {
            let ct = ct.to_ascii_lowercase();
            if ct.contains("html") {
                return true;
            }
            if ct.contains("json") || ct.contains("xml") || ct.contains("text/plain") {
                return false;
            }
        }
        self.response.body_text().trim_start().starts_with('<')
    }
}

pub struct RequestCtx {
    pub url: Url,
    pub domain: String,
    pub opts: ExtractOptions,
    pub cancel: CancellationToken,
    pub started: Instant,
    page: OnceCell<Option<Arc<PageSnapshot>>>,
    /// Why the page fetch failed, when it did.
    pub fetch_failure: Mutex<Option<(FailureCategory, String)>>,
}

impl RequestCtx {
    pub fn new(url: Url, opts: ExtractOptions) -> Self {
        let cancel = opts.cancel.clone().unwrap_or_default();
        let domain = registrable_domain(&url);
        Self {
            url,
            domain,
            opts,
            cancel,
            started: Instant::now(),
            page: OnceCell::new(),
            fetch_failure: Mutex::new(None),
        }
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    pub fn deadline_exceeded(&self) -> bool {
        self.elapsed_ms() >= self.opts.timeout_ms
    }

    /// Remaining wall-clock, floored at one second so in-flight calls can
    /// still finish with a sane timeout.
    pub fn remaining(&self) -> Duration {
        let remaining = self.opts.timeout_ms.saturating_sub(self.elapsed_ms()).max(1_000);
        Duration::from_millis(remaining)
    }

    /// Per-request fetch options: request headers, user agent, composed
    /// cancellation, remaining-budget timeout.
    pub fn fetch_options(&self) -> FetchOptions {
        let mut headers: HashMap<String, String> = self.opts.headers.clone();
        if let Some(ua) = &self.opts.user_agent {
            headers.insert("User-Agent".to_string(), ua.clone());
        }
        FetchOptions {
            headers,
            timeout: Some(self.remaining()),
            cancel: Some(self.cancel.clone()),
            ..Default::default()
        }
    }

    /// The page itself, fetched and parsed at most once per request.
    pub async fn page(&self, engine: &Engine) -> Option<Arc<PageSnapshot>> {
        self.page
            .get_or_init(|| async {
                match engine.client.fetch(&self.url, &self.fetch_options()).await {
                    Ok(response) if response.is_success() => {
                        let parsed = parse_html(&response.body_text(), &self.url);
                        Some(Arc::new(PageSnapshot { response, parsed }))
                    }
                    Ok(response) => {
                        debug!(status = response.status, "page fetch non-2xx");
                        *self.fetch_failure.lock().unwrap() = Some((
                            FailureCategory::from_status(response.status),
                            format!("HTTP {}", response.status),
                        ));
                        None
                    }
                    Err(e) => {
                        *self.fetch_failure.lock().unwrap() =
                            Some((FailureCategory::from_error(&e), e.to_string()));
                        None
                    }
                }
            })
            .await
            .clone()
    }

    pub fn take_fetch_failure(&self) -> Option<(FailureCategory, String)> {
        self.fetch_failure.lock().unwrap().clone()
    }

    /// Best page-derived title for mapping fallbacks: `<title>`, `og:title`,
    /// first H1.
    pub async fn fallback_title(&self, engine: &Engine) -> Option<String> {
        let page = self.page(engine).await?;
        Self::title_of(&page)
    }

    /// Same, but without triggering a fetch — for strategies that run ahead
    /// of the static tier.
    pub fn fallback_title_if_cached(&self) -> Option<String> {
        let page = self.page.get()?.as_ref()?;
        Self::title_of(page)
    }

    fn title_of(page: &PageSnapshot) -> Option<String> {
        page.parsed
            .title
            .clone()
            .or_else(|| page.parsed.open_graph.get("og:title").cloned())
            .or_else(|| page.parsed.h1.first().cloned())
    }
}

/// Fetch seam handed to site handlers: shared pool and jar, this request's
/// headers and cancellation.
pub struct CtxFetcher {
    pub client: Arc<PooledClient>,
    pub base: FetchOptions,
}

impl CtxFetcher {
    pub fn new(client: Arc<PooledClient>, ctx: &RequestCtx) -> Self {
        Self { client, base: ctx.fetch_options() }
    }
}

#[async_trait]
impl HandlerFetcher for CtxFetcher {
    async fn fetch(&self, url: &Url, opts: &FetchOptions) -> Result<FetchResponse, ExtractError> {
        let mut merged = self.base.clone();
        for (k, v) in &opts.headers {
            merged.headers.insert(k.clone(), v.clone());
        }
        merged.method = opts.method;
        merged.body = opts.body.clone();
        if let Some(t) = opts.timeout {
            merged.timeout = Some(t);
        }
        self.client.fetch(url, &merged).await
    }
}
