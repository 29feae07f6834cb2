//! Chain steps 9–10: public caches. Google's page cache, then the Wayback
//! Machine's closest snapshot.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use siphon_core::{CostTier, ExtractedContent, FailureCategory, HttpMethod};
use siphon_parse::parse_html;

use crate::context::RequestCtx;
use crate::strategy::{Candidate, Strategy, StrategyOutcome, ARCHIVE_ORG, GOOGLE_CACHE};
use crate::Engine;

fn candidate_from_html(
    html: &str,
    source_url: &Url,
    result_strategy: &str,
    final_url: String,
    response_time_ms: u64,
) -> Option<Candidate> {
    let parsed = parse_html(html, source_url);
    let title = parsed
        .title
        .clone()
        .or_else(|| parsed.h1.first().cloned())
        .unwrap_or_default();
    if parsed.body_text.is_empty() {
        return None;
    }
    Some(Candidate {
        content: ExtractedContent {
            title,
            text: parsed.body_text,
            markdown: parsed.markdown,
            structured: None,
        },
        result_strategy: result_strategy.to_string(),
        final_url,
        api_url: None,
        method: HttpMethod::Get,
        response_time_ms,
        status: Some(200),
        warnings: vec![format!("content served from {}", result_strategy)],
    })
}

pub struct GoogleCacheStrategy;

#[async_trait]
impl Strategy for GoogleCacheStrategy {
    fn id(&self) -> &'static str {
        GOOGLE_CACHE
    }

    fn tier(&self) -> CostTier {
        CostTier::Lightweight
    }

    async fn run(&self, ctx: &RequestCtx, engine: &Engine) -> StrategyOutcome {
        let cache_url = format!(
            "https://webcache.googleusercontent.com/search?q=cache:{}",
            ctx.url
        );
        let Ok(cache_url) = Url::parse(&cache_url) else {
            return StrategyOutcome::NotApplicable(None);
        };
        let response = match engine.client.fetch(&cache_url, &ctx.fetch_options()).await {
            Ok(r) => r,
            Err(e) => {
                return StrategyOutcome::failed(FailureCategory::from_error(&e), e.to_string())
            }
        };
        if !response.is_success() {
            return StrategyOutcome::NotApplicable(Some(format!(
                "google cache answered {}",
                response.status
            )));
        }
        match candidate_from_html(
            &response.body_text(),
            &ctx.url,
            "cache:google",
            ctx.url.to_string(),
            response.response_time_ms,
        ) {
            Some(candidate) => StrategyOutcome::Candidate(Box::new(candidate)),
            None => StrategyOutcome::NotApplicable(Some("empty cached copy".into())),
        }
    }
}

pub struct ArchiveOrgStrategy;

#[async_trait]
impl Strategy for ArchiveOrgStrategy {
    fn id(&self) -> &'static str {
        ARCHIVE_ORG
    }

    fn tier(&self) -> CostTier {
        CostTier::Lightweight
    }

    async fn run(&self, ctx: &RequestCtx, engine: &Engine) -> StrategyOutcome {
        let lookup = format!("https://archive.org/wayback/available?url={}", ctx.url);
        let Ok(lookup) = Url::parse(&lookup) else {
            return StrategyOutcome::NotApplicable(None);
        };
        let response = match engine.client.fetch(&lookup, &ctx.fetch_options()).await {
            Ok(r) => r,
            Err(e) => {
                return StrategyOutcome::failed(FailureCategory::from_error(&e), e.to_string())
            }
        };
        if !response.is_success() {
            return StrategyOutcome::NotApplicable(None);
        }
        let Ok(value) = serde_json::from_slice::<serde_json::Value>(&response.body) else {
            return StrategyOutcome::NotApplicable(None);
        };
        let Some(snapshot_url) = value["archived_snapshots"]["closest"]["url"].as_str() else {
            return StrategyOutcome::NotApplicable(Some("no wayback snapshot".into()));
        };
        debug!(snapshot = snapshot_url, "wayback snapshot located");
        let Ok(snapshot) = Url::parse(snapshot_url) else {
            return StrategyOutcome::NotApplicable(None);
        };

        let response = match engine.client.fetch(&snapshot, &ctx.fetch_options()).await {
            Ok(r) => r,
            Err(e) => {
                return StrategyOutcome::failed(FailureCategory::from_error(&e), e.to_string())
            }
        };
        if !response.is_success() {
            return StrategyOutcome::NotApplicable(None);
        }
        match candidate_from_html(
            &response.body_text(),
            &ctx.url,
            "cache:archive",
            snapshot.to_string(),
            response.response_time_ms,
        ) {
            Some(candidate) => StrategyOutcome::Candidate(Box::new(candidate)),
            None => StrategyOutcome::NotApplicable(Some("empty snapshot".into())),
        }
    }
}
