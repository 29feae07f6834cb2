//! Chain step 5: direct HTML parse of the fetched page, with challenge
//! detection routed to the caller's callback.

use async_trait::async_trait;
use tracing::info;

use siphon_core::{CostTier, ExtractedContent, FailureCategory, HttpMethod};
use siphon_parse::{estimate_wait_secs, is_interactive_challenge, is_waiting_screen};

use crate::context::RequestCtx;
use crate::options::ChallengeInfo;
use crate::strategy::{Candidate, Strategy, StrategyOutcome, STATIC_PARSE};
use crate::Engine;

pub struct StaticParseStrategy;

#[async_trait]
impl Strategy for StaticParseStrategy {
    fn id(&self) -> &'static str {
        STATIC_PARSE
    }

    fn tier(&self) -> CostTier {
        CostTier::Intelligence
    }

    async fn run(&self, ctx: &RequestCtx, engine: &Engine) -> StrategyOutcome {
        let Some(page) = ctx.page(engine).await else {
            let (category, reason) = ctx
                .take_fetch_failure()
                .unwrap_or((FailureCategory::Unknown, "page unavailable".into()));
            return StrategyOutcome::failed(category, reason);
        };
        if !page.is_html() {
            return StrategyOutcome::NotApplicable(Some("not an html document".into()));
        }

        let html = page.response.body_text();
        let parsed = &page.parsed;

        // Bot-protection pages: interactive challenges go to the callback;
        // auto-resolving waits are the browser tier's job.
        if is_interactive_challenge(&html) {
            let info = ChallengeInfo {
                url: ctx.url.to_string(),
                interactive: true,
                estimated_wait_secs: estimate_wait_secs(&parsed.body_text),
            };
            let handled = ctx
                .opts
                .on_challenge_detected
                .as_ref()
                .map(|cb| cb(&info))
                .unwrap_or(false);
            if handled {
                info!(url = %ctx.url, "challenge reported as resolved by callback");
            }
            return StrategyOutcome::Failed {
                category: FailureCategory::Blocked,
                reason: "interactive challenge page".into(),
                should_have_matched: false,
                api_url: None,
                status: Some(page.response.status),
            };
        }
        if is_waiting_screen(&parsed.body_text, html.len()) {
            return StrategyOutcome::Failed {
                category: FailureCategory::Blocked,
                reason: "waiting screen / JS challenge".into(),
                should_have_matched: false,
                api_url: None,
                status: Some(page.response.status),
            };
        }

        let title = parsed
            .title
            .clone()
            .or_else(|| parsed.open_graph.get("og:title").cloned())
            .or_else(|| parsed.h1.first().cloned())
            .unwrap_or_default();

        let mut warnings = Vec::new();
        if title.is_empty() {
            warnings.push("static parse found no title".to_string());
        }

        StrategyOutcome::Candidate(Box::new(Candidate {
            content: ExtractedContent {
                title,
                text: parsed.body_text.clone(),
                markdown: parsed.markdown.clone(),
                structured: None,
            },
            result_strategy: "parse:static".to_string(),
            final_url: page.response.final_url.to_string(),
            api_url: None,
            method: HttpMethod::Get,
            response_time_ms: page.response.response_time_ms,
            status: Some(page.response.status),
            warnings,
        }))
    }
}
