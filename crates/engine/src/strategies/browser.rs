//! Chain step 11, last resort: the headless renderer. Silently skipped when
//! no renderer is available or the caller disallowed it.

use async_trait::async_trait;
use tracing::info;

use siphon_adapters::{RenderOptions, WaitUntil};
use siphon_core::{CostTier, ExtractedContent, FailureCategory, HttpMethod};
use siphon_parse::{estimate_wait_secs, is_interactive_challenge, is_waiting_screen, parse_html};

use crate::context::RequestCtx;
use crate::options::ChallengeInfo;
use crate::strategy::{Candidate, Strategy, StrategyOutcome, HEADLESS_RENDERER};
use crate::Engine;

pub struct BrowserStrategy;

#[async_trait]
impl Strategy for BrowserStrategy {
    fn id(&self) -> &'static str {
        HEADLESS_RENDERER
    }

    fn tier(&self) -> CostTier {
        CostTier::Playwright
    }

    async fn run(&self, ctx: &RequestCtx, engine: &Engine) -> StrategyOutcome {
        if !engine.renderer.available() {
            return StrategyOutcome::NotApplicable(Some("renderer unavailable".into()));
        }

        let opts = RenderOptions {
            wait_for: WaitUntil::Networkidle,
            timeout_ms: ctx.remaining().as_millis() as u64,
            headers: ctx.opts.headers.clone(),
            cancel: Some(ctx.cancel.clone()),
            ..Default::default()
        };
        let mut rendering = match engine.renderer.render(ctx.url.as_str(), &opts).await {
            Ok(r) => r,
            Err(e) => {
                return StrategyOutcome::failed(FailureCategory::from_error(&e), e.to_string())
            }
        };

        // A challenge that survives rendering goes to the caller; if they
        // resolve it, one more render attempt.
        if is_interactive_challenge(&rendering.html) {
            let parsed = parse_html(&rendering.html, &ctx.url);
            let info = ChallengeInfo {
                url: ctx.url.to_string(),
                interactive: true,
                estimated_wait_secs: estimate_wait_secs(&parsed.body_text),
            };
            let resolved = ctx
                .opts
                .on_challenge_detected
                .as_ref()
                .map(|cb| cb(&info))
                .unwrap_or(false);
            if !resolved {
                return StrategyOutcome::Failed {
                    category: FailureCategory::Blocked,
                    reason: "interactive challenge survived rendering".into(),
                    should_have_matched: false,
                    api_url: None,
                    status: None,
                };
            }
            info!(url = %ctx.url, "challenge reported resolved, re-rendering");
            rendering = match engine.renderer.render(ctx.url.as_str(), &opts).await {
                Ok(r) => r,
                Err(e) => {
                    return StrategyOutcome::failed(FailureCategory::from_error(&e), e.to_string())
                }
            };
        }

        let parsed = parse_html(&rendering.html, &ctx.url);
        if is_waiting_screen(&parsed.body_text, rendering.html.len()) {
            return StrategyOutcome::failed(
                FailureCategory::Blocked,
                "waiting screen persisted after rendering",
            );
        }

        let title = parsed
            .title
            .clone()
            .or_else(|| parsed.open_graph.get("og:title").cloned())
            .or_else(|| parsed.h1.first().cloned())
            .unwrap_or_default();

        StrategyOutcome::Candidate(Box::new(Candidate {
            content: ExtractedContent {
                title,
                text: parsed.body_text,
                markdown: parsed.markdown,
                structured: None,
            },
            result_strategy: "browser:playwright".to_string(),
            final_url: rendering.final_url,
            api_url: None,
            method: HttpMethod::Get,
            response_time_ms: 0,
            status: None,
            warnings: Vec::new(),
        }))
    }
}
