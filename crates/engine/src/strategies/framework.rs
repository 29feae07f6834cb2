//! Chain step 3: frontend-framework state payloads (Next/Nuxt/Remix/Angular
//! and marker-only cousins).

use async_trait::async_trait;

use siphon_core::{CostTier, HttpMethod};

use crate::context::RequestCtx;
use crate::strategies::json_content::content_from_json;
use crate::strategy::{Candidate, Strategy, StrategyOutcome, FRAMEWORK_EXTRACTION};
use crate::Engine;

pub struct FrameworkStrategy;

#[async_trait]
impl Strategy for FrameworkStrategy {
    fn id(&self) -> &'static str {
        FRAMEWORK_EXTRACTION
    }

    fn tier(&self) -> CostTier {
        CostTier::Intelligence
    }

    async fn run(&self, ctx: &RequestCtx, engine: &Engine) -> StrategyOutcome {
        let Some(page) = ctx.page(engine).await else {
            return StrategyOutcome::NotApplicable(Some("page unavailable".into()));
        };
        if !page.is_html() {
            return StrategyOutcome::NotApplicable(None);
        }
        let Some(payload) = &page.parsed.framework else {
            return StrategyOutcome::NotApplicable(None);
        };
        if payload.data.is_null() {
            // Marker-only detection carries no state to extract from.
            return StrategyOutcome::NotApplicable(Some(format!(
                "{} detected without a state payload",
                payload.framework.as_str()
            )));
        }
        let Some(mut content) = content_from_json(&payload.data) else {
            return StrategyOutcome::NotApplicable(Some("no text in framework state".into()));
        };
        if content.title.is_empty() {
            if let Some(title) = ctx.fallback_title_if_cached() {
                content.title = title;
            }
        }

        StrategyOutcome::Candidate(Box::new(Candidate {
            content,
            result_strategy: format!("framework:{}", payload.framework.as_str()),
            final_url: page.response.final_url.to_string(),
            api_url: None,
            method: HttpMethod::Get,
            response_time_ms: page.response.response_time_ms,
            status: Some(page.response.status),
            warnings: Vec::new(),
        }))
    }
}
