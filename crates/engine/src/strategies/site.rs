//! Chain step 1: per-site handlers. First claiming handler only; a `None`
//! from it falls through to the next *strategy*, never to another handler.

use async_trait::async_trait;

use siphon_core::{CostTier, ExtractError, FailureCategory, HttpMethod};

use crate::context::{CtxFetcher, RequestCtx};
use crate::strategy::{Strategy, StrategyOutcome, SITE_HANDLERS};
use crate::Engine;

pub struct SiteHandlerStrategy;

#[async_trait]
impl Strategy for SiteHandlerStrategy {
    fn id(&self) -> &'static str {
        SITE_HANDLERS
    }

    fn tier(&self) -> siphon_core::CostTier {
        CostTier::Lightweight
    }

    async fn run(&self, ctx: &RequestCtx, engine: &Engine) -> StrategyOutcome {
        let Some(handler) = engine.handlers.handler_for(&ctx.url) else {
            return StrategyOutcome::NotApplicable(None);
        };
        let fetcher = CtxFetcher::new(engine.client.clone(), ctx);

        match handler.extract(&ctx.url, &fetcher).await {
            Ok(Some(site)) => StrategyOutcome::Candidate(Box::new(crate::strategy::Candidate {
                content: site.content,
                result_strategy: handler.name().to_string(),
                final_url: ctx.url.to_string(),
                api_url: site.api_url,
                method: HttpMethod::Get,
                response_time_ms: site.response_time_ms,
                status: Some(200),
                warnings: Vec::new(),
            })),
            Ok(None) => {
                StrategyOutcome::NotApplicable(Some(format!("{} bowed out", handler.name())))
            }
            Err(e) => {
                // This handler positively claimed the URL; its failure is a
                // recordable signal.
                let (category, status) = match &e {
                    ExtractError::Status { status, .. } => {
                        (FailureCategory::from_status(*status), Some(*status))
                    }
                    other => (FailureCategory::from_error(other), None),
                };
                StrategyOutcome::Failed {
                    category,
                    reason: e.to_string(),
                    should_have_matched: true,
                    api_url: None,
                    status,
                }
            }
        }
    }
}
