//! Chain step 2: replay learned patterns, best candidate first.

use async_trait::async_trait;
use tracing::debug;

use siphon_core::{CostTier, FailureCategory};
use siphon_patterns::{apply_pattern, FailureRecord};

use crate::context::RequestCtx;
use crate::strategy::{Candidate, Strategy, StrategyOutcome, LEARNED_PATTERNS};
use crate::Engine;

pub struct LearnedPatternStrategy;

/// `meta.strategy` from the pattern's provenance: `openapi:…` ids replay as
/// `api:openapi`, predicted ones as `api:predicted`, and so on.
fn strategy_for_pattern(pattern_id: &str) -> String {
    let source = pattern_id.split(':').next().unwrap_or("learned");
    format!("api:{}", source)
}

#[async_trait]
impl Strategy for LearnedPatternStrategy {
    fn id(&self) -> &'static str {
        LEARNED_PATTERNS
    }

    fn tier(&self) -> CostTier {
        CostTier::Lightweight
    }

    async fn run(&self, ctx: &RequestCtx, engine: &Engine) -> StrategyOutcome {
        let matched = engine.registry.match_url(&ctx.url).await;
        if matched.candidates.is_empty() {
            return StrategyOutcome::NotApplicable(None);
        }

        let fallback_title = ctx.fallback_title_if_cached();
        let mut last_failure: Option<StrategyOutcome> = None;

        for candidate in matched.candidates {
            if ctx.cancel.is_cancelled() {
                return StrategyOutcome::failed(FailureCategory::Cancelled, "cancelled");
            }
            let applied = apply_pattern(
                &engine.client,
                &candidate.pattern,
                &candidate.api_endpoint,
                Some(ctx.remaining()),
                Some(ctx.cancel.clone()),
                fallback_title.as_deref(),
            )
            .await;

            match applied {
                Ok(result) => {
                    return StrategyOutcome::Candidate(Box::new(Candidate {
                        content: result.content,
                        result_strategy: strategy_for_pattern(&candidate.pattern.id),
                        final_url: result.final_url,
                        api_url: Some(result.api_url),
                        method: candidate.pattern.method,
                        response_time_ms: result.response_time_ms,
                        status: Some(result.status),
                        warnings: result.warnings,
                    }));
                }
                Err(failure) => {
                    debug!(
                        pattern = %candidate.pattern.id,
                        category = %failure.category,
                        reason = %failure.reason,
                        "pattern application failed, trying next candidate"
                    );
                    let record = FailureRecord {
                        id: format!("{}-{}", candidate.pattern.id, siphon_core::now_ms()),
                        domain: ctx.domain.clone(),
                        url: ctx.url.to_string(),
                        api_url: Some(candidate.api_endpoint.clone()),
                        category: failure.category,
                        status_code: failure.status_code,
                        reason: failure.reason.clone(),
                        timestamp: siphon_core::now_ms(),
                        response_time_ms: failure.response_time_ms,
                    };
                    let _ = engine
                        .registry
                        .record_failure(record, Some(candidate.pattern.id.as_str()))
                        .await;
                    last_failure = Some(StrategyOutcome::Failed {
                        category: failure.category,
                        reason: failure.reason,
                        should_have_matched: true,
                        api_url: Some(candidate.api_endpoint),
                        status: failure.status_code,
                    });
                }
            }
        }
        last_failure.unwrap_or(StrategyOutcome::NotApplicable(None))
    }
}
