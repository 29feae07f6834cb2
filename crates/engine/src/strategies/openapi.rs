//! Chain step 7: OpenAPI discovery. Found patterns register for everyone;
//! one matching the current URL is applied immediately.

use async_trait::async_trait;
use tracing::{debug, info};

use siphon_core::{CostTier, ExtractError, FailureCategory};
use siphon_patterns::apply_pattern;

use crate::context::RequestCtx;
use crate::strategy::{Candidate, Strategy, StrategyOutcome, OPENAPI_DISCOVERY};
use crate::Engine;

pub struct OpenApiDiscoveryStrategy;

#[async_trait]
impl Strategy for OpenApiDiscoveryStrategy {
    fn id(&self) -> &'static str {
        OPENAPI_DISCOVERY
    }

    fn tier(&self) -> CostTier {
        CostTier::Lightweight
    }

    async fn run(&self, ctx: &RequestCtx, engine: &Engine) -> StrategyOutcome {
        let discovery = match engine
            .discovery
            .discover_openapi(&ctx.url, Some(ctx.cancel.clone()))
            .await
        {
            Ok(d) => d,
            Err(ExtractError::Cooldown { until_ms, .. }) => {
                return StrategyOutcome::NotApplicable(Some(format!(
                    "discovery in cooldown until {}",
                    until_ms
                )));
            }
            Err(ExtractError::Cancelled) => {
                return StrategyOutcome::failed(FailureCategory::Cancelled, "cancelled")
            }
            Err(e) => {
                return StrategyOutcome::failed(FailureCategory::from_error(&e), e.to_string())
            }
        };
        if !discovery.found {
            return StrategyOutcome::NotApplicable(None);
        }

        // Register everything the provider declared, idempotently.
        for pattern in &discovery.patterns {
            if let Err(e) = engine.registry.register(pattern.clone()).await {
                debug!(id = %pattern.id, error = %e, "generated pattern rejected");
            }
        }
        info!(
            domain = %ctx.domain,
            patterns = discovery.patterns.len(),
            "openapi spec discovered"
        );

        // Apply the first generated pattern that covers this very URL.
        let url_str = ctx.url.as_str();
        let fallback_title = ctx.fallback_title_if_cached();
        for pattern in &discovery.patterns {
            let matches = pattern.url_patterns.iter().any(|p| {
                regex::Regex::new(p).map(|re| re.is_match(url_str)).unwrap_or(false)
            });
            if !matches {
                continue;
            }
            let expanded = siphon_patterns::extract::expand_endpoint(
                &pattern.endpoint_template,
                &pattern.extractors,
                &ctx.url,
                &Default::default(),
            );
            let Ok(endpoint) = expanded else { continue };

            match apply_pattern(
                &engine.client,
                pattern,
                &endpoint,
                Some(ctx.remaining()),
                Some(ctx.cancel.clone()),
                fallback_title.as_deref(),
            )
            .await
            {
                Ok(result) => {
                    return StrategyOutcome::Candidate(Box::new(Candidate {
                        content: result.content,
                        result_strategy: "api:openapi".to_string(),
                        final_url: result.final_url,
                        api_url: Some(result.api_url),
                        method: pattern.method,
                        response_time_ms: result.response_time_ms,
                        status: Some(result.status),
                        warnings: result.warnings,
                    }));
                }
                Err(failure) => {
                    return StrategyOutcome::Failed {
                        category: failure.category,
                        reason: failure.reason,
                        should_have_matched: true,
                        api_url: Some(endpoint),
                        status: failure.status_code,
                    };
                }
            }
        }
        StrategyOutcome::NotApplicable(Some("spec found; no endpoint covers this url".into()))
    }
}
