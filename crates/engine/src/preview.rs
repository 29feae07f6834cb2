//! `preview`: the planned strategy order with expected costs and confidence
//! factors, computed entirely in memory — no strategy executes.

use serde::Serialize;
use url::Url;

use siphon_core::CostTier;

use crate::options::ExtractOptions;
use crate::strategy::Strategy;
use crate::Engine;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedStep {
    pub strategy: String,
    pub tier: CostTier,
    pub estimated_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Rough prior that this step would produce the result.
    pub confidence_factor: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    pub url: String,
    pub suppressed: bool,
    pub steps: Vec<PlannedStep>,
}

fn estimated_ms(tier: CostTier) -> u64 {
    match tier {
        CostTier::Intelligence => 80,
        CostTier::Lightweight => 800,
        CostTier::Playwright => 8_000,
    }
}

pub async fn preview(engine: &Engine, url: &Url, opts: &ExtractOptions) -> ExecutionPlan {
    let suppressed = engine
        .registry
        .suppression_for_url(url)
        .await
        .map(|a| a.recommended_action == siphon_patterns::RecommendedAction::SkipDomain)
        .unwrap_or(false);

    let matched = engine.registry.match_url(url).await;
    let best_pattern_confidence = matched
        .candidates
        .first()
        .map(|c| c.pattern.metrics.confidence)
        .unwrap_or(0.0);
    let handler_claims = engine.handlers.handler_for(url).is_some();

    let mut steps = Vec::new();
    for strategy in engine.strategies.iter() {
        let id = strategy.id();
        let tier = strategy.tier();

        let skip_reason = if let Some(forced) = &opts.force_strategy {
            (forced != id).then(|| format!("forceStrategy={}", forced))
        } else if opts.skip_strategies.iter().any(|s| s == id) {
            Some("skipped by caller".to_string())
        } else if tier == CostTier::Playwright && !opts.allow_browser {
            Some("browser disallowed".to_string())
        } else if opts.max_cost_tier.is_some_and(|cap| tier > cap) {
            Some("above cost tier cap".to_string())
        } else {
            None
        };

        let confidence_factor = match id {
            "site-handlers" => {
                if handler_claims {
                    0.9
                } else {
                    0.0
                }
            }
            "learned-patterns" => best_pattern_confidence,
            "framework-extraction" => 0.35,
            "structured-data" => 0.45,
            "static-parse" => 0.5,
            "predicted-api" => 0.25,
            "openapi-discovery" | "graphql-discovery" => {
                let source = if id.starts_with("openapi") { "openapi" } else { "graphql" };
                let domain = siphon_core::domain::registrable_domain(url);
                if engine.cache.in_cooldown(source, &domain).is_some() {
                    0.0
                } else {
                    0.3
                }
            }
            "google-cache" | "archive-org" => 0.2,
            "headless-renderer" => {
                if engine.renderer.available() {
                    0.7
                } else {
                    0.0
                }
            }
            _ => 0.1,
        };

        steps.push(PlannedStep {
            strategy: id.to_string(),
            tier,
            estimated_ms: estimated_ms(tier),
            skip_reason,
            confidence_factor,
        });
    }

    ExecutionPlan { url: url.to_string(), suppressed, steps }
}
