//! The orchestrator: drive the strategy chain in canonical order under the
//! request's budgets, validate candidates, record failures and traces, and
//! emit learning events for `api:*` successes.

use std::time::Instant;

use tracing::{debug, info, warn};

use siphon_core::{
    now_ms, Confidence, ContentResult, ExtractionEvent, FailureCategory, ResultMeta,
};
use siphon_patterns::{FailureRecord, RecommendedAction};
use siphon_trace::{ContentStats, TierAttempt, TraceError, TraceRecord};
use siphon_verify::{verify, VerifyOptions};

use crate::context::RequestCtx;
use crate::strategy::{min_tier_cost_ms, Candidate, StrategyOutcome, LEARNED_PATTERNS};
use crate::Engine;

/// Nominal fine-grained name for attempts that never produced a candidate.
fn default_result_name(chain_id: &str) -> &'static str {
    match chain_id {
        "site-handlers" => "site:handler",
        "learned-patterns" => "api:learned",
        "framework-extraction" => "framework:detect",
        "structured-data" => "structured:jsonld",
        "static-parse" => "parse:static",
        "predicted-api" => "api:predicted",
        "openapi-discovery" => "api:openapi",
        "graphql-discovery" => "api:graphql",
        "google-cache" => "cache:google",
        "archive-org" => "cache:archive",
        "headless-renderer" => "browser:playwright",
        _ => "unknown",
    }
}

fn confidence_for(result_strategy: &str, verified: Option<f64>) -> Confidence {
    match verified {
        Some(c) if c >= 0.9 => Confidence::High,
        Some(c) if c >= 0.6 => Confidence::Medium,
        Some(_) => Confidence::Low,
        None => {
            if result_strategy.starts_with("api:") || result_strategy.starts_with("site:") {
                Confidence::High
            } else {
                Confidence::Medium
            }
        }
    }
}

fn count_tables(markdown: &str) -> usize {
    markdown
        .lines()
        .filter(|line| {
            let t = line.trim();
            t.starts_with('|') && t.contains("---")
        })
        .count()
}

pub async fn run(engine: &Engine, ctx: &RequestCtx) -> ContentResult {
    let mut trace = TraceRecord::new(ctx.url.as_str(), &ctx.domain);
    trace.metadata.options = ctx.opts.echo();
    trace.metadata.session_loaded = ctx.opts.session.is_some();
    trace.budget.max_latency_ms = ctx.opts.max_latency_ms;

    // Active skip-domain suppression short-circuits before any network I/O.
    if let Some(anti) = engine.registry.suppression_for_url(&ctx.url).await {
        if anti.recommended_action == RecommendedAction::SkipDomain {
            info!(domain = %ctx.domain, category = %anti.failure_category, "domain suppressed");
            let mut result = ContentResult::empty(
                ctx.url.as_str(),
                Vec::new(),
                ctx.elapsed_ms(),
                "Domain suppressed".to_string(),
            );
            result.warnings.push(format!(
                "anti-pattern {} active for {}",
                anti.id, anti.failure_category
            ));
            trace.errors.push(TraceError {
                error_type: "suppressed".into(),
                message: anti.reason.clone(),
                recovery_attempted: false,
                timestamp: now_ms(),
            });
            finish_trace(engine, trace, &result, None);
            return result;
        }
    }

    let mut attempted: Vec<String> = Vec::new();
    let mut warnings: Vec<String> = Vec::new();
    let mut retried = false;

    'chain: loop {
        for strategy in engine.strategies.iter() {
            let id = strategy.id();

            if ctx.cancel.is_cancelled() || ctx.deadline_exceeded() {
                let mut result = ContentResult::empty(
                    ctx.url.as_str(),
                    attempted.clone(),
                    ctx.elapsed_ms(),
                    "cancelled".to_string(),
                );
                result.warnings = warnings.clone();
                trace.errors.push(TraceError {
                    error_type: "cancelled".into(),
                    message: "caller cancelled or deadline exceeded".into(),
                    recovery_attempted: false,
                    timestamp: now_ms(),
                });
                // No learning events on cancellation.
                finish_trace(engine, trace, &result, None);
                return result;
            }

            if let Some(forced) = &ctx.opts.force_strategy {
                if forced != id && forced != default_result_name(id) {
                    continue;
                }
            }
            if ctx.opts.skip_strategies.iter().any(|s| s == id) {
                trace.budget.tiers_skipped.push(id.to_string());
                continue;
            }
            let tier = strategy.tier();
            if tier == siphon_core::CostTier::Playwright && !ctx.opts.allow_browser {
                trace.budget.tiers_skipped.push(id.to_string());
                continue;
            }
            if let Some(cap) = ctx.opts.max_cost_tier {
                if tier > cap {
                    trace.budget.tiers_skipped.push(id.to_string());
                    continue;
                }
            }
            if let Some(max_latency) = ctx.opts.max_latency_ms {
                if ctx.elapsed_ms() + min_tier_cost_ms(tier) > max_latency {
                    trace.budget.latency_exceeded = true;
                    trace.budget.tiers_skipped.push(id.to_string());
                    continue;
                }
            }

            let step_started = Instant::now();
            let outcome = strategy.run(ctx, engine).await;
            let step_ms = step_started.elapsed().as_millis() as u64;

            match outcome {
                StrategyOutcome::NotApplicable(reason) => {
                    if let Some(reason) = reason {
                        debug!(strategy = id, reason, "not applicable");
                    }
                }
                StrategyOutcome::Failed { category, reason, should_have_matched, api_url, status } => {
                    let fine = default_result_name(id);
                    attempted.push(fine.to_string());
                    warnings.push(format!("{}: {} ({})", fine, reason, category));
                    trace.tiers.push(TierAttempt {
                        name: fine.to_string(),
                        success: false,
                        duration_ms: step_ms,
                    });
                    trace.errors.push(TraceError {
                        error_type: category.to_string(),
                        message: reason.clone(),
                        recovery_attempted: false,
                        timestamp: now_ms(),
                    });

                    // Only strategies that positively claimed the URL leave
                    // failure records. The learned tier records its own,
                    // per candidate.
                    if should_have_matched && id != LEARNED_PATTERNS {
                        let record = FailureRecord {
                            id: format!("{}-{}", fine, now_ms()),
                            domain: ctx.domain.clone(),
                            url: ctx.url.to_string(),
                            api_url,
                            category,
                            status_code: status,
                            reason: reason.clone(),
                            timestamp: now_ms(),
                            response_time_ms: step_ms,
                        };
                        if let Err(e) = engine.registry.record_failure(record, None).await {
                            warn!(error = %e, "failure record rejected");
                        }
                    }

                    if category == FailureCategory::Cancelled {
                        let mut result = ContentResult::empty(
                            ctx.url.as_str(),
                            attempted.clone(),
                            ctx.elapsed_ms(),
                            "cancelled".to_string(),
                        );
                        result.warnings = warnings.clone();
                        finish_trace(engine, trace, &result, None);
                        return result;
                    }
                    if ctx.opts.force_strategy.is_some() {
                        break 'chain;
                    }
                }
                StrategyOutcome::Candidate(candidate) => {
                    let fine = candidate.result_strategy.clone();
                    attempted.push(fine.clone());

                    let api_url = candidate.api_url.clone();
                    let method = candidate.method;
                    let api_response_ms = candidate.response_time_ms;
                    match validate_candidate(engine, ctx, *candidate, &mut retried).await {
                        Validation::Accepted(mut result, verified) => {
                            trace.tiers.push(TierAttempt {
                                name: fine.clone(),
                                success: true,
                                duration_ms: step_ms,
                            });
                            result.meta.strategies_attempted = attempted.clone();
                            result.meta.timing_ms = ctx.elapsed_ms();
                            let mut merged = warnings.clone();
                            merged.append(&mut result.warnings);
                            result.warnings = merged;
                            result.meta.confidence = confidence_for(&fine, verified);

                            // Learning: every successful api:* strategy
                            // emits; the registry keeps increments
                            // idempotent.
                            if fine.starts_with("api:") {
                                if let Some(api_url) = api_url {
                                    let event = ExtractionEvent {
                                        source_url: ctx.url.to_string(),
                                        api_url,
                                        strategy: fine.clone(),
                                        response_time_ms: api_response_ms,
                                        method,
                                        headers: None,
                                        content: result.content.clone(),
                                    };
                                    if let Some(listener) = &ctx.opts.on_extraction_success {
                                        listener(&event);
                                    }
                                    engine.bus.emit(event);
                                }
                            }

                            finish_trace(engine, trace, &result, Some(fine));
                            return result;
                        }
                        Validation::Rejected(reason) => {
                            trace.tiers.push(TierAttempt {
                                name: fine.clone(),
                                success: false,
                                duration_ms: step_ms,
                            });
                            warnings.push(format!("{}: {}", fine, reason));
                            if ctx.opts.force_strategy.is_some() {
                                break 'chain;
                            }
                        }
                        Validation::Retry => {
                            trace.tiers.push(TierAttempt {
                                name: fine.clone(),
                                success: false,
                                duration_ms: step_ms,
                            });
                            warnings.push(format!("{}: retrying chain on verification signal", fine));
                            continue 'chain;
                        }
                    }
                }
            }
        }
        break;
    }

    let error = if warnings.is_empty() {
        "no strategy produced content".to_string()
    } else {
        format!("all strategies exhausted: {}", warnings.join("; "))
    };
    let mut result =
        ContentResult::empty(ctx.url.as_str(), attempted, ctx.elapsed_ms(), error);
    result.warnings = warnings;
    finish_trace(engine, trace, &result, None);
    result
}

enum Validation {
    Accepted(ContentResult, Option<f64>),
    Rejected(String),
    /// Failed verification with a retryable check; restart the chain once.
    Retry,
}

/// Candidate validation: length gate first, then the verification engine.
async fn validate_candidate(
    engine: &Engine,
    ctx: &RequestCtx,
    candidate: Candidate,
    retried: &mut bool,
) -> Validation {
    let min_len = ctx.opts.effective_min_content_length();
    if candidate.content.text.len() < min_len {
        // One byte short is `empty`: not a failure, just not applicable.
        return Validation::Rejected(format!(
            "content {} chars below minimum {} (empty)",
            candidate.content.text.len(),
            min_len
        ));
    }

    let mut result = ContentResult {
        content: candidate.content,
        meta: ResultMeta {
            url: ctx.url.to_string(),
            final_url: candidate.final_url,
            strategy: candidate.result_strategy.clone(),
            strategies_attempted: Vec::new(),
            timing_ms: candidate.response_time_ms,
            confidence: Confidence::Medium,
        },
        warnings: candidate.warnings,
        error: None,
    };

    let Some(spec) = ctx.opts.verify.as_ref().filter(|v| v.enabled) else {
        return Validation::Accepted(result, None);
    };

    let opts = VerifyOptions {
        mode: spec.mode,
        validate_schema: spec.validate_schema,
        schema: spec.schema.clone(),
        checks: spec.checks.clone(),
    };
    let verdict = verify(&result, candidate.status, &opts);

    if verdict.passed || verdict.errors.is_empty() {
        result.warnings.extend(verdict.warnings.clone());
        return Validation::Accepted(result, Some(verdict.confidence));
    }
    if verdict.retry_signal() && !*retried {
        *retried = true;
        // Anti-pattern-derived delay before the one retry.
        if let Some(anti) = engine.registry.suppression_for_url(&ctx.url).await {
            if let Some(delay_ms) = siphon_patterns::PatternRegistry::retry_delay_ms(&anti) {
                let delay = std::time::Duration::from_millis(delay_ms as u64)
                    .min(ctx.remaining());
                tokio::time::sleep(delay).await;
            }
        }
        return Validation::Retry;
    }
    Validation::Rejected(format!(
        "verification failed: {}",
        verdict.errors.join("; ")
    ))
}

fn finish_trace(
    engine: &Engine,
    mut trace: TraceRecord,
    result: &ContentResult,
    final_tier: Option<String>,
) {
    trace.success = result.error.is_none();
    trace.final_url = result.meta.final_url.clone();
    trace.duration_ms = result.meta.timing_ms;
    trace.fallback_occurred = trace.tiers.len() > 1;
    trace.final_tier = final_tier;
    trace.content_stats = ContentStats {
        text_length: result.content.text.len(),
        markdown_length: result.content.markdown.len(),
        table_count: count_tables(&result.content.markdown),
        api_count: result
            .meta
            .strategies_attempted
            .iter()
            .filter(|s| s.starts_with("api:"))
            .count(),
    };
    if let Some(mode) = &result.error {
        debug!(url = %trace.url, error = %mode, "request finished without content");
    }
    engine.traces.record(trace);
}
