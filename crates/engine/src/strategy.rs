//! The strategy seam: every extraction path is a named, cost-classed step
//! that yields a candidate, bows out, or fails with a category.

use async_trait::async_trait;

use siphon_core::{CostTier, ExtractedContent, FailureCategory, HttpMethod};

use crate::context::RequestCtx;
use crate::Engine;

/// Chain-level identifiers, in canonical order.
pub const SITE_HANDLERS: &str = "site-handlers";
pub const LEARNED_PATTERNS: &str = "learned-patterns";
pub const FRAMEWORK_EXTRACTION: &str = "framework-extraction";
pub const STRUCTURED_DATA: &str = "structured-data";
pub const STATIC_PARSE: &str = "static-parse";
pub const PREDICTED_API: &str = "predicted-api";
pub const OPENAPI_DISCOVERY: &str = "openapi-discovery";
pub const GRAPHQL_DISCOVERY: &str = "graphql-discovery";
pub const GOOGLE_CACHE: &str = "google-cache";
pub const ARCHIVE_ORG: &str = "archive-org";
pub const HEADLESS_RENDERER: &str = "headless-renderer";

/// A candidate result produced by one strategy, pre-validation.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub content: ExtractedContent,
    /// Fine-grained strategy id for `meta.strategy`, e.g. `api:openapi`.
    pub result_strategy: String,
    pub final_url: String,
    /// The API endpoint used, when the content came from one.
    pub api_url: Option<String>,
    pub method: HttpMethod,
    pub response_time_ms: u64,
    pub status: Option<u16>,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
pub enum StrategyOutcome {
    /// "Not my URL" / "nothing there" — silent fall-through.
    NotApplicable(Option<String>),
    Candidate(Box<Candidate>),
    Failed {
        category: FailureCategory,
        reason: String,
        /// True when this strategy positively claimed the URL (a matched
        /// handler, an attempted learned pattern); gates failure records.
        should_have_matched: bool,
        api_url: Option<String>,
        status: Option<u16>,
    },
}

impl StrategyOutcome {
    pub fn failed(category: FailureCategory, reason: impl Into<String>) -> Self {
        Self::Failed {
            category,
            reason: reason.into(),
            should_have_matched: false,
            api_url: None,
            status: None,
        }
    }
}

#[async_trait]
pub trait Strategy: Send + Sync {
    /// Chain identifier (`skipStrategies` / `forceStrategy` vocabulary).
    fn id(&self) -> &'static str;
    fn tier(&self) -> CostTier;
    async fn run(&self, ctx: &RequestCtx, engine: &Engine) -> StrategyOutcome;
}

/// Minimum plausible wall-clock cost per tier, used by the latency budget to
/// decide whether a strategy still fits.
pub fn min_tier_cost_ms(tier: CostTier) -> u64 {
    match tier {
        CostTier::Intelligence => 50,
        CostTier::Lightweight => 500,
        CostTier::Playwright => 5_000,
    }
}
