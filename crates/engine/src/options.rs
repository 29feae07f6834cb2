//! Per-request options for `extract` and `preview`.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use siphon_core::{CostTier, ExtractionEvent};
use siphon_verify::{RunMode, VerificationCheck};

/// Information handed to the challenge callback when a CAPTCHA is suspected.
#[derive(Debug, Clone)]
pub struct ChallengeInfo {
    pub url: String,
    /// True for interactive challenges; false for auto-resolving waits.
    pub interactive: bool,
    pub estimated_wait_secs: u64,
}

pub type ChallengeCallback = Arc<dyn Fn(&ChallengeInfo) -> bool + Send + Sync>;
pub type SuccessListener = Arc<dyn Fn(&ExtractionEvent) + Send + Sync>;

#[derive(Clone, Default)]
pub struct VerifySpec {
    pub enabled: bool,
    pub mode: RunMode,
    pub validate_schema: bool,
    pub schema: Option<Value>,
    pub checks: Vec<VerificationCheck>,
}

#[derive(Clone, Default)]
pub struct SessionOptions {
    /// `Set-Cookie`-style strings applied to the jar before any fetch.
    pub cookies: Vec<String>,
    pub local_storage: HashMap<String, String>,
    pub profile: Option<String>,
}

#[derive(Clone)]
pub struct ExtractOptions {
    /// Total budget for the entire request.
    pub timeout_ms: u64,
    pub min_content_length: usize,
    /// Run only this strategy; its success or failure is final.
    pub force_strategy: Option<String>,
    pub skip_strategies: Vec<String>,
    pub allow_browser: bool,
    pub max_latency_ms: Option<u64>,
    pub max_cost_tier: Option<CostTier>,
    /// Applied to every HTTP call for this request.
    pub headers: HashMap<String, String>,
    pub user_agent: Option<String>,
    pub verify: Option<VerifySpec>,
    pub session: Option<SessionOptions>,
    pub cancel: Option<CancellationToken>,
    pub on_challenge_detected: Option<ChallengeCallback>,
    pub on_extraction_success: Option<SuccessListener>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 60_000,
            min_content_length: 500,
            force_strategy: None,
            skip_strategies: Vec::new(),
            allow_browser: true,
            max_latency_ms: None,
            max_cost_tier: None,
            headers: HashMap::new(),
            user_agent: None,
            verify: None,
            session: None,
            cancel: None,
            on_challenge_detected: None,
            on_extraction_success: None,
        }
    }
}

impl ExtractOptions {
    /// Acceptance threshold: forced strategies get the relaxed floor.
    pub fn effective_min_content_length(&self) -> usize {
        if self.force_strategy.is_some() {
            self.min_content_length.min(100)
        } else {
            self.min_content_length
        }
    }

    /// Options echo for the trace record; callbacks and session secrets are
    /// not serialized.
    pub fn echo(&self) -> Value {
        json!({
            "timeoutMs": self.timeout_ms,
            "minContentLength": self.min_content_length,
            "forceStrategy": self.force_strategy,
            "skipStrategies": self.skip_strategies,
            "allowBrowser": self.allow_browser,
            "maxLatencyMs": self.max_latency_ms,
            "maxCostTier": self.max_cost_tier,
            "verifyEnabled": self.verify.as_ref().map(|v| v.enabled).unwrap_or(false),
            "hasSession": self.session.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_contract() {
        let opts = ExtractOptions::default();
        assert_eq!(opts.timeout_ms, 60_000);
        assert_eq!(opts.min_content_length, 500);
        assert!(opts.allow_browser);
        assert_eq!(opts.effective_min_content_length(), 500);
    }

    #[test]
    fn forced_strategy_relaxes_floor() {
        let opts = ExtractOptions {
            force_strategy: Some("parse:static".into()),
            ..Default::default()
        };
        assert_eq!(opts.effective_min_content_length(), 100);
    }
}
