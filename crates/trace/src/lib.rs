//! Per-request debug traces: what was tried, in what order, why it was
//! skipped, and what came out. Bounded in memory with LRU-by-timestamp
//! retention; recording is gated by a policy.

use std::collections::VecDeque;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use siphon_core::config::TraceConfig;
use siphon_core::now_ms;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TierAttempt {
    pub name: String,
    pub success: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BudgetSnapshot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_latency_ms: Option<u64>,
    #[serde(default)]
    pub latency_exceeded: bool,
    #[serde(default)]
    pub tiers_skipped: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TitleAttempt {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,
    pub found: bool,
    pub selected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_length: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceError {
    pub error_type: String,
    pub message: String,
    pub recovery_attempted: bool,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentStats {
    pub text_length: usize,
    pub markdown_length: usize,
    pub table_count: usize,
    pub api_count: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceMetadata {
    /// Echo of the request options, as JSON.
    pub options: Value,
    pub session_loaded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub id: String,
    pub timestamp: i64,
    pub url: String,
    pub domain: String,
    pub final_url: String,
    pub duration_ms: u64,
    pub success: bool,
    pub tiers: Vec<TierAttempt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_tier: Option<String>,
    pub fallback_occurred: bool,
    pub budget: BudgetSnapshot,
    #[serde(default)]
    pub title_attempts: Vec<TitleAttempt>,
    #[serde(default)]
    pub errors: Vec<TraceError>,
    pub content_stats: ContentStats,
    pub metadata: TraceMetadata,
}

impl TraceRecord {
    pub fn new(url: &str, domain: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: now_ms(),
            url: url.to_string(),
            domain: domain.to_string(),
            final_url: url.to_string(),
            duration_ms: 0,
            success: false,
            tiers: Vec::new(),
            final_tier: None,
            fallback_occurred: false,
            budget: BudgetSnapshot::default(),
            title_attempts: Vec::new(),
            errors: Vec::new(),
            content_stats: ContentStats::default(),
            metadata: TraceMetadata::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TraceQuery {
    pub domain: Option<String>,
    pub success: Option<bool>,
    pub url_contains: Option<String>,
    pub tier: Option<String>,
    pub error_type: Option<String>,
    pub from_ms: Option<i64>,
    pub to_ms: Option<i64>,
    pub limit: usize,
    pub offset: usize,
}

pub struct TraceRecorder {
    config: TraceConfig,
    /// Newest at the back; pruned by count and age on every insert.
    records: Mutex<VecDeque<TraceRecord>>,
}

impl TraceRecorder {
    pub fn new(config: TraceConfig) -> Self {
        Self { config, records: Mutex::new(VecDeque::new()) }
    }

    /// Policy gate: global switch, then the never list, then the always
    /// list, then the failures-only filter.
    pub fn should_record(&self, domain: &str, success: bool) -> bool {
        if self.config.never_record.iter().any(|d| d == domain) {
            return false;
        }
        if self.config.always_record.iter().any(|d| d == domain) {
            return true;
        }
        if !self.config.enabled {
            return false;
        }
        !(self.config.only_record_failures && success)
    }

    pub fn record(&self, record: TraceRecord) {
        if !self.should_record(&record.domain, record.success) {
            return;
        }
        let mut records = self.records.lock().unwrap();
        debug!(id = %record.id, url = %record.url, success = record.success, "trace recorded");
        records.push_back(record);

        let max_age_ms = self.config.max_age_hours as i64 * 3_600_000;
        let cutoff = now_ms() - max_age_ms;
        while records.front().is_some_and(|r| r.timestamp < cutoff) {
            records.pop_front();
        }
        while records.len() > self.config.max_traces {
            records.pop_front();
        }
    }

    pub fn query(&self, q: &TraceQuery) -> Vec<TraceRecord> {
        let records = self.records.lock().unwrap();
        let limit = if q.limit == 0 { usize::MAX } else { q.limit };
        records
            .iter()
            .rev() // newest first
            .filter(|r| q.domain.as_deref().map(|d| r.domain == d).unwrap_or(true))
            .filter(|r| q.success.map(|s| r.success == s).unwrap_or(true))
            .filter(|r| {
                q.url_contains
                    .as_deref()
                    .map(|s| r.url.contains(s))
                    .unwrap_or(true)
            })
            .filter(|r| {
                q.tier
                    .as_deref()
                    .map(|t| r.tiers.iter().any(|a| a.name == t))
                    .unwrap_or(true)
            })
            .filter(|r| {
                q.error_type
                    .as_deref()
                    .map(|e| r.errors.iter().any(|err| err.error_type == e))
                    .unwrap_or(true)
            })
            .filter(|r| q.from_ms.map(|t| r.timestamp >= t).unwrap_or(true))
            .filter(|r| q.to_ms.map(|t| r.timestamp <= t).unwrap_or(true))
            .skip(q.offset)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TraceConfig {
        TraceConfig::default()
    }

    fn record(domain: &str, success: bool, tier: &str) -> TraceRecord {
        let mut r = TraceRecord::new(&format!("https://{}/x", domain), domain);
        r.success = success;
        r.tiers.push(TierAttempt { name: tier.into(), success, duration_ms: 10 });
        r.final_tier = Some(tier.into());
        r
    }

    #[test]
    fn policy_gates() {
        let mut cfg = config();
        cfg.never_record = vec!["secret.com".into()];
        cfg.always_record = vec!["debug.com".into()];
        cfg.only_record_failures = true;
        let recorder = TraceRecorder::new(cfg);

        assert!(!recorder.should_record("secret.com", false));
        assert!(recorder.should_record("debug.com", true));
        assert!(!recorder.should_record("other.com", true));
        assert!(recorder.should_record("other.com", false));
    }

    #[test]
    fn disabled_recorder_still_honors_always() {
        let mut cfg = config();
        cfg.enabled = false;
        cfg.always_record = vec!["debug.com".into()];
        let recorder = TraceRecorder::new(cfg);
        assert!(recorder.should_record("debug.com", true));
        assert!(!recorder.should_record("other.com", false));
    }

    #[test]
    fn retention_caps_count() {
        let mut cfg = config();
        cfg.max_traces = 5;
        let recorder = TraceRecorder::new(cfg);
        for i in 0..8 {
            recorder.record(record(&format!("d{}.com", i), true, "parse:static"));
        }
        assert_eq!(recorder.len(), 5);
        // Oldest evicted: d0..d2 gone.
        let all = recorder.query(&TraceQuery::default());
        assert!(all.iter().all(|r| r.domain != "d0.com"));
    }

    #[test]
    fn queries_filter_and_paginate() {
        let recorder = TraceRecorder::new(config());
        recorder.record(record("a.com", true, "parse:static"));
        recorder.record(record("a.com", false, "api:openapi"));
        recorder.record(record("b.com", true, "api:openapi"));

        let failures = recorder.query(&TraceQuery { success: Some(false), ..Default::default() });
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].domain, "a.com");

        let by_tier = recorder.query(&TraceQuery {
            tier: Some("api:openapi".into()),
            ..Default::default()
        });
        assert_eq!(by_tier.len(), 2);

        let paged = recorder.query(&TraceQuery { limit: 1, offset: 1, ..Default::default() });
        assert_eq!(paged.len(), 1);

        let by_url = recorder.query(&TraceQuery {
            url_contains: Some("b.com".into()),
            ..Default::default()
        });
        assert_eq!(by_url.len(), 1);
    }
}
