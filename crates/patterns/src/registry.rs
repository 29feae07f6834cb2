//! Owner of learned patterns, failure rings, and anti-patterns. Metric
//! updates are serialized per pattern id; anti-pattern promotion checks its
//! window under the same per-key lock.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use siphon_core::config::PatternConfig;
use siphon_core::domain::registrable_domain;
use siphon_core::{now_ms, ExtractError, FailureCategory};
use siphon_store::StoreBackend;

use crate::extract::{expand_endpoint, ExtractorContext};
use crate::model::{
    anti_pattern_id, suppression_for, AntiPattern, FailureRecord, LearnedPattern,
    RecommendedAction,
};

pub const NS_PATTERNS: &str = "patterns";
pub const NS_FAILURES: &str = "failures";
pub const NS_ANTI_PATTERNS: &str = "anti-patterns";

/// Confidence floor below which a pattern is never matched.
pub const MIN_PATTERN_CONFIDENCE: f64 = 0.3;
/// Below this the pattern is soft-retired; deletion follows after 30 days
/// without a success.
pub const SOFT_RETIRE_CONFIDENCE: f64 = 0.1;
pub const DELETE_CONFIDENCE: f64 = 0.05;
const DELETE_AFTER_DAYS: f64 = 30.0;

/// EWMA weight for avg_response_ms updates.
const RESPONSE_EWMA_ALPHA: f64 = 0.3;

#[derive(Debug, Clone)]
pub struct PatternMatch {
    pub pattern: LearnedPattern,
    /// Endpoint template expanded against the matched URL.
    pub api_endpoint: String,
}

#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    /// Set when an active anti-pattern gates the URL.
    pub suppressed: Option<AntiPattern>,
    /// Applicable patterns, best first.
    pub candidates: Vec<PatternMatch>,
}

pub struct PatternRegistry {
    store: Arc<dyn StoreBackend>,
    config: PatternConfig,
    patterns: DashMap<String, LearnedPattern>,
    anti_patterns: DashMap<String, AntiPattern>,
    /// `(domain, category)` → most-recent-first failure ring.
    failures: DashMap<String, VecDeque<FailureRecord>>,
    /// domain → recent success timestamps, for window success ratio.
    recent_successes: DashMap<String, VecDeque<i64>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    regex_cache: DashMap<String, Regex>,
}

fn failure_key(domain: &str, category: FailureCategory) -> String {
    format!("{}/{}", domain, category)
}

impl PatternRegistry {
    pub fn new(store: Arc<dyn StoreBackend>, config: PatternConfig) -> Self {
        Self {
            store,
            config,
            patterns: DashMap::new(),
            anti_patterns: DashMap::new(),
            failures: DashMap::new(),
            recent_successes: DashMap::new(),
            locks: DashMap::new(),
            regex_cache: DashMap::new(),
        }
    }

    /// Hydrate in-memory state from the persistent store.
    pub async fn load(&self) -> Result<(), ExtractError> {
        let patterns = self
            .store
            .get_all(NS_PATTERNS)
            .await
            .map_err(|e| ExtractError::Store(e.to_string()))?;
        for (id, value) in patterns {
            match serde_json::from_value::<LearnedPattern>(value) {
                Ok(p) => {
                    self.patterns.insert(id, p);
                }
                Err(e) => warn!(id, error = %e, "skipping unreadable pattern record"),
            }
        }

        let antis = self
            .store
            .get_all(NS_ANTI_PATTERNS)
            .await
            .map_err(|e| ExtractError::Store(e.to_string()))?;
        for (id, value) in antis {
            match serde_json::from_value::<AntiPattern>(value) {
                Ok(a) => {
                    self.anti_patterns.insert(id, a);
                }
                Err(e) => warn!(id, error = %e, "skipping unreadable anti-pattern record"),
            }
        }

        let failures = self
            .store
            .get_all(NS_FAILURES)
            .await
            .map_err(|e| ExtractError::Store(e.to_string()))?;
        for (_, value) in failures {
            if let Ok(record) = serde_json::from_value::<FailureRecord>(value) {
                let key = failure_key(&record.domain, record.category);
                self.failures.entry(key).or_default().push_back(record);
            }
        }
        // Rings are oldest-first; keep only the newest window worth.
        for mut ring in self.failures.iter_mut() {
            let ring = ring.value_mut();
            ring.make_contiguous().sort_by_key(|r| r.timestamp);
            while ring.len() > self.config.failure_window_size {
                ring.pop_front();
            }
        }

        info!(
            patterns = self.patterns.len(),
            anti_patterns = self.anti_patterns.len(),
            "pattern registry loaded"
        );
        Ok(())
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn compile(&self, pattern: &str) -> Option<Regex> {
        if let Some(hit) = self.regex_cache.get(pattern) {
            return Some(hit.clone());
        }
        match Regex::new(pattern) {
            Ok(re) => {
                self.regex_cache.insert(pattern.to_string(), re.clone());
                Some(re)
            }
            Err(e) => {
                warn!(pattern, error = %e, "unusable url pattern");
                None
            }
        }
    }

    /// Validate and store a new pattern. Re-registering an existing id is a
    /// no-op (metric increments are idempotent on id).
    pub async fn register(&self, pattern: LearnedPattern) -> Result<bool, ExtractError> {
        for re in &pattern.url_patterns {
            Regex::new(re).map_err(|e| {
                ExtractError::Config(format!("invalid url pattern `{}`: {}", re, e))
            })?;
        }
        for extractor in &pattern.extractors {
            Regex::new(&extractor.pattern).map_err(|e| {
                ExtractError::Config(format!(
                    "invalid extractor `{}` regex: {}",
                    extractor.name, e
                ))
            })?;
        }

        if self.patterns.contains_key(&pattern.id) {
            return Ok(false);
        }
        self.persist_pattern(&pattern).await?;
        debug!(id = %pattern.id, template = %pattern.endpoint_template, "pattern registered");
        self.patterns.insert(pattern.id.clone(), pattern);
        Ok(true)
    }

    async fn persist_pattern(&self, pattern: &LearnedPattern) -> Result<(), ExtractError> {
        let value = serde_json::to_value(pattern)
            .map_err(|e| ExtractError::Store(e.to_string()))?;
        self.store
            .set(NS_PATTERNS, &pattern.id, value)
            .await
            .map_err(|e| ExtractError::Store(e.to_string()))
    }

    async fn persist_anti_pattern(&self, anti: &AntiPattern) -> Result<(), ExtractError> {
        let value =
            serde_json::to_value(anti).map_err(|e| ExtractError::Store(e.to_string()))?;
        self.store
            .set(NS_ANTI_PATTERNS, &anti.id, value)
            .await
            .map_err(|e| ExtractError::Store(e.to_string()))
    }

    /// Active anti-pattern gating `url`, if any. Expired entries are pruned
    /// here, lazily.
    pub async fn suppression_for_url(&self, url: &Url) -> Option<AntiPattern> {
        let domain = registrable_domain(url);
        let now = now_ms();
        let url_str = url.as_str();

        let mut expired: Vec<String> = Vec::new();
        let mut hit: Option<AntiPattern> = None;
        for entry in self.anti_patterns.iter() {
            let anti = entry.value();
            if anti.is_expired(now) {
                expired.push(entry.key().clone());
                continue;
            }
            if !anti.domains.iter().any(|d| d == &domain) {
                continue;
            }
            let matches = anti.url_patterns.is_empty()
                || anti
                    .url_patterns
                    .iter()
                    .filter_map(|p| self.compile(p))
                    .any(|re| re.is_match(url_str));
            if matches {
                hit = Some(anti.clone());
                break;
            }
        }

        for id in expired {
            self.anti_patterns.remove(&id);
            let _ = self.store.delete(NS_ANTI_PATTERNS, &id).await;
        }
        hit
    }

    /// Matching: gate on anti-patterns, collect applicable candidates,
    /// rank, and expand each endpoint against the URL.
    pub async fn match_url(&self, url: &Url) -> MatchResult {
        if let Some(anti) = self.suppression_for_url(url).await {
            return MatchResult { suppressed: Some(anti), candidates: Vec::new() };
        }

        let now = now_ms();
        let url_str = url.as_str();
        let mut scored: Vec<(f64, i64, String, LearnedPattern)> = Vec::new();

        for entry in self.patterns.iter() {
            let pattern = entry.value();
            let confidence = pattern
                .metrics
                .decayed_confidence(self.config.decay_lambda, now);
            if confidence < self.config.min_confidence {
                continue;
            }
            let matched = pattern
                .url_patterns
                .iter()
                .filter_map(|p| self.compile(p))
                .any(|re| re.is_match(url_str));
            if matched {
                scored.push((confidence, pattern.metrics.last_success, pattern.id.clone(), pattern.clone()));
            }
        }

        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(b.1.cmp(&a.1))
                .then(a.2.cmp(&b.2))
        });

        let ctx = ExtractorContext::default();
        let candidates = scored
            .into_iter()
            .filter_map(|(_, _, _, pattern)| {
                match expand_endpoint(&pattern.endpoint_template, &pattern.extractors, url, &ctx) {
                    Ok(api_endpoint) => Some(PatternMatch { pattern, api_endpoint }),
                    Err(reason) => {
                        debug!(reason, "candidate abandoned during expansion");
                        None
                    }
                }
            })
            .collect();

        MatchResult { suppressed: None, candidates }
    }

    /// Success bookkeeping, serialized per pattern id.
    pub async fn record_pattern_success(
        &self,
        pattern_id: &str,
        domain: &str,
        api_url: &str,
        response_time_ms: u64,
    ) -> Result<(), ExtractError> {
        let lock = self.lock_for(pattern_id);
        let _guard = lock.lock().await;

        let now = now_ms();
        let updated = {
            let Some(mut entry) = self.patterns.get_mut(pattern_id) else {
                return Ok(());
            };
            let pattern = entry.value_mut();
            let m = &mut pattern.metrics;
            m.success_count += 1;
            m.last_success = now;
            m.avg_response_ms = if m.avg_response_ms == 0.0 {
                response_time_ms as f64
            } else {
                RESPONSE_EWMA_ALPHA * response_time_ms as f64
                    + (1.0 - RESPONSE_EWMA_ALPHA) * m.avg_response_ms
            };
            m.confidence = m.decayed_confidence(self.config.decay_lambda, now);
            if !m.domains.iter().any(|d| d == domain) {
                m.domains.push(domain.to_string());
            }
            pattern.updated_at = now;
            pattern.clone()
        };
        self.persist_pattern(&updated).await?;

        // Window bookkeeping + clearing of matching failure records.
        let window_ms = self.config.failure_window_seconds as i64 * 1000;
        {
            let mut successes = self.recent_successes.entry(domain.to_string()).or_default();
            successes.push_back(now);
            while successes.front().is_some_and(|t| now - t > window_ms) {
                successes.pop_front();
            }
        }
        let mut cleared: Vec<(String, String)> = Vec::new();
        for mut ring in self.failures.iter_mut() {
            if !ring.key().starts_with(&format!("{}/", domain)) {
                continue;
            }
            ring.value_mut().retain(|r| {
                let matches = r.api_url.as_deref() == Some(api_url);
                if matches {
                    cleared.push((r.domain.clone(), format!("{}/{}/{}", r.domain, r.category, r.id)));
                }
                !matches
            });
        }
        for (_, key) in cleared {
            let _ = self.store.delete(NS_FAILURES, &key).await;
        }
        Ok(())
    }

    /// Record a failure, update pattern metrics when one was involved, and
    /// promote an anti-pattern when the window says the domain is hopeless.
    pub async fn record_failure(
        &self,
        record: FailureRecord,
        pattern_id: Option<&str>,
    ) -> Result<Option<AntiPattern>, ExtractError> {
        if let Some(id) = pattern_id {
            let lock = self.lock_for(id);
            let _guard = lock.lock().await;
            if let Some(mut entry) = self.patterns.get_mut(id) {
                let pattern = entry.value_mut();
                // Schema drift demotes harder than a transient failure.
                let increment = if record.category == FailureCategory::SchemaMismatch { 2 } else { 1 };
                pattern.metrics.failure_count += increment;
                pattern.metrics.confidence = pattern
                    .metrics
                    .decayed_confidence(self.config.decay_lambda, now_ms());
                pattern.updated_at = now_ms();
                let snapshot = pattern.clone();
                drop(entry);
                self.persist_pattern(&snapshot).await?;
            }
        }

        let key = failure_key(&record.domain, record.category);
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let store_key = format!("{}/{}/{}", record.domain, record.category, record.id);
        let value = serde_json::to_value(&record)
            .map_err(|e| ExtractError::Store(e.to_string()))?;
        self.store
            .set(NS_FAILURES, &store_key, value)
            .await
            .map_err(|e| ExtractError::Store(e.to_string()))?;

        let window_ms = self.config.failure_window_seconds as i64 * 1000;
        let now = now_ms();
        let (window_count, evicted) = {
            let mut ring = self.failures.entry(key.clone()).or_default();
            ring.push_back(record.clone());
            let mut evicted = Vec::new();
            while ring.len() > self.config.failure_window_size {
                if let Some(old) = ring.pop_front() {
                    evicted.push(format!("{}/{}/{}", old.domain, old.category, old.id));
                }
            }
            let count = ring.iter().filter(|r| now - r.timestamp <= window_ms).count();
            (count, evicted)
        };
        for key in evicted {
            let _ = self.store.delete(NS_FAILURES, &key).await;
        }

        if window_count < self.config.failure_window_size {
            return Ok(None);
        }
        let successes = self
            .recent_successes
            .get(&record.domain)
            .map(|s| s.iter().filter(|t| now - **t <= window_ms).count())
            .unwrap_or(0);
        let ratio = successes as f64 / (successes + window_count) as f64;
        if ratio > 0.10 {
            return Ok(None);
        }

        let anti = self.promote(&record, now).await?;
        Ok(Some(anti))
    }

    /// Synthesize (or replace) the anti-pattern for this failure's
    /// `(domain, category)`.
    async fn promote(&self, record: &FailureRecord, now: i64) -> Result<AntiPattern, ExtractError> {
        let (action, duration_ms) = suppression_for(record.category);
        let anti = AntiPattern {
            id: anti_pattern_id(&record.domain, record.category),
            failure_category: record.category,
            domains: vec![record.domain.clone()],
            url_patterns: Vec::new(),
            recommended_action: action,
            reason: format!(
                "{} consecutive {} failures, last: {}",
                self.config.failure_window_size, record.category, record.reason
            ),
            suppression_duration_ms: duration_ms,
            created_at: now,
            expires_at: if duration_ms == 0 { 0 } else { now + duration_ms },
        };
        info!(
            domain = %record.domain,
            category = %record.category,
            action = ?action,
            "anti-pattern promoted"
        );
        self.persist_anti_pattern(&anti).await?;
        self.anti_patterns.insert(anti.id.clone(), anti.clone());

        // A permanent skip invalidates the domain's learned patterns too.
        if anti.is_decisive() {
            let doomed: Vec<String> = self
                .patterns
                .iter()
                .filter(|e| {
                    e.value().metrics.domains.iter().any(|d| d == &record.domain)
                        || e.key().contains(&format!(":{}:", record.domain))
                })
                .map(|e| e.key().clone())
                .collect();
            for id in doomed {
                self.patterns.remove(&id);
                let _ = self.store.delete(NS_PATTERNS, &id).await;
                debug!(id, "pattern invalidated by domain-wide anti-pattern");
            }
        }
        Ok(anti)
    }

    /// Apply decay to all stored confidences; soft-retired patterns linger,
    /// hopeless ones are deleted. Run nightly or before long matching
    /// sessions.
    pub async fn decay_pass(&self) -> Result<(), ExtractError> {
        let now = now_ms();
        let mut deletions = Vec::new();
        for mut entry in self.patterns.iter_mut() {
            let pattern = entry.value_mut();
            let decayed = pattern
                .metrics
                .decayed_confidence(self.config.decay_lambda, now);
            pattern.metrics.confidence = decayed;
            let idle_days =
                siphon_core::days_between(pattern.metrics.last_success.max(0), now);
            if decayed < DELETE_CONFIDENCE && idle_days > DELETE_AFTER_DAYS {
                deletions.push(entry.key().clone());
            }
        }
        for id in deletions {
            self.patterns.remove(&id);
            let _ = self.store.delete(NS_PATTERNS, &id).await;
            info!(id, "pattern deleted after decay");
        }
        Ok(())
    }

    pub fn pattern(&self, id: &str) -> Option<LearnedPattern> {
        self.patterns.get(id).map(|p| p.clone())
    }

    pub fn patterns_snapshot(&self) -> Vec<LearnedPattern> {
        self.patterns.iter().map(|e| e.value().clone()).collect()
    }

    pub fn anti_patterns_snapshot(&self) -> Vec<AntiPattern> {
        self.anti_patterns.iter().map(|e| e.value().clone()).collect()
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    pub(crate) fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Retry delay the orchestrator should honor for a suppressed URL, when
    /// the anti-pattern recommends waiting rather than skipping.
    pub fn retry_delay_ms(anti: &AntiPattern) -> Option<i64> {
        match anti.recommended_action {
            RecommendedAction::Retry | RecommendedAction::Backoff => {
                Some(anti.suppression_duration_ms)
            }
            _ => None,
        }
    }
}
