//! Discovery cache: per-source, per-tenant TTL cache with LRU overflow
//! eviction, plus a failed-domain tracker with exponential cooldown. Nothing
//! here persists; the cache is best-effort and warms up on demand.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use siphon_core::{now_ms, ExtractError};

const DEFAULT_TTL: Duration = Duration::from_secs(3600);
const DEFAULT_MAX_PER_SOURCE: usize = 500;
const DEFAULT_COOLDOWN_BASE: Duration = Duration::from_secs(300);
const DEFAULT_COOLDOWN_MAX: Duration = Duration::from_secs(86_400);

#[derive(Debug, Clone, Serialize)]
pub struct CacheEntry {
    pub value: Value,
    pub cached_at: i64,
    pub expires_at: i64,
    pub hit_count: u64,
    pub last_accessed_at: i64,
}

/// Not a cache: consecutive-failure bookkeeping for a `(source, domain)`.
#[derive(Debug, Clone, Serialize)]
pub struct FailedDomain {
    pub domain: String,
    pub source: String,
    pub failure_count: u32,
    pub first_failure_at: i64,
    pub last_failure_at: i64,
    pub cooldown_until: i64,
    pub last_error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries_per_source: HashMap<String, usize>,
    pub failed_domains: usize,
}

#[derive(Debug, Clone, Default)]
pub struct WithCacheOptions {
    pub ttl: Option<Duration>,
    pub skip_cooldown_check: bool,
}

pub struct DiscoveryCache {
    tenant: Option<String>,
    ttl: Duration,
    max_per_source: usize,
    cooldown_base: Duration,
    cooldown_max: Duration,
    /// One mutex per source namespace is enough contention-wise.
    sources: DashMap<String, Arc<Mutex<HashMap<String, CacheEntry>>>>,
    failed: DashMap<String, FailedDomain>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl DiscoveryCache {
    pub fn new(tenant: Option<String>) -> Self {
        Self::with_limits(
            tenant,
            DEFAULT_TTL,
            DEFAULT_MAX_PER_SOURCE,
            DEFAULT_COOLDOWN_BASE,
            DEFAULT_COOLDOWN_MAX,
        )
    }

    pub fn with_limits(
        tenant: Option<String>,
        ttl: Duration,
        max_per_source: usize,
        cooldown_base: Duration,
        cooldown_max: Duration,
    ) -> Self {
        Self {
            tenant,
            ttl,
            max_per_source,
            cooldown_base,
            cooldown_max,
            sources: DashMap::new(),
            failed: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// `<tenant?>:<source>:<domain>` — the tenant prefix isolates tenants
    /// sharing one process.
    fn key(&self, source: &str, domain: &str) -> String {
        match &self.tenant {
            Some(t) => format!("{}:{}:{}", t, source, domain),
            None => format!("{}:{}", source, domain),
        }
    }

    fn source_map(&self, source: &str) -> Arc<Mutex<HashMap<String, CacheEntry>>> {
        self.sources
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(HashMap::new())))
            .clone()
    }

    pub async fn get(&self, source: &str, domain: &str) -> Option<Value> {
        let key = self.key(source, domain);
        let map = self.source_map(source);
        let mut map = map.lock().await;
        let now = now_ms();
        match map.get_mut(&key) {
            Some(entry) if now < entry.expires_at => {
                entry.hit_count += 1;
                entry.last_accessed_at = now;
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.value.clone())
            }
            Some(_) => {
                // Expired: drop on read.
                map.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub async fn set(&self, source: &str, domain: &str, value: Value, ttl: Option<Duration>) {
        let key = self.key(source, domain);
        let ttl = ttl.unwrap_or(self.ttl);
        let now = now_ms();
        let entry = CacheEntry {
            value,
            cached_at: now,
            expires_at: now + ttl.as_millis() as i64,
            hit_count: 0,
            last_accessed_at: now,
        };
        let map = self.source_map(source);
        let mut map = map.lock().await;
        map.insert(key, entry);

        if map.len() > self.max_per_source {
            let evict = (self.max_per_source / 10).max(1);
            let mut by_age: Vec<(String, i64)> = map
                .iter()
                .map(|(k, e)| (k.clone(), e.last_accessed_at))
                .collect();
            by_age.sort_by_key(|(_, at)| *at);
            for (k, _) in by_age.into_iter().take(evict) {
                map.remove(&k);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
            debug!(source, evicted = evict, "cache overflow eviction");
        }
    }

    pub async fn invalidate(&self, source: &str, domain: &str) {
        let key = self.key(source, domain);
        let map = self.source_map(source);
        map.lock().await.remove(&key);
    }

    // --- failed-domain cooldown tracking ---

    pub fn record_failure(&self, source: &str, domain: &str, error: &str) -> i64 {
        let key = self.key(source, domain);
        let now = now_ms();
        let mut entry = self.failed.entry(key).or_insert_with(|| FailedDomain {
            domain: domain.to_string(),
            source: source.to_string(),
            failure_count: 0,
            first_failure_at: now,
            last_failure_at: now,
            cooldown_until: now,
            last_error: String::new(),
        });
        entry.failure_count += 1;
        entry.last_failure_at = now;
        entry.last_error = error.to_string();
        // cooldown = min(base * 2^(n-1), max)
        let exp = entry.failure_count.saturating_sub(1).min(31);
        let cooldown_ms = (self.cooldown_base.as_millis() as i64)
            .saturating_mul(1i64 << exp)
            .min(self.cooldown_max.as_millis() as i64);
        entry.cooldown_until = now + cooldown_ms;
        warn!(
            source,
            domain,
            failures = entry.failure_count,
            cooldown_ms,
            "discovery failure recorded"
        );
        entry.cooldown_until
    }

    /// Strictly before `cooldown_until`: at the boundary the domain is
    /// eligible again.
    pub fn in_cooldown(&self, source: &str, domain: &str) -> Option<i64> {
        let key = self.key(source, domain);
        let entry = self.failed.get(&key)?;
        let until = entry.cooldown_until;
        if now_ms() < until {
            Some(until)
        } else {
            None
        }
    }

    pub fn clear_failed_domain(&self, source: &str, domain: &str) {
        let key = self.key(source, domain);
        self.failed.remove(&key);
    }

    pub fn failed_domain(&self, source: &str, domain: &str) -> Option<FailedDomain> {
        self.failed.get(&self.key(source, domain)).map(|e| e.clone())
    }

    /// The common discovery path: cooldown gate, cache lookup, discover,
    /// store, and failure accounting on error.
    pub async fn with_cache<F, Fut>(
        &self,
        source: &str,
        domain: &str,
        discover: F,
        opts: WithCacheOptions,
    ) -> Result<Value, ExtractError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, ExtractError>>,
    {
        if !opts.skip_cooldown_check {
            if let Some(until) = self.in_cooldown(source, domain) {
                return Err(ExtractError::Cooldown {
                    domain: domain.to_string(),
                    until_ms: until,
                });
            }
        }

        if let Some(hit) = self.get(source, domain).await {
            return Ok(hit);
        }

        match discover().await {
            Ok(value) => {
                self.set(source, domain, value.clone(), opts.ttl).await;
                self.clear_failed_domain(source, domain);
                Ok(value)
            }
            Err(e) => {
                self.record_failure(source, domain, &e.to_string());
                Err(e)
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        // Clone the per-source handles first; a DashMap guard must not be
        // held across an await.
        let sources: Vec<(String, Arc<Mutex<HashMap<String, CacheEntry>>>)> = self
            .sources
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let mut entries_per_source = HashMap::new();
        for (source, map) in sources {
            let len = map.lock().await.len();
            entries_per_source.insert(source, len);
        }
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries_per_source,
            failed_domains: self.failed.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn small_cache() -> DiscoveryCache {
        DiscoveryCache::with_limits(
            None,
            Duration::from_secs(3600),
            10,
            Duration::from_secs(300),
            Duration::from_secs(86_400),
        )
    }

    #[tokio::test]
    async fn get_after_set_hits() {
        let cache = small_cache();
        cache.set("openapi", "example.com", json!({"found": true}), None).await;
        let got = cache.get("openapi", "example.com").await;
        assert_eq!(got, Some(json!({"found": true})));
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
    }

    #[tokio::test]
    async fn expired_entries_miss() {
        let cache = small_cache();
        cache
            .set("openapi", "example.com", json!(1), Some(Duration::from_millis(0)))
            .await;
        assert_eq!(cache.get("openapi", "example.com").await, None);
    }

    #[tokio::test]
    async fn tenant_prefix_isolates() {
        let a = DiscoveryCache::new(Some("tenant-a".into()));
        let b = DiscoveryCache::new(Some("tenant-b".into()));
        a.set("openapi", "example.com", json!("a"), None).await;
        assert_eq!(b.get("openapi", "example.com").await, None);
    }

    #[tokio::test]
    async fn overflow_evicts_oldest_tenth() {
        let cache = small_cache();
        for i in 0..11 {
            cache.set("gql", &format!("d{}.com", i), json!(i), None).await;
        }
        let stats = cache.stats().await;
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entries_per_source["gql"], 10);
    }

    #[tokio::test]
    async fn cooldown_doubles_and_caps() {
        let cache = small_cache();
        let base_ms = 300_000i64;

        let before = now_ms();
        let until1 = cache.record_failure("openapi", "bad.com", "boom");
        assert!(until1 - before >= base_ms && until1 - before <= base_ms + 1000);

        let before = now_ms();
        let until2 = cache.record_failure("openapi", "bad.com", "boom");
        assert!(until2 - before >= 2 * base_ms && until2 - before <= 2 * base_ms + 1000);

        // Many consecutive failures pin at the 24h cap.
        let mut last = 0;
        for _ in 0..20 {
            last = cache.record_failure("openapi", "bad.com", "boom");
        }
        assert!(last - now_ms() <= 86_400_000 + 1000);
    }

    #[tokio::test]
    async fn success_clears_cooldown() {
        let cache = small_cache();
        cache.record_failure("openapi", "flaky.com", "boom");
        assert!(cache.in_cooldown("openapi", "flaky.com").is_some());
        cache.clear_failed_domain("openapi", "flaky.com");
        assert!(cache.in_cooldown("openapi", "flaky.com").is_none());
        assert!(cache.failed_domain("openapi", "flaky.com").is_none());
    }

    #[tokio::test]
    async fn with_cache_happy_path_and_failure() {
        let cache = small_cache();

        let value = cache
            .with_cache(
                "openapi",
                "ok.com",
                || async { Ok(json!({"spec": true})) },
                WithCacheOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(value, json!({"spec": true}));

        // Second call served from cache without invoking discover.
        let value = cache
            .with_cache(
                "openapi",
                "ok.com",
                || async { panic!("should not be called") },
                WithCacheOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(value, json!({"spec": true}));

        // Failure records cooldown; next call is gated.
        let err = cache
            .with_cache(
                "openapi",
                "down.com",
                || async { Err(ExtractError::Network("refused".into())) },
                WithCacheOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Network(_)));

        let err = cache
            .with_cache(
                "openapi",
                "down.com",
                || async { Ok(json!(1)) },
                WithCacheOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Cooldown { .. }));

        // skip_cooldown_check bypasses the gate.
        let value = cache
            .with_cache(
                "openapi",
                "down.com",
                || async { Ok(json!(2)) },
                WithCacheOptions { skip_cooldown_check: true, ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(value, json!(2));
    }
}
