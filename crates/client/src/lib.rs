//! Pooled HTTP executor. One shared reqwest client with keep-alive and a
//! shared cookie jar; per-host and global socket caps enforced with
//! semaphores so back-pressure shows up as queueing here rather than as
//! connection churn upstream.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use reqwest::cookie::Jar;
use reqwest::redirect::Policy;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use url::Url;

use siphon_core::{ExtractError, FetchOptions, FetchResponse, HttpMethod};

const DEFAULT_PER_HOST: usize = 10;
const DEFAULT_GLOBAL: usize = 50;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

#[derive(Debug, Clone, serde::Serialize)]
pub struct ClientStats {
    pub total_requests: u64,
    pub connections_reused: u64,
    pub new_connections: u64,
    pub active_sockets: HashMap<String, usize>,
    pub pending_requests: HashMap<String, usize>,
    pub utilization_percent: f64,
}

struct HostState {
    semaphore: Arc<Semaphore>,
    active: AtomicUsize,
    pending: AtomicUsize,
    /// Estimated idle keep-alive connections available for reuse.
    open_connections: AtomicUsize,
}

pub struct PooledClient {
    client: reqwest::Client,
    jar: Arc<Jar>,
    hosts: DashMap<String, Arc<HostState>>,
    global: Arc<Semaphore>,
    per_host_limit: usize,
    global_limit: usize,
    timeout: Duration,
    user_agent: String,
    total_requests: AtomicU64,
    connections_reused: AtomicU64,
    new_connections: AtomicU64,
}

impl PooledClient {
    pub fn new() -> Result<Self, ExtractError> {
        Self::with_limits(DEFAULT_PER_HOST, DEFAULT_GLOBAL, DEFAULT_TIMEOUT, None)
    }

    pub fn with_limits(
        per_host: usize,
        global: usize,
        timeout: Duration,
        user_agent: Option<String>,
    ) -> Result<Self, ExtractError> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .redirect(Policy::limited(10))
            .pool_max_idle_per_host(per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(timeout)
            .build()
            .map_err(|e| ExtractError::Network(e.to_string()))?;

        Ok(Self {
            client,
            jar,
            hosts: DashMap::new(),
            global: Arc::new(Semaphore::new(global)),
            per_host_limit: per_host,
            global_limit: global,
            timeout,
            user_agent: user_agent.unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            total_requests: AtomicU64::new(0),
            connections_reused: AtomicU64::new(0),
            new_connections: AtomicU64::new(0),
        })
    }

    fn host_state(&self, host: &str) -> Arc<HostState> {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(HostState {
                    semaphore: Arc::new(Semaphore::new(self.per_host_limit)),
                    active: AtomicUsize::new(0),
                    pending: AtomicUsize::new(0),
                    open_connections: AtomicUsize::new(0),
                })
            })
            .clone()
    }

    /// Seed cookies into the shared jar; replayed on every matching request.
    pub fn add_cookie(&self, url: &Url, cookie: &str) {
        self.jar.add_cookie_str(cookie, url);
    }

    pub async fn fetch(&self, url: &Url, opts: &FetchOptions) -> Result<FetchResponse, ExtractError> {
        if opts.skip_pooling {
            // Fresh connection outside the shared pool (control channels).
            let client = reqwest::Client::builder()
                .redirect(Policy::limited(10))
                .timeout(opts.timeout.unwrap_or(self.timeout))
                .build()
                .map_err(|e| ExtractError::Network(e.to_string()))?;
            self.new_connections.fetch_add(1, Ordering::Relaxed);
            self.total_requests.fetch_add(1, Ordering::Relaxed);
            return self.dispatch(&client, url, opts).await;
        }

        let host = url.host_str().unwrap_or("unknown").to_string();
        let state = self.host_state(&host);

        state.pending.fetch_add(1, Ordering::Relaxed);
        let _global_permit = self
            .global
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ExtractError::Network("client shut down".into()))?;
        let _host_permit = state
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ExtractError::Network("client shut down".into()))?;
        state.pending.fetch_sub(1, Ordering::Relaxed);

        // Reuse accounting: an idle keep-alive connection beyond the in-
        // flight count means this request rides an existing socket.
        let active_now = state.active.fetch_add(1, Ordering::Relaxed);
        if active_now < state.open_connections.load(Ordering::Relaxed) {
            self.connections_reused.fetch_add(1, Ordering::Relaxed);
        } else {
            self.new_connections.fetch_add(1, Ordering::Relaxed);
            state.open_connections.fetch_add(1, Ordering::Relaxed);
        }
        self.total_requests.fetch_add(1, Ordering::Relaxed);

        let result = self.dispatch(&self.client, url, opts).await;
        state.active.fetch_sub(1, Ordering::Relaxed);
        result
    }

    async fn dispatch(
        &self,
        client: &reqwest::Client,
        url: &Url,
        opts: &FetchOptions,
    ) -> Result<FetchResponse, ExtractError> {
        let start = Instant::now();
        let timeout = opts.timeout.unwrap_or(self.timeout);

        let mut request = match opts.method {
            HttpMethod::Get => client.get(url.as_str()),
            HttpMethod::Post => client.post(url.as_str()),
            HttpMethod::Put => client.put(url.as_str()),
            HttpMethod::Delete => client.delete(url.as_str()),
        };
        request = request
            .timeout(timeout)
            .header("User-Agent", &self.user_agent);
        for (name, value) in &opts.headers {
            request = request.header(name, value);
        }
        if let Some(body) = &opts.body {
            request = request.body(body.clone());
        }

        debug!(url = %url, method = opts.method.as_str(), "dispatching");

        let send = request.send();
        let response = match &opts.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => return Err(ExtractError::Cancelled),
                    r = send => r,
                }
            }
            None => send.await,
        };

        let response = response.map_err(|e| {
            if e.is_timeout() {
                ExtractError::Timeout(timeout.as_millis() as u64)
            } else {
                warn!(url = %url, error = %e, "fetch failed");
                ExtractError::Network(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let final_url =
            Url::parse(response.url().as_str()).unwrap_or_else(|_| url.clone());

        let mut headers = HashMap::new();
        for (k, v) in response.headers() {
            if let Ok(value) = v.to_str() {
                headers.insert(k.as_str().to_string(), value.to_string());
            }
        }
        let content_type = headers.get("content-type").cloned();

        let body_fut = response.bytes();
        let body = match &opts.cancel {
            Some(token) => {
                tokio::select! {
                    _ = token.cancelled() => return Err(ExtractError::Cancelled),
                    b = body_fut => b,
                }
            }
            None => body_fut.await,
        }
        .map_err(|e| ExtractError::Network(e.to_string()))?;

        Ok(FetchResponse {
            url: url.clone(),
            final_url,
            status,
            headers,
            body: body.to_vec(),
            content_type,
            fetched_at: chrono::Utc::now(),
            response_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    pub fn stats(&self) -> ClientStats {
        let mut active_sockets = HashMap::new();
        let mut pending_requests = HashMap::new();
        let mut active_total = 0usize;
        for entry in self.hosts.iter() {
            let active = entry.value().active.load(Ordering::Relaxed);
            let pending = entry.value().pending.load(Ordering::Relaxed);
            if active > 0 {
                active_sockets.insert(entry.key().clone(), active);
            }
            if pending > 0 {
                pending_requests.insert(entry.key().clone(), pending);
            }
            active_total += active;
        }
        ClientStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            connections_reused: self.connections_reused.load(Ordering::Relaxed),
            new_connections: self.new_connections.load(Ordering::Relaxed),
            active_sockets,
            pending_requests,
            utilization_percent: active_total as f64 / self.global_limit as f64 * 100.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_start_empty() {
        let client = PooledClient::new().unwrap();
        let stats = client.stats();
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.connections_reused, 0);
        assert!(stats.active_sockets.is_empty());
        assert_eq!(stats.utilization_percent, 0.0);
    }
}
