use serde::Deserialize;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub patterns: PatternConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub trace: TraceConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    /// Optional tenant id; prefixes every cache and persistence key.
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default = "default_min_content_length")]
    pub min_content_length: usize,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_per_host_sockets")]
    pub max_sockets_per_host: usize,
    #[serde(default = "default_global_sockets")]
    pub max_sockets_total: usize,
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub user_agent: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_seconds: u64,
    #[serde(default = "default_cache_max_entries")]
    pub max_entries_per_source: usize,
    #[serde(default = "default_cooldown_base_secs")]
    pub cooldown_base_seconds: u64,
    #[serde(default = "default_cooldown_max_secs")]
    pub cooldown_max_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PatternConfig {
    #[serde(default = "default_min_pattern_confidence")]
    pub min_confidence: f64,
    #[serde(default = "default_decay_lambda")]
    pub decay_lambda: f64,
    #[serde(default = "default_failure_window")]
    pub failure_window_size: usize,
    #[serde(default = "default_failure_window_secs")]
    pub failure_window_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrowserConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Remote DevTools websocket endpoint. Absent selects a local launch.
    #[serde(default)]
    pub remote_endpoint: Option<String>,
    #[serde(default)]
    pub remote_token: Option<String>,
    #[serde(default = "default_browser_timeout_secs")]
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TraceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub always_record: Vec<String>,
    #[serde(default)]
    pub never_record: Vec<String>,
    #[serde(default)]
    pub only_record_failures: bool,
    #[serde(default = "default_max_traces")]
    pub max_traces: usize,
    #[serde(default = "default_trace_max_age_hours")]
    pub max_age_hours: u64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    /// Absent selects the file-backed store.
    #[serde(default)]
    pub postgres_url: Option<String>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            tenant_id: None,
            min_content_length: default_min_content_length(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            max_sockets_per_host: default_per_host_sockets(),
            max_sockets_total: default_global_sockets(),
            timeout_seconds: default_http_timeout_secs(),
            user_agent: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl_secs(),
            max_entries_per_source: default_cache_max_entries(),
            cooldown_base_seconds: default_cooldown_base_secs(),
            cooldown_max_seconds: default_cooldown_max_secs(),
        }
    }
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_pattern_confidence(),
            decay_lambda: default_decay_lambda(),
            failure_window_size: default_failure_window(),
            failure_window_seconds: default_failure_window_secs(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            remote_endpoint: None,
            remote_token: None,
            timeout_seconds: default_browser_timeout_secs(),
        }
    }
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            always_record: Vec::new(),
            never_record: Vec::new(),
            only_record_failures: false,
            max_traces: default_max_traces(),
            max_age_hours: default_trace_max_age_hours(),
        }
    }
}

fn default_data_dir() -> String { "data".to_string() }
fn default_min_content_length() -> usize { 500 }
fn default_request_timeout_ms() -> u64 { 60_000 }
fn default_per_host_sockets() -> usize { 10 }
fn default_global_sockets() -> usize { 50 }
fn default_http_timeout_secs() -> u64 { 60 }
fn default_cache_ttl_secs() -> u64 { 3600 }
fn default_cache_max_entries() -> usize { 500 }
fn default_cooldown_base_secs() -> u64 { 300 }
fn default_cooldown_max_secs() -> u64 { 86_400 }
fn default_min_pattern_confidence() -> f64 { 0.3 }
fn default_decay_lambda() -> f64 { 0.05 }
fn default_failure_window() -> usize { 10 }
fn default_failure_window_secs() -> u64 { 3600 }
fn default_browser_timeout_secs() -> u64 { 60 }
fn default_max_traces() -> usize { 1000 }
fn default_trace_max_age_hours() -> u64 { 72 }
fn default_true() -> bool { true }
