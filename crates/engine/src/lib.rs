//! The tiered extraction engine: a runtime context owning every component,
//! driving the strategy chain per request. No global singletons — tests
//! build a context over in-memory stores, production builds one at startup.

pub mod chain;
pub mod context;
pub mod events;
pub mod options;
pub mod preview;
pub mod strategies;
pub mod strategy;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use url::Url;

use siphon_adapters::{ChromeRenderer, NullRenderer, Renderer, SessionStore};
use siphon_cache::DiscoveryCache;
use siphon_client::PooledClient;
use siphon_core::{AppConfig, ContentResult, ExtractError};
use siphon_discovery::DiscoveryService;
use siphon_handlers::HandlerDispatch;
use siphon_patterns::PatternRegistry;
use siphon_store::{FileStore, PgStore, StoreBackend};
use siphon_trace::TraceRecorder;

use crate::context::RequestCtx;
use crate::events::LearningBus;
use crate::strategy::Strategy;

pub use crate::options::{ChallengeInfo, ExtractOptions, SessionOptions, VerifySpec};
pub use crate::preview::ExecutionPlan;

/// Everything a request needs, shared across concurrent requests.
pub struct Engine {
    pub config: AppConfig,
    pub client: Arc<PooledClient>,
    pub store: Arc<dyn StoreBackend>,
    pub cache: Arc<DiscoveryCache>,
    pub registry: Arc<PatternRegistry>,
    pub discovery: DiscoveryService,
    pub handlers: HandlerDispatch,
    pub traces: Arc<TraceRecorder>,
    pub renderer: Arc<dyn Renderer>,
    pub sessions: Arc<dyn SessionStore>,
    pub(crate) bus: LearningBus,
    pub(crate) strategies: Vec<Box<dyn Strategy>>,
}

/// Public handle; cheap to clone, safe to share.
#[derive(Clone)]
pub struct Siphon {
    engine: Arc<Engine>,
}

impl Siphon {
    /// Production wiring from configuration: Postgres when a database URL is
    /// set, the debounced file store otherwise; a Chrome renderer when the
    /// browser tier is enabled.
    pub async fn from_config(config: AppConfig) -> Result<Self, ExtractError> {
        let store: Arc<dyn StoreBackend> = match &config.database.postgres_url {
            Some(url) => Arc::new(
                PgStore::connect(url)
                    .await
                    .map_err(|e| ExtractError::Store(e.to_string()))?,
            ),
            None => Arc::new(
                FileStore::open(&config.general.data_dir)
                    .map_err(|e| ExtractError::Store(e.to_string()))?,
            ),
        };
        let renderer: Arc<dyn Renderer> = if config.browser.enabled {
            Arc::new(ChromeRenderer::new(
                config.browser.remote_endpoint.clone(),
                Duration::from_secs(config.browser.timeout_seconds),
            ))
        } else {
            Arc::new(NullRenderer)
        };
        let sessions: Arc<dyn SessionStore> =
            Arc::new(siphon_adapters::InMemorySessionStore::default());
        Self::assemble(config, store, renderer, sessions).await
    }

    /// Explicit wiring; what tests use.
    pub async fn assemble(
        config: AppConfig,
        store: Arc<dyn StoreBackend>,
        renderer: Arc<dyn Renderer>,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, ExtractError> {
        let client = Arc::new(PooledClient::with_limits(
            config.http.max_sockets_per_host,
            config.http.max_sockets_total,
            Duration::from_secs(config.http.timeout_seconds),
            config.http.user_agent.clone(),
        )?);
        let cache = Arc::new(DiscoveryCache::with_limits(
            config.general.tenant_id.clone(),
            Duration::from_secs(config.cache.ttl_seconds),
            config.cache.max_entries_per_source,
            Duration::from_secs(config.cache.cooldown_base_seconds),
            Duration::from_secs(config.cache.cooldown_max_seconds),
        ));
        let registry = Arc::new(PatternRegistry::new(
            Arc::clone(&store),
            config.patterns.clone(),
        ));
        registry.load().await?;

        let discovery = DiscoveryService::new(Arc::clone(&client), Arc::clone(&cache));
        let traces = Arc::new(TraceRecorder::new(config.trace.clone()));
        let bus = LearningBus::start(Arc::clone(&registry));

        info!(
            patterns = registry.pattern_count(),
            tenant = ?config.general.tenant_id,
            "extraction engine assembled"
        );

        Ok(Self {
            engine: Arc::new(Engine {
                config,
                client,
                store,
                cache,
                registry,
                discovery,
                handlers: HandlerDispatch::default(),
                traces,
                renderer,
                sessions,
                bus,
                strategies: strategies::default_chain(),
            }),
        })
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Primary entry point. Always produces a `ContentResult`; total failure
    /// comes back as empty content with `error` set.
    pub async fn extract(&self, url: &str, opts: ExtractOptions) -> ContentResult {
        let parsed = match Url::parse(url) {
            Ok(u) => u,
            Err(e) => {
                return ContentResult::empty(url, Vec::new(), 0, format!("invalid URL: {}", e))
            }
        };

        // Session state applies to the shared jar before any fetch.
        if let Some(session) = &opts.session {
            for cookie in &session.cookies {
                self.engine.client.add_cookie(&parsed, cookie);
            }
            if let Some(profile) = &session.profile {
                if let Ok(Some(state)) = self.engine.sessions.get(profile).await {
                    for cookie in &state.cookies {
                        self.engine.client.add_cookie(&parsed, cookie);
                    }
                }
            }
        }

        let ctx = RequestCtx::new(parsed, opts);
        chain::run(&self.engine, &ctx).await
    }

    /// Planned strategy order without executing anything. In-memory only.
    pub async fn preview(
        &self,
        url: &str,
        opts: ExtractOptions,
    ) -> Result<ExecutionPlan, ExtractError> {
        let parsed = Url::parse(url).map_err(|e| ExtractError::InvalidUrl(e.to_string()))?;
        Ok(preview::preview(&self.engine, &parsed, &opts).await)
    }

    /// Drain pending persistence. Awaited on shutdown.
    pub async fn shutdown(&self) -> Result<(), ExtractError> {
        self.engine
            .store
            .flush()
            .await
            .map_err(|e| ExtractError::Store(e.to_string()))
    }
}
