//! API discovery: probe OpenAPI and GraphQL contracts, parse them, and turn
//! them into replayable patterns. Each `(source, domain)` is probed at most
//! once per cache TTL, guarded by the cache's cooldown tracker.

pub mod graphql;
pub mod graphql_patterns;
pub mod openapi;
pub mod openapi_patterns;
pub mod refs;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use siphon_cache::{DiscoveryCache, WithCacheOptions};
use siphon_client::PooledClient;
use siphon_core::domain::registrable_domain;
use siphon_core::ExtractError;
use siphon_patterns::LearnedPattern;

pub use graphql::{
    IntrospectionOutcome, ParsedGraphQlSchema, PaginationPattern, GRAPHQL_PROBE_PATHS,
};
pub use graphql_patterns::{GraphQlQueryPattern, OperationType};
pub use openapi::{OpenApiVersion, ParsedOpenApiSpec, OPENAPI_PROBE_PATHS};
pub use openapi_patterns::MAX_ENDPOINTS_PER_SPEC;
pub use refs::resolve_refs;

pub const SOURCE_OPENAPI: &str = "openapi";
pub const SOURCE_GRAPHQL: &str = "graphql";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiDiscovery {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec: Option<ParsedOpenApiSpec>,
    #[serde(default)]
    pub patterns: Vec<LearnedPattern>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlDiscovery {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub introspection_disabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<ParsedGraphQlSchema>,
    #[serde(default)]
    pub patterns: Vec<GraphQlQueryPattern>,
}

pub struct DiscoveryService {
    client: Arc<PooledClient>,
    cache: Arc<DiscoveryCache>,
}

impl DiscoveryService {
    pub fn new(client: Arc<PooledClient>, cache: Arc<DiscoveryCache>) -> Self {
        Self { client, cache }
    }

    fn origin_of(url: &Url) -> Result<Url, ExtractError> {
        let mut origin = url.clone();
        origin.set_path("/");
        origin.set_query(None);
        origin.set_fragment(None);
        Ok(origin)
    }

    /// OpenAPI discovery for the URL's domain. A clean "nothing found" is a
    /// cacheable answer; transport errors feed the cooldown tracker.
    pub async fn discover_openapi(
        &self,
        url: &Url,
        cancel: Option<CancellationToken>,
    ) -> Result<OpenApiDiscovery, ExtractError> {
        let domain = registrable_domain(url);
        let base = Self::origin_of(url)?;
        let client = Arc::clone(&self.client);

        let value = self
            .cache
            .with_cache(
                SOURCE_OPENAPI,
                &domain,
                || async move {
                    let result = match openapi::probe_openapi(&client, &base, cancel).await? {
                        Some(spec) => {
                            let generated = openapi_patterns::patterns_from_spec(&spec);
                            OpenApiDiscovery {
                                found: true,
                                spec: Some(spec),
                                patterns: generated.patterns,
                                warnings: generated.warnings,
                            }
                        }
                        None => OpenApiDiscovery::default(),
                    };
                    serde_json::to_value(&result).map_err(|e| ExtractError::Parse(e.to_string()))
                },
                WithCacheOptions::default(),
            )
            .await?;
        serde_json::from_value(value).map_err(|e| ExtractError::Parse(e.to_string()))
    }

    /// GraphQL discovery: probe, then introspect. An endpoint that refuses
    /// introspection is still a find — reported, cached, zero patterns.
    pub async fn discover_graphql(
        &self,
        url: &Url,
        cancel: Option<CancellationToken>,
    ) -> Result<GraphQlDiscovery, ExtractError> {
        let domain = registrable_domain(url);
        let base = Self::origin_of(url)?;
        let client = Arc::clone(&self.client);

        let value = self
            .cache
            .with_cache(
                SOURCE_GRAPHQL,
                &domain,
                || async move {
                    let Some(endpoint) =
                        graphql::probe_graphql(&client, &base, cancel.clone()).await?
                    else {
                        return serde_json::to_value(GraphQlDiscovery::default())
                            .map_err(|e| ExtractError::Parse(e.to_string()));
                    };

                    let result = match graphql::introspect(&client, &endpoint, cancel).await? {
                        IntrospectionOutcome::Schema(schema) => {
                            let patterns = graphql_patterns::query_patterns_from_schema(&schema);
                            GraphQlDiscovery {
                                found: true,
                                endpoint: Some(endpoint.to_string()),
                                introspection_disabled: false,
                                schema: Some(schema),
                                patterns,
                            }
                        }
                        IntrospectionOutcome::Disabled => GraphQlDiscovery {
                            found: true,
                            endpoint: Some(endpoint.to_string()),
                            introspection_disabled: true,
                            schema: None,
                            patterns: Vec::new(),
                        },
                        IntrospectionOutcome::Unusable(reason) => {
                            debug!(endpoint = %endpoint, reason, "introspection unusable");
                            GraphQlDiscovery {
                                found: true,
                                endpoint: Some(endpoint.to_string()),
                                introspection_disabled: false,
                                schema: None,
                                patterns: Vec::new(),
                            }
                        }
                    };
                    serde_json::to_value(&result).map_err(|e| ExtractError::Parse(e.to_string()))
                },
                WithCacheOptions::default(),
            )
            .await?;
        serde_json::from_value(value).map_err(|e| ExtractError::Parse(e.to_string()))
    }
}
