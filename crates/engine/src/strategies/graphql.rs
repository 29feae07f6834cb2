//! Chain step 8: GraphQL discovery. With introspection available, fire the
//! best-fitting generated query against the endpoint.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::{debug, info};
use url::Url;

use siphon_core::generalize::generalize_url;
use siphon_core::{CostTier, ExtractError, FailureCategory, FetchOptions, HttpMethod};
use siphon_discovery::GraphQlQueryPattern;

use crate::context::RequestCtx;
use crate::strategies::json_content::content_from_json;
use crate::strategy::{Candidate, Strategy, StrategyOutcome, GRAPHQL_DISCOVERY};
use crate::Engine;

pub struct GraphQlDiscoveryStrategy;

/// A pattern is fireable when every required argument can be filled from the
/// page URL: one id-like value feeding one ID/Int/String argument.
fn fill_variables(pattern: &GraphQlQueryPattern, url: &Url) -> Option<Value> {
    if pattern.required_args.is_empty() {
        return Some(json!({}));
    }
    if pattern.required_args.len() > 1 {
        return None;
    }
    let arg = &pattern.required_args[0];
    let generalized = generalize_url(url);
    let observed = generalized.placeholders.first().map(|p| p.observed.clone())?;

    let base_type = arg.type_name.trim_end_matches('!');
    let value = match base_type {
        "Int" => Value::Number(observed.parse::<i64>().ok()?.into()),
        _ => Value::String(observed),
    };
    let mut vars = Map::new();
    vars.insert(arg.name.clone(), value);
    Some(Value::Object(vars))
}

#[async_trait]
impl Strategy for GraphQlDiscoveryStrategy {
    fn id(&self) -> &'static str {
        GRAPHQL_DISCOVERY
    }

    fn tier(&self) -> CostTier {
        CostTier::Lightweight
    }

    async fn run(&self, ctx: &RequestCtx, engine: &Engine) -> StrategyOutcome {
        let discovery = match engine
            .discovery
            .discover_graphql(&ctx.url, Some(ctx.cancel.clone()))
            .await
        {
            Ok(d) => d,
            Err(ExtractError::Cooldown { until_ms, .. }) => {
                return StrategyOutcome::NotApplicable(Some(format!(
                    "discovery in cooldown until {}",
                    until_ms
                )));
            }
            Err(ExtractError::Cancelled) => {
                return StrategyOutcome::failed(FailureCategory::Cancelled, "cancelled")
            }
            Err(e) => {
                return StrategyOutcome::failed(FailureCategory::from_error(&e), e.to_string())
            }
        };
        if !discovery.found {
            return StrategyOutcome::NotApplicable(None);
        }
        if discovery.introspection_disabled || discovery.patterns.is_empty() {
            return StrategyOutcome::NotApplicable(Some(
                "graphql endpoint found but unusable for queries".into(),
            ));
        }
        let Some(endpoint) = discovery.endpoint.as_deref().and_then(|e| Url::parse(e).ok())
        else {
            return StrategyOutcome::NotApplicable(None);
        };
        info!(endpoint = %endpoint, patterns = discovery.patterns.len(), "graphql schema usable");

        let mut last_failure: Option<(FailureCategory, String, Option<u16>)> = None;
        for pattern in &discovery.patterns {
            if ctx.cancel.is_cancelled() {
                return StrategyOutcome::failed(FailureCategory::Cancelled, "cancelled");
            }
            let Some(variables) = fill_variables(pattern, &ctx.url) else {
                continue;
            };
            let body = json!({ "query": pattern.query_template, "variables": variables });
            let opts = FetchOptions {
                method: HttpMethod::Post,
                headers: [
                    ("Content-Type".to_string(), "application/json".to_string()),
                    ("Accept".to_string(), "application/json".to_string()),
                ]
                .into(),
                body: serde_json::to_vec(&body).ok(),
                timeout: Some(ctx.remaining()),
                cancel: Some(ctx.cancel.clone()),
                ..Default::default()
            };
            let response = match engine.client.fetch(&endpoint, &opts).await {
                Ok(r) => r,
                Err(e) => {
                    last_failure =
                        Some((FailureCategory::from_error(&e), e.to_string(), None));
                    continue;
                }
            };
            if !response.is_success() {
                last_failure = Some((
                    FailureCategory::from_status(response.status),
                    format!("HTTP {}", response.status),
                    Some(response.status),
                ));
                continue;
            }
            let Ok(value) = serde_json::from_slice::<Value>(&response.body) else {
                continue;
            };
            if value["errors"].is_array() {
                debug!(query = %pattern.query_name, "graphql query errored, trying next");
                continue;
            }
            let data = &value["data"][pattern.query_name.as_str()];
            if data.is_null() {
                continue;
            }
            let Some(content) = content_from_json(data) else {
                continue;
            };

            return StrategyOutcome::Candidate(Box::new(Candidate {
                content,
                result_strategy: "api:graphql".to_string(),
                final_url: ctx.url.to_string(),
                api_url: Some(endpoint.to_string()),
                method: HttpMethod::Post,
                response_time_ms: response.response_time_ms,
                status: Some(response.status),
                warnings: Vec::new(),
            }));
        }

        match last_failure {
            Some((category, reason, status)) => StrategyOutcome::Failed {
                category,
                reason,
                should_have_matched: false,
                api_url: discovery.endpoint.clone(),
                status,
            },
            None => StrategyOutcome::NotApplicable(Some("no fireable graphql query".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use siphon_discovery::{GraphQlQueryPattern, OperationType};

    fn pattern(required: Vec<(&str, &str)>) -> GraphQlQueryPattern {
        GraphQlQueryPattern {
            operation_type: OperationType::Query,
            query_name: "article".into(),
            required_args: required
                .into_iter()
                .map(|(name, ty)| siphon_discovery::graphql_patterns::GraphQlArgSpec {
                    name: name.into(),
                    type_name: ty.into(),
                })
                .collect(),
            optional_args: vec![],
            query_template: "query Article($id: ID!) { article(id: $id) { id title } }".into(),
            default_field_selection: vec!["id".into(), "title".into()],
            confidence: 0.95,
        }
    }

    #[test]
    fn variables_filled_from_url_id() {
        let url = Url::parse("https://x.io/articles/123").unwrap();
        let vars = fill_variables(&pattern(vec![("id", "ID!")]), &url).unwrap();
        assert_eq!(vars["id"], "123");

        let vars = fill_variables(&pattern(vec![("id", "Int!")]), &url).unwrap();
        assert_eq!(vars["id"], 123);
    }

    #[test]
    fn unfillable_patterns_skipped() {
        let url = Url::parse("https://x.io/about").unwrap();
        assert!(fill_variables(&pattern(vec![("id", "ID!")]), &url).is_none());

        let url = Url::parse("https://x.io/articles/123").unwrap();
        assert!(fill_variables(&pattern(vec![("a", "ID!"), ("b", "ID!")]), &url).is_none());
    }

    #[test]
    fn no_args_is_trivially_fireable() {
        let url = Url::parse("https://x.io/about").unwrap();
        assert_eq!(fill_variables(&pattern(vec![]), &url), Some(json!({})));
    }
}
