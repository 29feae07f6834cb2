//! Chain step 6: API endpoints mined from the page's scripts, tried in
//! order until one yields real content.

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use siphon_core::domain::registrable_domain;
use siphon_core::{CostTier, FailureCategory, HttpMethod};
use siphon_parse::mine_endpoints;

use crate::context::RequestCtx;
use crate::strategies::json_content::content_from_json;
use crate::strategy::{Candidate, Strategy, StrategyOutcome, PREDICTED_API};
use crate::Engine;

const MAX_PROBES: usize = 5;

pub struct PredictedApiStrategy;

/// `{slot}` placeholders take the page URL's last path segment — the common
/// `/api/article/${slug}` shape.
fn fill_slots(endpoint: &str, page_url: &Url) -> Option<String> {
    if !endpoint.contains("{slot}") {
        return Some(endpoint.to_string());
    }
    let last = page_url
        .path_segments()?
        .filter(|s| !s.is_empty())
        .next_back()?;
    Some(endpoint.replace("{slot}", last))
}

#[async_trait]
impl Strategy for PredictedApiStrategy {
    fn id(&self) -> &'static str {
        PREDICTED_API
    }

    fn tier(&self) -> CostTier {
        CostTier::Intelligence
    }

    async fn run(&self, ctx: &RequestCtx, engine: &Engine) -> StrategyOutcome {
        let Some(page) = ctx.page(engine).await else {
            return StrategyOutcome::NotApplicable(Some("page unavailable".into()));
        };
        if !page.is_html() {
            return StrategyOutcome::NotApplicable(None);
        }
        let mined = mine_endpoints(&page.parsed.script_text, &ctx.url);
        if mined.is_empty() {
            return StrategyOutcome::NotApplicable(None);
        }

        let page_domain = ctx.domain.clone();
        let mut last_failure: Option<(FailureCategory, String, Option<u16>, String)> = None;
        let mut probed = 0usize;

        for endpoint in mined {
            if probed >= MAX_PROBES || ctx.cancel.is_cancelled() {
                break;
            }
            // GET-able, same-site candidates only.
            if endpoint.method.as_deref().is_some_and(|m| m != "GET") {
                continue;
            }
            let Some(filled) = fill_slots(&endpoint.url, &ctx.url) else { continue };
            let Ok(api_url) = Url::parse(&filled) else { continue };
            if registrable_domain(&api_url) != page_domain {
                continue;
            }
            probed += 1;

            let mut opts = ctx.fetch_options();
            opts.headers
                .insert("Accept".to_string(), "application/json".to_string());
            let response = match engine.client.fetch(&api_url, &opts).await {
                Ok(r) => r,
                Err(e) => {
                    debug!(api = %api_url, error = %e, "predicted endpoint unreachable");
                    last_failure = Some((
                        FailureCategory::from_error(&e),
                        e.to_string(),
                        None,
                        api_url.to_string(),
                    ));
                    continue;
                }
            };
            if !response.is_success() {
                last_failure = Some((
                    FailureCategory::from_status(response.status),
                    format!("HTTP {}", response.status),
                    Some(response.status),
                    api_url.to_string(),
                ));
                continue;
            }
            let Ok(value) = serde_json::from_slice::<serde_json::Value>(&response.body) else {
                continue;
            };
            let Some(mut content) = content_from_json(&value) else {
                continue;
            };
            if content.title.is_empty() {
                if let Some(title) = ctx.fallback_title_if_cached() {
                    content.title = title;
                }
            }

            return StrategyOutcome::Candidate(Box::new(Candidate {
                content,
                result_strategy: "api:predicted".to_string(),
                final_url: ctx.url.to_string(),
                api_url: Some(api_url.to_string()),
                method: HttpMethod::Get,
                response_time_ms: response.response_time_ms,
                status: Some(response.status),
                warnings: Vec::new(),
            }));
        }

        match last_failure {
            Some((category, reason, status, api_url)) => StrategyOutcome::Failed {
                category,
                reason,
                should_have_matched: false,
                api_url: Some(api_url),
                status,
            },
            None => StrategyOutcome::NotApplicable(Some("no predicted endpoint panned out".into())),
        }
    }
}
