//! Chain step 4: structured data already on the page — JSON-LD articles
//! first, OpenGraph as the thin fallback.

use async_trait::async_trait;
use serde_json::Value;

use siphon_core::{CostTier, ExtractedContent, HttpMethod};
use siphon_parse::markdown::{html_to_markdown, html_to_text, normalize_text};

use crate::context::RequestCtx;
use crate::strategy::{Candidate, Strategy, StrategyOutcome, STRUCTURED_DATA};
use crate::Engine;

const ARTICLE_TYPES: &[&str] = &[
    "Article",
    "NewsArticle",
    "BlogPosting",
    "TechArticle",
    "Report",
    "ScholarlyArticle",
];

pub struct StructuredDataStrategy;

fn is_article(block: &Value) -> bool {
    match &block["@type"] {
        Value::String(t) => ARTICLE_TYPES.contains(&t.as_str()),
        Value::Array(types) => types
            .iter()
            .filter_map(|t| t.as_str())
            .any(|t| ARTICLE_TYPES.contains(&t)),
        _ => false,
    }
}

fn from_json_ld(block: &Value) -> Option<(ExtractedContent, &'static str)> {
    let title = block["headline"]
        .as_str()
        .or_else(|| block["name"].as_str())?
        .to_string();
    let body = block["articleBody"]
        .as_str()
        .or_else(|| block["text"].as_str())
        .or_else(|| block["description"].as_str())
        .unwrap_or("");
    let (text, markdown) = if body.contains('<') {
        (html_to_text(body), html_to_markdown(body))
    } else {
        (normalize_text(body), body.to_string())
    };
    Some((
        ExtractedContent { title, text, markdown, structured: Some(block.clone()) },
        "structured:jsonld",
    ))
}

#[async_trait]
impl Strategy for StructuredDataStrategy {
    fn id(&self) -> &'static str {
        STRUCTURED_DATA
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

        // Graph containers unwrap to their nodes.
        let mut blocks: Vec<&Value> = Vec::new();
        for block in &page.parsed.json_ld {
            if let Some(graph) = block["@graph"].as_array() {
                blocks.extend(graph.iter());
            } else {
                blocks.push(block);
            }
        }

        let hit = blocks
            .iter()
            .filter(|b| is_article(b))
            .find_map(|b| from_json_ld(b));
        let (content, result_strategy) = match hit {
            Some(found) => found,
            None => {
                // OpenGraph rarely carries a full body; let the length gate
                // decide whether description-only content suffices.
                let og = &page.parsed.open_graph;
                let Some(title) = og.get("og:title") else {
                    return StrategyOutcome::NotApplicable(None);
                };
                let description = og.get("og:description").cloned().unwrap_or_default();
                (
                    ExtractedContent {
                        title: title.clone(),
                        text: normalize_text(&description),
                        markdown: description,
                        structured: None,
                    },
                    "structured:opengraph",
                )
            }
        };

        StrategyOutcome::Candidate(Box::new(Candidate {
            content,
            result_strategy: result_strategy.to_string(),
            final_url: page.response.final_url.to_string(),
            api_url: None,
            method: HttpMethod::Get,
            response_time_ms: page.response.response_time_ms,
            status: Some(page.response.status),
            warnings: Vec::new(),
        }))
    }
}
