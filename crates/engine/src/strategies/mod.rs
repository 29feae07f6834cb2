pub mod browser;
pub mod cache_sources;
pub mod framework;
pub mod graphql;
pub mod json_content;
pub mod learned;
pub mod openapi;
pub mod predicted;
pub mod site;
pub mod static_parse;
pub mod structured;

use crate::strategy::Strategy;

/// The canonical chain, in fail-over order.
pub fn default_chain() -> Vec<Box<dyn Strategy>> {
    vec![
        Box::new(site::SiteHandlerStrategy),
        Box::new(learned::LearnedPatternStrategy),
        Box::new(framework::FrameworkStrategy),
        Box::new(structured::StructuredDataStrategy),
        Box::new(static_parse::StaticParseStrategy),
        Box::new(predicted::PredictedApiStrategy),
        Box::new(openapi::OpenApiDiscoveryStrategy),
        Box::new(graphql::GraphQlDiscoveryStrategy),
        Box::new(cache_sources::GoogleCacheStrategy),
        Box::new(cache_sources::ArchiveOrgStrategy),
        Box::new(browser::BrowserStrategy),
    ]
}
