//! npm packages via the public registry.

use async_trait::async_trait;
use serde_json::json;
use url::Url;

use siphon_core::ExtractError;

use crate::{fetch_json, host_is, site_content, HandlerFetcher, SiteContent, SiteHandler};

pub struct NpmHandler;

#[async_trait]
impl SiteHandler for NpmHandler {
    fn name(&self) -> &'static str {
        "site:npm"
    }

    fn can_handle(&self, url: &Url) -> bool {
        host_is(url, "npmjs.com") && url.path().starts_with("/package/")
    }

    async fn extract(
        &self,
        url: &Url,
        fetch: &dyn HandlerFetcher,
    ) -> Result<Option<SiteContent>, ExtractError> {
        // Scoped names keep their slash: /package/@scope/name.
        let Some(name) = url.path().strip_prefix("/package/") else {
            return Ok(None);
        };
        let api_url = Url::parse(&format!("https://registry.npmjs.org/{}", name))
            .map_err(|e| ExtractError::InvalidUrl(e.to_string()))?;
        let Some((value, ms)) = fetch_json(fetch, &api_url).await? else {
            return Ok(None);
        };
        let Some(pkg_name) = value["name"].as_str() else {
            return Ok(None);
        };
        let description = value["description"].as_str().unwrap_or("");
        let readme = value["readme"].as_str().unwrap_or("");
        let latest = value["dist-tags"]["latest"].as_str().unwrap_or("unknown");
        let markdown = format!("# {}\n\n{}\n\n{}", pkg_name, description, readme);
        let structured = json!({
            "name": pkg_name,
            "latest": latest,
            "license": value["license"],
            "homepage": value["homepage"],
        });
        Ok(Some(site_content(
            pkg_name.to_string(),
            markdown,
            Some(structured),
            Some(api_url.to_string()),
            ms,
        )))
    }
}
