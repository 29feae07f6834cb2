//! PyPI project pages via the JSON API.

use async_trait::async_trait;
use serde_json::json;
use url::Url;

use siphon_core::ExtractError;

use crate::{fetch_json, host_is, site_content, HandlerFetcher, SiteContent, SiteHandler};

pub struct PypiHandler;

#[async_trait]
impl SiteHandler for PypiHandler {
    fn name(&self) -> &'static str {
        "site:pypi"
    }

    fn can_handle(&self, url: &Url) -> bool {
        host_is(url, "pypi.org") && url.path().starts_with("/project/")
    }

    async fn extract(
        &self,
        url: &Url,
        fetch: &dyn HandlerFetcher,
    ) -> Result<Option<SiteContent>, ExtractError> {
        let name = url
            .path()
            .trim_start_matches("/project/")
            .trim_end_matches('/');
        if name.is_empty() || name.contains('/') {
            return Ok(None);
        }
        let api_url = Url::parse(&format!("https://pypi.org/pypi/{}/json", name))
            .map_err(|e| ExtractError::InvalidUrl(e.to_string()))?;
        let Some((value, ms)) = fetch_json(fetch, &api_url).await? else {
            return Ok(None);
        };
        let info = &value["info"];
        let Some(pkg_name) = info["name"].as_str() else {
            return Ok(None);
        };
        let summary = info["summary"].as_str().unwrap_or("");
        let description = info["description"].as_str().unwrap_or("");
        let markdown = format!("# {}\n\n{}\n\n{}", pkg_name, summary, description);
        let structured = json!({
            "name": pkg_name,
            "version": info["version"],
            "license": info["license"],
            "home_page": info["home_page"],
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
