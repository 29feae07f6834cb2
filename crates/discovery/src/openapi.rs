//! OpenAPI/Swagger discovery: probe the fixed candidate paths, parse JSON or
//! YAML specs (2.0 / 3.0 / 3.1), and normalize endpoints for pattern
//! generation.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use siphon_client::PooledClient;
use siphon_core::{ExtractError, FetchOptions};

use crate::refs::resolve_refs;

/// Fixed probe order; first 2xx with a parseable spec wins.
pub const OPENAPI_PROBE_PATHS: &[&str] = &[
    "/openapi.json",
    "/openapi.yaml",
    "/swagger.json",
    "/swagger.yaml",
    "/v3/api-docs",
    "/api-docs",
    "/api/swagger.json",
    "/swagger/v1/swagger.json",
    "/api/openapi.json",
    "/api/openapi.yaml",
];

const PROBE_ACCEPT: &str = "application/json, application/yaml, text/yaml";
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpenApiVersion {
    #[serde(rename = "2.0")]
    V2,
    #[serde(rename = "3.0")]
    V3,
    #[serde(rename = "3.1")]
    V31,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedOpenApiSpec {
    pub version: OpenApiVersion,
    pub title: String,
    pub base_url: String,
    pub endpoints: Vec<OpenApiEndpoint>,
    #[serde(default)]
    pub security_schemes: Vec<SecurityScheme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitInfo>,
    pub discovered_at: i64,
    pub spec_url: String,
    /// Circular `$ref`s left unresolved during parsing.
    #[serde(default)]
    pub circular_refs: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiEndpoint {
    pub path: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
    #[serde(default)]
    pub parameters: Vec<OpenApiParameter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<OpenApiRequestBody>,
    #[serde(default)]
    pub responses: Vec<OpenApiResponse>,
    #[serde(default)]
    pub deprecated: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiParameter {
    pub name: String,
    /// `path`, `query`, `header`, `cookie`, `body`, `formData`.
    pub location: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiRequestBody {
    pub content_type: String,
    pub schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenApiResponse {
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityScheme {
    pub name: String,
    pub scheme_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitInfo {
    pub limit: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_seconds: Option<u64>,
}

/// Probe the candidate paths on `base`. Returns the parsed spec of the first
/// hit, or None when nothing answered with a spec.
pub async fn probe_openapi(
    client: &PooledClient,
    base: &Url,
    cancel: Option<tokio_util::sync::CancellationToken>,
) -> Result<Option<ParsedOpenApiSpec>, ExtractError> {
    for path in OPENAPI_PROBE_PATHS {
        let Ok(probe_url) = base.join(path) else { continue };
        let opts = FetchOptions {
            headers: [("Accept".to_string(), PROBE_ACCEPT.to_string())].into(),
            timeout: Some(PROBE_TIMEOUT),
            cancel: cancel.clone(),
            ..Default::default()
        };
        let response = match client.fetch(&probe_url, &opts).await {
            Ok(r) => r,
            Err(ExtractError::Cancelled) => return Err(ExtractError::Cancelled),
            Err(e) => {
                debug!(url = %probe_url, error = %e, "openapi probe failed");
                continue;
            }
        };
        if !response.is_success() {
            continue;
        }
        match parse_spec(&response.body_text(), probe_url.as_str()) {
            Ok(spec) => {
                info!(url = %probe_url, endpoints = spec.endpoints.len(), "openapi spec found");
                return Ok(Some(spec));
            }
            Err(reason) => {
                debug!(url = %probe_url, reason, "response was not a usable spec");
            }
        }
    }
    Ok(None)
}

/// Parse a spec document: JSON first, then YAML (anchors and aliases are
/// resolved by the YAML parser).
pub fn parse_spec(text: &str, spec_url: &str) -> Result<ParsedOpenApiSpec, String> {
    let mut tree: Value = serde_json::from_str(text)
        .or_else(|_| serde_yaml::from_str(text).map_err(|e| format!("not json or yaml: {}", e)))?;

    let version = detect_version(&tree).ok_or("no openapi/swagger version marker")?;
    let circular_refs = resolve_refs(&mut tree);

    let title = tree["info"]["title"].as_str().unwrap_or("untitled").to_string();
    let base_url = extract_base_url(&tree, version, spec_url)?;
    let endpoints = extract_endpoints(&tree, version);
    if endpoints.is_empty() && tree.get("paths").is_none() {
        return Err("document has no paths".into());
    }
    let security_schemes = extract_security_schemes(&tree, version);
    let rate_limit = extract_rate_limit(&tree);

    Ok(ParsedOpenApiSpec {
        version,
        title,
        base_url,
        endpoints,
        security_schemes,
        rate_limit,
        discovered_at: siphon_core::now_ms(),
        spec_url: spec_url.to_string(),
        circular_refs,
    })
}

fn detect_version(tree: &Value) -> Option<OpenApiVersion> {
    if let Some(v) = tree["openapi"].as_str() {
        if v.starts_with("3.1") {
            return Some(OpenApiVersion::V31);
        }
        if v.starts_with("3.") {
            return Some(OpenApiVersion::V3);
        }
    }
    if tree["swagger"].as_str() == Some("2.0") {
        return Some(OpenApiVersion::V2);
    }
    None
}

fn extract_base_url(tree: &Value, version: OpenApiVersion, spec_url: &str) -> Result<String, String> {
    let spec = Url::parse(spec_url).map_err(|e| e.to_string())?;
    match version {
        OpenApiVersion::V2 => {
            let host = tree["host"].as_str().unwrap_or_else(|| spec.host_str().unwrap_or(""));
            let scheme = tree["schemes"][0].as_str().unwrap_or("https");
            let base_path = tree["basePath"].as_str().unwrap_or("");
            Ok(format!("{}://{}{}", scheme, host, base_path.trim_end_matches('/')))
        }
        _ => {
            let server = tree["servers"][0]["url"].as_str().unwrap_or("/");
            // Server URLs may be relative to where the spec was served.
            match Url::parse(server) {
                Ok(abs) => Ok(abs.to_string().trim_end_matches('/').to_string()),
                Err(_) => spec
                    .join(server)
                    .map(|u| u.to_string().trim_end_matches('/').to_string())
                    .map_err(|e| e.to_string()),
            }
        }
    }
}

fn extract_endpoints(tree: &Value, version: OpenApiVersion) -> Vec<OpenApiEndpoint> {
    let Some(paths) = tree["paths"].as_object() else {
        return Vec::new();
    };
    let mut endpoints = Vec::new();
    for (path, item) in paths {
        let Some(item) = item.as_object() else { continue };
        let shared_params: Vec<Value> = item
            .get("parameters")
            .and_then(|p| p.as_array())
            .cloned()
            .unwrap_or_default();
        for method in ["get", "post", "put", "delete", "patch"] {
            let Some(op) = item.get(method) else { continue };
            let mut raw_params = shared_params.clone();
            if let Some(own) = op["parameters"].as_array() {
                raw_params.extend(own.iter().cloned());
            }
            let parameters = raw_params
                .iter()
                .filter_map(|p| parse_parameter(p, version))
                .collect();
            endpoints.push(OpenApiEndpoint {
                path: path.clone(),
                method: method.to_uppercase(),
                operation_id: op["operationId"].as_str().map(str::to_string),
                parameters,
                request_body: parse_request_body(op, &raw_params, version),
                responses: parse_responses(op, version),
                deprecated: op["deprecated"].as_bool().unwrap_or(false),
            });
        }
    }
    endpoints
}

fn parse_parameter(param: &Value, version: OpenApiVersion) -> Option<OpenApiParameter> {
    let name = param["name"].as_str()?.to_string();
    let location = param["in"].as_str()?.to_string();
    let required = location == "path" || param["required"].as_bool().unwrap_or(false);
    let schema_type = match version {
        OpenApiVersion::V2 => param["type"].as_str().map(str::to_string),
        _ => param["schema"]["type"].as_str().map(str::to_string),
    };
    Some(OpenApiParameter { name, location, required, schema_type })
}

fn parse_request_body(
    op: &Value,
    raw_params: &[Value],
    version: OpenApiVersion,
) -> Option<OpenApiRequestBody> {
    match version {
        OpenApiVersion::V2 => raw_params
            .iter()
            .find(|p| p["in"].as_str() == Some("body"))
            .and_then(|p| p.get("schema"))
            .map(|schema| OpenApiRequestBody {
                content_type: "application/json".to_string(),
                schema: schema.clone(),
            }),
        _ => {
            let content = op["requestBody"]["content"].as_object()?;
            let (content_type, media) = content.iter().next()?;
            Some(OpenApiRequestBody {
                content_type: content_type.clone(),
                schema: media["schema"].clone(),
            })
        }
    }
}

fn parse_responses(op: &Value, version: OpenApiVersion) -> Vec<OpenApiResponse> {
    let Some(responses) = op["responses"].as_object() else {
        return Vec::new();
    };
    responses
        .iter()
        .filter_map(|(status, body)| {
            let status: u16 = status.parse().ok()?;
            let schema = match version {
                OpenApiVersion::V2 => body.get("schema").cloned(),
                _ => body["content"]
                    .as_object()
                    .and_then(|c| c.values().next())
                    .and_then(|m| m.get("schema"))
                    .cloned(),
            };
            Some(OpenApiResponse { status, schema: schema.filter(|s| !s.is_null()) })
        })
        .collect()
}

fn extract_security_schemes(tree: &Value, version: OpenApiVersion) -> Vec<SecurityScheme> {
    let schemes = match version {
        OpenApiVersion::V2 => tree["securityDefinitions"].as_object(),
        _ => tree["components"]["securitySchemes"].as_object(),
    };
    schemes
        .map(|map| {
            map.iter()
                .map(|(name, def)| SecurityScheme {
                    name: name.clone(),
                    scheme_type: def["type"].as_str().unwrap_or("unknown").to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// `x-ratelimit-*` vendor extensions at the document root.
fn extract_rate_limit(tree: &Value) -> Option<RateLimitInfo> {
    let obj = tree.as_object()?;
    let limit = obj
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("x-ratelimit-limit"))
        .and_then(|(_, v)| v.as_u64())?;
    let window_seconds = obj
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("x-ratelimit-window"))
        .and_then(|(_, v)| v.as_u64());
    Some(RateLimitInfo { limit, window_seconds })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v3_spec() -> String {
        json!({
            "openapi": "3.0.1",
            "info": {"title": "Users API"},
            "servers": [{"url": "https://api.example.com/v1"}],
            "paths": {
                "/users/{id}": {
                    "get": {
                        "operationId": "getUser",
                        "parameters": [
                            {"name": "id", "in": "path", "required": true,
                             "schema": {"type": "integer"}}
                        ],
                        "responses": {
                            "200": {
                                "content": {"application/json": {"schema": {
                                    "$ref": "#/components/schemas/User"
                                }}}
                            }
                        }
                    }
                }
            },
            "components": {
                "schemas": {
                    "User": {
                        "type": "object",
                        "required": ["id", "name"],
                        "properties": {
                            "id": {"type": "integer"},
                            "name": {"type": "string"},
                            "description": {"type": "string"}
                        }
                    }
                },
                "securitySchemes": {"bearer": {"type": "http"}}
            }
        })
        .to_string()
    }

    #[test]
    fn parses_v3_json() {
        let spec = parse_spec(&v3_spec(), "https://api.example.com/openapi.json").unwrap();
        assert_eq!(spec.version, OpenApiVersion::V3);
        assert_eq!(spec.title, "Users API");
        assert_eq!(spec.base_url, "https://api.example.com/v1");
        assert_eq!(spec.endpoints.len(), 1);

        let ep = &spec.endpoints[0];
        assert_eq!(ep.path, "/users/{id}");
        assert_eq!(ep.method, "GET");
        assert_eq!(ep.operation_id.as_deref(), Some("getUser"));
        assert_eq!(ep.parameters.len(), 1);
        assert!(ep.parameters[0].required);

        // $ref resolved into the response schema.
        let schema = spec.endpoints[0].responses[0].schema.as_ref().unwrap();
        assert_eq!(schema["required"][0], "id");
        assert_eq!(spec.security_schemes[0].name, "bearer");
    }

    #[test]
    fn parses_v2_yaml() {
        let yaml = r#"
swagger: "2.0"
info:
  title: Legacy API
host: legacy.example.com
basePath: /api
schemes: [https]
paths:
  /items/{itemId}:
    get:
      parameters:
        - name: itemId
          in: path
          required: true
          type: string
      responses:
        "200":
          schema:
            type: object
            required: [name]
            properties:
              name: {type: string}
"#;
        let spec = parse_spec(yaml, "https://legacy.example.com/swagger.yaml").unwrap();
        assert_eq!(spec.version, OpenApiVersion::V2);
        assert_eq!(spec.base_url, "https://legacy.example.com/api");
        assert_eq!(spec.endpoints[0].parameters[0].schema_type.as_deref(), Some("string"));
        assert!(spec.endpoints[0].responses[0].schema.is_some());
    }

    #[test]
    fn v31_detected() {
        let text = json!({
            "openapi": "3.1.0",
            "info": {"title": "T"},
            "servers": [{"url": "https://x.io"}],
            "paths": {}
        })
        .to_string();
        let spec = parse_spec(&text, "https://x.io/openapi.json").unwrap();
        assert_eq!(spec.version, OpenApiVersion::V31);
    }

    #[test]
    fn html_is_rejected() {
        assert!(parse_spec("<html><body>404</body></html>", "https://x.io/openapi.json").is_err());
    }

    #[test]
    fn missing_version_marker_rejected() {
        assert!(parse_spec("{\"info\": {}}", "https://x.io/openapi.json").is_err());
    }

    #[test]
    fn relative_server_url_resolves_against_spec() {
        let text = json!({
            "openapi": "3.0.0",
            "info": {"title": "T"},
            "servers": [{"url": "/api/v2"}],
            "paths": {}
        })
        .to_string();
        let spec = parse_spec(&text, "https://host.example.com/openapi.json").unwrap();
        assert_eq!(spec.base_url, "https://host.example.com/api/v2");
    }

    #[test]
    fn rate_limit_extension() {
        let text = json!({
            "openapi": "3.0.0",
            "info": {"title": "T"},
            "servers": [{"url": "https://x.io"}],
            "x-ratelimit-limit": 100,
            "x-ratelimit-window": 60,
            "paths": {}
        })
        .to_string();
        let spec = parse_spec(&text, "https://x.io/openapi.json").unwrap();
        let rl = spec.rate_limit.unwrap();
        assert_eq!(rl.limit, 100);
        assert_eq!(rl.window_seconds, Some(60));
    }
}
