use std::sync::Arc;

use serde_json::json;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use siphon_cache::DiscoveryCache;
use siphon_client::PooledClient;
use siphon_discovery::DiscoveryService;

fn service() -> DiscoveryService {
    DiscoveryService::new(
        Arc::new(PooledClient::new().unwrap()),
        Arc::new(DiscoveryCache::new(None)),
    )
}

fn users_spec() -> String {
    json!({
        "openapi": "3.0.0",
        "info": {"title": "Users API"},
        "servers": [{"url": "/"}],
        "paths": {
            "/users/{id}": {
                "get": {
                    "operationId": "getUser",
                    "parameters": [{"name": "id", "in": "path", "required": true,
                                    "schema": {"type": "integer"}}],
                    "responses": {"200": {"content": {"application/json": {"schema": {
                        "type": "object",
                        "required": ["id", "name"],
                        "properties": {
                            "id": {"type": "integer"},
                            "name": {"type": "string"},
                            "email": {"type": "string"},
                            "description": {"type": "string"}
                        }
                    }}}}}
                }
            }
        }
    })
    .to_string()
}

#[tokio::test]
async fn openapi_probe_parses_and_generates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openapi.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(users_spec()))
        .expect(1)
        .mount(&server)
        .await;

    let svc = service();
    let url = Url::parse(&format!("{}/users/123", server.uri())).unwrap();

    let discovery = svc.discover_openapi(&url, None).await.unwrap();
    assert!(discovery.found);
    assert_eq!(discovery.patterns.len(), 1);
    let pattern = &discovery.patterns[0];
    assert_eq!(pattern.content_mapping.title, "name");
    assert!(pattern.endpoint_template.ends_with("/users/{id}"));

    // Second call for the same domain must come from cache (expect(1) above).
    let again = svc.discover_openapi(&url, None).await.unwrap();
    assert!(again.found);
    assert_eq!(again.patterns.len(), 1);
}

#[tokio::test]
async fn openapi_absent_is_cached_not_failed() {
    let server = MockServer::start().await;
    // Everything 404s; ten probe paths, hit exactly once each.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .expect(10)
        .mount(&server)
        .await;

    let svc = service();
    let url = Url::parse(&format!("{}/page", server.uri())).unwrap();

    let first = svc.discover_openapi(&url, None).await.unwrap();
    assert!(!first.found);
    // Cached: no further probes.
    let second = svc.discover_openapi(&url, None).await.unwrap();
    assert!(!second.found);
}

#[tokio::test]
async fn graphql_introspection_disabled_is_reported_found() {
    let server = MockServer::start().await;
    // Probe: { __typename } proves GraphQL.
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("__typename"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"__typename": "Query"}})),
        )
        .expect(1)
        .mount(&server)
        .await;
    // Introspection: refused.
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("IntrospectionQuery"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{"message": "GraphQL introspection is disabled"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let svc = service();
    let url = Url::parse(&format!("{}/article/1", server.uri())).unwrap();

    let discovery = svc.discover_graphql(&url, None).await.unwrap();
    assert!(discovery.found);
    assert!(discovery.introspection_disabled);
    assert!(discovery.patterns.is_empty());
    assert_eq!(
        discovery.endpoint.as_deref(),
        Some(format!("{}/graphql", server.uri()).as_str())
    );

    // Cached for the TTL: no re-probe, no introspection retry (expect(1)s).
    let again = svc.discover_graphql(&url, None).await.unwrap();
    assert!(again.introspection_disabled);
}

#[tokio::test]
async fn graphql_full_introspection_generates_patterns() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("__typename"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"data": {"__typename": "Query"}})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_string_contains("IntrospectionQuery"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"__schema": {
                "queryType": {"name": "Query"},
                "types": [
                    {"name": "Query", "kind": "OBJECT", "fields": [
                        {"name": "article", "args": [
                            {"name": "id", "type": {"kind": "NON_NULL",
                             "ofType": {"kind": "SCALAR", "name": "ID"}}}
                        ], "type": {"kind": "OBJECT", "name": "Article"}}
                    ]},
                    {"name": "Article", "kind": "OBJECT", "fields": [
                        {"name": "id", "args": [], "type": {"kind": "SCALAR", "name": "ID"}},
                        {"name": "title", "args": [], "type": {"kind": "SCALAR", "name": "String"}}
                    ]}
                ]
            }}
        })))
        .mount(&server)
        .await;

    let svc = service();
    let url = Url::parse(&format!("{}/x", server.uri())).unwrap();
    let discovery = svc.discover_graphql(&url, None).await.unwrap();
    assert!(discovery.found);
    assert!(!discovery.introspection_disabled);
    assert_eq!(discovery.patterns.len(), 1);
    assert_eq!(discovery.patterns[0].query_name, "article");
    assert!(discovery.patterns[0].query_template.contains("article(id: $id)"));
}

#[tokio::test]
async fn no_graphql_endpoint_found() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let svc = service();
    let url = Url::parse(&format!("{}/x", server.uri())).unwrap();
    let discovery = svc.discover_graphql(&url, None).await.unwrap();
    assert!(!discovery.found);
}
