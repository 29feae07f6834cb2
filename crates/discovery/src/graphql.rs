//! GraphQL discovery: probe candidate endpoints with `{ __typename }`,
//! introspect the schema (with a reduced fallback), and normalize types for
//! query-pattern generation.

use std::collections::HashMap;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};
use url::Url;

use siphon_client::PooledClient;
use siphon_core::{ExtractError, FetchOptions, HttpMethod};

pub const GRAPHQL_PROBE_PATHS: &[&str] =
    &["/graphql", "/api/graphql", "/v1/graphql", "/v2/graphql", "/gql", "/query"];

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

static INTROSPECTION_DISABLED_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)introspection (is )?disabled").unwrap());

/// Canonical introspection query, trimmed to what pattern generation needs:
/// root type names plus every type's fields, args, and (wrapped) type refs.
pub const INTROSPECTION_QUERY: &str = r#"
query IntrospectionQuery {
  __schema {
    queryType { name }
    mutationType { name }
    types {
      name
      kind
      fields(includeDeprecated: false) {
        name
        args { name type { ...TypeRef } }
        type { ...TypeRef }
      }
    }
  }
}
fragment TypeRef on __Type {
  kind name
  ofType { kind name ofType { kind name ofType { kind name } } }
}
"#;

/// Fallback for servers that reject the full query.
pub const REDUCED_INTROSPECTION_QUERY: &str =
    "{ __schema { queryType { name } types { name kind } } }";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedGraphQlSchema {
    pub endpoint: String,
    pub query_type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mutation_type_name: Option<String>,
    pub types: HashMap<String, GraphQlType>,
    /// OBJECT types with an `id` field, excluding roots and introspection
    /// machinery.
    pub entity_types: Vec<String>,
    pub pagination_pattern: PaginationPattern,
    pub fetched_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlType {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub fields: Vec<GraphQlField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlField {
    pub name: String,
    #[serde(default)]
    pub args: Vec<GraphQlArg>,
    pub type_ref: TypeRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlArg {
    pub name: String,
    pub type_ref: TypeRef,
}

/// Recursive `{name?, kind, ofType?}` tuple mirroring `__Type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub of_type: Option<Box<TypeRef>>,
}

impl TypeRef {
    pub fn is_non_null(&self) -> bool {
        self.kind == "NON_NULL"
    }

    pub fn is_list(&self) -> bool {
        self.kind == "LIST" || self.of_type.as_ref().is_some_and(|t| t.is_list())
    }

    /// Strip NON_NULL/LIST wrappers down to the named type.
    pub fn base_type_name(&self) -> Option<&str> {
        match (&self.name, &self.of_type) {
            (Some(name), _) => Some(name),
            (None, Some(inner)) => inner.base_type_name(),
            (None, None) => None,
        }
    }

    /// Render in GraphQL syntax: `[Item!]!` etc.
    pub fn render(&self) -> String {
        match self.kind.as_str() {
            "NON_NULL" => format!(
                "{}!",
                self.of_type.as_ref().map(|t| t.render()).unwrap_or_default()
            ),
            "LIST" => format!(
                "[{}]",
                self.of_type.as_ref().map(|t| t.render()).unwrap_or_default()
            ),
            _ => self.name.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaginationPattern {
    Relay,
    Offset,
    Cursor,
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlProbe {
    pub found: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub introspection_disabled: bool,
}

async fn post_query(
    client: &PooledClient,
    endpoint: &Url,
    query: &str,
    cancel: Option<tokio_util::sync::CancellationToken>,
) -> Result<Value, ExtractError> {
    let body = serde_json::to_vec(&json!({ "query": query }))
        .map_err(|e| ExtractError::Parse(e.to_string()))?;
    let opts = FetchOptions {
        method: HttpMethod::Post,
        headers: [
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Accept".to_string(), "application/json".to_string()),
        ]
        .into(),
        body: Some(body),
        timeout: Some(PROBE_TIMEOUT),
        cancel,
        ..Default::default()
    };
    let response = client.fetch(endpoint, &opts).await?;
    if !response.is_success() {
        return Err(ExtractError::Status {
            status: response.status,
            url: endpoint.to_string(),
        });
    }
    serde_json::from_slice(&response.body)
        .map_err(|e| ExtractError::Parse(format!("not a graphql response: {}", e)))
}

/// A 2xx carrying either `data.__typename` or an `errors[]` array proves
/// GraphQL semantics at the endpoint.
fn is_graphql_response(value: &Value) -> bool {
    value["data"]["__typename"].is_string() || value["errors"].is_array()
}

pub async fn probe_graphql(
    client: &PooledClient,
    base: &Url,
    cancel: Option<tokio_util::sync::CancellationToken>,
) -> Result<Option<Url>, ExtractError> {
    for path in GRAPHQL_PROBE_PATHS {
        let Ok(endpoint) = base.join(path) else { continue };
        match post_query(client, &endpoint, "{ __typename }", cancel.clone()).await {
            Ok(value) if is_graphql_response(&value) => {
                info!(endpoint = %endpoint, "graphql endpoint found");
                return Ok(Some(endpoint));
            }
            Ok(_) => debug!(endpoint = %endpoint, "2xx but not graphql"),
            Err(ExtractError::Cancelled) => return Err(ExtractError::Cancelled),
            Err(e) => debug!(endpoint = %endpoint, error = %e, "graphql probe failed"),
        }
    }
    Ok(None)
}

pub enum IntrospectionOutcome {
    Schema(ParsedGraphQlSchema),
    /// Endpoint is GraphQL but refuses introspection; report found, learn
    /// nothing.
    Disabled,
    Unusable(String),
}

fn errors_say_disabled(value: &Value) -> bool {
    value["errors"]
        .as_array()
        .map(|errors| {
            errors.iter().any(|e| {
                e["message"]
                    .as_str()
                    .is_some_and(|m| INTROSPECTION_DISABLED_RE.is_match(m))
            })
        })
        .unwrap_or(false)
}

pub async fn introspect(
    client: &PooledClient,
    endpoint: &Url,
    cancel: Option<tokio_util::sync::CancellationToken>,
) -> Result<IntrospectionOutcome, ExtractError> {
    let value = post_query(client, endpoint, INTROSPECTION_QUERY, cancel.clone()).await?;
    if errors_say_disabled(&value) {
        info!(endpoint = %endpoint, "introspection disabled");
        return Ok(IntrospectionOutcome::Disabled);
    }
    if value["data"]["__schema"].is_object() {
        return Ok(parse_schema(endpoint.as_str(), &value["data"]["__schema"]));
    }

    // Some servers reject the full query shape; retry with the reduced one.
    let value = post_query(client, endpoint, REDUCED_INTROSPECTION_QUERY, cancel).await?;
    if errors_say_disabled(&value) {
        return Ok(IntrospectionOutcome::Disabled);
    }
    if value["data"]["__schema"].is_object() {
        return Ok(parse_schema(endpoint.as_str(), &value["data"]["__schema"]));
    }
    Ok(IntrospectionOutcome::Unusable("no usable __schema in response".into()))
}

fn parse_type_ref(value: &Value) -> TypeRef {
    TypeRef {
        name: value["name"].as_str().map(str::to_string),
        kind: value["kind"].as_str().unwrap_or("SCALAR").to_string(),
        of_type: value
            .get("ofType")
            .filter(|v| v.is_object())
            .map(|v| Box::new(parse_type_ref(v))),
    }
}

pub fn parse_schema(endpoint: &str, schema: &Value) -> IntrospectionOutcome {
    let Some(query_type_name) = schema["queryType"]["name"].as_str() else {
        return IntrospectionOutcome::Unusable("missing queryType".into());
    };
    let mutation_type_name = schema["mutationType"]["name"].as_str().map(str::to_string);

    let mut types = HashMap::new();
    for raw in schema["types"].as_array().map(|a| a.as_slice()).unwrap_or_default() {
        let Some(name) = raw["name"].as_str() else { continue };
        if name.starts_with("__") {
            continue;
        }
        let fields = raw["fields"]
            .as_array()
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(|f| {
                        let field_name = f["name"].as_str()?;
                        let args = f["args"]
                            .as_array()
                            .map(|args| {
                                args.iter()
                                    .filter_map(|a| {
                                        Some(GraphQlArg {
                                            name: a["name"].as_str()?.to_string(),
                                            type_ref: parse_type_ref(&a["type"]),
                                        })
                                    })
                                    .collect()
                            })
                            .unwrap_or_default();
                        Some(GraphQlField {
                            name: field_name.to_string(),
                            args,
                            type_ref: parse_type_ref(&f["type"]),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        types.insert(
            name.to_string(),
            GraphQlType {
                name: name.to_string(),
                kind: raw["kind"].as_str().unwrap_or("OBJECT").to_string(),
                fields,
            },
        );
    }

    let pagination_pattern = detect_pagination(&types, query_type_name);
    let entity_types = types
        .values()
        .filter(|t| {
            t.kind == "OBJECT"
                && t.name != query_type_name
                && Some(t.name.as_str()) != mutation_type_name.as_deref()
                && t.fields.iter().any(|f| f.name == "id")
        })
        .map(|t| t.name.clone())
        .collect();

    IntrospectionOutcome::Schema(ParsedGraphQlSchema {
        endpoint: endpoint.to_string(),
        query_type_name: query_type_name.to_string(),
        mutation_type_name,
        types,
        entity_types,
        pagination_pattern,
        fetched_at: siphon_core::now_ms(),
    })
}

/// Classify pagination by the argument names on query-root fields.
fn detect_pagination(types: &HashMap<String, GraphQlType>, query_type: &str) -> PaginationPattern {
    let Some(root) = types.get(query_type) else {
        return PaginationPattern::None;
    };
    let has_connection_types = types
        .keys()
        .any(|name| name.ends_with("Connection") || name.ends_with("Edge"));

    for field in &root.fields {
        let arg_names: Vec<&str> = field.args.iter().map(|a| a.name.as_str()).collect();
        if arg_names.contains(&"first") && arg_names.contains(&"after") {
            return if has_connection_types {
                PaginationPattern::Relay
            } else {
                PaginationPattern::Cursor
            };
        }
        if arg_names.contains(&"limit") && arg_names.contains(&"offset") {
            return PaginationPattern::Offset;
        }
        if arg_names.contains(&"cursor") && arg_names.contains(&"pageSize") {
            return PaginationPattern::Cursor;
        }
    }
    PaginationPattern::None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_ref_helpers() {
        // [User!]!
        let t = parse_type_ref(&json!({
            "kind": "NON_NULL",
            "ofType": {"kind": "LIST", "ofType": {"kind": "NON_NULL", "ofType": {
                "kind": "OBJECT", "name": "User"
            }}}
        }));
        assert!(t.is_non_null());
        assert!(t.is_list());
        assert_eq!(t.base_type_name(), Some("User"));
        assert_eq!(t.render(), "[User!]!");
    }

    #[test]
    fn graphql_semantics_detection() {
        assert!(is_graphql_response(&json!({"data": {"__typename": "Query"}})));
        assert!(is_graphql_response(&json!({"errors": [{"message": "x"}]})));
        assert!(!is_graphql_response(&json!({"hello": "world"})));
    }

    #[test]
    fn disabled_detection_is_case_insensitive() {
        assert!(errors_say_disabled(&json!({
            "errors": [{"message": "GraphQL Introspection is disabled on this server"}]
        })));
        assert!(errors_say_disabled(&json!({
            "errors": [{"message": "introspection disabled"}]
        })));
        assert!(!errors_say_disabled(&json!({"errors": [{"message": "syntax error"}]})));
    }

    fn sample_schema() -> Value {
        json!({
            "queryType": {"name": "Query"},
            "mutationType": {"name": "Mutation"},
            "types": [
                {"name": "Query", "kind": "OBJECT", "fields": [
                    {"name": "article", "args": [
                        {"name": "id", "type": {"kind": "NON_NULL", "ofType": {"kind": "SCALAR", "name": "ID"}}}
                    ], "type": {"kind": "OBJECT", "name": "Article"}},
                    {"name": "articles", "args": [
                        {"name": "first", "type": {"kind": "SCALAR", "name": "Int"}},
                        {"name": "after", "type": {"kind": "SCALAR", "name": "String"}}
                    ], "type": {"kind": "OBJECT", "name": "ArticleConnection"}}
                ]},
                {"name": "Article", "kind": "OBJECT", "fields": [
                    {"name": "id", "args": [], "type": {"kind": "SCALAR", "name": "ID"}},
                    {"name": "title", "args": [], "type": {"kind": "SCALAR", "name": "String"}},
                    {"name": "author", "args": [], "type": {"kind": "OBJECT", "name": "Author"}}
                ]},
                {"name": "ArticleConnection", "kind": "OBJECT", "fields": []},
                {"name": "Author", "kind": "OBJECT", "fields": [
                    {"name": "id", "args": [], "type": {"kind": "SCALAR", "name": "ID"}},
                    {"name": "name", "args": [], "type": {"kind": "SCALAR", "name": "String"}}
                ]},
                {"name": "__Schema", "kind": "OBJECT", "fields": []}
            ]
        })
    }

    #[test]
    fn schema_parse_filters_and_classifies() {
        let IntrospectionOutcome::Schema(schema) =
            parse_schema("https://x.io/graphql", &sample_schema())
        else {
            panic!("expected schema");
        };
        assert_eq!(schema.query_type_name, "Query");
        assert_eq!(schema.mutation_type_name.as_deref(), Some("Mutation"));
        // Introspection types filtered out.
        assert!(!schema.types.contains_key("__Schema"));
        // Relay: first/after plus a Connection type.
        assert_eq!(schema.pagination_pattern, PaginationPattern::Relay);
        // Entities: OBJECT types with an id, roots excluded.
        let mut entities = schema.entity_types.clone();
        entities.sort();
        assert_eq!(entities, vec!["Article", "Author"]);
    }

    #[test]
    fn offset_pagination() {
        let schema = json!({
            "queryType": {"name": "Query"},
            "types": [{"name": "Query", "kind": "OBJECT", "fields": [
                {"name": "items", "args": [
                    {"name": "limit", "type": {"kind": "SCALAR", "name": "Int"}},
                    {"name": "offset", "type": {"kind": "SCALAR", "name": "Int"}}
                ], "type": {"kind": "OBJECT", "name": "Item"}}
            ]}]
        });
        let IntrospectionOutcome::Schema(parsed) = parse_schema("e", &schema) else {
            panic!()
        };
        assert_eq!(parsed.pagination_pattern, PaginationPattern::Offset);
    }
}
