//! Query-pattern generation from an introspected GraphQL schema.

use serde::{Deserialize, Serialize};

use crate::graphql::{GraphQlType, ParsedGraphQlSchema, TypeRef};

const MAX_SELECTION_DEPTH: usize = 3;
const GENERATED_CONFIDENCE: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Query,
    Mutation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlArgSpec {
    pub name: String,
    /// Rendered GraphQL type, e.g. `ID!`, `[String]`.
    pub type_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlQueryPattern {
    pub operation_type: OperationType,
    pub query_name: String,
    pub required_args: Vec<GraphQlArgSpec>,
    pub optional_args: Vec<GraphQlArgSpec>,
    /// Ready-to-send operation with `$var` placeholders.
    pub query_template: String,
    pub default_field_selection: Vec<String>,
    pub confidence: f64,
}

/// One pattern per root field whose base return type is an OBJECT the schema
/// actually defines. Scalar-returning fields have nothing to select.
pub fn query_patterns_from_schema(schema: &ParsedGraphQlSchema) -> Vec<GraphQlQueryPattern> {
    let mut patterns = Vec::new();

    let roots = [
        (OperationType::Query, Some(schema.query_type_name.as_str())),
        (OperationType::Mutation, schema.mutation_type_name.as_deref()),
    ];
    for (operation_type, root_name) in roots {
        let Some(root) = root_name.and_then(|n| schema.types.get(n)) else {
            continue;
        };
        for field in &root.fields {
            let Some(base) = field.type_ref.base_type_name() else { continue };
            let Some(return_type) = schema.types.get(base) else { continue };
            if return_type.kind != "OBJECT" {
                continue;
            }

            let (required_args, optional_args): (Vec<_>, Vec<_>) = field
                .args
                .iter()
                .map(|a| {
                    (
                        a.type_ref.is_non_null(),
                        GraphQlArgSpec { name: a.name.clone(), type_name: a.type_ref.render() },
                    )
                })
                .partition(|(required, _)| *required);
            let required_args: Vec<_> = required_args.into_iter().map(|(_, a)| a).collect();
            let optional_args: Vec<_> = optional_args.into_iter().map(|(_, a)| a).collect();

            let selection = build_selection(return_type, schema, 1);
            if selection.is_empty() {
                continue;
            }
            let query_template =
                render_template(operation_type, &field.name, &required_args, &selection);

            patterns.push(GraphQlQueryPattern {
                operation_type,
                query_name: field.name.clone(),
                required_args,
                optional_args,
                query_template,
                default_field_selection: selection,
                confidence: GENERATED_CONFIDENCE,
            });
        }
    }
    patterns
}

/// Selection set up to three levels deep: scalars first; nested OBJECT fields
/// recurse until the depth budget, then contribute only `id`. `__typename`
/// never appears.
fn build_selection(t: &GraphQlType, schema: &ParsedGraphQlSchema, depth: usize) -> Vec<String> {
    let mut scalars = Vec::new();
    let mut objects = Vec::new();

    for field in &t.fields {
        if field.name == "__typename" || !field.args.is_empty() {
            continue;
        }
        let Some(base) = field.type_ref.base_type_name() else { continue };
        match schema.types.get(base) {
            Some(inner) if inner.kind == "OBJECT" => {
                if depth < MAX_SELECTION_DEPTH {
                    let nested = build_selection(inner, schema, depth + 1);
                    if !nested.is_empty() {
                        objects.push(format!("{} {{ {} }}", field.name, nested.join(" ")));
                    }
                } else if inner.fields.iter().any(|f| f.name == "id") {
                    objects.push(format!("{} {{ id }}", field.name));
                }
            }
            Some(inner) if inner.kind == "ENUM" => scalars.push(field.name.clone()),
            Some(_) => {}
            // Built-in scalars (ID, String, Int, ...) are absent from the
            // filtered type map.
            None => scalars.push(field.name.clone()),
        }
    }
    scalars.extend(objects);
    scalars
}

fn render_template(
    operation_type: OperationType,
    field_name: &str,
    required_args: &[GraphQlArgSpec],
    selection: &[String],
) -> String {
    let op_keyword = match operation_type {
        OperationType::Query => "query",
        OperationType::Mutation => "mutation",
    };
    let op_name = {
        let mut chars = field_name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    };

    if required_args.is_empty() {
        return format!(
            "{} {} {{ {} {{ {} }} }}",
            op_keyword,
            op_name,
            field_name,
            selection.join(" ")
        );
    }
    let var_defs = required_args
        .iter()
        .map(|a| format!("${}: {}", a.name, a.type_name))
        .collect::<Vec<_>>()
        .join(", ");
    let arg_list = required_args
        .iter()
        .map(|a| format!("{}: ${}", a.name, a.name))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "{} {}({}) {{ {}({}) {{ {} }} }}",
        op_keyword,
        op_name,
        var_defs,
        field_name,
        arg_list,
        selection.join(" ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphql::{parse_schema, IntrospectionOutcome};
    use serde_json::json;

    fn schema() -> ParsedGraphQlSchema {
        let raw = json!({
            "queryType": {"name": "Query"},
            "types": [
                {"name": "Query", "kind": "OBJECT", "fields": [
                    {"name": "article", "args": [
                        {"name": "id", "type": {"kind": "NON_NULL", "ofType": {"kind": "SCALAR", "name": "ID"}}},
                        {"name": "draft", "type": {"kind": "SCALAR", "name": "Boolean"}}
                    ], "type": {"kind": "OBJECT", "name": "Article"}},
                    {"name": "version", "args": [], "type": {"kind": "SCALAR", "name": "String"}}
                ]},
                {"name": "Article", "kind": "OBJECT", "fields": [
                    {"name": "id", "args": [], "type": {"kind": "SCALAR", "name": "ID"}},
                    {"name": "title", "args": [], "type": {"kind": "SCALAR", "name": "String"}},
                    {"name": "author", "args": [], "type": {"kind": "OBJECT", "name": "Author"}}
                ]},
                {"name": "Author", "kind": "OBJECT", "fields": [
                    {"name": "id", "args": [], "type": {"kind": "SCALAR", "name": "ID"}},
                    {"name": "profile", "args": [], "type": {"kind": "OBJECT", "name": "Profile"}}
                ]},
                {"name": "Profile", "kind": "OBJECT", "fields": [
                    {"name": "id", "args": [], "type": {"kind": "SCALAR", "name": "ID"}},
                    {"name": "links", "args": [], "type": {"kind": "OBJECT", "name": "Links"}}
                ]},
                {"name": "Links", "kind": "OBJECT", "fields": [
                    {"name": "id", "args": [], "type": {"kind": "SCALAR", "name": "ID"}},
                    {"name": "home", "args": [], "type": {"kind": "SCALAR", "name": "String"}}
                ]}
            ]
        });
        match parse_schema("https://x.io/graphql", &raw) {
            IntrospectionOutcome::Schema(s) => s,
            _ => panic!("expected schema"),
        }
    }

    #[test]
    fn scalar_returning_fields_skipped() {
        let patterns = query_patterns_from_schema(&schema());
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].query_name, "article");
    }

    #[test]
    fn args_partition_by_nullability() {
        let patterns = query_patterns_from_schema(&schema());
        let p = &patterns[0];
        assert_eq!(p.required_args.len(), 1);
        assert_eq!(p.required_args[0].name, "id");
        assert_eq!(p.required_args[0].type_name, "ID!");
        assert_eq!(p.optional_args.len(), 1);
        assert_eq!(p.optional_args[0].name, "draft");
    }

    #[test]
    fn template_shape() {
        let patterns = query_patterns_from_schema(&schema());
        let template = &patterns[0].query_template;
        assert!(template.starts_with("query Article($id: ID!)"));
        assert!(template.contains("article(id: $id)"));
        assert!(!template.contains("__typename"));
    }

    #[test]
    fn selection_depth_capped_with_id_terminals() {
        let patterns = query_patterns_from_schema(&schema());
        let selection = patterns[0].default_field_selection.join(" ");
        // Scalars first, then nested objects; Links is at depth 4 and
        // collapses to id.
        assert!(selection.starts_with("id title"));
        assert!(selection.contains("author { id profile { id links { id } } }"));
        assert!(!selection.contains("home"));
        assert!((patterns[0].confidence - 0.95).abs() < 1e-9);
    }
}
