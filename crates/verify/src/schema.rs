//! JSON Schema (draft-07 subset) evaluation. Covers the keywords extracted
//! content actually uses: type, required, properties, items, enum, string
//! and numeric bounds, pattern. Failures accumulate with instance path and
//! the violated keyword.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SchemaError {
    /// Instance path, e.g. `items[2].name`; empty string is the root.
    pub path: String,
    pub keyword: String,
    pub message: String,
}

pub fn validate(schema: &Value, instance: &Value) -> Vec<SchemaError> {
    let mut errors = Vec::new();
    walk(schema, instance, "", &mut errors);
    errors
}

fn push(errors: &mut Vec<SchemaError>, path: &str, keyword: &str, message: String) {
    errors.push(SchemaError {
        path: path.to_string(),
        keyword: keyword.to_string(),
        message,
    });
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        // Integers satisfy "number".
        "number" => value.is_number(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        other => type_name(value) == other,
    }
}

fn join(path: &str, segment: &str) -> String {
    if path.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", path, segment)
    }
}

fn walk(schema: &Value, instance: &Value, path: &str, errors: &mut Vec<SchemaError>) {
    let Some(schema_obj) = schema.as_object() else {
        return;
    };

    if let Some(expected) = schema_obj.get("type") {
        let allowed: Vec<&str> = match expected {
            Value::String(s) => vec![s.as_str()],
            Value::Array(options) => options.iter().filter_map(|v| v.as_str()).collect(),
            _ => vec![],
        };
        if !allowed.is_empty() && !allowed.iter().any(|t| type_matches(t, instance)) {
            push(
                errors,
                path,
                "type",
                format!("expected {}, got {}", allowed.join(" or "), type_name(instance)),
            );
            // Further keyword checks would only cascade.
            return;
        }
    }

    if let Some(options) = schema_obj.get("enum").and_then(|e| e.as_array()) {
        if !options.contains(instance) {
            push(errors, path, "enum", "value not in enum".to_string());
        }
    }

    match instance {
        Value::Object(map) => {
            if let Some(required) = schema_obj.get("required").and_then(|r| r.as_array()) {
                for field in required.iter().filter_map(|f| f.as_str()) {
                    if !map.contains_key(field) || map[field].is_null() {
                        push(
                            errors,
                            &join(path, field),
                            "required",
                            format!("missing required field `{}`", field),
                        );
                    }
                }
            }
            if let Some(properties) = schema_obj.get("properties").and_then(|p| p.as_object()) {
                for (name, subschema) in properties {
                    if let Some(child) = map.get(name) {
                        if !child.is_null() {
                            walk(subschema, child, &join(path, name), errors);
                        }
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema_obj.get("items") {
                for (i, child) in items.iter().enumerate() {
                    let child_path = if path.is_empty() {
                        format!("[{}]", i)
                    } else {
                        format!("{}[{}]", path, i)
                    };
                    walk(item_schema, child, &child_path, errors);
                }
            }
        }
        Value::String(s) => {
            if let Some(min) = schema_obj.get("minLength").and_then(|v| v.as_u64()) {
                if (s.chars().count() as u64) < min {
                    push(errors, path, "minLength", format!("shorter than {}", min));
                }
            }
            if let Some(max) = schema_obj.get("maxLength").and_then(|v| v.as_u64()) {
                if (s.chars().count() as u64) > max {
                    push(errors, path, "maxLength", format!("longer than {}", max));
                }
            }
            if let Some(pattern) = schema_obj.get("pattern").and_then(|v| v.as_str()) {
                if let Ok(re) = Regex::new(pattern) {
                    if !re.is_match(s) {
                        push(errors, path, "pattern", format!("does not match `{}`", pattern));
                    }
                }
            }
        }
        Value::Number(n) => {
            let value = n.as_f64().unwrap_or(0.0);
            if let Some(min) = schema_obj.get("minimum").and_then(|v| v.as_f64()) {
                if value < min {
                    push(errors, path, "minimum", format!("below minimum {}", min));
                }
            }
            if let Some(max) = schema_obj.get("maximum").and_then(|v| v.as_f64()) {
                if value > max {
                    push(errors, path, "maximum", format!("above maximum {}", max));
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_and_types() {
        let schema = json!({
            "type": "object",
            "required": ["id", "name"],
            "properties": {
                "id": {"type": "integer"},
                "name": {"type": "string", "minLength": 2}
            }
        });
        let errors = validate(&schema, &json!({"id": "not-a-number", "name": "x"}));
        let keywords: Vec<&str> = errors.iter().map(|e| e.keyword.as_str()).collect();
        assert!(keywords.contains(&"type"));
        assert!(keywords.contains(&"minLength"));
        // `name` present, `id` wrong type, nothing missing.
        assert!(!keywords.contains(&"required"));

        let errors = validate(&schema, &json!({"id": 1}));
        assert_eq!(errors[0].keyword, "required");
        assert_eq!(errors[0].path, "name");
    }

    #[test]
    fn array_items_carry_index_paths() {
        let schema = json!({
            "type": "array",
            "items": {"type": "object", "required": ["id"], "properties": {}}
        });
        let errors = validate(&schema, &json!([{"id": 1}, {}]));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "[1].id");
    }

    #[test]
    fn numeric_bounds_and_enum() {
        let schema = json!({
            "type": "object",
            "properties": {
                "score": {"type": "number", "minimum": 0, "maximum": 10},
                "status": {"enum": ["open", "closed"]}
            }
        });
        let errors = validate(&schema, &json!({"score": 11, "status": "pending"}));
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].keyword, "maximum");
        assert_eq!(errors[1].keyword, "enum");
    }

    #[test]
    fn integer_satisfies_number() {
        let schema = json!({"type": "number"});
        assert!(validate(&schema, &json!(3)).is_empty());
        let schema = json!({"type": "integer"});
        assert!(!validate(&schema, &json!(3.5)).is_empty());
    }

    #[test]
    fn valid_instance_is_clean() {
        let schema = json!({
            "type": "object",
            "required": ["name"],
            "properties": {"name": {"type": "string", "pattern": "^[A-Z]"}}
        });
        assert!(validate(&schema, &json!({"name": "Alice"})).is_empty());
    }
}
