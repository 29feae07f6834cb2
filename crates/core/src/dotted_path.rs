//! Dotted-path lookup over parsed JSON: `a.b.c`, `a[0].b`, `items[2][0].id`.
//! Small by design; content mappings and validation fields never need more.

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
enum Step<'a> {
    Key(&'a str),
    Index(usize),
}

fn parse_path(path: &str) -> Option<Vec<Step<'_>>> {
    let mut steps = Vec::new();
    for segment in path.split('.') {
        if segment.is_empty() {
            return None;
        }
        let mut rest = segment;
        let key_end = rest.find('[').unwrap_or(rest.len());
        let key = &rest[..key_end];
        if !key.is_empty() {
            steps.push(Step::Key(key));
        }
        rest = &rest[key_end..];
        while let Some(stripped) = rest.strip_prefix('[') {
            let close = stripped.find(']')?;
            let idx: usize = stripped[..close].parse().ok()?;
            steps.push(Step::Index(idx));
            rest = &stripped[close + 1..];
        }
        if !rest.is_empty() {
            return None;
        }
    }
    Some(steps)
}

/// Resolve `path` against `value`. Returns None for missing keys, out-of-range
/// indices, or a malformed path.
pub fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let steps = parse_path(path)?;
    let mut current = value;
    for step in steps {
        current = match step {
            Step::Key(k) => current.as_object()?.get(k)?,
            Step::Index(i) => current.as_array()?.get(i)?,
        };
    }
    Some(current)
}

/// True when the path resolves to a value that is neither `null` nor absent.
pub fn exists(value: &Value, path: &str) -> bool {
    matches!(lookup(value, path), Some(v) if !v.is_null())
}

/// Resolve a path and render the leaf as a string. Objects and arrays are
/// rendered as compact JSON so content mappings can point at nested shapes.
pub fn lookup_string(value: &Value, path: &str) -> Option<String> {
    match lookup(value, path)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn plain_keys() {
        let v = json!({"a": {"b": {"c": 7}}});
        assert_eq!(lookup(&v, "a.b.c"), Some(&json!(7)));
        assert_eq!(lookup(&v, "a.b.missing"), None);
    }

    #[test]
    fn array_indices() {
        let v = json!({"items": [{"id": 1}, {"id": 2}]});
        assert_eq!(lookup(&v, "items[1].id"), Some(&json!(2)));
        assert_eq!(lookup(&v, "items[5].id"), None);
    }

    #[test]
    fn nested_indices() {
        let v = json!({"grid": [[1, 2], [3, 4]]});
        assert_eq!(lookup(&v, "grid[1][0]"), Some(&json!(3)));
    }

    #[test]
    fn null_is_absent() {
        let v = json!({"a": null, "b": 0});
        assert!(!exists(&v, "a"));
        assert!(exists(&v, "b"));
    }

    #[test]
    fn string_rendering() {
        let v = json!({"n": 42, "s": "hi", "o": {"k": 1}});
        assert_eq!(lookup_string(&v, "n").unwrap(), "42");
        assert_eq!(lookup_string(&v, "s").unwrap(), "hi");
        assert_eq!(lookup_string(&v, "o").unwrap(), "{\"k\":1}");
    }

    #[test]
    fn malformed_paths() {
        let v = json!({"a": 1});
        assert_eq!(lookup(&v, ""), None);
        assert_eq!(lookup(&v, "a[x]"), None);
        assert_eq!(lookup(&v, "a..b"), None);
    }
}
