//! `$ref` resolution over a parsed spec tree. Single pass; every local ref
//! is replaced in place with a deep clone of its target. A visited set per
//! path breaks cycles: circular refs are logged and left as-is, which also
//! makes resolution idempotent on an already-resolved tree.

use serde_json::Value;
use tracing::debug;

/// Resolve every `#/...` reference in `tree` against the tree itself.
/// Returns the circular ref strings that were left in place.
pub fn resolve_refs(tree: &mut Value) -> Vec<String> {
    let root = tree.clone();
    let mut circular = Vec::new();
    let mut visiting = Vec::new();
    walk(tree, &root, &mut visiting, &mut circular);
    circular.sort();
    circular.dedup();
    circular
}

fn walk(node: &mut Value, root: &Value, visiting: &mut Vec<String>, circular: &mut Vec<String>) {
    // A `{"$ref": "#/..."}` node is substituted wholesale.
    let ref_target = node
        .as_object()
        .and_then(|o| o.get("$ref"))
        .and_then(|r| r.as_str())
        .filter(|r| r.starts_with("#/"))
        .map(str::to_string);

    if let Some(ref_str) = ref_target {
        if visiting.iter().any(|v| v == &ref_str) {
            debug!(reference = %ref_str, "circular $ref left unresolved");
            circular.push(ref_str);
            return;
        }
        match resolve_pointer(root, &ref_str) {
            Some(target) => {
                let mut replacement = target.clone();
                visiting.push(ref_str);
                walk(&mut replacement, root, visiting, circular);
                visiting.pop();
                *node = replacement;
            }
            None => {
                debug!(reference = %ref_str, "dangling $ref left unresolved");
            }
        }
        return;
    }

    match node {
        Value::Object(map) => {
            for (_, child) in map.iter_mut() {
                walk(child, root, visiting, circular);
            }
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                walk(child, root, visiting, circular);
            }
        }
        _ => {}
    }
}

/// JSON-pointer lookup for `#/a/b/c`, with `~0`/`~1` unescaping.
fn resolve_pointer<'a>(root: &'a Value, reference: &str) -> Option<&'a Value> {
    let mut current = root;
    for raw in reference.trim_start_matches("#/").split('/') {
        let token = raw.replace("~1", "/").replace("~0", "~");
        current = match current {
            Value::Object(map) => map.get(&token)?,
            Value::Array(items) => items.get(token.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn simple_ref_inlined() {
        let mut tree = json!({
            "definitions": {"Pet": {"type": "object"}},
            "schema": {"$ref": "#/definitions/Pet"}
        });
        let circular = resolve_refs(&mut tree);
        assert!(circular.is_empty());
        assert_eq!(tree["schema"]["type"], "object");
    }

    #[test]
    fn nested_refs_resolve_transitively() {
        let mut tree = json!({
            "a": {"$ref": "#/b"},
            "b": {"inner": {"$ref": "#/c"}},
            "c": 42
        });
        resolve_refs(&mut tree);
        assert_eq!(tree["a"]["inner"], 42);
    }

    #[test]
    fn cycles_are_kept_and_reported() {
        let mut tree = json!({
            "Node": {
                "type": "object",
                "properties": {"next": {"$ref": "#/Node"}}
            },
            "root": {"$ref": "#/Node"}
        });
        let circular = resolve_refs(&mut tree);
        assert_eq!(circular, vec!["#/Node".to_string()]);
        // The inner self-reference survives as a literal $ref.
        assert_eq!(tree["root"]["properties"]["next"]["$ref"], "#/Node");
    }

    #[test]
    fn idempotent_on_resolved_tree() {
        let mut tree = json!({
            "definitions": {"Pet": {"type": "object"}},
            "schema": {"$ref": "#/definitions/Pet"}
        });
        resolve_refs(&mut tree);
        let once = tree.clone();
        resolve_refs(&mut tree);
        assert_eq!(tree, once);
    }

    #[test]
    fn escaped_pointer_tokens() {
        let mut tree = json!({
            "paths": {"/users~1{id}": {"get": {"x": 1}}},
            "ref": {"$ref": "#/paths/~1users~01{id}"}
        });
        // `~1` encodes `/`, `~0` encodes `~` — the literal key here is
        // "/users~1{id}", pointer-escaped as "~1users~01{id}".
        resolve_refs(&mut tree);
        assert_eq!(tree["ref"]["get"]["x"], 1);
    }
}
