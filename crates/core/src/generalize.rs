//! URL generalization: turn a concrete URL into a replayable template by
//! substituting identifier-like path segments with typed placeholders.
//!
//! Precedence is explicit and ordered: hyphenated UUID, then Mongo ObjectId
//! (exactly 24 hex), then long alphanumeric (>= 20), then numeric id. A
//! segment matches at most one rule, so an ObjectId whose leading characters
//! are digits is never partially rewritten by the numeric rule.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use url::Url;

static UUID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .unwrap()
});
static OBJECT_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").unwrap());
static LONG_TOKEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]{20,}$").unwrap());
static NUMERIC_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaceholderKind {
    Uuid,
    ObjectId,
    Token,
    NumericId,
}

impl PlaceholderKind {
    /// Regex fragment matching values of this kind inside a URL pattern.
    pub fn pattern(&self) -> &'static str {
        match self {
            Self::Uuid => "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
            Self::ObjectId => "[0-9a-fA-F]{24}",
            Self::Token => "[A-Za-z0-9]{20,}",
            Self::NumericId => "[0-9]+",
        }
    }

    fn base_name(&self) -> &'static str {
        match self {
            Self::Uuid => "uuid",
            Self::ObjectId => "objectId",
            Self::Token => "token",
            Self::NumericId => "id",
        }
    }
}

/// One substituted segment of a generalized URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Placeholder {
    /// Name used inside the template, e.g. `id`, `id2`, `uuid`.
    pub name: String,
    pub kind: PlaceholderKind,
    /// Zero-based index into the path segments of the original URL.
    pub segment_index: usize,
    /// The concrete value observed when the template was learned.
    pub observed: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralizedUrl {
    /// Scheme + host + generalized path, query dropped.
    pub template: String,
    pub placeholders: Vec<Placeholder>,
}

fn classify(segment: &str) -> Option<PlaceholderKind> {
    if UUID_RE.is_match(segment) {
        Some(PlaceholderKind::Uuid)
    } else if OBJECT_ID_RE.is_match(segment) {
        Some(PlaceholderKind::ObjectId)
    } else if LONG_TOKEN_RE.is_match(segment) {
        Some(PlaceholderKind::Token)
    } else if NUMERIC_RE.is_match(segment) {
        Some(PlaceholderKind::NumericId)
    } else {
        None
    }
}

/// Generalize a URL. Idempotent: placeholders contain `{}` braces, which no
/// rule matches, so a second pass is the identity.
pub fn generalize_url(url: &Url) -> GeneralizedUrl {
    let mut placeholders: Vec<Placeholder> = Vec::new();
    let mut out_segments: Vec<String> = Vec::new();

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.collect())
        .unwrap_or_default();

    for (i, segment) in segments.iter().enumerate() {
        match classify(segment) {
            Some(kind) => {
                let prior = placeholders.iter().filter(|p| p.kind == kind).count();
                let name = if prior == 0 {
                    kind.base_name().to_string()
                } else {
                    format!("{}{}", kind.base_name(), prior + 1)
                };
                out_segments.push(format!("{{{}}}", name));
                placeholders.push(Placeholder {
                    name,
                    kind,
                    segment_index: i,
                    observed: segment.to_string(),
                });
            }
            None => out_segments.push(segment.to_string()),
        }
    }

    let origin = format!(
        "{}://{}{}",
        url.scheme(),
        url.host_str().unwrap_or(""),
        url.port()
            .map(|p| format!(":{}", p))
            .unwrap_or_default()
    );
    let path = if out_segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", out_segments.join("/"))
    };

    GeneralizedUrl {
        template: format!("{}{}", origin, path),
        placeholders,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gen(u: &str) -> GeneralizedUrl {
        generalize_url(&Url::parse(u).unwrap())
    }

    #[test]
    fn numeric_ids() {
        let g = gen("https://api.example.com/users/123/posts/456");
        assert_eq!(g.template, "https://api.example.com/users/{id}/posts/{id2}");
        assert_eq!(g.placeholders.len(), 2);
        assert_eq!(g.placeholders[0].observed, "123");
    }

    #[test]
    fn uuid_beats_token() {
        let g = gen("https://x.io/items/550e8400-e29b-41d4-a716-446655440000");
        assert_eq!(g.template, "https://x.io/items/{uuid}");
        assert_eq!(g.placeholders[0].kind, PlaceholderKind::Uuid);
    }

    #[test]
    fn object_id_with_numeric_prefix_is_whole() {
        // 24 hex chars starting with digits must not fall to the numeric rule.
        let g = gen("https://x.io/docs/507f1f77bcf86cd799439011");
        assert_eq!(g.template, "https://x.io/docs/{objectId}");
        assert_eq!(g.placeholders[0].kind, PlaceholderKind::ObjectId);
    }

    #[test]
    fn long_alphanumeric() {
        let g = gen("https://x.io/t/AbC123xyzAbC123xyzAbC1");
        assert_eq!(g.template, "https://x.io/t/{token}");
    }

    #[test]
    fn plain_slugs_untouched() {
        let g = gen("https://x.io/blog/hello-world");
        assert_eq!(g.template, "https://x.io/blog/hello-world");
        assert!(g.placeholders.is_empty());
    }

    #[test]
    fn idempotent() {
        let once = gen("https://x.io/users/42");
        let twice = generalize_url(&Url::parse(&once.template).unwrap());
        assert_eq!(once.template, twice.template);
        assert!(twice.placeholders.is_empty());
    }

    #[test]
    fn query_dropped_port_kept() {
        let g = gen("https://x.io:8443/users/7?tab=posts");
        assert_eq!(g.template, "https://x.io:8443/users/{id}");
    }
}
