use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timeout after {0}ms")]
    Timeout(u64),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error("discovery cooldown for {domain} until {until_ms}")]
    Cooldown { domain: String, until_ms: i64 },

    #[error("body too large: {size} bytes (max {max})")]
    BodyTooLarge { size: usize, max: usize },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Failure vocabulary used by the registry, anti-patterns, traces, and the
/// orchestrator. Every recorded failure carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    RateLimited,
    AuthRequired,
    WrongEndpoint,
    ServerError,
    Timeout,
    ParseError,
    Empty,
    SchemaMismatch,
    Blocked,
    Cancelled,
    Unknown,
}

impl FailureCategory {
    /// Classify an HTTP error status. 2xx never reaches this.
    pub fn from_status(status: u16) -> Self {
        match status {
            429 => Self::RateLimited,
            401 | 403 => Self::AuthRequired,
            404 | 410 => Self::WrongEndpoint,
            500..=599 => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    pub fn from_error(err: &ExtractError) -> Self {
        match err {
            ExtractError::Timeout(_) => Self::Timeout,
            ExtractError::Parse(_) => Self::ParseError,
            ExtractError::Cancelled => Self::Cancelled,
            ExtractError::Status { status, .. } => Self::from_status(*status),
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::AuthRequired => "auth_required",
            Self::WrongEndpoint => "wrong_endpoint",
            Self::ServerError => "server_error",
            Self::Timeout => "timeout",
            Self::ParseError => "parse_error",
            Self::Empty => "empty",
            Self::SchemaMismatch => "schema_mismatch",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(FailureCategory::from_status(429), FailureCategory::RateLimited);
        assert_eq!(FailureCategory::from_status(401), FailureCategory::AuthRequired);
        assert_eq!(FailureCategory::from_status(403), FailureCategory::AuthRequired);
        assert_eq!(FailureCategory::from_status(404), FailureCategory::WrongEndpoint);
        assert_eq!(FailureCategory::from_status(410), FailureCategory::WrongEndpoint);
        assert_eq!(FailureCategory::from_status(503), FailureCategory::ServerError);
        assert_eq!(FailureCategory::from_status(418), FailureCategory::Unknown);
    }

    #[test]
    fn category_roundtrips_snake_case() {
        let json = serde_json::to_string(&FailureCategory::SchemaMismatch).unwrap();
        assert_eq!(json, "\"schema_mismatch\"");
        let back: FailureCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, FailureCategory::SchemaMismatch);
    }
}
