//! Verification engine: score a candidate result against structural,
//! content, custom, and schema checks. Confidence aggregates by severity
//! weight; a result passes iff no error-or-critical check failed.

pub mod schema;

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use siphon_core::{dotted_path, ContentResult};

pub use schema::SchemaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// Confidence weight: warning 1, error 2, critical 4.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Warning => 1.0,
            Self::Error => 2.0,
            Self::Critical => 4.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckType {
    Content,
    Action,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Basic,
    #[default]
    Standard,
    Thorough,
}

type CustomPredicate = Arc<dyn Fn(&ContentResult) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum Assertion {
    FieldExists { path: String },
    FieldNotEmpty { path: String },
    FieldMatches { path: String, pattern: String },
    MinLength(usize),
    MaxLength(usize),
    ContainsText(String),
    ExcludesText(String),
    StatusCode(u16),
    Custom { description: String, predicate: CustomPredicate },
}

impl fmt::Debug for Assertion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FieldExists { path } => write!(f, "fieldExists({})", path),
            Self::FieldNotEmpty { path } => write!(f, "fieldNotEmpty({})", path),
            Self::FieldMatches { path, pattern } => write!(f, "fieldMatches({} ~ {})", path, pattern),
            Self::MinLength(n) => write!(f, "minLength({})", n),
            Self::MaxLength(n) => write!(f, "maxLength({})", n),
            Self::ContainsText(s) => write!(f, "containsText({})", s),
            Self::ExcludesText(s) => write!(f, "excludesText({})", s),
            Self::StatusCode(n) => write!(f, "statusCode({})", n),
            Self::Custom { description, .. } => write!(f, "custom({})", description),
        }
    }
}

impl Assertion {
    pub fn check_type(&self) -> CheckType {
        match self {
            Self::StatusCode(_) => CheckType::Action,
            Self::Custom { .. } => CheckType::Custom,
            _ => CheckType::Content,
        }
    }

    /// Which run mode first includes this assertion. Structural field and
    /// action checks are `basic`; content assertions are `standard`;
    /// custom predicates are `thorough`.
    fn minimum_mode(&self) -> RunMode {
        match self {
            Self::FieldExists { .. } | Self::FieldNotEmpty { .. } | Self::StatusCode(_) => {
                RunMode::Basic
            }
            Self::Custom { .. } => RunMode::Thorough,
            _ => RunMode::Standard,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VerificationCheck {
    pub assertion: Assertion,
    pub severity: Severity,
    pub retryable: bool,
}

impl VerificationCheck {
    pub fn new(assertion: Assertion, severity: Severity) -> Self {
        Self { assertion, severity, retryable: false }
    }

    pub fn retryable(mut self) -> Self {
        self.retryable = true;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    pub mode: RunMode,
    pub validate_schema: bool,
    pub schema: Option<Value>,
    pub checks: Vec<VerificationCheck>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub description: String,
    pub check_type: CheckType,
    pub severity: Severity,
    pub passed: bool,
    pub retryable: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerificationResult {
    pub passed: bool,
    pub checks: Vec<CheckOutcome>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub schema_errors: Vec<SchemaError>,
}

impl VerificationResult {
    /// Any failed check flagged retryable signals the orchestrator's
    /// once-per-request chain restart.
    pub fn retry_signal(&self) -> bool {
        self.checks.iter().any(|c| !c.passed && c.retryable)
    }
}

fn mode_includes(mode: RunMode, minimum: RunMode) -> bool {
    let rank = |m: RunMode| match m {
        RunMode::Basic => 0,
        RunMode::Standard => 1,
        RunMode::Thorough => 2,
    };
    rank(mode) >= rank(minimum)
}

/// Built-in checks every run starts from.
fn builtin_checks() -> Vec<VerificationCheck> {
    vec![
        VerificationCheck::new(
            Assertion::FieldNotEmpty { path: "content.text".into() },
            Severity::Error,
        ),
        VerificationCheck::new(
            Assertion::FieldNotEmpty { path: "content.title".into() },
            Severity::Warning,
        ),
    ]
}

pub fn verify(
    result: &ContentResult,
    status_code: Option<u16>,
    opts: &VerifyOptions,
) -> VerificationResult {
    let as_value = serde_json::to_value(result).unwrap_or(Value::Null);
    let mut checks = builtin_checks();
    checks.extend(opts.checks.iter().cloned());

    let mut outcomes = Vec::new();
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    let mut weighted_pass = 0.0;
    let mut weight_total = 0.0;

    for check in &checks {
        if !mode_includes(opts.mode, check.assertion.minimum_mode()) {
            continue;
        }
        let passed = evaluate(&check.assertion, result, &as_value, status_code);
        let description = format!("{:?}", check.assertion);
        weight_total += check.severity.weight();
        if passed {
            weighted_pass += check.severity.weight();
        } else {
            match check.severity {
                Severity::Warning => warnings.push(format!("check failed: {}", description)),
                _ => errors.push(format!("check failed: {}", description)),
            }
        }
        outcomes.push(CheckOutcome {
            description,
            check_type: check.assertion.check_type(),
            severity: check.severity,
            passed,
            retryable: check.retryable,
        });
    }

    // Schema validation joins in thorough mode (or when forced on).
    let mut schema_errors = Vec::new();
    if (opts.validate_schema || opts.mode == RunMode::Thorough) && opts.schema.is_some() {
        let schema = opts.schema.as_ref().unwrap();
        let instance = result
            .content
            .structured
            .clone()
            .unwrap_or_else(|| as_value["content"].clone());
        schema_errors = schema::validate(schema, &instance);
        let passed = schema_errors.is_empty();
        weight_total += Severity::Error.weight();
        if passed {
            weighted_pass += Severity::Error.weight();
        } else {
            errors.push(format!("schema validation failed with {} errors", schema_errors.len()));
        }
        outcomes.push(CheckOutcome {
            description: "schema".to_string(),
            check_type: CheckType::Content,
            severity: Severity::Error,
            passed,
            retryable: false,
        });
    }

    let passed = outcomes
        .iter()
        .all(|c| c.passed || c.severity == Severity::Warning);
    let confidence = if weight_total == 0.0 { 1.0 } else { weighted_pass / weight_total };

    debug!(passed, confidence, checks = outcomes.len(), "verification complete");

    VerificationResult { passed, checks: outcomes, errors, warnings, confidence, schema_errors }
}

fn evaluate(
    assertion: &Assertion,
    result: &ContentResult,
    as_value: &Value,
    status_code: Option<u16>,
) -> bool {
    match assertion {
        Assertion::FieldExists { path } => dotted_path::exists(as_value, path),
        Assertion::FieldNotEmpty { path } => dotted_path::lookup_string(as_value, path)
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false),
        Assertion::FieldMatches { path, pattern } => {
            let Some(value) = dotted_path::lookup_string(as_value, path) else {
                return false;
            };
            Regex::new(pattern).map(|re| re.is_match(&value)).unwrap_or(false)
        }
        Assertion::MinLength(n) => result.content.text.len() >= *n,
        Assertion::MaxLength(n) => result.content.text.len() <= *n,
        Assertion::ContainsText(s) => result.content.text.contains(s.as_str()),
        Assertion::ExcludesText(s) => !result.content.text.contains(s.as_str()),
        Assertion::StatusCode(expected) => status_code == Some(*expected),
        Assertion::Custom { predicate, .. } => predicate(result),
    }
}
