pub mod config;
pub mod dotted_path;
pub mod domain;
pub mod error;
pub mod generalize;
pub mod types;

pub use config::AppConfig;
pub use error::{ExtractError, FailureCategory};
pub use types::*;

/// Current time as epoch milliseconds. All persisted timestamps use this form.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Fractional days between two epoch-millisecond timestamps.
pub fn days_between(earlier_ms: i64, later_ms: i64) -> f64 {
    (later_ms - earlier_ms) as f64 / 86_400_000.0
}
