pub mod apply;
pub mod extract;
pub mod learn;
pub mod model;
pub mod registry;

pub use apply::{apply_pattern, AppliedPattern, ApplyFailure};
pub use model::{
    AntiPattern, ContentMapping, FailureRecord, LearnedPattern, PatternMetrics,
    PatternValidation, RecommendedAction, TemplateType, Transform, VariableExtractor,
    VariableSource,
};
pub use registry::{MatchResult, PatternMatch, PatternRegistry, MIN_PATTERN_CONFIDENCE};

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    use crate::model::*;

    pub fn pattern_with_mapping(title: &str, body: Option<&str>) -> LearnedPattern {
        LearnedPattern {
            id: pattern_id("test", "example.com", "https://api.example.com/items/{id}"),
            template_type: TemplateType::RestResource,
            url_patterns: vec![r"^https?://example\.com/items/[0-9]+$".to_string()],
            endpoint_template: "https://api.example.com/items/{id}".to_string(),
            extractors: vec![VariableExtractor {
                name: "id".into(),
                source: VariableSource::Path,
                pattern: r"/items/([0-9]+)".into(),
                group: 1,
                transform: Transform::None,
                header_name: None,
            }],
            method: siphon_core::HttpMethod::Get,
            headers: HashMap::new(),
            response_format: siphon_core::ResponseFormat::Json,
            content_mapping: ContentMapping {
                title: title.to_string(),
                description: None,
                body: body.map(str::to_string),
            },
            validation: PatternValidation { required_fields: vec![], min_content_length: 0 },
            metrics: PatternMetrics::seed(1, 0.5),
            created_at: siphon_core::now_ms(),
            updated_at: siphon_core::now_ms(),
        }
    }
}
