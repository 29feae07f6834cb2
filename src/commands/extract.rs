use anyhow::Result;

use siphon_core::AppConfig;
use siphon_engine::{ExtractOptions, Siphon};

#[allow(clippy::too_many_arguments)]
pub async fn run(
    config: AppConfig,
    url: String,
    force_strategy: Option<String>,
    skip: Vec<String>,
    no_browser: bool,
    min_content_length: Option<usize>,
    max_latency_ms: Option<u64>,
    json: bool,
) -> Result<()> {
    let min_content_length =
        min_content_length.unwrap_or(config.general.min_content_length);
    let timeout_ms = config.general.request_timeout_ms;

    let siphon = Siphon::from_config(config).await?;
    let opts = ExtractOptions {
        timeout_ms,
        min_content_length,
        force_strategy,
        skip_strategies: skip,
        allow_browser: !no_browser,
        max_latency_ms,
        ..Default::default()
    };

    let result = siphon.extract(&url, opts).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        if !result.content.title.is_empty() {
            println!("# {}\n", result.content.title);
        }
        println!("{}", result.content.markdown);
        eprintln!(
            "\n[{} | {:?} | {}ms | attempted: {}]",
            result.meta.strategy,
            result.meta.confidence,
            result.meta.timing_ms,
            result.meta.strategies_attempted.join(" → ")
        );
        if let Some(error) = &result.error {
            eprintln!("error: {}", error);
        }
        for warning in &result.warnings {
            eprintln!("warning: {}", warning);
        }
    }

    siphon.shutdown().await?;
    Ok(())
}
