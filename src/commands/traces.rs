use anyhow::Result;

use siphon_core::AppConfig;
use siphon_engine::Siphon;
use siphon_trace::TraceQuery;

pub async fn run(
    config: AppConfig,
    domain: Option<String>,
    failures: bool,
    limit: usize,
) -> Result<()> {
    let siphon = Siphon::from_config(config).await?;
    let query = TraceQuery {
        domain,
        success: failures.then_some(false),
        limit,
        ..Default::default()
    };
    let traces = siphon.engine().traces.query(&query);

    if traces.is_empty() {
        println!("no traces recorded (traces live in memory for the engine's lifetime)");
        return Ok(());
    }
    for trace in traces {
        println!(
            "{} {} {} {}ms tiers=[{}]",
            trace.id,
            if trace.success { "ok " } else { "FAIL" },
            trace.url,
            trace.duration_ms,
            trace
                .tiers
                .iter()
                .map(|t| format!("{}{}", t.name, if t.success { "" } else { "!" }))
                .collect::<Vec<_>>()
                .join(", ")
        );
        for error in &trace.errors {
            println!("    {}: {}", error.error_type, error.message);
        }
    }
    Ok(())
}
