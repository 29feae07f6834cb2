use anyhow::Result;

use siphon_core::AppConfig;
use siphon_engine::{ExtractOptions, Siphon};

pub async fn run(config: AppConfig, url: String) -> Result<()> {
    let siphon = Siphon::from_config(config).await?;
    let plan = siphon.preview(&url, ExtractOptions::default()).await?;

    if plan.suppressed {
        println!("domain is suppressed by an active anti-pattern\n");
    }
    println!("{:<22} {:<14} {:>8} {:>6}  skip", "strategy", "tier", "est ms", "conf");
    for step in &plan.steps {
        println!(
            "{:<22} {:<14} {:>8} {:>6.2}  {}",
            step.strategy,
            format!("{:?}", step.tier).to_lowercase(),
            step.estimated_ms,
            step.confidence_factor,
            step.skip_reason.as_deref().unwrap_or("-")
        );
    }
    Ok(())
}
