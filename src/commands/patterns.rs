use anyhow::Result;

use siphon_core::AppConfig;
use siphon_engine::Siphon;

use crate::cli::PatternsAction;

pub async fn run(config: AppConfig, action: PatternsAction) -> Result<()> {
    let siphon = Siphon::from_config(config).await?;
    let registry = &siphon.engine().registry;

    match action {
        PatternsAction::List => {
            let mut patterns = registry.patterns_snapshot();
            patterns.sort_by(|a, b| {
                b.metrics
                    .confidence
                    .partial_cmp(&a.metrics.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
            println!(
                "{:<46} {:<14} {:>6} {:>5}/{:<5} {:>8}",
                "id", "type", "conf", "ok", "fail", "avg ms"
            );
            for p in patterns {
                println!(
                    "{:<46} {:<14} {:>6.2} {:>5}/{:<5} {:>8.0}",
                    p.id,
                    format!("{:?}", p.template_type),
                    p.metrics.confidence,
                    p.metrics.success_count,
                    p.metrics.failure_count,
                    p.metrics.avg_response_ms,
                );
            }
            let antis = registry.anti_patterns_snapshot();
            if !antis.is_empty() {
                println!("\nactive anti-patterns:");
                for a in antis {
                    println!(
                        "  {} [{:?}] expires {}",
                        a.id,
                        a.recommended_action,
                        if a.expires_at == 0 { "never".to_string() } else { a.expires_at.to_string() }
                    );
                }
            }
        }
        PatternsAction::Prune => {
            let before = registry.pattern_count();
            registry.decay_pass().await?;
            let after = registry.pattern_count();
            println!("decay applied: {} patterns -> {}", before, after);
        }
    }

    siphon.shutdown().await?;
    Ok(())
}
