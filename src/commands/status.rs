use anyhow::Result;

use siphon_core::AppConfig;
use siphon_engine::Siphon;

pub async fn run(config: AppConfig) -> Result<()> {
    let siphon = Siphon::from_config(config).await?;
    let engine = siphon.engine();

    println!("patterns:       {}", engine.registry.pattern_count());
    println!("anti-patterns:  {}", engine.registry.anti_patterns_snapshot().len());

    let cache = engine.cache.stats().await;
    println!(
        "cache:          {} hits / {} misses / {} evictions, {} cooled domains",
        cache.hits, cache.misses, cache.evictions, cache.failed_domains
    );

    let client = engine.client.stats();
    println!(
        "http:           {} requests, {} reused / {} new connections, {:.0}% pool utilization",
        client.total_requests,
        client.connections_reused,
        client.new_connections,
        client.utilization_percent
    );

    println!("traces held:    {}", engine.traces.len());
    println!("renderer:       {}", if engine.renderer.available() { "available" } else { "absent" });

    Ok(())
}
