//! Measure client capability and server load.

use rendermode_common::config::AppConfig;

use crate::ServerArgs;

pub async fn run(config: &AppConfig, server: ServerArgs, json: bool) -> anyhow::Result<()> {
    let assessor = super::assessor(config, &server)?;
    let assessment = assessor.assess(config.assessor.timeout()).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&assessment)?);
        return Ok(());
    }

    println!("Rendermode Capability Assessment");
    println!("{}", "=".repeat(50));
    println!("Client tier:        {}", assessment.client_tier);
    println!("Available memory:   {} MiB", assessment.available_memory_mb);
    println!("Hardware threads:   {}", assessment.hardware_concurrency);
    println!(
        "Threaded encode:    {}",
        if assessment.supports_threaded_wasm { "yes" } else { "no" }
    );
    if assessment.server_reachable {
        println!("[OK] Render server reachable");
        if let Some(load) = assessment.server_load {
            println!("     Load: {:.0}%", load * 100.0);
        }
        if let Some(depth) = assessment.server_queue_depth {
            println!("     Queue depth: {depth}");
        }
        if let Some(wait) = assessment.server_estimated_wait_secs {
            println!("     Estimated wait: {wait:.0}s");
        }
    } else if assessment.degraded {
        println!("[WARN] Render server did not answer in time");
    } else {
        println!("[WARN] Render server unreachable");
    }

    Ok(())
}
