//! Show which venue a render would use.

use std::path::PathBuf;

use rendermode_common::config::AppConfig;
use rendermode_render_engine::{DecisionPolicy, RenderRequest, VenueOverride};

use crate::ServerArgs;

pub async fn run(
    config: &AppConfig,
    path: PathBuf,
    venue: VenueOverride,
    server: ServerArgs,
) -> anyhow::Result<()> {
    let project = super::load_project(&path)?;
    let request = RenderRequest::new(project).with_override(venue);
    request.validate()?;

    let assessment = super::assessor(config, &server)?
        .assess(config.assessor.timeout())
        .await;
    let complexity = request.complexity();
    let decision =
        DecisionPolicy::new(config.policy.clone()).decide(&assessment, complexity.score, venue);

    println!("Venue:      {}", decision.mode);
    println!("Reason:     {}", decision.reason);
    println!("Confidence: {:?}", decision.confidence);
    println!("Metrics:");
    for (key, value) in &decision.metrics {
        println!("  {key}: {value}");
    }
    Ok(())
}
