//! Render a project end to end.
//!
//! Uses the simulated encoder as the local venue and an in-memory render
//! farm as the remote one, so the whole lifecycle can be exercised
//! without a codec or a server.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use rendermode_common::config::AppConfig;
use rendermode_render_engine::{
    trace_events, DecisionPolicy, EncodeError, EventChannel, EventKind, InMemoryRenderFarm,
    LocalBackend, RemoteBackend, RenderCoordinator, RenderEvent, RenderRequest, RenderResult,
    SimulatedEncoder, VenueOverride,
};

use crate::ServerArgs;

/// Time the simulated encoder spends per frame.
const SIMULATED_FRAME_TIME: Duration = Duration::from_millis(2);

pub struct RenderArgs {
    pub path: PathBuf,
    pub venue: VenueOverride,
    pub output: Option<PathBuf>,
    pub fail_local: bool,
    pub farm_steps: u64,
}

pub async fn run(config: &AppConfig, args: RenderArgs, server: ServerArgs) -> anyhow::Result<()> {
    println!("Rendering project at: {}", args.path.display());

    let project = super::load_project(&args.path)?;
    let request = RenderRequest::new(project).with_override(args.venue);

    let mut encoder = SimulatedEncoder::new().with_frame_delay(SIMULATED_FRAME_TIME);
    if args.fail_local {
        encoder = encoder.failing_at(
            0.5,
            EncodeError::OutOfMemory("simulated allocation failure".to_string()),
        );
    }
    let farm = InMemoryRenderFarm::new("memory://rendermode-farm").with_steps(args.farm_steps);

    let coordinator = RenderCoordinator::new(
        super::assessor(config, &server)?,
        DecisionPolicy::new(config.policy.clone()),
        Arc::new(LocalBackend::new(Arc::new(encoder))),
        Arc::new(RemoteBackend::new(
            Arc::new(farm),
            config.coordinator.remote_poll_interval(),
        )),
    )
    .configured(config);

    let events = EventChannel::new();
    trace_events(&events);
    events.on(EventKind::Decision, |event| {
        if let RenderEvent::Decision(d) = &event.event {
            println!("\n  Venue: {} ({}, {:?} confidence)", d.mode, d.reason, d.confidence);
        }
    });
    events.on(EventKind::Progress, |event| {
        if let RenderEvent::Progress(p) = &event.event {
            print!("\r  Progress: {:5.1}% [{}]  ", p.percent, p.status.as_str());
            let _ = std::io::stdout().flush();
        }
    });

    let handle = coordinator.start(request, &events)?;
    let canceller = handle.canceller();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let result = handle.wait().await.into_result();
    println!();

    match result? {
        RenderResult::Local {
            data,
            size_bytes,
            mime_type,
        } => {
            println!("Render complete: {size_bytes} bytes of {mime_type}");
            if let Some(output) = args.output {
                if let Some(parent) = output.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&output, &data)?;
                println!("  Output: {}", output.display());
            }
        }
        RenderResult::Remote { location } => {
            println!("Render complete: {location}");
        }
    }

    Ok(())
}
