#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rendermode_capability::{
    Assessor, ClientCapabilities, ClientProbe, ClientTier, ServerProbe, ServerStatus,
    StaticServerProbe, UnreachableServerProbe,
};
use rendermode_common::config::CoordinatorConfig;
use rendermode_project_model::VideoProject;
use rendermode_render_engine::{
    BackendFailure, DecisionPolicy, FailureKind, RenderBackend, RenderContext, RenderCoordinator,
    RenderRequest, RenderResult, Venue,
};

/// One step of a scripted render attempt.
#[derive(Debug, Clone)]
pub enum Step {
    Progress(f64),
    /// Sleep, returning early as cancelled if the token fires.
    Sleep(Duration),
    /// Sleep without looking at the token.
    Stall(Duration),
    /// Block until cancellation, then carry on with the script.
    WaitForCancel,
    Fail(FailureKind),
    Succeed,
}

/// A backend that plays back a fixed script.
pub struct ScriptedBackend {
    venue: Venue,
    script: Vec<Step>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(venue: Venue, script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            venue,
            script,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn succeeding(venue: Venue) -> Arc<Self> {
        Self::new(
            venue,
            vec![Step::Progress(25.0), Step::Progress(75.0), Step::Succeed],
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn result(&self) -> RenderResult {
        match self.venue {
            Venue::Local => RenderResult::local(b"scripted".to_vec(), "video/mp4"),
            Venue::Remote => RenderResult::remote("memory://scripted/out.mp4"),
        }
    }
}

#[async_trait::async_trait]
impl RenderBackend for ScriptedBackend {
    fn venue(&self) -> Venue {
        self.venue
    }

    fn name(&self) -> &str {
        "scripted"
    }

    async fn render(
        &self,
        _request: &RenderRequest,
        ctx: RenderContext,
    ) -> Result<RenderResult, BackendFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        for step in &self.script {
            match step {
                Step::Progress(p) => ctx.progress.rendering(*p),
                Step::Sleep(d) => {
                    tokio::select! {
                        _ = ctx.cancel.cancelled() => return Err(BackendFailure::cancelled()),
                        _ = tokio::time::sleep(*d) => {}
                    }
                }
                Step::Stall(d) => tokio::time::sleep(*d).await,
                Step::WaitForCancel => ctx.cancel.cancelled().await,
                Step::Fail(kind) => {
                    return Err(BackendFailure::new(*kind, "scripted failure"));
                }
                Step::Succeed => return Ok(self.result()),
            }
        }
        Ok(self.result())
    }
}

/// Client probe that counts how often it is read.
pub struct CountingClientProbe {
    capabilities: ClientCapabilities,
    reads: Arc<AtomicUsize>,
}

impl CountingClientProbe {
    pub fn new(capabilities: ClientCapabilities) -> (Arc<Self>, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let probe = Arc::new(Self {
            capabilities,
            reads: reads.clone(),
        });
        (probe, reads)
    }
}

impl ClientProbe for CountingClientProbe {
    fn read(&self) -> ClientCapabilities {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.capabilities.clone()
    }

    fn name(&self) -> &str {
        "counting"
    }
}

pub fn client(tier: ClientTier) -> ClientCapabilities {
    ClientCapabilities {
        tier,
        available_memory_mb: match tier {
            ClientTier::Low => 1024,
            ClientTier::Medium => 4096,
            ClientTier::High => 16_384,
        },
        hardware_concurrency: 8,
        supports_threaded_wasm: true,
    }
}

/// Server probe reporting `load`, or an unreachable server for `None`.
pub fn server(load: Option<f64>) -> Arc<dyn ServerProbe> {
    match load {
        Some(load) => Arc::new(StaticServerProbe::new(ServerStatus {
            load,
            queue_depth: Some(0),
            estimated_wait_secs: None,
        })),
        None => Arc::new(UnreachableServerProbe),
    }
}

pub fn test_config() -> CoordinatorConfig {
    CoordinatorConfig {
        render_deadline_ms: 5_000,
        cancel_grace_ms: 50,
        remote_poll_interval_ms: 1,
        progress_min_interval_ms: 0,
    }
}

pub fn coordinator_with(
    client_probe: Arc<dyn ClientProbe>,
    server_probe: Arc<dyn ServerProbe>,
    local: Arc<dyn RenderBackend>,
    remote: Arc<dyn RenderBackend>,
) -> RenderCoordinator {
    RenderCoordinator::new(
        Assessor::new(client_probe, server_probe, Duration::from_millis(200)),
        DecisionPolicy::default(),
        local,
        remote,
    )
    .with_coordinator_config(test_config())
    .with_assess_timeout(Duration::from_millis(500))
}

pub fn coordinator(
    tier: ClientTier,
    load: Option<f64>,
    local: Arc<dyn RenderBackend>,
    remote: Arc<dyn RenderBackend>,
) -> RenderCoordinator {
    let (probe, _) = CountingClientProbe::new(client(tier));
    coordinator_with(probe, server(load), local, remote)
}

pub fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
        .join("fixtures")
        .join("projects")
        .join(name)
}

pub fn demo_request() -> RenderRequest {
    let project = VideoProject::load(fixture("demo.json")).expect("demo fixture should load");
    RenderRequest::new(project)
}
