//! Render lifecycle coordination.
//!
//! The coordinator runs each job as its own task through
//! assess, decide and render, relays backend progress onto the event
//! channel, and allows one fallback to the other venue when an attempt
//! fails in a way the other venue might survive.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use rendermode_capability::{Assessment, Assessor};
use rendermode_common::clock::{JobClock, ProgressPacer};
use rendermode_common::config::{AppConfig, CoordinatorConfig};
use rendermode_common::error::RendermodeError;
use rendermode_project_model::ValidationError;
use tokio::sync::watch;
use tracing::Instrument;

use crate::backend::{BackendFailure, FailureKind, ProgressSink, RenderBackend, RenderContext};
use crate::events::{CompleteEvent, ErrorEvent, EventChannel, JobEvent, RenderEvent};
use crate::job::{JobGate, JobHandle, JobId, JobOutcome, JobState, CANCELLED_CODE};
use crate::policy::{Decision, DecisionPolicy};
use crate::request::{RenderRequest, Venue};

/// Why a job could not be started.
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Render jobs must be started from within a Tokio runtime")]
    NoRuntime,
}

impl From<StartError> for RendermodeError {
    fn from(e: StartError) -> Self {
        match e {
            StartError::Validation(e) => RendermodeError::validation(e.to_string()),
            StartError::NoRuntime => {
                RendermodeError::unsupported("render jobs need a Tokio runtime")
            }
        }
    }
}

/// Drives render requests from assessment to a terminal event.
///
/// Holds only configuration and shared capabilities; each job owns its own
/// state, so concurrent jobs never contend.
#[derive(Clone)]
pub struct RenderCoordinator {
    assessor: Assessor,
    policy: DecisionPolicy,
    local: Arc<dyn RenderBackend>,
    remote: Arc<dyn RenderBackend>,
    config: CoordinatorConfig,
    assess_timeout: Duration,
}

impl RenderCoordinator {
    pub fn new(
        assessor: Assessor,
        policy: DecisionPolicy,
        local: Arc<dyn RenderBackend>,
        remote: Arc<dyn RenderBackend>,
    ) -> Self {
        let app = AppConfig::default();
        Self {
            assessor,
            policy,
            local,
            remote,
            config: app.coordinator,
            assess_timeout: app.assessor.timeout(),
        }
    }

    /// Take policy, coordinator and assessment timeouts from `config`.
    pub fn configured(mut self, config: &AppConfig) -> Self {
        self.policy = DecisionPolicy::new(config.policy.clone());
        self.config = config.coordinator.clone();
        self.assess_timeout = config.assessor.timeout();
        self
    }

    pub fn with_coordinator_config(mut self, config: CoordinatorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_assess_timeout(mut self, timeout: Duration) -> Self {
        self.assess_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Validate `request` and start rendering it in the background.
    ///
    /// Invalid requests are refused here and never enter a render state.
    pub fn start(
        &self,
        request: RenderRequest,
        events: &EventChannel,
    ) -> Result<JobHandle, StartError> {
        request.validate()?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StartError::NoRuntime)?;

        let id = JobId::new();
        let gate = Arc::new(JobGate::default());
        let (state_tx, state_rx) = watch::channel(JobState::Idle);

        tracing::info!(
            job_id = %id,
            project = %request.project.id,
            venue_override = ?request.venue_override,
            "Render job accepted"
        );

        let job = RenderJob {
            id,
            request,
            assessor: self.assessor.clone(),
            policy: self.policy.clone(),
            local: self.local.clone(),
            remote: self.remote.clone(),
            config: self.config.clone(),
            assess_timeout: self.assess_timeout,
            events: events.clone(),
            gate: gate.clone(),
            state: state_tx,
            clock: JobClock::start(),
        };
        let span = tracing::info_span!("render_job", job_id = %id);
        let task = runtime.spawn(job.run().instrument(span));

        Ok(JobHandle::new(id, gate, state_rx, task))
    }

    /// Best-effort cancellation. Returns false if the job already ended.
    pub fn cancel(&self, handle: &JobHandle) -> bool {
        handle.cancel()
    }

    /// Start `request` and wait for its outcome.
    pub async fn render(
        &self,
        request: RenderRequest,
        events: &EventChannel,
    ) -> Result<JobOutcome, StartError> {
        Ok(self.start(request, events)?.wait().await)
    }
}

impl std::fmt::Debug for RenderCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderCoordinator")
            .field("local", &self.local.name())
            .field("remote", &self.remote.name())
            .field("config", &self.config)
            .field("assess_timeout", &self.assess_timeout)
            .finish()
    }
}

/// One job's private state, owned by its task.
struct RenderJob {
    id: JobId,
    request: RenderRequest,
    assessor: Assessor,
    policy: DecisionPolicy,
    local: Arc<dyn RenderBackend>,
    remote: Arc<dyn RenderBackend>,
    config: CoordinatorConfig,
    assess_timeout: Duration,
    events: EventChannel,
    gate: Arc<JobGate>,
    state: watch::Sender<JobState>,
    clock: JobClock,
}

impl RenderJob {
    async fn run(self) -> JobOutcome {
        let outcome = self.drive().await;
        self.finish(outcome)
    }

    async fn drive(&self) -> JobOutcome {
        self.transition(JobState::Assessing);
        let assessment = tokio::select! {
            biased;
            _ = self.gate.token().cancelled() => return JobOutcome::Cancelled,
            assessment = self.assessor.assess(self.assess_timeout) => Arc::new(assessment),
        };

        self.transition(JobState::Deciding);
        if self.gate.is_cancel_requested() {
            return JobOutcome::Cancelled;
        }
        let complexity = self.request.complexity().score;
        let mut decision = self
            .policy
            .decide(&assessment, complexity, self.request.venue_override);
        let mut fallback_used = false;

        loop {
            self.emit(RenderEvent::Decision(decision.clone()));
            if self.gate.is_cancel_requested() {
                return JobOutcome::Cancelled;
            }

            self.transition(JobState::Rendering);
            let venue = decision.mode;
            let failure = match self.attempt(&decision, &assessment).await {
                Ok(result) => return JobOutcome::Completed(result),
                Err(failure) => failure,
            };

            if failure.kind == FailureKind::Cancelled || self.gate.is_cancel_requested() {
                return JobOutcome::Cancelled;
            }
            if fallback_used || !failure.is_fallback_eligible() {
                return JobOutcome::Failed {
                    code: failure.code().to_string(),
                    message: failure.message,
                };
            }

            tracing::warn!(
                venue = %venue,
                code = failure.code(),
                error = %failure.message,
                "Render attempt failed, falling back to {}",
                venue.other()
            );
            fallback_used = true;
            self.transition(JobState::Deciding);
            if self.gate.is_cancel_requested() {
                return JobOutcome::Cancelled;
            }
            decision = self
                .policy
                .decide_fallback(&assessment, complexity, venue, failure.code());
        }
    }

    async fn attempt(
        &self,
        decision: &Decision,
        assessment: &Arc<Assessment>,
    ) -> Result<crate::request::RenderResult, BackendFailure> {
        let venue = decision.mode;
        let backend = match venue {
            Venue::Local => &self.local,
            Venue::Remote => &self.remote,
        };
        let budget = self.config.render_deadline();
        let ctx = RenderContext {
            progress: self.progress_sink(),
            cancel: self.gate.token().child_token(),
            deadline: self.clock.deadline_in(budget),
            assessment: assessment.clone(),
        };

        tracing::info!(
            venue = %venue,
            backend = backend.name(),
            deadline_ms = budget.as_millis() as u64,
            "Starting render attempt"
        );

        let cancelled = async {
            self.gate.token().cancelled().await;
            tokio::time::sleep(self.config.cancel_grace()).await;
        };

        tokio::select! {
            outcome = tokio::time::timeout(budget, backend.render(&self.request, ctx)) => {
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(BackendFailure::deadline_exceeded(venue)),
                }
            }
            _ = cancelled => {
                tracing::debug!(venue = %venue, "Backend ignored cancellation, abandoning attempt");
                Err(BackendFailure::cancelled())
            }
        }
    }

    /// A sink for one attempt. Reports are dropped once the job is
    /// cancelled or terminal, and paced by the configured interval.
    fn progress_sink(&self) -> ProgressSink {
        let id = self.id;
        let gate = self.gate.clone();
        let events = self.events.clone();
        let pacer = Mutex::new(ProgressPacer::new(self.config.progress_min_interval()));
        ProgressSink::new(move |progress| {
            if !gate.accepts_progress() {
                return;
            }
            let relay = pacer
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .should_relay(progress.percent, Instant::now());
            if relay {
                events.emit(&JobEvent {
                    job_id: id,
                    event: RenderEvent::Progress(progress),
                });
            }
        })
    }

    fn finish(&self, outcome: JobOutcome) -> JobOutcome {
        let outcome = if self.gate.close() {
            JobOutcome::Cancelled
        } else {
            outcome
        };
        self.transition(outcome.state());

        let elapsed_ms = self.clock.elapsed_ms();
        let event = match &outcome {
            JobOutcome::Completed(result) => {
                tracing::info!(venue = %result.venue(), elapsed_ms, "Render job completed");
                RenderEvent::Complete(CompleteEvent {
                    result: result.clone(),
                })
            }
            JobOutcome::Failed { code, message } => {
                tracing::error!(code = %code, error = %message, elapsed_ms, "Render job failed");
                RenderEvent::Error(ErrorEvent {
                    error: message.clone(),
                    code: Some(code.clone()),
                })
            }
            JobOutcome::Cancelled => {
                tracing::info!(elapsed_ms, "Render job cancelled");
                RenderEvent::Error(ErrorEvent {
                    error: "Render cancelled".to_string(),
                    code: Some(CANCELLED_CODE.to_string()),
                })
            }
        };
        self.emit(event);
        outcome
    }

    fn transition(&self, next: JobState) {
        let previous = self.state.send_replace(next);
        if !previous.can_transition_to(next) {
            tracing::warn!(from = %previous, to = %next, "Unexpected job state transition");
        } else {
            tracing::debug!(from = %previous, to = %next, "Job state changed");
        }
    }

    fn emit(&self, event: RenderEvent) {
        self.events.emit(&JobEvent {
            job_id: self.id,
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventRecorder;
    use crate::local::{EncodeError, LocalBackend};
    use crate::remote::RemoteBackend;
    use crate::sim::{InMemoryRenderFarm, SimulatedEncoder};
    use rendermode_capability::{
        ClientCapabilities, ClientTier, ServerStatus, StaticClientProbe, StaticServerProbe,
        UnreachableServerProbe,
    };
    use rendermode_project_model::{OutputFormat, OutputSettings, VideoProject};

    fn assessor(tier: ClientTier, reachable: bool) -> Assessor {
        let client = Arc::new(StaticClientProbe(ClientCapabilities {
            tier,
            available_memory_mb: 8192,
            hardware_concurrency: 4,
            supports_threaded_wasm: true,
        }));
        if reachable {
            Assessor::new(
                client,
                Arc::new(StaticServerProbe::new(ServerStatus {
                    load: 0.2,
                    queue_depth: None,
                    estimated_wait_secs: None,
                })),
                Duration::from_millis(500),
            )
        } else {
            Assessor::new(client, Arc::new(UnreachableServerProbe), Duration::from_millis(500))
        }
    }

    fn coordinator(assessor: Assessor, encoder: SimulatedEncoder) -> RenderCoordinator {
        RenderCoordinator::new(
            assessor,
            DecisionPolicy::default(),
            Arc::new(LocalBackend::new(Arc::new(encoder))),
            Arc::new(RemoteBackend::new(
                Arc::new(InMemoryRenderFarm::new("memory://renders").with_steps(3)),
                Duration::from_millis(1),
            )),
        )
    }

    fn request() -> RenderRequest {
        RenderRequest::new(VideoProject::new(
            "unit",
            OutputSettings::new(640, 360, 30.0, OutputFormat::Mp4),
        ))
    }

    #[tokio::test]
    async fn local_render_completes() {
        let events = EventChannel::new();
        let recorder = EventRecorder::attach(&events);
        let outcome = coordinator(assessor(ClientTier::High, false), SimulatedEncoder::new())
            .render(request(), &events)
            .await
            .unwrap();

        assert!(outcome.is_completed());
        assert_eq!(recorder.decisions().len(), 1);
        assert_eq!(recorder.decisions()[0].mode, Venue::Local);
        assert_eq!(recorder.terminals().len(), 1);
    }

    #[tokio::test]
    async fn local_out_of_memory_falls_back_to_remote() {
        let events = EventChannel::new();
        let recorder = EventRecorder::attach(&events);
        let encoder =
            SimulatedEncoder::new().failing_at(0.0, EncodeError::OutOfMemory("sim".into()));
        let outcome = coordinator(assessor(ClientTier::High, true), encoder)
            .render(request(), &events)
            .await
            .unwrap();

        let decisions = recorder.decisions();
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].mode, Venue::Local);
        assert_eq!(decisions[1].mode, Venue::Remote);
        assert_eq!(decisions[1].reason, "fallback after local failure");
        match outcome {
            JobOutcome::Completed(result) => assert_eq!(result.venue(), Venue::Remote),
            other => panic!("expected completion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn fatal_failure_is_not_retried() {
        let events = EventChannel::new();
        let recorder = EventRecorder::attach(&events);
        let encoder =
            SimulatedEncoder::new().failing_at(0.0, EncodeError::Rejected("codec".into()));
        let outcome = coordinator(assessor(ClientTier::High, true), encoder)
            .render(request(), &events)
            .await
            .unwrap();

        assert_eq!(outcome.error_code(), Some("CODEC_REJECTED"));
        assert_eq!(recorder.decisions().len(), 1);
    }

    #[tokio::test]
    async fn invalid_request_is_refused_synchronously() {
        let events = EventChannel::new();
        let recorder = EventRecorder::attach(&events);
        let mut request = request();
        request.project.version = "0.2.0".to_string();

        let err = coordinator(assessor(ClientTier::High, true), SimulatedEncoder::new())
            .start(request, &events)
            .unwrap_err();
        assert!(matches!(err, StartError::Validation(_)));
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn start_outside_runtime_is_refused() {
        let events = EventChannel::new();
        let err = coordinator(assessor(ClientTier::High, true), SimulatedEncoder::new())
            .start(request(), &events)
            .unwrap_err();
        assert!(matches!(err, StartError::NoRuntime));
    }
}
