//! Remote render backend.
//!
//! Hands the request to a [`JobSubmitter`] and polls it until the remote
//! job settles. Remote progress is relayed through the attempt's sink, so
//! a remote facility that reports out of order still looks monotonic to
//! subscribers.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backend::{BackendFailure, RenderBackend, RenderContext};
use crate::events::RenderStatus;
use crate::request::{RenderRequest, RenderResult, Venue};

/// Poll failures in a row after which the facility counts as unreachable.
const MAX_CONSECUTIVE_POLL_FAILURES: u32 = 3;

/// Identifier the remote facility assigned to a submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteJobId(pub String);

impl std::fmt::Display for RemoteJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of a remote job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum RemoteJobState {
    Queued,
    Running,
    Succeeded { location: String },
    Failed { reason: String, retryable: bool },
}

/// One poll response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteJobStatus {
    #[serde(flatten)]
    pub state: RemoteJobState,
    #[serde(default)]
    pub percent: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("Render server unreachable: {0}")]
    Unreachable(String),

    #[error("Render server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Render server rejected the job: {0}")]
    Rejected(String),
}

impl From<SubmitError> for BackendFailure {
    fn from(e: SubmitError) -> Self {
        match &e {
            SubmitError::Unreachable(_) => BackendFailure::unreachable(e.to_string()),
            SubmitError::Server { status, .. } if *status >= 500 => {
                BackendFailure::server(e.to_string())
            }
            SubmitError::Server { .. } | SubmitError::Rejected(_) => {
                BackendFailure::rejected(e.to_string())
            }
        }
    }
}

/// A remote job-submission capability.
#[async_trait::async_trait]
pub trait JobSubmitter: Send + Sync {
    fn name(&self) -> &str;

    async fn submit(&self, request: &RenderRequest) -> Result<RemoteJobId, SubmitError>;

    async fn status(&self, id: &RemoteJobId) -> Result<RemoteJobStatus, SubmitError>;

    /// Ask the facility to abandon a job. Best effort.
    async fn cancel(&self, id: &RemoteJobId) -> Result<(), SubmitError>;
}

/// Renders on the render server.
pub struct RemoteBackend {
    submitter: Arc<dyn JobSubmitter>,
    poll_interval: Duration,
}

impl RemoteBackend {
    pub fn new(submitter: Arc<dyn JobSubmitter>, poll_interval: Duration) -> Self {
        Self {
            submitter,
            poll_interval: poll_interval.max(Duration::from_millis(1)),
        }
    }

    async fn abandon(&self, id: &RemoteJobId) {
        if let Err(e) = self.submitter.cancel(id).await {
            tracing::warn!(remote_job = %id, error = %e, "Failed to cancel remote job");
        }
    }
}

#[async_trait::async_trait]
impl RenderBackend for RemoteBackend {
    fn venue(&self) -> Venue {
        Venue::Remote
    }

    fn name(&self) -> &str {
        self.submitter.name()
    }

    async fn render(
        &self,
        request: &RenderRequest,
        ctx: RenderContext,
    ) -> Result<RenderResult, BackendFailure> {
        let id = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(BackendFailure::cancelled()),
            submitted = self.submitter.submit(request) => submitted?,
        };

        tracing::info!(
            submitter = self.submitter.name(),
            remote_job = %id,
            "Submitted remote render"
        );
        ctx.progress
            .report(0.0, RenderStatus::Queued, Some(format!("remote job {id}")));

        let mut failures = 0u32;
        loop {
            let deadline = tokio::time::Instant::from_std(ctx.deadline.instant());
            tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => {
                    self.abandon(&id).await;
                    return Err(BackendFailure::cancelled());
                }
                _ = tokio::time::sleep_until(deadline) => {
                    self.abandon(&id).await;
                    return Err(BackendFailure::deadline_exceeded(Venue::Remote));
                }
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            let status = match self.submitter.status(&id).await {
                Ok(status) => {
                    failures = 0;
                    status
                }
                Err(e @ SubmitError::Unreachable(_)) => {
                    failures += 1;
                    tracing::debug!(remote_job = %id, failures, error = %e, "Remote poll failed");
                    if failures >= MAX_CONSECUTIVE_POLL_FAILURES {
                        return Err(e.into());
                    }
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            match status.state {
                RemoteJobState::Queued => {
                    ctx.progress
                        .report(status.percent, RenderStatus::Queued, status.message);
                }
                RemoteJobState::Running => {
                    ctx.progress
                        .report(status.percent, RenderStatus::Rendering, status.message);
                }
                RemoteJobState::Succeeded { location } => {
                    ctx.progress.report(100.0, RenderStatus::Done, None);
                    return Ok(RenderResult::remote(location));
                }
                RemoteJobState::Failed { reason, retryable } => {
                    return Err(if retryable {
                        BackendFailure::server(reason)
                    } else {
                        BackendFailure::rejected(reason)
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{FailureKind, ProgressSink};
    use crate::sim::InMemoryRenderFarm;
    use chrono::Utc;
    use rendermode_capability::{Assessment, ClientTier};
    use rendermode_common::clock::Deadline;
    use rendermode_project_model::{OutputFormat, OutputSettings, VideoProject};
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    fn request() -> RenderRequest {
        RenderRequest::new(VideoProject::new(
            "p",
            OutputSettings::new(640, 360, 30.0, OutputFormat::Mp4),
        ))
    }

    fn context(deadline: Duration, seen: Arc<Mutex<Vec<f64>>>) -> RenderContext {
        RenderContext {
            progress: ProgressSink::new(move |p| seen.lock().unwrap().push(p.percent)),
            cancel: CancellationToken::new(),
            deadline: Deadline::after(deadline),
            assessment: Arc::new(Assessment {
                client_tier: ClientTier::Low,
                available_memory_mb: 1024,
                hardware_concurrency: 2,
                supports_threaded_wasm: true,
                server_load: Some(0.1),
                server_queue_depth: None,
                server_estimated_wait_secs: None,
                server_reachable: true,
                measured_at: Utc::now(),
                degraded: false,
            }),
        }
    }

    #[test]
    fn status_json_shape() {
        let status: RemoteJobStatus = serde_json::from_str(
            r#"{ "state": "succeeded", "location": "s3://renders/1.mp4", "percent": 100 }"#,
        )
        .unwrap();
        assert_eq!(
            status.state,
            RemoteJobState::Succeeded {
                location: "s3://renders/1.mp4".to_string()
            }
        );
    }

    #[test]
    fn submit_errors_split_by_status() {
        let kind = |e: SubmitError| BackendFailure::from(e).kind;
        assert_eq!(kind(SubmitError::Unreachable("x".into())), FailureKind::ServerUnreachable);
        assert_eq!(
            kind(SubmitError::Server { status: 503, message: "busy".into() }),
            FailureKind::ServerError
        );
        assert_eq!(
            kind(SubmitError::Server { status: 422, message: "bad".into() }),
            FailureKind::CodecRejected
        );
        assert_eq!(kind(SubmitError::Rejected("x".into())), FailureKind::CodecRejected);
    }

    #[tokio::test]
    async fn polls_until_the_farm_finishes() {
        let farm = Arc::new(InMemoryRenderFarm::new("memory://renders").with_steps(4));
        let backend = RemoteBackend::new(farm.clone(), Duration::from_millis(1));
        let seen = Arc::new(Mutex::new(vec![]));

        let result = backend
            .render(&request(), context(Duration::from_secs(10), seen.clone()))
            .await
            .unwrap();

        match result {
            RenderResult::Remote { location } => assert!(location.starts_with("memory://renders/")),
            other => panic!("expected remote result, got {other:?}"),
        }
        let seen = seen.lock().unwrap();
        assert_eq!(seen.first(), Some(&0.0));
        assert_eq!(seen.last(), Some(&100.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn unreachable_farm_is_fallback_eligible() {
        let farm = Arc::new(InMemoryRenderFarm::new("memory://renders").offline());
        let backend = RemoteBackend::new(farm, Duration::from_millis(1));
        let failure = backend
            .render(&request(), context(Duration::from_secs(10), Arc::new(Mutex::new(vec![]))))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::ServerUnreachable);
        assert!(failure.is_fallback_eligible());
    }

    #[tokio::test]
    async fn deadline_cancels_remote_job() {
        let farm = Arc::new(InMemoryRenderFarm::new("memory://renders").with_steps(1_000_000));
        let backend = RemoteBackend::new(farm.clone(), Duration::from_millis(5));
        let failure = backend
            .render(&request(), context(Duration::from_millis(30), Arc::new(Mutex::new(vec![]))))
            .await
            .unwrap_err();
        assert_eq!(failure.kind, FailureKind::DeadlineExceeded);
        assert_eq!(farm.cancelled_count(), 1);
    }

    #[tokio::test]
    async fn cancellation_abandons_remote_job() {
        let farm = Arc::new(InMemoryRenderFarm::new("memory://renders").with_steps(1_000_000));
        let backend = RemoteBackend::new(farm.clone(), Duration::from_millis(5));
        let ctx = context(Duration::from_secs(10), Arc::new(Mutex::new(vec![])));
        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let failure = backend.render(&request(), ctx).await.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Cancelled);
        assert_eq!(farm.cancelled_count(), 1);
    }
}
