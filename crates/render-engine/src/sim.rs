//! Simulated encode and render-farm capabilities.
//!
//! These let the full lifecycle run without a codec or a render server:
//! the encoder walks the frame timeline and emits a JSON render manifest,
//! and the farm accepts submissions and advances them one step per poll.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::local::{EncodeError, EncodeJob, LocalEncoder};
use crate::remote::{JobSubmitter, RemoteJobId, RemoteJobState, RemoteJobStatus, SubmitError};
use crate::request::RenderRequest;

/// Progress reports per encode, at most.
const PROGRESS_STEPS: u64 = 100;

/// Walks every frame of the timeline and returns a manifest of what it
/// would have encoded.
#[derive(Debug, Clone, Default)]
pub struct SimulatedEncoder {
    frame_delay: Duration,
    fail_at: Option<(f64, EncodeError)>,
}

impl SimulatedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spend `delay` on each frame.
    pub fn with_frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    /// Fail with `error` once `fraction` of the frames are done.
    pub fn failing_at(mut self, fraction: f64, error: EncodeError) -> Self {
        self.fail_at = Some((fraction.clamp(0.0, 1.0), error));
        self
    }
}

#[async_trait::async_trait]
impl LocalEncoder for SimulatedEncoder {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn encode(
        &self,
        job: &EncodeJob,
        progress: &(dyn Fn(f64) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, EncodeError> {
        let total = job.total_frames;
        let report_every = (total / PROGRESS_STEPS).max(1);

        for frame in 0..total {
            if cancel.is_cancelled() {
                return Err(EncodeError::Cancelled);
            }
            let done = frame as f64 / total as f64;
            if let Some((at, error)) = &self.fail_at {
                if done >= *at {
                    return Err(error.clone());
                }
            }
            if frame % report_every == 0 {
                progress(done);
            }
            if self.frame_delay.is_zero() {
                if frame % report_every == 0 {
                    tokio::task::yield_now().await;
                }
            } else {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(EncodeError::Cancelled),
                    _ = tokio::time::sleep(self.frame_delay) => {}
                }
            }
        }
        if let Some((_, error)) = &self.fail_at {
            if total == 0 {
                return Err(error.clone());
            }
        }
        progress(1.0);

        let request = &job.request;
        let clips: Vec<_> = request
            .project
            .clips()
            .map(|clip| {
                json!({
                    "id": clip.id(),
                    "type": clip.kind(),
                    "start": clip.timing().start,
                    "end": clip.end(),
                })
            })
            .collect();
        let manifest = json!({
            "projectId": request.project.id,
            "width": request.output.width,
            "height": request.output.height,
            "fps": request.output.fps,
            "format": request.output.format.as_str(),
            "frames": total,
            "threads": job.threads,
            "clips": clips,
        });
        serde_json::to_vec_pretty(&manifest).map_err(|e| EncodeError::Malformed(e.to_string()))
    }
}

#[derive(Debug)]
struct FarmJob {
    polls: u64,
    extension: &'static str,
}

/// A render farm held in memory.
///
/// Each status poll advances a job by one step; after `steps` polls it
/// succeeds with a location under the base location.
#[derive(Debug)]
pub struct InMemoryRenderFarm {
    base_location: String,
    steps: u64,
    online: bool,
    failure: Option<(String, bool)>,
    jobs: Mutex<HashMap<RemoteJobId, FarmJob>>,
    submitted: AtomicUsize,
    cancelled: AtomicUsize,
    polls: AtomicU64,
}

impl InMemoryRenderFarm {
    pub fn new(base_location: impl Into<String>) -> Self {
        Self {
            base_location: base_location.into().trim_end_matches('/').to_string(),
            steps: 5,
            online: true,
            failure: None,
            jobs: Mutex::new(HashMap::new()),
            submitted: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            polls: AtomicU64::new(0),
        }
    }

    /// Polls needed before a job succeeds.
    pub fn with_steps(mut self, steps: u64) -> Self {
        self.steps = steps.max(1);
        self
    }

    /// Refuse every request as unreachable.
    pub fn offline(mut self) -> Self {
        self.online = false;
        self
    }

    /// Fail every job on its final step.
    pub fn failing(mut self, reason: impl Into<String>, retryable: bool) -> Self {
        self.failure = Some((reason.into(), retryable));
        self
    }

    pub fn submitted_count(&self) -> usize {
        self.submitted.load(Ordering::SeqCst)
    }

    pub fn cancelled_count(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn poll_count(&self) -> u64 {
        self.polls.load(Ordering::SeqCst)
    }

    /// Jobs submitted and not yet finished or cancelled.
    pub fn active_count(&self) -> usize {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn ensure_online(&self) -> Result<(), SubmitError> {
        if self.online {
            Ok(())
        } else {
            Err(SubmitError::Unreachable(format!(
                "{} is offline",
                self.base_location
            )))
        }
    }
}

#[async_trait::async_trait]
impl JobSubmitter for InMemoryRenderFarm {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn submit(&self, request: &RenderRequest) -> Result<RemoteJobId, SubmitError> {
        self.ensure_online()?;
        let id = RemoteJobId(Uuid::new_v4().to_string());
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id.clone(),
                FarmJob {
                    polls: 0,
                    extension: request.output.format.as_str(),
                },
            );
        self.submitted.fetch_add(1, Ordering::SeqCst);
        Ok(id)
    }

    async fn status(&self, id: &RemoteJobId) -> Result<RemoteJobStatus, SubmitError> {
        self.ensure_online()?;
        self.polls.fetch_add(1, Ordering::SeqCst);

        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| SubmitError::Rejected(format!("unknown job {id}")))?;
        job.polls += 1;

        let percent = (job.polls as f64 / self.steps as f64 * 100.0).min(100.0);
        let finished = job.polls >= self.steps;
        let state = if !finished {
            if job.polls == 1 {
                RemoteJobState::Queued
            } else {
                RemoteJobState::Running
            }
        } else if let Some((reason, retryable)) = &self.failure {
            RemoteJobState::Failed {
                reason: reason.clone(),
                retryable: *retryable,
            }
        } else {
            RemoteJobState::Succeeded {
                location: format!("{}/{}.{}", self.base_location, id, job.extension),
            }
        };
        if finished {
            jobs.remove(id);
        }

        Ok(RemoteJobStatus {
            state,
            percent,
            message: None,
        })
    }

    async fn cancel(&self, id: &RemoteJobId) -> Result<(), SubmitError> {
        self.ensure_online()?;
        let removed = self
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
        if removed.is_some() {
            self.cancelled.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
