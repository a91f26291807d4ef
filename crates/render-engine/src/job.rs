//! Render job identity, lifecycle states and handles.

use std::sync::{Arc, Mutex, PoisonError};

use rendermode_common::error::{RendermodeError, RendermodeResult};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::request::RenderResult;

/// Unique identifier of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle state of a render job.
///
/// ```text
/// Idle -> Assessing -> Deciding -> Rendering -> Completed | Failed
///              \           \          |  \
///               \           \         |   -> Deciding (once, on fallback)
///                -----------------------> Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Idle,
    Assessing,
    Deciding,
    Rendering,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Idle, Assessing)
                | (Assessing, Deciding)
                | (Assessing, Cancelled)
                | (Deciding, Rendering)
                | (Deciding, Cancelled)
                | (Rendering, Deciding)
                | (Rendering, Completed)
                | (Rendering, Failed)
                | (Rendering, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Assessing => "assessing",
            Self::Deciding => "deciding",
            Self::Rendering => "rendering",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(RenderResult),
    Failed { code: String, message: String },
    Cancelled,
}

impl JobOutcome {
    pub fn state(&self) -> JobState {
        match self {
            Self::Completed(_) => JobState::Completed,
            Self::Failed { .. } => JobState::Failed,
            Self::Cancelled => JobState::Cancelled,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Error code reported for this outcome, if it is not a success.
    pub fn error_code(&self) -> Option<&str> {
        match self {
            Self::Completed(_) => None,
            Self::Failed { code, .. } => Some(code),
            Self::Cancelled => Some(CANCELLED_CODE),
        }
    }

    /// The render result, or the failure as a [`RendermodeError`].
    pub fn into_result(self) -> RendermodeResult<RenderResult> {
        match self {
            Self::Completed(result) => Ok(result),
            Self::Failed { code, message } => {
                Err(RendermodeError::render(format!("{message} ({code})")))
            }
            Self::Cancelled => Err(RendermodeError::Cancelled),
        }
    }
}

/// Error code carried by the terminal event of a cancelled job.
pub const CANCELLED_CODE: &str = "CANCELLED";

#[derive(Debug, Default)]
struct GateState {
    cancel_requested: bool,
    terminal: bool,
}

/// Serializes cancellation against job completion.
///
/// Whichever of `cancel` and `close` takes the lock first wins: a cancel
/// accepted before close forces the outcome to cancelled, and a cancel
/// arriving after close is refused.
#[derive(Debug, Default)]
pub(crate) struct JobGate {
    state: Mutex<GateState>,
    token: CancellationToken,
}

impl JobGate {
    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Request cancellation. Returns false once the job is terminal.
    pub(crate) fn cancel(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.terminal {
            return false;
        }
        state.cancel_requested = true;
        self.token.cancel();
        true
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel_requested
    }

    /// Whether progress may still be relayed.
    pub(crate) fn accepts_progress(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        !state.cancel_requested && !state.terminal
    }

    /// Mark the job terminal. Returns whether a cancel got in first.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.terminal = true;
        state.cancel_requested
    }
}

/// Cancels a job from anywhere, including from inside an event handler.
#[derive(Debug, Clone)]
pub struct JobCanceller {
    id: JobId,
    gate: Arc<JobGate>,
}

impl JobCanceller {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Best-effort cancellation. Returns false if the job already ended.
    pub fn cancel(&self) -> bool {
        let accepted = self.gate.cancel();
        if accepted {
            tracing::info!(job_id = %self.id, "Cancellation requested");
        }
        accepted
    }
}

/// Caller's handle on a running job.
#[derive(Debug)]
pub struct JobHandle {
    canceller: JobCanceller,
    state: watch::Receiver<JobState>,
    task: JoinHandle<JobOutcome>,
}

impl JobHandle {
    pub(crate) fn new(
        id: JobId,
        gate: Arc<JobGate>,
        state: watch::Receiver<JobState>,
        task: JoinHandle<JobOutcome>,
    ) -> Self {
        Self {
            canceller: JobCanceller { id, gate },
            state,
            task,
        }
    }

    pub fn id(&self) -> JobId {
        self.canceller.id
    }

    /// Current lifecycle state.
    pub fn state(&self) -> JobState {
        *self.state.borrow()
    }

    /// A receiver that observes every state the job publishes.
    pub fn watch_state(&self) -> watch::Receiver<JobState> {
        self.state.clone()
    }

    pub fn canceller(&self) -> JobCanceller {
        self.canceller.clone()
    }

    pub fn cancel(&self) -> bool {
        self.canceller.cancel()
    }

    /// Wait for the job to reach a terminal state.
    pub async fn wait(self) -> JobOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(job_id = %self.canceller.id, error = %e, "Render job task failed");
                JobOutcome::Failed {
                    code: "INTERNAL".to_string(),
                    message: format!("render job task failed: {e}"),
                }
            }
        }
    }
}
