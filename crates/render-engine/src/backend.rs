//! Render backend abstraction.
//!
//! A backend performs one render attempt at one venue. The coordinator
//! drives local and remote backends through the same contract: report
//! progress through the [`ProgressSink`], stop early when the cancellation
//! token fires, and finish with a result or a [`BackendFailure`].

use std::sync::{Arc, Mutex, PoisonError};

use rendermode_capability::Assessment;
use rendermode_common::clock::Deadline;
use tokio_util::sync::CancellationToken;

use crate::events::{ProgressEvent, RenderStatus};
use crate::request::{RenderRequest, RenderResult, Venue};

/// Classes of backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Local encode ran out of memory.
    OutOfMemory,
    /// Remote facility could not be reached.
    ServerUnreachable,
    /// Remote facility failed on its side.
    ServerError,
    /// The attempt overran the coordinator's deadline.
    DeadlineExceeded,
    /// The backend produced output that cannot be used.
    MalformedOutput,
    /// The codec refused the project.
    CodecRejected,
    Cancelled,
    Internal,
}

impl FailureKind {
    /// Whether the alternate venue may still succeed.
    pub fn is_fallback_eligible(self) -> bool {
        matches!(
            self,
            Self::OutOfMemory | Self::ServerUnreachable | Self::ServerError | Self::DeadlineExceeded
        )
    }

    /// Code reported in the terminal error event.
    pub fn code(self) -> &'static str {
        match self {
            Self::OutOfMemory => "OUT_OF_MEMORY",
            Self::ServerUnreachable => "SERVER_UNREACHABLE",
            Self::ServerError => "SERVER_ERROR",
            Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Self::MalformedOutput => "MALFORMED_OUTPUT",
            Self::CodecRejected => "CODEC_REJECTED",
            Self::Cancelled => "CANCELLED",
            Self::Internal => "INTERNAL",
        }
    }
}

/// A failed render attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} ({})", .kind.code())]
pub struct BackendFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl BackendFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self::new(FailureKind::OutOfMemory, message)
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ServerUnreachable, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ServerError, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(FailureKind::MalformedOutput, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(FailureKind::CodecRejected, message)
    }

    pub fn cancelled() -> Self {
        Self::new(FailureKind::Cancelled, "Render cancelled")
    }

    pub fn deadline_exceeded(venue: Venue) -> Self {
        Self::new(
            FailureKind::DeadlineExceeded,
            format!("{venue} render exceeded its deadline"),
        )
    }

    pub fn is_fallback_eligible(&self) -> bool {
        self.kind.is_fallback_eligible()
    }

    pub fn code(&self) -> &'static str {
        self.kind.code()
    }
}

type ProgressFn = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Progress reporter handed to a backend for one attempt.
///
/// Percentages are clamped to `[0, 100]` and never go backwards within the
/// attempt; a report lower than the previous one is raised to it. The
/// forward callback runs under the sink's lock and must not report back
/// into the same sink.
#[derive(Clone)]
pub struct ProgressSink {
    forward: ProgressFn,
    last: Arc<Mutex<f64>>,
}

impl ProgressSink {
    pub fn new<F>(forward: F) -> Self
    where
        F: Fn(ProgressEvent) + Send + Sync + 'static,
    {
        Self {
            forward: Arc::new(forward),
            last: Arc::new(Mutex::new(0.0)),
        }
    }

    pub fn report(&self, percent: f64, status: RenderStatus, message: Option<String>) {
        let percent = if percent.is_finite() {
            percent.clamp(0.0, 100.0)
        } else {
            0.0
        };
        // Held across the forward so clones reporting from several threads
        // cannot deliver out of order.
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        *last = last.max(percent);
        (self.forward)(ProgressEvent {
            percent: *last,
            status,
            message,
        });
    }

    pub fn rendering(&self, percent: f64) {
        self.report(percent, RenderStatus::Rendering, None);
    }

    /// Highest percentage reported so far.
    pub fn last_percent(&self) -> f64 {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSink")
            .field("last", &self.last_percent())
            .finish()
    }
}

/// Everything a backend gets from the coordinator besides the request.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub progress: ProgressSink,
    pub cancel: CancellationToken,
    pub deadline: Deadline,
    /// The snapshot the venue was decided on.
    pub assessment: Arc<Assessment>,
}

/// Trait for render venue backends.
#[async_trait::async_trait]
pub trait RenderBackend: Send + Sync {
    /// Venue this backend renders at.
    fn venue(&self) -> Venue;

    /// Backend name for logging.
    fn name(&self) -> &str;

    /// Run one render attempt to completion, failure or cancellation.
    async fn render(
        &self,
        request: &RenderRequest,
        ctx: RenderContext,
    ) -> Result<RenderResult, BackendFailure>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_eligibility() {
        assert!(FailureKind::OutOfMemory.is_fallback_eligible());
        assert!(FailureKind::ServerUnreachable.is_fallback_eligible());
        assert!(FailureKind::ServerError.is_fallback_eligible());
        assert!(FailureKind::DeadlineExceeded.is_fallback_eligible());
        assert!(!FailureKind::MalformedOutput.is_fallback_eligible());
        assert!(!FailureKind::CodecRejected.is_fallback_eligible());
        assert!(!FailureKind::Cancelled.is_fallback_eligible());
        assert!(!FailureKind::Internal.is_fallback_eligible());
    }

    #[test]
    fn failure_display_includes_code() {
        let failure = BackendFailure::out_of_memory("needs 3 GiB");
        assert_eq!(failure.to_string(), "needs 3 GiB (OUT_OF_MEMORY)");
        assert_eq!(BackendFailure::cancelled().code(), "CANCELLED");
    }

    #[test]
    fn progress_sink_clamps_and_never_regresses() {
        let seen = Arc::new(Mutex::new(vec![]));
        let sink_seen = seen.clone();
        let sink = ProgressSink::new(move |p| sink_seen.lock().unwrap().push(p.percent));

        sink.rendering(-5.0);
        sink.rendering(40.0);
        sink.rendering(30.0);
        sink.clone().rendering(150.0);
        sink.rendering(f64::NAN);

        assert_eq!(*seen.lock().unwrap(), vec![0.0, 40.0, 40.0, 100.0, 100.0]);
        assert_eq!(sink.last_percent(), 100.0);
    }

    #[test]
    fn progress_sink_stays_monotonic_across_threads() {
        for _ in 0..50 {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let sink_seen = seen.clone();
            let sink = ProgressSink::new(move |p| sink_seen.lock().unwrap().push(p.percent));

            let workers: Vec<_> = (0..4)
                .map(|worker| {
                    let sink = sink.clone();
                    std::thread::spawn(move || {
                        for step in 0..25 {
                            sink.rendering((step * 4 + worker) as f64);
                        }
                    })
                })
                .collect();
            for worker in workers {
                worker.join().unwrap();
            }

            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 100);
            assert!(seen.windows(2).all(|w| w[0] <= w[1]), "regressed: {seen:?}");
        }
    }
}
