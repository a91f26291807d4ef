//! In-process render backend.
//!
//! The local backend drives an in-process [`LocalEncoder`] within the
//! limits the assessment measured: thread count from the client's
//! concurrency, and a memory pre-flight so an encode that cannot fit is
//! reported as out-of-memory before any frame is produced.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::{BackendFailure, FailureKind, RenderBackend, RenderContext};
use crate::events::RenderStatus;
use crate::request::{RenderRequest, RenderResult, Venue};

/// Bytes per pixel of an RGBA frame buffer.
const BYTES_PER_PIXEL: u64 = 4;

/// Frame buffers held besides the per-thread pair: one composite, one
/// encoder input.
const SHARED_FRAME_BUFFERS: u64 = 2;

/// Parameters for one encode.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub request: RenderRequest,
    pub threads: u32,
    pub total_frames: u64,
}

/// Why an encode stopped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("Encoder ran out of memory: {0}")]
    OutOfMemory(String),

    #[error("Encoder rejected the project: {0}")]
    Rejected(String),

    #[error("Encoder produced malformed output: {0}")]
    Malformed(String),

    #[error("Encode cancelled")]
    Cancelled,

    #[error("Encoder failed: {0}")]
    Other(String),
}

impl From<EncodeError> for BackendFailure {
    fn from(e: EncodeError) -> Self {
        match e {
            EncodeError::OutOfMemory(_) => BackendFailure::out_of_memory(e.to_string()),
            EncodeError::Rejected(_) => BackendFailure::rejected(e.to_string()),
            EncodeError::Malformed(_) => BackendFailure::malformed(e.to_string()),
            EncodeError::Cancelled => BackendFailure::cancelled(),
            EncodeError::Other(_) => BackendFailure::new(FailureKind::Internal, e.to_string()),
        }
    }
}

/// An in-process encode capability.
#[async_trait::async_trait]
pub trait LocalEncoder: Send + Sync {
    fn name(&self) -> &str;

    /// Encode `job`, reporting completion in `[0, 1]` through `progress`.
    /// Should return [`EncodeError::Cancelled`] promptly once `cancel` fires.
    async fn encode(
        &self,
        job: &EncodeJob,
        progress: &(dyn Fn(f64) + Send + Sync),
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, EncodeError>;
}

/// Renders in the caller's own process.
pub struct LocalBackend {
    encoder: Arc<dyn LocalEncoder>,
}

impl LocalBackend {
    pub fn new(encoder: Arc<dyn LocalEncoder>) -> Self {
        Self { encoder }
    }
}

/// Estimated peak working set of an encode, in MiB.
pub fn estimated_working_set_mb(width: u32, height: u32, threads: u32) -> u64 {
    let frame = u64::from(width) * u64::from(height) * BYTES_PER_PIXEL;
    let buffers = u64::from(threads.max(1)) * 2 + SHARED_FRAME_BUFFERS;
    (frame * buffers).div_ceil(1024 * 1024)
}

#[async_trait::async_trait]
impl RenderBackend for LocalBackend {
    fn venue(&self) -> Venue {
        Venue::Local
    }

    fn name(&self) -> &str {
        self.encoder.name()
    }

    async fn render(
        &self,
        request: &RenderRequest,
        ctx: RenderContext,
    ) -> Result<RenderResult, BackendFailure> {
        let assessment = &ctx.assessment;
        let threads = if assessment.supports_threaded_wasm {
            assessment.hardware_concurrency.max(1)
        } else {
            1
        };

        let needed_mb =
            estimated_working_set_mb(request.output.width, request.output.height, threads);
        if needed_mb > assessment.available_memory_mb {
            return Err(BackendFailure::out_of_memory(format!(
                "encode needs ~{needed_mb} MiB, {} MiB available",
                assessment.available_memory_mb
            )));
        }

        let job = EncodeJob {
            request: request.clone(),
            threads,
            total_frames: request.frame_count(),
        };

        tracing::info!(
            encoder = self.encoder.name(),
            threads,
            total_frames = job.total_frames,
            working_set_mb = needed_mb,
            "Starting local encode"
        );

        ctx.progress.report(0.0, RenderStatus::Queued, None);

        let sink = ctx.progress.clone();
        let progress = move |fraction: f64| sink.rendering(fraction * 100.0);
        let data = self.encoder.encode(&job, &progress, &ctx.cancel).await?;

        if data.is_empty() {
            return Err(BackendFailure::malformed("encoder returned no data"));
        }

        ctx.progress.report(100.0, RenderStatus::Done, None);

        Ok(RenderResult::local(data, request.output.format.mime_type()))
    }
}
