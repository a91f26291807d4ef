//! Rendermode Render Engine
//!
//! Decides, per render request, whether to encode in the requesting
//! process or on the render server, then drives the chosen backend
//! through one lifecycle and reports it as a typed event stream.
//!
//! # Pipeline Architecture
//!
//! ```text
//! RenderRequest ──► validate ──► Assessor ──► DecisionPolicy ──► decision
//!                                                    ▲               │
//!                                                    │               ▼
//!                                        fallback (once)      RenderBackend
//!                                                    │        (local | remote)
//!                                                    │               │
//!                                                    └── eligible ◄──┤
//!                                                        failure     ▼
//!                                                          progress* → complete | error
//! ```
//!
//! Every job emits exactly one terminal event, and at most two decisions.

pub mod backend;
pub mod coordinator;
pub mod events;
pub mod job;
pub mod local;
pub mod policy;
pub mod remote;
pub mod request;
pub mod sim;

pub use backend::{BackendFailure, FailureKind, ProgressSink, RenderBackend, RenderContext};
pub use coordinator::{RenderCoordinator, StartError};
pub use events::*;
pub use job::{JobCanceller, JobHandle, JobId, JobOutcome, JobState, CANCELLED_CODE};
pub use local::{EncodeError, EncodeJob, LocalBackend, LocalEncoder};
pub use policy::{Confidence, Decision, DecisionPolicy};
pub use remote::{
    JobSubmitter, RemoteBackend, RemoteJobId, RemoteJobState, RemoteJobStatus, SubmitError,
};
pub use request::{RenderRequest, RenderResult, Venue, VenueOverride};
pub use sim::{InMemoryRenderFarm, SimulatedEncoder};
