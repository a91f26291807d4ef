//! Rendermode capability assessment.
//!
//! This crate produces the point-in-time [`Assessment`] that the venue
//! policy decides on: what the client machine can do right now, and how
//! busy the render server is, if it can be reached at all.

pub mod assessor;
pub mod client;
pub mod server;

pub use assessor::Assessor;
pub use client::{ClientCapabilities, ClientProbe, StaticClientProbe, SystemClientProbe};
pub use server::{
    HttpServerProbe, ProbeError, ServerProbe, ServerStatus, StaticServerProbe,
    UnreachableServerProbe,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Coarse client hardware class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientTier {
    Low,
    Medium,
    High,
}

impl ClientTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for ClientTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable snapshot of client capability and server load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessment {
    pub client_tier: ClientTier,

    /// Memory the client could devote to an encode, in MiB.
    #[serde(rename = "availableMemoryMB")]
    pub available_memory_mb: u64,

    /// Logical cores available to the process.
    pub hardware_concurrency: u32,

    /// Whether a multi-threaded in-process encode is possible.
    pub supports_threaded_wasm: bool,

    /// Server load in `[0.0, 1.0]`, when the server answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_load: Option<f64>,

    /// Jobs waiting on the server, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_queue_depth: Option<u32>,

    /// Server-estimated wait before a new job starts, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_estimated_wait_secs: Option<f64>,

    pub server_reachable: bool,

    pub measured_at: DateTime<Utc>,

    /// Set when the assessment budget ran out and only local fields were
    /// filled in.
    #[serde(default)]
    pub degraded: bool,
}

impl Assessment {
    /// Assessment built from client fields only, with the server treated as
    /// unreachable.
    pub fn local_only(client: &ClientCapabilities) -> Self {
        Self {
            client_tier: client.tier,
            available_memory_mb: client.available_memory_mb,
            hardware_concurrency: client.hardware_concurrency,
            supports_threaded_wasm: client.supports_threaded_wasm,
            server_load: None,
            server_queue_depth: None,
            server_estimated_wait_secs: None,
            server_reachable: false,
            measured_at: Utc::now(),
            degraded: false,
        }
    }

    /// Attach a server status report, marking the server reachable.
    pub fn with_server(mut self, status: &ServerStatus) -> Self {
        self.server_reachable = true;
        self.server_load = Some(status.load.clamp(0.0, 1.0));
        self.server_queue_depth = status.queue_depth;
        self.server_estimated_wait_secs = status.estimated_wait_secs;
        self
    }
}
