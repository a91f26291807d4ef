//! Client capability probing.
//!
//! Reads are synchronous and cheap: memory from the OS, parallelism from
//! the standard library. The tier is derived from both against the
//! thresholds in [`AssessorConfig`].

use rendermode_common::config::AssessorConfig;
use serde::{Deserialize, Serialize};
use sysinfo::System;

use crate::ClientTier;

/// What the client machine offers right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientCapabilities {
    pub tier: ClientTier,
    pub available_memory_mb: u64,
    pub hardware_concurrency: u32,
    pub supports_threaded_wasm: bool,
}

/// Source of client capability readings.
pub trait ClientProbe: Send + Sync {
    /// Take a reading. Must not block for long; it runs on the caller's task.
    fn read(&self) -> ClientCapabilities;

    /// Probe name for logging.
    fn name(&self) -> &str;
}

/// Reads the host this process runs on.
pub struct SystemClientProbe {
    config: AssessorConfig,
}

impl SystemClientProbe {
    pub fn new(config: AssessorConfig) -> Self {
        Self { config }
    }
}

impl ClientProbe for SystemClientProbe {
    fn read(&self) -> ClientCapabilities {
        let mut sys = System::new();
        sys.refresh_memory();
        let available_memory_mb = sys.available_memory() / 1024 / 1024;

        let hardware_concurrency = std::thread::available_parallelism()
            .map(|n| n.get() as u32)
            .unwrap_or(1);

        let tier = classify_tier(available_memory_mb, hardware_concurrency, &self.config);

        tracing::debug!(
            available_memory_mb,
            hardware_concurrency,
            tier = %tier,
            "Read client capabilities"
        );

        ClientCapabilities {
            tier,
            available_memory_mb,
            hardware_concurrency,
            supports_threaded_wasm: hardware_concurrency > 1,
        }
    }

    fn name(&self) -> &str {
        "system"
    }
}

/// Fixed readings, for tests and for overriding detection from the CLI.
#[derive(Debug, Clone)]
pub struct StaticClientProbe(pub ClientCapabilities);

impl ClientProbe for StaticClientProbe {
    fn read(&self) -> ClientCapabilities {
        self.0.clone()
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Classify hardware into a tier. Both memory and cores must meet a tier's
/// minimum for the client to reach it.
pub fn classify_tier(memory_mb: u64, cores: u32, config: &AssessorConfig) -> ClientTier {
    if memory_mb >= config.high_tier_memory_mb && cores >= config.high_tier_cores {
        ClientTier::High
    } else if memory_mb >= config.medium_tier_memory_mb && cores >= config.medium_tier_cores {
        ClientTier::Medium
    } else {
        ClientTier::Low
    }
}
