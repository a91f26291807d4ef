//! Application configuration.
//!
//! Policy thresholds are carried in an explicit [`PolicyConfig`] that is
//! handed to the decision policy, never read from ambient state.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Global application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Venue decision thresholds.
    pub policy: PolicyConfig,

    /// Capability assessment tuning.
    pub assessor: AssessorConfig,

    /// Render lifecycle tuning.
    pub coordinator: CoordinatorConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Thresholds consulted by the venue decision policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Below this much available client memory the client is treated as insufficient.
    pub memory_floor_mb: u64,

    /// Server load above this value (in `[0.0, 1.0]`) counts as overloaded.
    pub load_ceiling: f64,

    /// Projects scoring at or above this complexity are sent remote.
    pub complexity_threshold: f64,
}

/// Capability assessor tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssessorConfig {
    /// Overall budget for one assessment.
    pub timeout_ms: u64,

    /// Budget for the server reachability probe (clamped to `timeout_ms`).
    pub probe_timeout_ms: u64,

    /// Render server status endpoint. `None` means no server is configured.
    pub server_status_url: Option<String>,

    /// Minimum memory/cores for the `medium` client tier.
    pub medium_tier_memory_mb: u64,
    pub medium_tier_cores: u32,

    /// Minimum memory/cores for the `high` client tier.
    pub high_tier_memory_mb: u64,
    pub high_tier_cores: u32,
}

/// Render coordinator tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Overall deadline handed to each backend attempt.
    pub render_deadline_ms: u64,

    /// How long a backend may take to wind down after cancellation.
    pub cancel_grace_ms: u64,

    /// Remote job status polling interval.
    pub remote_poll_interval_ms: u64,

    /// Minimum spacing between relayed progress events (0 relays all).
    pub progress_min_interval_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "rendermode=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            memory_floor_mb: 2048,
            load_ceiling: 0.85,
            complexity_threshold: 100.0,
        }
    }
}

impl Default for AssessorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            probe_timeout_ms: 1000,
            server_status_url: None,
            medium_tier_memory_mb: 4096,
            medium_tier_cores: 4,
            high_tier_memory_mb: 8192,
            high_tier_cores: 8,
        }
    }
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            render_deadline_ms: 600_000,
            cancel_grace_ms: 2000,
            remote_poll_interval_ms: 500,
            progress_min_interval_ms: 0,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AssessorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Probe budget, never longer than the overall assessment budget.
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms.min(self.timeout_ms))
    }
}

impl CoordinatorConfig {
    pub fn render_deadline(&self) -> Duration {
        Duration::from_millis(self.render_deadline_ms)
    }

    pub fn cancel_grace(&self) -> Duration {
        Duration::from_millis(self.cancel_grace_ms)
    }

    pub fn remote_poll_interval(&self) -> Duration {
        Duration::from_millis(self.remote_poll_interval_ms.max(1))
    }

    pub fn progress_min_interval(&self) -> Duration {
        Duration::from_millis(self.progress_min_interval_ms)
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }

    /// Where [`AppConfig::load`] looks for the config file.
    pub fn path() -> PathBuf {
        config_file_path()
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("rendermode").join("config.json")
}
