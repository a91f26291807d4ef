//! Render server load probing.
//!
//! A probe either returns a [`ServerStatus`] within its budget or fails.
//! Failure is never fatal to an assessment; it only marks the server
//! unreachable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Load report published by the render server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatus {
    /// Utilisation in `[0.0, 1.0]`.
    pub load: f64,

    #[serde(default)]
    pub queue_depth: Option<u32>,

    #[serde(default)]
    pub estimated_wait_secs: Option<f64>,
}

/// Why a probe produced no status.
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("Probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("Server unreachable: {0}")]
    Unreachable(String),

    #[error("Server returned status {0}")]
    Status(u16),

    #[error("Malformed status report: {0}")]
    Malformed(String),
}

/// Source of server load readings.
#[async_trait::async_trait]
pub trait ServerProbe: Send + Sync {
    /// Ask the server for its current load, giving up after `timeout`.
    async fn probe(&self, timeout: Duration) -> Result<ServerStatus, ProbeError>;

    /// Probe name for logging.
    fn name(&self) -> &str;
}

/// Reads `{load, queueDepth, estimatedWaitSecs}` JSON from a status URL.
pub struct HttpServerProbe {
    client: reqwest::Client,
    status_url: String,
}

impl HttpServerProbe {
    pub fn new(status_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            status_url: status_url.into(),
        }
    }
}

#[async_trait::async_trait]
impl ServerProbe for HttpServerProbe {
    async fn probe(&self, timeout: Duration) -> Result<ServerStatus, ProbeError> {
        let response = self
            .client
            .get(&self.status_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProbeError::Timeout(timeout)
                } else {
                    ProbeError::Unreachable(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let report: ServerStatus = response
            .json()
            .await
            .map_err(|e| ProbeError::Malformed(e.to_string()))?;

        if !report.load.is_finite() {
            return Err(ProbeError::Malformed(format!(
                "load is not a number: {}",
                report.load
            )));
        }

        Ok(report)
    }

    fn name(&self) -> &str {
        "http"
    }
}

/// Answers with a fixed status, optionally after a delay.
#[derive(Debug, Clone)]
pub struct StaticServerProbe {
    status: ServerStatus,
    delay: Duration,
}

impl StaticServerProbe {
    pub fn new(status: ServerStatus) -> Self {
        Self {
            status,
            delay: Duration::ZERO,
        }
    }

    /// Respond only after `delay`, to simulate a slow server.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl ServerProbe for StaticServerProbe {
    async fn probe(&self, timeout: Duration) -> Result<ServerStatus, ProbeError> {
        if self.delay > timeout {
            tokio::time::sleep(timeout).await;
            return Err(ProbeError::Timeout(timeout));
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.status.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// A server that never answers.
#[derive(Debug, Clone, Default)]
pub struct UnreachableServerProbe;

#[async_trait::async_trait]
impl ServerProbe for UnreachableServerProbe {
    async fn probe(&self, _timeout: Duration) -> Result<ServerStatus, ProbeError> {
        Err(ProbeError::Unreachable("no render server configured".to_string()))
    }

    fn name(&self) -> &str {
        "unreachable"
    }
}
