//! Capability assessor: one bounded snapshot per decision.

use std::sync::Arc;
use std::time::Duration;

use rendermode_common::config::AssessorConfig;

use crate::client::{ClientProbe, SystemClientProbe};
use crate::server::{HttpServerProbe, ProbeError, ServerProbe, UnreachableServerProbe};
use crate::Assessment;

/// Combines a client probe and a server probe into an [`Assessment`].
///
/// `assess` never fails and never outlives its budget. The server probe gets
/// its own shorter budget; when it fails the assessment carries
/// `server_reachable = false` and no load. There are no retries.
#[derive(Clone)]
pub struct Assessor {
    client: Arc<dyn ClientProbe>,
    server: Arc<dyn ServerProbe>,
    probe_timeout: Duration,
}

impl Assessor {
    pub fn new(
        client: Arc<dyn ClientProbe>,
        server: Arc<dyn ServerProbe>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            client,
            server,
            probe_timeout,
        }
    }

    /// Assessor for this host: system client probe, plus an HTTP probe when
    /// a status URL is configured.
    pub fn from_config(config: &AssessorConfig) -> Self {
        let server: Arc<dyn ServerProbe> = match &config.server_status_url {
            Some(url) => Arc::new(HttpServerProbe::new(url.clone())),
            None => Arc::new(UnreachableServerProbe),
        };
        Self::new(
            Arc::new(SystemClientProbe::new(config.clone())),
            server,
            config.probe_timeout(),
        )
    }

    /// Take a fresh snapshot within `timeout`.
    pub async fn assess(&self, timeout: Duration) -> Assessment {
        let client = self.client.read();
        let assessment = Assessment::local_only(&client);

        let probe_budget = self.probe_timeout.min(timeout);
        let outcome = tokio::time::timeout(probe_budget, self.server.probe(probe_budget)).await;

        match outcome {
            Ok(Ok(status)) => {
                tracing::debug!(
                    probe = self.server.name(),
                    load = status.load,
                    queue_depth = ?status.queue_depth,
                    "Server status received"
                );
                assessment.with_server(&status)
            }
            // Only running out of the overall budget degrades the snapshot;
            // the probe's own shorter timeout is an ordinary probe failure.
            Ok(Err(ProbeError::Timeout(_))) | Err(_) if probe_budget < timeout => {
                tracing::info!(
                    probe = self.server.name(),
                    timeout_ms = probe_budget.as_millis() as u64,
                    "Server probe timed out"
                );
                assessment
            }
            Ok(Err(ProbeError::Timeout(_))) | Err(_) => {
                tracing::warn!(
                    probe = self.server.name(),
                    budget_ms = probe_budget.as_millis() as u64,
                    "Server probe exceeded assessment budget"
                );
                Assessment {
                    degraded: true,
                    ..assessment
                }
            }
            Ok(Err(e)) => {
                tracing::info!(probe = self.server.name(), error = %e, "Server unreachable");
                assessment
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientCapabilities, StaticClientProbe};
    use crate::server::{ServerStatus, StaticServerProbe};
    use crate::ClientTier;

    fn client() -> Arc<dyn ClientProbe> {
        Arc::new(StaticClientProbe(ClientCapabilities {
            tier: ClientTier::Medium,
            available_memory_mb: 6000,
            hardware_concurrency: 4,
            supports_threaded_wasm: true,
        }))
    }

    fn status(load: f64) -> ServerStatus {
        ServerStatus {
            load,
            queue_depth: Some(3),
            estimated_wait_secs: Some(12.0),
        }
    }

    #[tokio::test]
    async fn reachable_server_fills_load() {
        let assessor = Assessor::new(
            client(),
            Arc::new(StaticServerProbe::new(status(0.2))),
            Duration::from_millis(1000),
        );
        let a = assessor.assess(Duration::from_millis(2000)).await;
        assert!(a.server_reachable);
        assert_eq!(a.server_load, Some(0.2));
        assert_eq!(a.client_tier, ClientTier::Medium);
        assert!(!a.degraded);
    }

    #[tokio::test]
    async fn unreachable_server_is_not_degraded() {
        let assessor = Assessor::new(
            client(),
            Arc::new(UnreachableServerProbe),
            Duration::from_millis(1000),
        );
        let a = assessor.assess(Duration::from_millis(2000)).await;
        assert!(!a.server_reachable);
        assert_eq!(a.server_load, None);
        assert!(!a.degraded);
        assert_eq!(a.available_memory_mb, 6000);
    }

    #[tokio::test]
    async fn slow_server_degrades_within_budget() {
        let assessor = Assessor::new(
            client(),
            Arc::new(StaticServerProbe::new(status(0.2)).with_delay(Duration::from_secs(30))),
            Duration::from_millis(1000),
        );
        let started = std::time::Instant::now();
        let a = assessor.assess(Duration::from_millis(50)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!a.server_reachable);
        assert!(a.degraded);
    }

    #[tokio::test]
    async fn server_timeout_within_budget_is_plain_unreachable() {
        let assessor = Assessor::new(
            client(),
            Arc::new(StaticServerProbe::new(status(0.2)).with_delay(Duration::from_secs(30))),
            Duration::from_millis(20),
        );
        let a = assessor.assess(Duration::from_millis(2000)).await;
        assert!(!a.server_reachable);
        assert_eq!(a.server_load, None);
        assert!(!a.degraded);
    }
}
