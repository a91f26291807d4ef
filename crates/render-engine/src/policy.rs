//! Venue decision policy.
//!
//! `decide` is a pure function of its inputs: same assessment, complexity
//! and override in, same [`Decision`] out. Rules apply in priority order:
//!
//! 1. A forced override wins.
//! 2. An unreachable server leaves local as the only venue.
//! 3. Weak client hardware goes remote.
//! 4. An overloaded server goes local when the client can cope.
//! 5. Otherwise project complexity picks the venue.
//!
//! Every decision echoes the numbers that drove its branch in `metrics`.

use std::collections::BTreeMap;

use rendermode_capability::{Assessment, ClientTier};
use rendermode_common::config::PolicyConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::request::{Venue, VenueOverride};

pub const REASON_USER_OVERRIDE: &str = "user override";
pub const REASON_SERVER_UNREACHABLE: &str = "server unreachable";
pub const REASON_CLIENT_INSUFFICIENT: &str = "client hardware insufficient";
pub const REASON_SERVER_OVERLOADED: &str = "server overloaded";
pub const REASON_OVERLOADED_NO_ALTERNATIVE: &str =
    "server overloaded, client insufficient — proceeding remote";
pub const REASON_CLIENT_SUFFICIENT: &str = "client hardware sufficient";
pub const REASON_COMPLEXITY_EXCEEDED: &str = "project complexity exceeds local threshold";

/// How much the assessment behind a decision can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    /// The assessment ran out of time and carries local readings only.
    Reduced,
}

/// A venue choice and why it was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub mode: Venue,
    pub reason: String,
    pub metrics: BTreeMap<String, Value>,
    pub confidence: Confidence,
}

impl Decision {
    fn new(mode: Venue, reason: &str, confidence: Confidence) -> Self {
        Self {
            mode,
            reason: reason.to_string(),
            metrics: BTreeMap::new(),
            confidence,
        }
    }

    fn metric(mut self, key: &str, value: Value) -> Self {
        self.metrics.insert(key.to_string(), value);
        self
    }
}

/// The venue policy with its thresholds.
#[derive(Debug, Clone, Default)]
pub struct DecisionPolicy {
    config: PolicyConfig,
}

impl DecisionPolicy {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Pick a venue for a render.
    pub fn decide(
        &self,
        assessment: &Assessment,
        project_complexity: f64,
        venue_override: VenueOverride,
    ) -> Decision {
        let confidence = if assessment.degraded {
            Confidence::Reduced
        } else {
            Confidence::High
        };
        let tier = assessment.client_tier.as_str();

        if let Some(venue) = venue_override.forced() {
            return Decision::new(venue, REASON_USER_OVERRIDE, Confidence::High)
                .metric("override", json!(venue.as_str()));
        }

        if !assessment.server_reachable {
            return Decision::new(Venue::Local, REASON_SERVER_UNREACHABLE, confidence)
                .metric("serverReachable", json!(false))
                .metric("clientTier", json!(tier))
                .metric("assessmentDegraded", json!(assessment.degraded));
        }

        let memory_short = assessment.available_memory_mb < self.config.memory_floor_mb;
        if assessment.client_tier == ClientTier::Low || memory_short {
            return Decision::new(Venue::Remote, REASON_CLIENT_INSUFFICIENT, confidence)
                .metric("clientTier", json!(tier))
                .metric("availableMemory", json!(assessment.available_memory_mb))
                .metric("memoryFloor", json!(self.config.memory_floor_mb))
                .metric("serverLoad", json!(assessment.server_load));
        }

        if let Some(load) = assessment.server_load {
            if load > self.config.load_ceiling {
                // Rule 3 already sent low-tier clients remote, so any client
                // reaching this point is at least medium.
                let (venue, reason) = if assessment.client_tier >= ClientTier::Medium {
                    (Venue::Local, REASON_SERVER_OVERLOADED)
                } else {
                    (Venue::Remote, REASON_OVERLOADED_NO_ALTERNATIVE)
                };
                return Decision::new(venue, reason, confidence)
                    .metric("serverLoad", json!(load))
                    .metric("loadCeiling", json!(self.config.load_ceiling))
                    .metric("clientTier", json!(tier));
            }
        }

        let (venue, reason) = if project_complexity < self.config.complexity_threshold {
            (Venue::Local, REASON_CLIENT_SUFFICIENT)
        } else {
            (Venue::Remote, REASON_COMPLEXITY_EXCEEDED)
        };
        Decision::new(venue, reason, confidence)
            .metric("projectComplexity", json!(project_complexity))
            .metric("complexityThreshold", json!(self.config.complexity_threshold))
            .metric("clientTier", json!(tier))
            .metric("serverLoad", json!(assessment.server_load))
    }

    /// Re-decide after `failed_venue` produced a fallback-eligible failure.
    ///
    /// The policy runs with the override forced to the untried venue; the
    /// resulting decision is relabelled so the event stream shows it as a
    /// fallback and records what failed.
    pub fn decide_fallback(
        &self,
        assessment: &Assessment,
        project_complexity: f64,
        failed_venue: Venue,
        failure_code: &str,
    ) -> Decision {
        let mut decision = self.decide(
            assessment,
            project_complexity,
            VenueOverride::from(failed_venue.other()),
        );
        decision.reason = format!("fallback after {failed_venue} failure");
        decision
            .metric("fallbackFrom", json!(failed_venue.as_str()))
            .metric("failure", json!(failure_code))
    }
}
