//! Clock and timing utilities for render jobs.
//!
//! Every job is anchored to a monotonic epoch taken when it is accepted.
//! This module provides:
//! - The job clock (monotonic elapsed + wall-clock anchor)
//! - Deadlines derived from that clock
//! - Pacing for progress relays

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

/// A job clock that provides monotonic timings relative to a fixed epoch
/// (the moment the job was accepted).
#[derive(Debug, Clone)]
pub struct JobClock {
    /// The instant the job started.
    epoch: Instant,

    /// Wall-clock time at epoch.
    epoch_wall: DateTime<Utc>,
}

impl JobClock {
    /// Create a new clock anchored to now.
    pub fn start() -> Self {
        Self {
            epoch: Instant::now(),
            epoch_wall: Utc::now(),
        }
    }

    /// Time elapsed since the epoch.
    pub fn elapsed(&self) -> Duration {
        self.epoch.elapsed()
    }

    /// Milliseconds elapsed since the epoch.
    pub fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    /// Wall-clock time at the epoch.
    pub fn epoch_wall(&self) -> DateTime<Utc> {
        self.epoch_wall
    }

    /// A deadline `budget` after now.
    pub fn deadline_in(&self, budget: Duration) -> Deadline {
        Deadline {
            at: Instant::now() + budget,
        }
    }
}

/// A point in monotonic time after which an operation counts as overdue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    at: Instant,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
        }
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn remaining(&self) -> Duration {
        self.at.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// The underlying instant.
    pub fn instant(&self) -> Instant {
        self.at
    }
}

/// Paces progress relays so a slow subscriber is not flooded.
///
/// A report passes when the minimum interval has elapsed since the last
/// relayed report, or when it reaches 100%. Skipped reports are superseded
/// by the next one that passes, which always carries an equal or higher
/// percentage.
#[derive(Debug)]
pub struct ProgressPacer {
    min_interval: Duration,
    last_relay: Option<Instant>,
}

impl ProgressPacer {
    /// Create a pacer with the given minimum spacing. Zero relays everything.
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_relay: None,
        }
    }

    /// Check whether a report at `percent` should be relayed at `now`.
    /// Returns true and updates internal state if so. The first call always
    /// returns true.
    pub fn should_relay(&mut self, percent: f64, now: Instant) -> bool {
        let due = match self.last_relay {
            None => true,
            Some(last) => {
                self.min_interval.is_zero()
                    || percent >= 100.0
                    || now.saturating_duration_since(last) >= self.min_interval
            }
        };
        if due {
            self.last_relay = Some(now);
        }
        due
    }

    /// Minimum spacing between relays.
    pub fn interval(&self) -> Duration {
        self.min_interval
    }
}
