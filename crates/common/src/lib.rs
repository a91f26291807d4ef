//! Rendermode Common Utilities
//!
//! Shared infrastructure for all Rendermode crates:
//! - Error types and result aliases
//! - Clock, deadline and progress pacing utilities
//! - Tracing/logging initialization
//! - Configuration loading (policy thresholds, assessor and coordinator tuning)

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

pub use clock::*;
pub use config::*;
pub use error::*;
