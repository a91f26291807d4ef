//! Rendermode Project Model
//!
//! Defines the declarative document a render request carries:
//! - **Project:** Schema version, output settings, and an ordered list of tracks
//! - **Clips:** Video, audio, image and text clips placed on the timeline
//! - **Effects:** Fade and blur effects attached to clips
//! - **Validation:** Range, identity and version checks run before any render
//! - **Complexity:** A cheap structural score used by the venue policy
//!
//! Timeline values (`start`, `duration`, `trimStart`) are in seconds.

pub mod complexity;
pub mod project;
pub mod validate;

pub use complexity::*;
pub use project::*;
pub use validate::*;
