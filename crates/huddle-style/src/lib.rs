//! Huddle Style - Per-user and per-group style models
//!
//! Features are extracted from a subject's own (non-generated) messages and
//! rendered into an instruction prompt that conditions the agents.

pub mod features;
pub mod prompt;
pub mod scheduler;

pub use features::{extract_features, FeatureLimits};
pub use prompt::render_prompt;
pub use scheduler::{is_due, StyleScheduler};
