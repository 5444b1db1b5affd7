//! Durable state for the cluster-expansion orchestrator: the phase log
//! and the filesystem-only portion of the segment template build.

pub mod phase_log;
pub mod segment_template;

pub use phase_log::{PhaseEntry, PhaseLog, PhaseLogError};
pub use segment_template::{TemplateBuildResult, TemplateBuilder, TemplateError, TrustEntry};
