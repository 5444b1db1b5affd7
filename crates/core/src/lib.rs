//! Shared data model, error taxonomy, and external-collaborator contracts
//! for the cluster-expansion orchestrator.
//!
//! This crate has no filesystem or network side effects of its own: every
//! other `gpexpand-*` crate depends on it for the vocabulary (`SegmentSpec`,
//! `Phase`, `TableWorkItem`, …) and the two traits (`SqlSession`,
//! `RemoteExecutor`) that keep the orchestrator free of a concrete
//! database or SSH dependency.

pub mod error;
pub mod format;
pub mod testing;
pub mod traits;
pub mod types;

pub use error::{GpExpandError, GpResult};
pub use traits::{CommandOutcome, InterviewHook, RemoteCommand, RemoteExecutor, Row, SqlSession};
pub use types::{
    ContentRow, GlobalEvent, Phase, Rank, SegmentRole, SegmentSet, SegmentSpec, TableWorkItem,
    WorkStatus,
};
