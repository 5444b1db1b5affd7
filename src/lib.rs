//! # gpexpand
//!
//! A cluster-expansion orchestrator for a Greenplum-style MPP database:
//! it adds segment hosts to a running cluster and redistributes existing
//! table data onto them.
//!
//! # Quick Start
//!
//! ```no_run
//! use gpexpand::{LifecycleController, LifecycleConfig};
//! use gpexpand_concurrency::BatchPool;
//!
//! fn main() -> gpexpand::Result<()> {
//!     let config = LifecycleConfig::from_input_file("/tmp/segments.conf")?;
//!     let mut controller = LifecycleController::new(config, "/data/coordinator")?;
//!     let pool = BatchPool::new(4);
//!     // `session` and `executor` wire in the caller's SqlSession/RemoteExecutor.
//!     // controller.run(&mut session, &executor, &pool)?;
//!     Ok(())
//! }
//! ```
//!
//! # Phases
//!
//! | Phase | Purpose |
//! |-------|---------|
//! | **Template** | Build a segment-directory template and distribute it to new hosts |
//! | **Segments** | Bring new segment instances online and record them in the catalog |
//! | **Catalog** | Snapshot the catalog, then add new segment rows |
//! | **Schema** | Create the `expand` bookkeeping schema and enumerate redistribution work |
//! | **Populate** | Redistribute table data across the expanded cluster |
//!
//! Progress through these phases is durable (see [`gpexpand_durability::PhaseLog`])
//! and resumable: re-running the tool against an in-progress expansion picks
//! up from the last completed phase instead of starting over.
//!
//! # Architecture
//!
//! [`LifecycleController`] is the single entry point; all other
//! orchestration (segment template building, redistribution, rollback) is
//! reached through it. Internal crates (`gpexpand-durability`,
//! `gpexpand-concurrency`, `gpexpand-catalog`) are implementation details
//! of `gpexpand-engine`; only the API re-exported here is stable.

pub use gpexpand_core::error::{GpExpandError, GpResult as Result};
pub use gpexpand_core::types::{Phase, SegmentSet, SegmentSpec};
pub use gpexpand_engine::*;
