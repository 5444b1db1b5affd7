//! Segment distribution, redistribution, rollback, and the top-level
//! lifecycle controller that routes a single `gpexpand` invocation to the
//! right one of those, plus the pre-flight validation pass that gates the
//! prepare pipeline.

pub mod lifecycle;
pub mod planner;
pub mod preflight;
pub mod redistribution;
pub mod rollback;
pub mod template;

pub use lifecycle::{LifecycleAction, LifecycleConfig, LifecycleController};
pub use planner::RedistributionPlanner;
pub use redistribution::{RedistributionEngine, WorkerSessions};
pub use rollback::RollbackController;
pub use template::{distribute_template, DistributeReport};
