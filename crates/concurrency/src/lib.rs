//! Worker pools and cancellation shared by the redistribution and
//! segment-distribution phases.

pub mod batch_pool;
pub mod cancellation;
pub mod table_pool;

pub use batch_pool::BatchPool;
pub use cancellation::CancellationToken;
pub use table_pool::{drain, DrainReport};
