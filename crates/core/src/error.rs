//! Error taxonomy for the expansion orchestrator.
//!
//! `GpExpandError` is the unified error type returned by every public
//! operation in the `gpexpand-*` crates. Its six variants are the taxonomy
//! the controller distinguishes on: each one carries a different recovery
//! instruction for the operator (retry, rollback, none).

use thiserror::Error;

/// Result type alias used throughout the orchestrator crates.
pub type GpResult<T> = std::result::Result<T, GpExpandError>;

/// The six-member error taxonomy.
///
/// Each variant answers one question for the caller: can this be retried,
/// does it require `-r`, or is it unrecoverable by this tool at all.
#[derive(Debug, Error)]
pub enum GpExpandError {
    /// PhaseLog transition violated total order, or a write was attempted
    /// against a log that has already reached its terminal phase.
    #[error("invalid phase transition: {0}")]
    InvalidStatus(String),

    /// Pre-flight validation refused to start: insufficient max_connections,
    /// unalterable columns, heap-checksum mismatch, malformed input file.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A failure during the prepare pipeline, before the point of no return.
    #[error("expansion failed before point of no return: {0}")]
    Expansion(#[source] Box<GpExpandError>),

    /// A failure after PREPARE_DONE. No automated recovery is offered.
    #[error("failure past point of no return, manual recovery required: {0}")]
    PastPointOfNoReturn(String),

    /// A single redistribution worker's `ALTER` failed. The row is left
    /// `NOT STARTED` and the batch is marked as having had errors.
    #[error("table redistribution failed for {table}: {reason}")]
    TableExpand { table: String, reason: String },

    /// Deadline reached or cancellation signal observed.
    #[error("cancelled: {0}")]
    Cancelled(String),
}

impl GpExpandError {
    /// True for errors a caller may retry by simply re-running the tool.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GpExpandError::TableExpand { .. } | GpExpandError::Cancelled(_)
        )
    }

    /// True for errors with no automated recovery path left.
    pub fn is_fatal(&self) -> bool {
        matches!(self, GpExpandError::PastPointOfNoReturn(_))
    }

    /// True when the recommended recovery is `-r` (rollback).
    pub fn requires_rollback(&self) -> bool {
        matches!(
            self,
            GpExpandError::InvalidStatus(_) | GpExpandError::Expansion(_)
        )
    }

    pub fn expansion(cause: GpExpandError) -> Self {
        GpExpandError::Expansion(Box::new(cause))
    }
}

impl From<std::io::Error> for GpExpandError {
    fn from(e: std::io::Error) -> Self {
        GpExpandError::Validation(format!("I/O error: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_expand_and_cancelled_are_retryable() {
        let err = GpExpandError::TableExpand {
            table: "s.t".into(),
            reason: "lock timeout".into(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_fatal());

        let err = GpExpandError::Cancelled("deadline reached".into());
        assert!(err.is_retryable());
    }

    #[test]
    fn past_point_of_no_return_is_fatal_not_retryable() {
        let err = GpExpandError::PastPointOfNoReturn("catalog already rewritten".into());
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
    }

    #[test]
    fn invalid_status_and_expansion_require_rollback() {
        assert!(GpExpandError::InvalidStatus("bad jump".into()).requires_rollback());
        let wrapped = GpExpandError::expansion(GpExpandError::Validation("boom".into()));
        assert!(wrapped.requires_rollback());
    }

    #[test]
    fn display_messages_are_human_readable() {
        let err = GpExpandError::TableExpand {
            table: "public.orders".into(),
            reason: "relation does not exist".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("public.orders"));
        assert!(msg.contains("relation does not exist"));
    }
}
