//! Pre-flight validation passes run before the prepare pipeline commits
//! to anything. Each pass is a thin query + classification step; a
//! failure here refuses to start instead of leaving the cluster in a
//! half-prepared state.

use gpexpand_core::error::{GpExpandError, GpResult};
use gpexpand_core::traits::SqlSession;

const SELECT_UNALTERABLE_COLUMNS: &str = "SELECT c.relname FROM pg_catalog.pg_attribute a \
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid \
    WHERE a.atttypid IN (SELECT oid FROM pg_catalog.pg_type WHERE typname IN ('money')) \
    AND c.relkind = 'r'";

const SELECT_HEAP_CHECKSUM_VERSIONS: &str =
    "SELECT DISTINCT data_checksums FROM pg_catalog.gp_segment_configuration_checksums";

const SELECT_MAX_CONNECTIONS: &str = "SHOW max_connections";

/// Tables with a column type that cannot survive `ALTER ... SET
/// DISTRIBUTED BY`; presence of any refuses the whole run unless the
/// caller passed `--silent` (carried by the CLI layer, not here).
pub fn validate_alterable_tables(session: &mut dyn SqlSession) -> GpResult<()> {
    let rows = session.query(SELECT_UNALTERABLE_COLUMNS)?;
    if !rows.is_empty() {
        let names: Vec<&str> = rows.iter().filter_map(|r| r.get(0)).collect();
        return Err(GpExpandError::Validation(format!(
            "the following tables have columns that cannot be redistributed: {}",
            names.join(", ")
        )));
    }
    Ok(())
}

/// Every segment must agree on whether heap page checksums are enabled;
/// a new segment initialized with a mismatched setting would corrupt
/// replay on failover.
pub fn validate_heap_checksums_consistent(session: &mut dyn SqlSession) -> GpResult<()> {
    let rows = session.query(SELECT_HEAP_CHECKSUM_VERSIONS)?;
    if rows.len() > 1 {
        return Err(GpExpandError::Validation(
            "segments disagree on heap checksum setting".into(),
        ));
    }
    Ok(())
}

/// `max_connections` must admit `2P + 1` sessions (two per
/// redistribution worker, one headroom connection) before the engine is
/// allowed to start.
pub fn validate_max_connections(session: &mut dyn SqlSession, parallelism: usize) -> GpResult<()> {
    let rows = session.query(SELECT_MAX_CONNECTIONS)?;
    let max_connections: usize = rows
        .first()
        .and_then(|r| r.get(0))
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| GpExpandError::Validation("could not read max_connections".into()))?;
    let required = 2 * parallelism + 1;
    if max_connections < required {
        return Err(GpExpandError::Validation(format!(
            "max_connections={max_connections} is below the {required} required for parallel={parallelism}"
        )));
    }
    Ok(())
}

/// Parallelism must be in `[1, 96]`.
pub fn validate_parallelism(parallelism: usize) -> GpResult<()> {
    if !(1..=96).contains(&parallelism) {
        return Err(GpExpandError::Validation(format!(
            "parallel must be between 1 and 96, got {parallelism}"
        )));
    }
    Ok(())
}

/// Batch size must be in `[1, 128]`.
pub fn validate_batch_size(batch_size: usize) -> GpResult<()> {
    if !(1..=128).contains(&batch_size) {
        return Err(GpExpandError::Validation(format!(
            "batch_size must be between 1 and 128, got {batch_size}"
        )));
    }
    Ok(())
}

/// A deadline strictly in the past at invocation time refuses to start.
pub fn validate_deadline_not_past(deadline: Option<chrono::DateTime<chrono::Utc>>) -> GpResult<()> {
    if let Some(d) = deadline {
        if d <= chrono::Utc::now() {
            return Err(GpExpandError::Validation(format!(
                "deadline {d} is already in the past"
            )));
        }
    }
    Ok(())
}
