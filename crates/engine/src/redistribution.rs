//! `RedistributionEngine`: drains `expand.status_detail` with up to `P`
//! concurrent workers, each owning two sessions (target database +
//! controller database), honoring a shared cancellation token and an
//! optional deadline.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gpexpand_concurrency::{drain, CancellationToken, DrainReport};
use gpexpand_core::error::GpResult;
use gpexpand_core::traits::SqlSession;
use gpexpand_core::types::TableWorkItem;
use tracing::{info, warn};

const CLAIM_NEXT_SQL: &str = "SELECT dbname, fq_name, schema_oid, table_oid, \
    distribution_policy_names, storage_options, rank, source_bytes \
    FROM expand.status_detail WHERE status = 'NOT STARTED' \
    ORDER BY rank ASC LIMIT 1 FOR UPDATE SKIP LOCKED";

/// Per-worker state: one session against the database being
/// redistributed, one against the controller's bookkeeping database.
pub struct WorkerSessions {
    pub target: Box<dyn SqlSession>,
    pub status: Box<dyn SqlSession>,
}

fn relation_exists_sql(schema_oid: u32, relation_oid: u32) -> String {
    format!(
        "SELECT 1 FROM pg_catalog.pg_class WHERE oid = {relation_oid} \
         AND relnamespace = {schema_oid}"
    )
}

fn alter_distributed_by_sql(item: &TableWorkItem) -> String {
    let distribution = if item.policy_names.is_empty() {
        "RANDOMLY".to_string()
    } else {
        format!("BY ({})", item.policy_names.join(", "))
    };
    let opts = if item.storage_options.is_empty() {
        String::new()
    } else {
        format!(",{}", item.storage_options)
    };
    format!(
        "ALTER TABLE ONLY {} SET WITH(REORGANIZE=TRUE{opts}) DISTRIBUTED {distribution}",
        item.fq_name
    )
}

fn mark_in_progress_sql(item: &TableWorkItem) -> String {
    format!(
        "UPDATE expand.status_detail SET status = 'IN PROGRESS', expansion_started = now() \
         WHERE dbname = '{}' AND schema_oid = {} AND table_oid = {}",
        item.database, item.schema_oid, item.relation_oid
    )
}

fn mark_completed_sql(item: &TableWorkItem) -> String {
    format!(
        "UPDATE expand.status_detail SET status = 'COMPLETED', expansion_finished = now() \
         WHERE dbname = '{}' AND schema_oid = {} AND table_oid = {}",
        item.database, item.schema_oid, item.relation_oid
    )
}

fn mark_no_longer_exists_sql(item: &TableWorkItem) -> String {
    format!(
        "UPDATE expand.status_detail SET status = 'NO LONGER EXISTS' \
         WHERE dbname = '{}' AND schema_oid = {} AND table_oid = {}",
        item.database, item.schema_oid, item.relation_oid
    )
}

fn reset_not_started_sql(item: &TableWorkItem) -> String {
    format!(
        "UPDATE expand.status_detail SET status = 'NOT STARTED' \
         WHERE dbname = '{}' AND schema_oid = {} AND table_oid = {}",
        item.database, item.schema_oid, item.relation_oid
    )
}

pub struct RedistributionEngine;

impl RedistributionEngine {
    /// Drains the queue. `make_sessions` is called once per worker
    /// thread to open its pair of sessions. If `deadline` is set, a
    /// watcher thread trips `cancel` once it elapses so in-flight
    /// workers observe it on their next poll boundary.
    pub fn run(
        parallelism: usize,
        cancel: &CancellationToken,
        deadline: Option<Duration>,
        simple_progress: bool,
        analyze_after: bool,
        make_sessions: impl Fn() -> WorkerSessions + Sync,
    ) -> GpResult<DrainReport> {
        let watcher_cancel = cancel.clone();
        let watcher = deadline.map(|d| {
            thread::spawn(move || {
                thread::sleep(d);
                watcher_cancel.cancel();
            })
        });

        let report = drain(
            parallelism,
            cancel,
            make_sessions,
            |state: &mut WorkerSessions| claim_next(state),
            move |state: &mut WorkerSessions, item: TableWorkItem| {
                process_item(state, item, simple_progress, analyze_after)
            },
        );

        if let Some(handle) = watcher {
            // The watcher either already fired or is now moot; detach it
            // rather than block the caller on a full deadline sleep.
            drop(handle);
        }

        if report.had_errors {
            warn!(target: "gpexpand::redistribution", "redistribution run completed with errors; re-run to retry");
        }
        info!(
            target: "gpexpand::redistribution",
            processed = report.items_processed,
            cancelled = report.items_cancelled,
            "redistribution drain finished"
        );
        Ok(report)
    }
}

fn claim_next(state: &mut WorkerSessions) -> Option<TableWorkItem> {
    let rows = state.status.query(CLAIM_NEXT_SQL).ok()?;
    let row = rows.first()?;
    let rank_num: i32 = row.get(6).unwrap_or("2").parse().unwrap_or(2);
    let rank = if rank_num == 1 {
        gpexpand_core::types::Rank::Unique
    } else {
        gpexpand_core::types::Rank::Ordinary
    };
    Some(TableWorkItem {
        database: row.get(0)?.to_string(),
        fq_name: row.get(1)?.to_string(),
        schema_oid: row.get(2)?.parse().ok()?,
        relation_oid: row.get(3)?.parse().ok()?,
        policy_colnums: Vec::new(),
        policy_names: row
            .get(4)
            .unwrap_or_default()
            .split(',')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        policy_coloids: Vec::new(),
        storage_options: row.get(5).unwrap_or_default().to_string(),
        rank,
        status: gpexpand_core::types::WorkStatus::NotStarted,
        started_at: None,
        finished_at: None,
        source_bytes: row.get(7).unwrap_or("0").parse().unwrap_or(0),
    })
}

fn process_item(
    state: &mut WorkerSessions,
    item: TableWorkItem,
    simple_progress: bool,
    analyze_after: bool,
) -> Result<(), String> {
    let exists = state
        .target
        .query(&relation_exists_sql(item.schema_oid, item.relation_oid))
        .map_err(|e| e.to_string())?;
    if exists.is_empty() {
        state
            .status
            .execute(&mark_no_longer_exists_sql(&item))
            .map_err(|e| e.to_string())?;
        return Ok(());
    }

    if !simple_progress {
        state
            .status
            .execute(&mark_in_progress_sql(&item))
            .map_err(|e| e.to_string())?;
    }

    let alter_result = state.target.execute(&alter_distributed_by_sql(&item));
    match alter_result {
        Ok(_) => {
            if analyze_after {
                let _ = state.target.execute(&format!("ANALYZE {}", item.fq_name));
            }
            state
                .status
                .execute(&mark_completed_sql(&item))
                .map_err(|e| e.to_string())?;
            Ok(())
        }
        Err(e) => {
            let _ = state.status.execute(&reset_not_started_sql(&item));
            Err(format!("{}: {e}", item.fq_name))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpexpand_core::testing::FakeSqlSession;
    use gpexpand_core::traits::Row;
    use std::sync::Mutex;

    fn sample_row() -> Row {
        Row {
            columns: vec![
                Some("mydb".into()),
                Some("public.a".into()),
                Some("1".into()),
                Some("2".into()),
                Some("c1".into()),
                Some("".into()),
                Some("1".into()),
                Some("100".into()),
            ],
        }
    }

    #[test]
    fn claim_next_parses_row_into_work_item() {
        let mut session = FakeSqlSession::new();
        session.push_rows(vec![sample_row()]);
        let mut state = WorkerSessions {
            target: Box::new(FakeSqlSession::new()),
            status: Box::new(session),
        };
        let item = claim_next(&mut state).unwrap();
        assert_eq!(item.fq_name, "public.a");
        assert_eq!(item.rank, gpexpand_core::types::Rank::Unique);
    }

    #[test]
    fn process_item_marks_no_longer_exists_when_relation_missing() {
        let mut target = FakeSqlSession::new();
        target.push_rows(vec![]);
        let status = FakeSqlSession::new();
        let mut state = WorkerSessions {
            target: Box::new(target),
            status: Box::new(status),
        };
        let item = TableWorkItem {
            database: "mydb".into(),
            schema_oid: 1,
            relation_oid: 2,
            fq_name: "public.a".into(),
            policy_colnums: vec![],
            policy_names: vec![],
            policy_coloids: vec![],
            storage_options: String::new(),
            rank: gpexpand_core::types::Rank::Ordinary,
            status: gpexpand_core::types::WorkStatus::NotStarted,
            started_at: None,
            finished_at: None,
            source_bytes: 0,
        };
        process_item(&mut state, item, false, false).unwrap();
    }

    #[test]
    fn run_processes_queue_across_workers() {
        let queue: Arc<Mutex<Vec<u32>>> = Arc::new(Mutex::new((0..10).collect()));
        let cancel = CancellationToken::new();
        let make_sessions = move || {
            let mut status = FakeSqlSession::new();
            if let Some(_next) = queue.lock().unwrap().pop() {
                status.push_rows(vec![sample_row()]);
            }
            let mut target = FakeSqlSession::new();
            target.push_rows(vec![sample_row()]);
            WorkerSessions {
                target: Box::new(target),
                status: Box::new(status),
            }
        };
        let report = RedistributionEngine::run(2, &cancel, None, false, false, make_sessions).unwrap();
        assert!(report.items_processed <= 10);
    }
}
