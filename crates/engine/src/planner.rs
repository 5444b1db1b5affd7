//! `RedistributionPlanner`: seeds the durable `expand.status_detail`
//! work queue and nulls out distribution policies
//! so the database actually rewrites each table on `ALTER ... SET
//! DISTRIBUTED BY`.

use gpexpand_core::error::GpResult;
use gpexpand_core::traits::SqlSession;
use gpexpand_core::types::{Rank, TableWorkItem, WorkStatus};
use tracing::info;

const CREATE_SCHEMA_SQL: &str = "CREATE SCHEMA IF NOT EXISTS expand";

const CREATE_STATUS_TABLE_SQL: &str =
    "CREATE TABLE IF NOT EXISTS expand.status (status text, updated timestamp)";

const CREATE_STATUS_DETAIL_TABLE_SQL: &str = "CREATE TABLE IF NOT EXISTS expand.status_detail ( \
    dbname text, fq_name text, schema_oid oid, table_oid oid, \
    distribution_policy smallint[], distribution_policy_names text[], \
    distribution_policy_coloids oid[], storage_options text, rank smallint, \
    status text, expansion_started timestamp, expansion_finished timestamp, \
    source_bytes bigint, PRIMARY KEY (dbname, schema_oid, table_oid))";

const CREATE_RICH_VIEW_SQL: &str = "CREATE OR REPLACE VIEW expand.expansion_progress AS \
    SELECT dbname, fq_name, status, source_bytes, expansion_started, expansion_finished \
    FROM expand.status_detail";

const CREATE_SIMPLE_VIEW_SQL: &str = "CREATE OR REPLACE VIEW expand.expansion_progress AS \
    SELECT dbname, fq_name, status FROM expand.status_detail";

/// Every user database, skipping the immutable `template0`/`template1`
/// and the bootstrap `postgres` database, per SPEC_FULL.md §4.4.
const LIST_USER_DATABASES_SQL: &str = "SELECT datname FROM pg_catalog.pg_database \
    WHERE datistemplate = false AND datname != 'postgres' ORDER BY datname";

/// Pass (a): every non-external relation that is not itself a partition
/// root and not a leaf (deepest-level) partition member — plain tables
/// plus intermediate levels of a multi-level partition hierarchy.
/// Partition roots are skipped entirely: `ALTER TABLE ONLY` against a
/// root does not touch the physical data and redistributing the root
/// alone would leave every child still on its old policy.
const ENUMERATE_NONLEAF_TABLES_SQL: &str = "SELECT \
        n.nspname || '.' || c.relname, c.oid, n.oid, \
        p.attrnums, p.attnames, p.attcoloids, c.reloptions::text, \
        EXISTS (SELECT 1 FROM pg_catalog.pg_index i WHERE i.indrelid = c.oid AND i.indisunique), \
        pg_catalog.pg_relation_size(c.oid) \
    FROM pg_catalog.pg_class c \
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
    JOIN gp_distribution_policy p ON p.localoid = c.oid \
    WHERE c.relkind = 'r' AND n.nspname NOT IN ('pg_catalog', 'information_schema', 'gp_toolkit') \
      AND c.oid NOT IN (SELECT parrelid FROM pg_partition) \
      AND (c.oid NOT IN (SELECT parchildrelid FROM pg_partition_rule) \
           OR c.oid IN ( \
               SELECT pr.parchildrelid FROM pg_partition_rule pr \
               JOIN pg_partition lvl ON lvl.oid = pr.paroid \
               WHERE lvl.parlevel < ( \
                   SELECT max(deepest.parlevel) FROM pg_partition deepest \
                   WHERE deepest.parrelid = lvl.parrelid)))";

/// Pass (b): leaf partitions at the deepest partitioning level for each
/// root, the physical relations that actually hold rows and so are the
/// ones that must be redistributed.
const ENUMERATE_LEAF_TABLES_SQL: &str = "SELECT \
        n.nspname || '.' || c.relname, c.oid, n.oid, \
        p.attrnums, p.attnames, p.attcoloids, c.reloptions::text, \
        EXISTS (SELECT 1 FROM pg_catalog.pg_index i WHERE i.indrelid = c.oid AND i.indisunique), \
        pg_catalog.pg_relation_size(c.oid) \
    FROM pg_catalog.pg_class c \
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
    JOIN gp_distribution_policy p ON p.localoid = c.oid \
    JOIN pg_partition_rule pr ON pr.parchildrelid = c.oid \
    JOIN pg_partition lvl ON lvl.oid = pr.paroid \
    WHERE c.relkind = 'r' AND n.nspname NOT IN ('pg_catalog', 'information_schema', 'gp_toolkit') \
      AND lvl.parlevel = (SELECT max(deepest.parlevel) FROM pg_partition deepest \
                           WHERE deepest.parrelid = lvl.parrelid)";

/// Shared row decoder for both enumeration passes: the two queries
/// project the same column list, they just differ on which relations
/// they admit.
fn row_to_work_item(
    row: &gpexpand_core::traits::Row,
    database: &str,
    simple_progress: bool,
) -> TableWorkItem {
    let fq_name = row.get(0).unwrap_or_default().to_string();
    let table_oid: u32 = row.get(1).unwrap_or("0").parse().unwrap_or(0);
    let schema_oid: u32 = row.get(2).unwrap_or("0").parse().unwrap_or(0);
    let policy_names: Vec<String> = row
        .get(4)
        .unwrap_or_default()
        .split(',')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    let storage_options = row.get(6).unwrap_or_default().to_string();
    let has_unique_index = row.get(7) == Some("t");
    let size: i64 = if simple_progress {
        0
    } else {
        row.get(8).unwrap_or("0").parse().unwrap_or(0)
    };

    TableWorkItem {
        database: database.to_string(),
        schema_oid,
        relation_oid: table_oid,
        fq_name,
        policy_colnums: Vec::new(),
        policy_names,
        policy_coloids: Vec::new(),
        storage_options,
        rank: if has_unique_index { Rank::Unique } else { Rank::Ordinary },
        status: WorkStatus::NotStarted,
        started_at: None,
        finished_at: None,
        source_bytes: size,
    }
}

fn null_out_distribution_policy_sql(fq_name: &str) -> String {
    format!(
        "UPDATE gp_distribution_policy SET attrnums = NULL, attcoloids = NULL \
         WHERE localoid = '{fq_name}'::regclass"
    )
}

pub struct RedistributionPlanner;

impl RedistributionPlanner {
    /// Creates the `expand` schema/tables/view (step 1) if not already
    /// present — idempotent, so resume after a crash mid-planning is
    /// just a re-run.
    pub fn create_schema(session: &mut dyn SqlSession, simple_progress: bool) -> GpResult<()> {
        session.execute(CREATE_SCHEMA_SQL)?;
        session.execute(CREATE_STATUS_TABLE_SQL)?;
        session.execute(CREATE_STATUS_DETAIL_TABLE_SQL)?;
        session.execute(if simple_progress { CREATE_SIMPLE_VIEW_SQL } else { CREATE_RICH_VIEW_SQL })?;
        Ok(())
    }

    /// Every user database the prepare pipeline should seed a work queue
    /// for, excluding the template databases and `postgres`.
    pub fn list_user_databases(session: &mut dyn SqlSession) -> GpResult<Vec<String>> {
        let rows = session.query(LIST_USER_DATABASES_SQL)?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get(0))
            .map(str::to_string)
            .collect())
    }

    /// Enumerates every qualifying table in `database` (step 2),
    /// classifies rank, and streams work items into `status_detail` via
    /// `copy_in`. `simple_progress` forces the recorded size estimate to
    /// zero, avoiding the cost of `pg_relation_size` on very large
    /// clusters. Returns the work items seeded, for the caller to record
    /// a count in the phase payload.
    pub fn seed_work_queue(
        session: &mut dyn SqlSession,
        database: &str,
        simple_progress: bool,
    ) -> GpResult<Vec<TableWorkItem>> {
        let nonleaf_rows = session.query(ENUMERATE_NONLEAF_TABLES_SQL)?;
        let leaf_rows = session.query(ENUMERATE_LEAF_TABLES_SQL)?;

        let mut items = Vec::with_capacity(nonleaf_rows.len() + leaf_rows.len());
        for row in nonleaf_rows.iter().chain(leaf_rows.iter()) {
            items.push(row_to_work_item(row, database, simple_progress));
        }

        let mut rows_iter = items.iter().map(|item| {
            vec![
                Some(item.database.clone()),
                Some(item.fq_name.clone()),
                Some(item.schema_oid.to_string()),
                Some(item.relation_oid.to_string()),
                Some(item.policy_names.join(",")),
                Some(item.storage_options.clone()),
                Some((item.rank as i32).to_string()),
                Some(item.status.as_str().to_string()),
                Some(item.source_bytes.to_string()),
            ]
        });
        session.copy_in(
            "COPY expand.status_detail (dbname, fq_name, schema_oid, table_oid, \
             distribution_policy_names, storage_options, rank, status, source_bytes) FROM STDIN",
            &mut rows_iter,
        )?;

        for item in &items {
            session.execute(&null_out_distribution_policy_sql(&item.fq_name))?;
        }

        info!(target: "gpexpand::planner", database, seeded = items.len(), "seeded redistribution work queue");
        Ok(items)
    }
}
