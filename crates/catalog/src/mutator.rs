//! `CatalogMutator` reads and mutates the cluster catalog through a
//! [`SqlSession`], and owns the write-once/read-once catalog snapshot
//! file consulted by rollback's catalog phase.

use std::fs;
use std::path::Path;

use gpexpand_core::error::{GpExpandError, GpResult};
use gpexpand_core::format::{parse_snapshot, write_snapshot};
use gpexpand_core::traits::SqlSession;
use gpexpand_core::types::{ContentRow, SegmentRole, SegmentSet, SegmentSpec};
use tracing::{info, warn};

const SELECT_SEGMENT_CONFIGURATION: &str = "SELECT dbid, content, role, hostname, address, port, \
    fselocation, replication_port FROM pg_catalog.gp_segment_configuration \
    ORDER BY content, role";

/// No free-standing state: every operation is a function of the
/// `SqlSession` and, for snapshot/restore, a file path.
pub struct CatalogMutator;

impl CatalogMutator {
    /// Reads the live segment configuration catalog into a [`SegmentSet`].
    pub fn read_current(session: &mut dyn SqlSession) -> GpResult<SegmentSet> {
        let rows = session.query(SELECT_SEGMENT_CONFIGURATION)?;
        let mut set = SegmentSet::new();
        for row in &rows {
            let dbid: i32 = row.get(0).unwrap_or("0").parse().unwrap_or(0);
            let content_id: i32 = row.get(1).unwrap_or("-1").parse().unwrap_or(-1);
            let role_col = row.get(2).unwrap_or("p");
            let host = row.get(3).unwrap_or("").to_string();
            let address = row.get(4).unwrap_or("").to_string();
            let port: u16 = row.get(5).unwrap_or("0").parse().unwrap_or(0);
            let datadir = row.get(6).unwrap_or("").to_string();
            let replication_port = row.get(7).and_then(|s| s.parse().ok());

            if content_id < 0 {
                // Coordinator or coordinator-standby row: role 'p' is the
                // coordinator, 's' is its standby, per GPDB convention.
                let spec = SegmentSpec {
                    host,
                    address,
                    port,
                    data_directory: datadir.into(),
                    dbid,
                    content_id,
                    role: SegmentRole::Primary,
                    replication_port,
                    filespaces: None,
                };
                if role_col == "p" {
                    set.coordinator = Some(spec);
                } else {
                    set.coordinator_standby = Some(spec);
                }
                continue;
            }

            let role = if role_col == "p" { SegmentRole::Primary } else { SegmentRole::Mirror };
            let spec = SegmentSpec::new(
                host,
                address,
                port,
                datadir.into(),
                dbid,
                content_id,
                role,
                replication_port,
                None,
            )?;
            let row_entry = set.content_rows.entry(content_id).or_insert_with(|| ContentRow {
                primary: spec.clone(),
                mirrors: Vec::new(),
            });
            if spec.is_primary() {
                row_entry.primary = spec;
            } else {
                row_entry.mirrors.push(spec);
            }
        }
        Ok(set)
    }

    /// Serializes the live `SegmentSet` to `path`; the path is recorded
    /// in the phase payload by the caller.
    pub fn snapshot(session: &mut dyn SqlSession, path: &Path) -> GpResult<()> {
        let current = Self::read_current(session)?;
        let text = write_snapshot(&current);
        fs::write(path, text)?;
        info!(target: "gpexpand::catalog", path = %path.display(), "wrote catalog snapshot");
        Ok(())
    }

    /// Within a single administrative write: for each new-segment row,
    /// insert it; primaries go in with mode `changetracking`, mirrors
    /// with status `down` (they have not yet had their base data copied).
    pub fn apply_new_segments(session: &mut dyn SqlSession, added: &[SegmentSpec]) -> GpResult<()> {
        session.begin()?;
        for spec in added {
            let (mode, status) = if spec.is_primary() {
                ("changetracking", "up")
            } else {
                ("sync", "down")
            };
            let sql = format!(
                "INSERT INTO pg_catalog.gp_segment_configuration \
                 (dbid, content, role, mode, status, hostname, address, port, fselocation) \
                 VALUES ({}, {}, '{}', '{}', '{}', '{}', '{}', {}, '{}')",
                spec.dbid,
                spec.content_id,
                spec.role.as_char(),
                mode,
                status,
                spec.host,
                spec.address,
                spec.port,
                spec.data_directory.display(),
            );
            session.execute(&sql)?;
        }
        session.commit()?;
        info!(target: "gpexpand::catalog", added = added.len(), "applied new segment rows");
        Ok(())
    }

    /// Restores the catalog to the membership recorded in the snapshot
    /// at `path`. `max_deletions` is the new-segment count recorded in
    /// the phase payload; restore refuses to delete more rows than that,
    /// and refuses outright if the snapshot names fewer than two
    /// identities (coordinator plus at least one segment).
    pub fn restore_from_snapshot(
        session: &mut dyn SqlSession,
        path: &Path,
        max_deletions: usize,
    ) -> GpResult<()> {
        let text = fs::read_to_string(path)?;
        let snapshot = parse_snapshot(&text)?;

        let snapshot_id_count = snapshot.coordinator.is_some() as usize
            + snapshot.coordinator_standby.is_some() as usize
            + snapshot
                .content_rows
                .values()
                .map(|r| 1 + r.mirrors.len())
                .sum::<usize>();
        if snapshot_id_count < 2 {
            return Err(GpExpandError::Validation(format!(
                "catalog snapshot names only {snapshot_id_count} identities, refusing restore"
            )));
        }

        let current = Self::read_current(session)?;

        let mut mirrors_to_remove = Vec::new();
        for content_id in current.content_rows.keys() {
            if !snapshot.content_rows.contains_key(content_id) {
                mirrors_to_remove.push(*content_id);
            }
        }

        let mut primaries_to_remove = Vec::new();
        let snapshot_dbids: std::collections::BTreeSet<i32> = snapshot
            .content_rows
            .values()
            .flat_map(|r| std::iter::once(r.primary.dbid).chain(r.mirrors.iter().map(|m| m.dbid)))
            .chain(snapshot.coordinator.iter().map(|c| c.dbid))
            .chain(snapshot.coordinator_standby.iter().map(|c| c.dbid))
            .collect();
        for row in current.content_rows.values() {
            if !snapshot_dbids.contains(&row.primary.dbid) {
                primaries_to_remove.push(row.primary.dbid);
            }
        }

        let total_deletions = mirrors_to_remove.len() + primaries_to_remove.len();
        if total_deletions > max_deletions {
            return Err(GpExpandError::Validation(format!(
                "restore would delete {total_deletions} rows, exceeding recorded new-segment count {max_deletions}"
            )));
        }

        session.begin()?;
        for content_id in &mirrors_to_remove {
            session.execute(&format!(
                "SELECT pg_catalog.gp_remove_segment_mirror({content_id})"
            ))?;
        }
        for dbid in &primaries_to_remove {
            session.execute(&format!("SELECT pg_catalog.gp_remove_segment({dbid})"))?;
        }
        session.commit()?;

        warn!(
            target: "gpexpand::catalog",
            mirrors_removed = mirrors_to_remove.len(),
            primaries_removed = primaries_to_remove.len(),
            "restored catalog from snapshot"
        );
        Ok(())
    }
}
