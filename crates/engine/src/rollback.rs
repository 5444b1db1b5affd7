//! `RollbackController`: walks `PhaseLog.history()` in reverse and
//! dispatches each phase's inverse operation. Illegal once `current()`
//! is `PREPARE_DONE` — the point of no return.

use std::path::Path;

use gpexpand_catalog::CatalogMutator;
use gpexpand_core::error::{GpExpandError, GpResult};
use gpexpand_core::format::parse_input_file;
use gpexpand_core::traits::{RemoteCommand, RemoteExecutor, SqlSession};
use gpexpand_core::types::Phase;
use gpexpand_durability::{PhaseEntry, PhaseLog};
use tracing::{info, warn};

pub struct RollbackController;

impl RollbackController {
    /// Runs the full reverse walk. `max_catalog_deletions` is the
    /// new-segment count recorded when `CATALOG_STARTED` was entered;
    /// it bounds `CatalogMutator::restore_from_snapshot`'s safety rail.
    pub fn run(
        log: PhaseLog,
        session: &mut dyn SqlSession,
        executor: &dyn RemoteExecutor,
        max_catalog_deletions: usize,
    ) -> GpResult<()> {
        if log.current().phase.is_point_of_no_return() {
            return Err(GpExpandError::PastPointOfNoReturn(
                "PREPARE_DONE already recorded; rollback is no longer offered".into(),
            ));
        }

        let history: Vec<PhaseEntry> = log.history().to_vec();
        for entry in history.iter().rev() {
            Self::invert(entry, session, executor, max_catalog_deletions)?;
        }

        log.remove()
            .map_err(|e| GpExpandError::Validation(e.to_string()))?;
        info!(target: "gpexpand::rollback", "rollback complete, phase log removed");
        Ok(())
    }

    fn invert(
        entry: &PhaseEntry,
        session: &mut dyn SqlSession,
        executor: &dyn RemoteExecutor,
        max_catalog_deletions: usize,
    ) -> GpResult<()> {
        match entry.phase {
            Phase::SchemaStarted => {
                info!(target: "gpexpand::rollback", "dropping expand schema");
                session.execute("DROP SCHEMA IF EXISTS expand CASCADE")?;
            }
            Phase::CatalogStarted => {
                info!(target: "gpexpand::rollback", path = %entry.payload, "restoring catalog from snapshot");
                CatalogMutator::restore_from_snapshot(
                    session,
                    Path::new(&entry.payload),
                    max_catalog_deletions,
                )?;
            }
            Phase::OldSegmentsStarted => {
                warn!(target: "gpexpand::rollback", "restoring original segment pg_hba.conf from backups");
                // The payload names the backup host list; each original
                // segment's pg_hba.conf.gpexpand.bak is restored in place.
                for host in entry.payload.split(',').filter(|h| !h.is_empty()) {
                    let _ = executor.run(
                        host,
                        &RemoteCommand::Shell {
                            command: "mv pg_hba.conf.gpexpand.bak pg_hba.conf".into(),
                        },
                    );
                }
            }
            Phase::SegmentsStarted => {
                if !entry.payload.is_empty() {
                    let specs = parse_input_file(&entry.payload).unwrap_or_default();
                    for spec in &specs {
                        let _ = executor.run(
                            &spec.host,
                            &RemoteCommand::Remove {
                                remote_path: spec.data_directory.display().to_string(),
                            },
                        );
                    }
                    info!(target: "gpexpand::rollback", hosts = specs.len(), "cleaned new segment data directories");
                }
            }
            Phase::TemplateStarted => {
                if !entry.payload.is_empty() {
                    let _ = std::fs::remove_dir_all(&entry.payload);
                    info!(target: "gpexpand::rollback", path = %entry.payload, "deleted local template scratch directory");
                }
            }
            _ => {}
        }
        Ok(())
    }
}
