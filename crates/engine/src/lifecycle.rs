//! `LifecycleController`: the single entry point. Decides an action
//! from database status + `PhaseLog` presence, then composes the rest
//! of the engine to carry it out.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use gpexpand_catalog::CatalogMutator;
use gpexpand_concurrency::{BatchPool, CancellationToken, DrainReport};
use gpexpand_core::error::{GpExpandError, GpResult};
use gpexpand_core::format::parse_input_file;
use gpexpand_core::traits::{InterviewHook, RemoteExecutor, SqlSession};
use gpexpand_core::types::{GlobalEvent, Phase};
use gpexpand_durability::{PhaseLog, TemplateBuilder, TrustEntry};
use tracing::{info, warn};

use crate::planner::RedistributionPlanner;
use crate::preflight;
use crate::redistribution::{RedistributionEngine, WorkerSessions};
use crate::rollback::RollbackController;
use crate::template::distribute_template;

const SELECT_TOP_GLOBAL_STATUS_SQL: &str =
    "SELECT status FROM expand.status ORDER BY updated DESC LIMIT 1";

/// Options a caller (the CLI crate) gathers from arguments and the
/// environment. Unknown options are a parse-time failure at that layer;
/// this struct only ever holds validated values.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    pub input_file: Option<PathBuf>,
    pub hosts_file: Option<PathBuf>,
    pub database: String,
    pub batch_size: usize,
    pub parallelism: usize,
    pub deadline: Option<DateTime<Utc>>,
    pub rollback: bool,
    pub clean: bool,
    pub skip_vacuum: bool,
    pub simple_progress: bool,
    pub analyze_after: bool,
    pub suppress_prompts: bool,
    pub tar_dir: Option<PathBuf>,
    pub verbose: bool,
}

impl LifecycleConfig {
    /// Convenience constructor for the common case: prepare a new
    /// expansion from an input segment file, everything else default.
    pub fn from_input_file(path: impl Into<PathBuf>) -> GpResult<Self> {
        Ok(LifecycleConfig {
            input_file: Some(path.into()),
            hosts_file: None,
            database: "gpadmin".to_string(),
            batch_size: 16,
            parallelism: 4,
            deadline: None,
            rollback: false,
            clean: false,
            skip_vacuum: false,
            simple_progress: false,
            analyze_after: false,
            suppress_prompts: false,
            tar_dir: None,
            verbose: false,
        })
    }

    fn validate(&self) -> GpResult<()> {
        if self.database == "postgres" || self.database.starts_with("template") {
            return Err(GpExpandError::Validation(format!(
                "database {:?} may not be used for the expand schema",
                self.database
            )));
        }
        if self.rollback && self.clean {
            return Err(GpExpandError::Validation(
                "--rollback and --clean are mutually exclusive".into(),
            ));
        }
        preflight::validate_batch_size(self.batch_size)?;
        preflight::validate_parallelism(self.parallelism)?;
        preflight::validate_deadline_not_past(self.deadline)?;
        Ok(())
    }
}

/// The action the controller took, for the CLI layer to report and turn
/// into an exit code.
#[derive(Debug)]
pub enum LifecycleAction {
    RanRollback,
    RanPreparePipeline,
    RanRedistribution(DrainReport),
    EnteredInterview,
    CleanedSchema,
}

pub struct LifecycleController {
    config: LifecycleConfig,
    coordinator_data_dir: PathBuf,
    cancel: CancellationToken,
    interview: Option<Box<dyn InterviewHook>>,
    worker_sessions: Option<Box<dyn Fn() -> WorkerSessions + Sync + Send>>,
    database_session_factory:
        Option<Box<dyn Fn(&str) -> GpResult<Box<dyn SqlSession>> + Sync + Send>>,
}

impl LifecycleController {
    pub fn new(config: LifecycleConfig, coordinator_data_dir: impl Into<PathBuf>) -> GpResult<Self> {
        config.validate()?;
        Ok(LifecycleController {
            config,
            coordinator_data_dir: coordinator_data_dir.into(),
            cancel: CancellationToken::new(),
            interview: None,
            worker_sessions: None,
            database_session_factory: None,
        })
    }

    /// Wires the interview hand-off, the last row of the state routing
    /// matrix. Without one, entering the interview state is a no-op
    /// that just reports [`LifecycleAction::EnteredInterview`] to the
    /// caller.
    pub fn with_interview_hook(mut self, hook: Box<dyn InterviewHook>) -> Self {
        self.interview = Some(hook);
        self
    }

    /// Wires the per-worker session factory the redistribution phase
    /// calls once per thread: each worker owns a target session and a
    /// controller-status session. Without one, redistribution refuses
    /// rather than silently substituting a fake session.
    pub fn with_worker_session_factory(
        mut self,
        make_sessions: impl Fn() -> WorkerSessions + Sync + Send + 'static,
    ) -> Self {
        self.worker_sessions = Some(Box::new(make_sessions));
        self
    }

    /// Wires a per-database session factory so seeding the redistribution
    /// work queue (SPEC_FULL.md §4.4) can enumerate every user database
    /// rather than only the one named on the command line. Without one,
    /// seeding falls back to `self.config.database` alone.
    pub fn with_database_session_factory(
        mut self,
        make_session: impl Fn(&str) -> GpResult<Box<dyn SqlSession>> + Sync + Send + 'static,
    ) -> Self {
        self.database_session_factory = Some(Box::new(make_session));
        self
    }

    /// The shared cancellation flag driving both pools. A caller
    /// installs SIGTERM/SIGHUP handlers against a clone of this token
    /// *before* calling [`LifecycleController::run`] so a signal
    /// received mid-redistribution is observed at the next poll
    /// boundary.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn read_top_global_status(session: &mut dyn SqlSession) -> GpResult<Option<String>> {
        match session.query(SELECT_TOP_GLOBAL_STATUS_SQL) {
            Ok(rows) => Ok(rows.first().and_then(|r| r.get(0)).map(str::to_string)),
            // A fresh cluster has no `expand.status` table yet; that is
            // not a validation failure, just an absence of prior runs.
            Err(GpExpandError::Validation(msg)) if msg.contains("does not exist") => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Top-level dispatch per the state routing matrix.
    pub fn run(
        &mut self,
        session: &mut dyn SqlSession,
        executor: Arc<dyn RemoteExecutor>,
        batch_pool: &BatchPool,
    ) -> GpResult<LifecycleAction> {
        if self.config.clean {
            return self.cleanup_schema(session);
        }

        let log_present = PhaseLog::exists(&self.coordinator_data_dir);

        if self.config.rollback {
            if !log_present {
                return Err(GpExpandError::Validation(
                    "no phase log present; nothing to roll back".into(),
                ));
            }
            return self.run_rollback(session, executor);
        }

        let global_status = Self::read_top_global_status(session)?;
        match global_status.as_deref() {
            Some(s) if s == GlobalEvent::ExpansionComplete.as_str() => Err(GpExpandError::Validation(
                "a prior expansion already completed; run with --clean first".into(),
            )),
            Some(s)
                if s == GlobalEvent::SetupDone.as_str()
                    || s == GlobalEvent::ExpansionStopped.as_str()
                    || s == GlobalEvent::ExpansionStarted.as_str() =>
            {
                self.run_redistribution(session)
            }
            _ if log_present => self.resume_prepare_pipeline(session, executor, batch_pool),
            _ if self.config.input_file.is_some() => {
                self.run_full_prepare_pipeline(session, executor, batch_pool)
            }
            _ => {
                if let Some(hook) = &self.interview {
                    hook.run(self.config.hosts_file.as_deref())?;
                }
                Ok(LifecycleAction::EnteredInterview)
            }
        }
    }

    fn cleanup_schema(&mut self, session: &mut dyn SqlSession) -> GpResult<LifecycleAction> {
        session.execute("DROP SCHEMA IF EXISTS expand CASCADE")?;
        info!(target: "gpexpand::lifecycle", "expand schema dropped");
        Ok(LifecycleAction::CleanedSchema)
    }

    fn run_rollback(
        &mut self,
        session: &mut dyn SqlSession,
        executor: Arc<dyn RemoteExecutor>,
    ) -> GpResult<LifecycleAction> {
        let log = PhaseLog::open(&self.coordinator_data_dir, false)
            .map_err(|e| GpExpandError::Validation(e.to_string()))?;
        let new_segment_count = log
            .history()
            .iter()
            .find(|e| e.phase == Phase::SegmentsDone)
            .map(|e| e.payload.parse::<usize>().unwrap_or(usize::MAX))
            .unwrap_or(usize::MAX);
        RollbackController::run(log, session, executor.as_ref(), new_segment_count)?;
        Ok(LifecycleAction::RanRollback)
    }

    fn resume_prepare_pipeline(
        &mut self,
        session: &mut dyn SqlSession,
        executor: Arc<dyn RemoteExecutor>,
        batch_pool: &BatchPool,
    ) -> GpResult<LifecycleAction> {
        // A crash-consistent resume re-enters the same ordered pipeline;
        // each step below is itself idempotent (schema creation uses `IF
        // NOT EXISTS`, catalog inserts are keyed by dbid, etc.), so
        // replaying from the top after the already-completed phases is
        // safe -- `PhaseLog::advance` rejects any phase already recorded
        // as out of order, which is how completed phases are skipped.
        let log = PhaseLog::open(&self.coordinator_data_dir, false)
            .map_err(|e| GpExpandError::Validation(e.to_string()))?;
        info!(target: "gpexpand::lifecycle", phase = %log.current().phase, "resuming prepare pipeline");
        self.drive_prepare_pipeline(log, session, executor, batch_pool)
    }

    fn run_full_prepare_pipeline(
        &mut self,
        session: &mut dyn SqlSession,
        executor: Arc<dyn RemoteExecutor>,
        batch_pool: &BatchPool,
    ) -> GpResult<LifecycleAction> {
        let log = PhaseLog::create(&self.coordinator_data_dir, None)
            .map_err(|e| GpExpandError::Validation(e.to_string()))?;
        self.drive_prepare_pipeline(log, session, executor, batch_pool)
    }

    fn drive_prepare_pipeline(
        &mut self,
        mut log: PhaseLog,
        session: &mut dyn SqlSession,
        executor: Arc<dyn RemoteExecutor>,
        batch_pool: &BatchPool,
    ) -> GpResult<LifecycleAction> {
        let input_path = self
            .config
            .input_file
            .clone()
            .ok_or_else(|| GpExpandError::Validation("no input file configured".into()))?;

        let result = self.drive_prepare_pipeline_inner(&mut log, session, executor, batch_pool, &input_path);
        if let Err(e) = &result {
            warn!(target: "gpexpand::lifecycle", error = %e, "prepare pipeline failed before point of no return");
            return Err(GpExpandError::expansion(match result.unwrap_err() {
                GpExpandError::Expansion(inner) => *inner,
                other => other,
            }));
        }
        result
    }

    fn advance(&self, log: &mut PhaseLog, phase: Phase, payload: impl Into<String>) -> GpResult<()> {
        if phase.is_successor_of(log.current().phase) {
            log.advance(phase, payload)
                .map_err(|e| GpExpandError::InvalidStatus(e.to_string()))?;
        }
        Ok(())
    }

    fn append_global_event(session: &mut dyn SqlSession, event: GlobalEvent) -> GpResult<()> {
        session.execute(&format!(
            "INSERT INTO expand.status (status, updated) VALUES ('{event}', now())"
        ))?;
        Ok(())
    }

    fn drive_prepare_pipeline_inner(
        &mut self,
        log: &mut PhaseLog,
        session: &mut dyn SqlSession,
        executor: Arc<dyn RemoteExecutor>,
        batch_pool: &BatchPool,
        input_path: &std::path::Path,
    ) -> GpResult<LifecycleAction> {
        preflight::validate_alterable_tables(session)?;
        preflight::validate_heap_checksums_consistent(session)?;

        let text = std::fs::read_to_string(input_path)?;
        let new_segments = parse_input_file(&text)?;
        if new_segments.is_empty() {
            return Err(GpExpandError::Validation("input file named no segments".into()));
        }

        self.advance(log, Phase::PrepareStarted, String::new())?;

        let template_result = if let Some(tar_dir) = &self.config.tar_dir {
            let scratch_dir = tar_dir.join("gpexpand_template");
            self.advance(log, Phase::TemplateStarted, scratch_dir.display().to_string())?;

            let existing = CatalogMutator::read_current(session)?;
            let mut addresses: std::collections::BTreeSet<String> =
                existing.all_addresses().into_iter().collect();
            addresses.extend(new_segments.iter().map(|s| s.address.clone()));
            let trust_entries: Vec<TrustEntry> = addresses
                .into_iter()
                .map(|address| {
                    let is_ipv6 = address.contains(':');
                    TrustEntry { address, is_ipv6 }
                })
                .collect();

            let result = TemplateBuilder::new(tar_dir.clone())
                .build(
                    &self.coordinator_data_dir,
                    tar_dir,
                    None,
                    &self.coordinator_data_dir.join("pg_hba.conf"),
                    &self.coordinator_data_dir.join("postgresql.conf"),
                    &trust_entries,
                )
                .map_err(|e| GpExpandError::Validation(e.to_string()))?;
            self.advance(log, Phase::TemplateDone, result.tar_path.display().to_string())?;
            Some(result)
        } else {
            self.advance(log, Phase::TemplateStarted, String::new())?;
            self.advance(log, Phase::TemplateDone, String::new())?;
            None
        };

        self.advance(log, Phase::SegmentsStarted, text.clone())?;
        let primary_hosts: Vec<String> = new_segments
            .iter()
            .filter(|s| s.is_primary())
            .map(|s| s.host.clone())
            .collect();
        let mirror_hosts: Vec<String> = new_segments
            .iter()
            .filter(|s| !s.is_primary())
            .map(|s| s.host.clone())
            .collect();
        if let Some(result) = &template_result {
            let report = distribute_template(
                batch_pool,
                Arc::clone(&executor),
                &result.tar_path,
                "/tmp/gpexpand_template.tar",
                &primary_hosts,
                &mirror_hosts,
            )?;
            if !report.all_succeeded() {
                return Err(GpExpandError::Validation(format!(
                    "template distribution failed on hosts: {:?}",
                    report.failed_hosts
                )));
            }
        }
        self.advance(log, Phase::SegmentsDone, new_segments.len().to_string())?;

        self.advance(log, Phase::OldSegmentsStarted, String::new())?;
        self.advance(log, Phase::OldSegmentsDone, String::new())?;

        let snapshot_path = self.coordinator_data_dir.join("gpexpand.gp_segment_configuration");
        self.advance(log, Phase::CatalogStarted, snapshot_path.display().to_string())?;
        CatalogMutator::snapshot(session, &snapshot_path)?;
        CatalogMutator::apply_new_segments(session, &new_segments)?;
        self.advance(log, Phase::CatalogDone, snapshot_path.display().to_string())?;

        self.advance(log, Phase::SchemaStarted, String::new())?;
        RedistributionPlanner::create_schema(session, self.config.simple_progress)?;
        let seeded = match &self.database_session_factory {
            Some(make_session) => {
                let databases = RedistributionPlanner::list_user_databases(session)?;
                let mut total = 0usize;
                for database in &databases {
                    let mut db_session = make_session(database)?;
                    let items = RedistributionPlanner::seed_work_queue(
                        db_session.as_mut(),
                        database,
                        self.config.simple_progress,
                    )?;
                    total += items.len();
                }
                total
            }
            None => {
                let items = RedistributionPlanner::seed_work_queue(
                    session,
                    &self.config.database,
                    self.config.simple_progress,
                )?;
                items.len()
            }
        };
        self.advance(log, Phase::SchemaDone, seeded.to_string())?;

        self.advance(log, Phase::PopulateStarted, String::new())?;
        Self::append_global_event(session, GlobalEvent::SetupDone)?;
        self.advance(log, Phase::PopulateDone, String::new())?;

        self.advance(log, Phase::PrepareDone, String::new())?;
        info!(target: "gpexpand::lifecycle", "prepare pipeline reached point of no return");
        Ok(LifecycleAction::RanPreparePipeline)
    }

    fn run_redistribution(&mut self, session: &mut dyn SqlSession) -> GpResult<LifecycleAction> {
        preflight::validate_max_connections(session, self.config.parallelism)?;
        Self::append_global_event(session, GlobalEvent::ExpansionStarted)?;

        let cancel = self.cancel.clone();
        let deadline = self
            .config
            .deadline
            .map(|d| (d - Utc::now()).to_std().unwrap_or(Duration::from_secs(0)));

        let make_sessions = self.worker_sessions.as_ref().ok_or_else(|| {
            GpExpandError::Validation(
                "no worker session factory configured; call with_worker_session_factory before run"
                    .into(),
            )
        })?;
        let report = RedistributionEngine::run(
            self.config.parallelism,
            &cancel,
            deadline,
            self.config.simple_progress,
            self.config.analyze_after,
            || make_sessions(),
        )?;

        let final_event = if cancel.is_cancelled() {
            GlobalEvent::ExpansionStopped
        } else {
            GlobalEvent::ExpansionComplete
        };
        Self::append_global_event(session, final_event)?;
        Ok(LifecycleAction::RanRedistribution(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpexpand_core::testing::{FakeRemoteExecutor, FakeSqlSession};
    use gpexpand_core::traits::Row;
    use tempfile::tempdir;

    fn base_config(input: PathBuf) -> LifecycleConfig {
        LifecycleConfig {
            input_file: Some(input),
            hosts_file: None,
            database: "mydb".into(),
            batch_size: 4,
            parallelism: 2,
            deadline: None,
            rollback: false,
            clean: false,
            skip_vacuum: true,
            simple_progress: true,
            analyze_after: false,
            suppress_prompts: true,
            tar_dir: None,
            verbose: false,
        }
    }

    #[test]
    fn validate_rejects_postgres_database() {
        let mut cfg = base_config(PathBuf::from("/tmp/in"));
        cfg.database = "postgres".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn enters_interview_when_no_input_file_and_no_log() {
        let dir = tempdir().unwrap();
        let mut cfg = base_config(PathBuf::from("/tmp/in"));
        cfg.input_file = None;
        let mut controller = LifecycleController::new(cfg, dir.path()).unwrap();
        let mut session = FakeSqlSession::new();
        session.push_rows(vec![]);
        let executor: Arc<dyn RemoteExecutor> = Arc::new(FakeRemoteExecutor::new());
        let pool = BatchPool::new(2);
        let action = controller.run(&mut session, executor, &pool).unwrap();
        assert!(matches!(action, LifecycleAction::EnteredInterview));
    }

    #[test]
    fn interview_hook_is_invoked_when_no_log_and_no_input_file() {
        use gpexpand_core::testing::RecordingInterviewHook;
        use std::sync::Arc;

        let dir = tempdir().unwrap();
        let mut cfg = base_config(PathBuf::from("/tmp/in"));
        cfg.input_file = None;
        cfg.hosts_file = Some(PathBuf::from("/tmp/hosts"));
        let hook = Arc::new(RecordingInterviewHook::new());

        struct ArcHook(Arc<RecordingInterviewHook>);
        impl gpexpand_core::traits::InterviewHook for ArcHook {
            fn run(&self, hosts_file: Option<&std::path::Path>) -> GpResult<()> {
                self.0.run(hosts_file)
            }
        }

        let controller = LifecycleController::new(cfg, dir.path())
            .unwrap()
            .with_interview_hook(Box::new(ArcHook(Arc::clone(&hook))));
        let mut session = FakeSqlSession::new();
        session.push_rows(vec![]);
        let executor: Arc<dyn RemoteExecutor> = Arc::new(FakeRemoteExecutor::new());
        let pool = BatchPool::new(2);
        let mut controller = controller;
        controller.run(&mut session, executor, &pool).unwrap();
        assert_eq!(hook.invoked.snapshot(), vec!["/tmp/hosts".to_string()]);
    }

    #[test]
    fn cancellation_token_is_shared_and_cloneable() {
        let dir = tempdir().unwrap();
        let cfg = base_config(PathBuf::from("/tmp/in"));
        let controller = LifecycleController::new(cfg, dir.path()).unwrap();
        let token = controller.cancellation_token();
        assert!(!token.is_cancelled());
        token.cancel();
        assert!(controller.cancellation_token().is_cancelled());
    }

    #[test]
    fn refuses_when_expansion_already_complete() {
        let dir = tempdir().unwrap();
        let cfg = base_config(PathBuf::from("/tmp/in"));
        let mut controller = LifecycleController::new(cfg, dir.path()).unwrap();
        let mut session = FakeSqlSession::new();
        session.push_rows(vec![Row { columns: vec![Some("EXPANSION COMPLETE".into())] }]);
        let executor: Arc<dyn RemoteExecutor> = Arc::new(FakeRemoteExecutor::new());
        let pool = BatchPool::new(2);
        let err = controller.run(&mut session, executor, &pool).unwrap_err();
        assert!(matches!(err, GpExpandError::Validation(_)));
    }

    #[test]
    fn full_prepare_pipeline_reaches_prepare_done() {
        let dir = tempdir().unwrap();
        let input_path = dir.path().join("segments.conf");
        std::fs::write(&input_path, "h3:h3:40000:/data/p0:5:2:p\n").unwrap();

        let cfg = base_config(input_path);
        let mut controller = LifecycleController::new(cfg, dir.path()).unwrap();

        let mut session = FakeSqlSession::new();
        // validate_alterable_tables, validate_heap_checksums, catalog
        // snapshot read_current, seed_work_queue enumerate -- all empty.
        for _ in 0..4 {
            session.push_rows(vec![]);
        }
        let executor: Arc<dyn RemoteExecutor> = Arc::new(FakeRemoteExecutor::new());
        let pool = BatchPool::new(2);

        let action = controller.run(&mut session, executor, &pool).unwrap();
        assert!(matches!(action, LifecycleAction::RanPreparePipeline));
        assert!(PhaseLog::exists(dir.path()));
        let log = PhaseLog::open(dir.path(), false).unwrap();
        assert_eq!(log.current().phase, Phase::PrepareDone);
    }

    #[test]
    fn redistribution_refuses_without_a_session_factory() {
        let dir = tempdir().unwrap();
        let cfg = base_config(PathBuf::from("/tmp/in"));
        let mut controller = LifecycleController::new(cfg, dir.path()).unwrap();
        let mut session = FakeSqlSession::new();
        session.push_rows(vec![Row { columns: vec![Some("SETUP DONE".into())] }]);
        // validate_max_connections queries current max_connections.
        session.push_rows(vec![Row { columns: vec![Some("10".into())] }]);
        let executor: Arc<dyn RemoteExecutor> = Arc::new(FakeRemoteExecutor::new());
        let pool = BatchPool::new(2);
        let err = controller.run(&mut session, executor, &pool).unwrap_err();
        assert!(matches!(err, GpExpandError::Validation(_)));
    }

    #[test]
    fn redistribution_runs_with_a_configured_session_factory() {
        let dir = tempdir().unwrap();
        let cfg = base_config(PathBuf::from("/tmp/in"));
        let mut controller = LifecycleController::new(cfg, dir.path())
            .unwrap()
            .with_worker_session_factory(|| {
                let target = FakeSqlSession::new();
                let mut status = FakeSqlSession::new();
                status.push_rows(vec![]);
                crate::redistribution::WorkerSessions {
                    target: Box::new(target),
                    status: Box::new(status),
                }
            });
        let mut session = FakeSqlSession::new();
        session.push_rows(vec![Row { columns: vec![Some("SETUP DONE".into())] }]);
        session.push_rows(vec![Row { columns: vec![Some("10".into())] }]);
        let executor: Arc<dyn RemoteExecutor> = Arc::new(FakeRemoteExecutor::new());
        let pool = BatchPool::new(2);
        let action = controller.run(&mut session, executor, &pool).unwrap();
        assert!(matches!(action, LifecycleAction::RanRedistribution(_)));
    }

    #[test]
    fn multi_database_seeding_sums_items_across_databases() {
        let dir = tempdir().unwrap();
        let input_path = dir.path().join("segments.conf");
        std::fs::write(&input_path, "h3:h3:40000:/data/p0:5:2:p\n").unwrap();

        let cfg = base_config(input_path);
        let mut controller = LifecycleController::new(cfg, dir.path())
            .unwrap()
            .with_database_session_factory(|database| {
                let mut session = FakeSqlSession::new();
                session.push_rows(vec![Row {
                    columns: vec![
                        Some(format!("{database}.a")),
                        Some("1".into()),
                        Some("2".into()),
                        Some("".into()),
                        Some("".into()),
                        Some("".into()),
                        Some("".into()),
                        Some("f".into()),
                        Some("0".into()),
                    ],
                }]);
                Ok(Box::new(session) as Box<dyn SqlSession>)
            });

        let mut session = FakeSqlSession::new();
        // read_top_global_status, validate_alterable_tables,
        // validate_heap_checksums, catalog read_current -- all empty.
        for _ in 0..4 {
            session.push_rows(vec![]);
        }
        session.push_rows(vec![
            Row { columns: vec![Some("dba".into())] },
            Row { columns: vec![Some("dbb".into())] },
        ]);
        let executor: Arc<dyn RemoteExecutor> = Arc::new(FakeRemoteExecutor::new());
        let pool = BatchPool::new(2);

        let action = controller.run(&mut session, executor, &pool).unwrap();
        assert!(matches!(action, LifecycleAction::RanPreparePipeline));
        let log = PhaseLog::open(dir.path(), false).unwrap();
        let schema_done = log
            .history()
            .iter()
            .find(|e| e.phase == Phase::SchemaDone)
            .unwrap();
        assert_eq!(schema_done.payload, "2");
    }
}
