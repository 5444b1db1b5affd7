//! End-to-end scenarios driving `LifecycleController` across separate
//! invocations against the same coordinator data directory -- the
//! cases a single in-crate unit test can't exercise because they
//! require composing durability, catalog, and engine state the way a
//! real process restart would.

use std::sync::Arc;

use gpexpand_catalog::CatalogMutator;
use gpexpand_concurrency::BatchPool;
use gpexpand_core::error::GpExpandError;
use gpexpand_core::testing::{fixture_primary, FakeRemoteExecutor, FakeSqlSession};
use gpexpand_core::traits::{RemoteExecutor, Row};
use gpexpand_core::types::Phase;
use gpexpand_durability::PhaseLog;
use gpexpand_engine::{LifecycleAction, LifecycleConfig, LifecycleController};

fn base_config(input_file: std::path::PathBuf) -> LifecycleConfig {
    LifecycleConfig {
        input_file: Some(input_file),
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

fn catalog_rows() -> Vec<Row> {
    vec![
        Row {
            columns: vec![
                Some("1".into()),
                Some("-1".into()),
                Some("p".into()),
                Some("cdw".into()),
                Some("cdw".into()),
                Some("5432".into()),
                Some("/data/master".into()),
            ],
        },
        Row {
            columns: vec![
                Some("2".into()),
                Some("0".into()),
                Some("p".into()),
                Some("sdw1".into()),
                Some("sdw1".into()),
                Some("40000".into()),
                Some("/data/p0".into()),
            ],
        },
    ]
}

/// A process crash after `OldSegmentsDone` leaves a phase log on disk;
/// re-running against the same input file and coordinator directory
/// must resume from there rather than redo the completed phases, and
/// must still reach `PrepareDone`.
#[test]
fn resume_after_interrupted_prepare_reaches_prepare_done() {
    let dir = tempfile::tempdir().unwrap();
    let input_path = dir.path().join("segments.conf");
    let spec = fixture_primary("sdw3", 2, 6);
    std::fs::write(&input_path, gpexpand_core::format::write_input_file(&[spec])).unwrap();

    {
        let mut log = PhaseLog::create(dir.path(), None).unwrap();
        for phase in [
            Phase::PrepareStarted,
            Phase::TemplateStarted,
            Phase::TemplateDone,
            Phase::SegmentsStarted,
            Phase::SegmentsDone,
            Phase::OldSegmentsStarted,
            Phase::OldSegmentsDone,
        ] {
            log.advance(phase, String::new()).unwrap();
        }
    }

    let cfg = base_config(input_path);
    let mut controller = LifecycleController::new(cfg, dir.path()).unwrap();
    let mut session = FakeSqlSession::new();
    // validate_alterable_tables, validate_heap_checksums, catalog
    // read_current (via snapshot), seed_work_queue enumerate.
    for _ in 0..4 {
        session.push_rows(vec![]);
    }
    let executor: Arc<dyn RemoteExecutor> = Arc::new(FakeRemoteExecutor::new());
    let pool = BatchPool::new(2);

    let action = controller.run(&mut session, executor, &pool).unwrap();
    assert!(matches!(action, LifecycleAction::RanPreparePipeline));

    let log = PhaseLog::open(dir.path(), false).unwrap();
    assert_eq!(log.current().phase, Phase::PrepareDone);
    // The phases already recorded before the crash must not have been
    // re-appended; the log should hold exactly one entry per phase.
    assert_eq!(log.history().len(), 14);
}

/// Rolling back an expansion that stopped at `CatalogDone` must restore
/// the catalog from the snapshot recorded when `CatalogStarted` was
/// entered, then remove the phase log entirely.
#[test]
fn rollback_restores_catalog_snapshot_and_removes_phase_log() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot_path = dir.path().join("gpexpand.gp_segment_configuration");

    let mut snap_session = FakeSqlSession::new();
    snap_session.push_rows(catalog_rows());
    CatalogMutator::snapshot(&mut snap_session, &snapshot_path).unwrap();

    {
        let mut log = PhaseLog::create(dir.path(), None).unwrap();
        for (phase, payload) in [
            (Phase::PrepareStarted, String::new()),
            (Phase::TemplateStarted, String::new()),
            (Phase::TemplateDone, String::new()),
            (Phase::SegmentsStarted, String::new()),
            (Phase::SegmentsDone, "0".to_string()),
            (Phase::OldSegmentsStarted, String::new()),
            (Phase::OldSegmentsDone, String::new()),
            (Phase::CatalogStarted, snapshot_path.display().to_string()),
            (Phase::CatalogDone, snapshot_path.display().to_string()),
        ] {
            log.advance(phase, payload).unwrap();
        }
    }

    let mut cfg = base_config(dir.path().join("unused.conf"));
    cfg.rollback = true;
    let mut controller = LifecycleController::new(cfg, dir.path()).unwrap();

    let mut session = FakeSqlSession::new();
    // restore_from_snapshot's own read_current call, during the
    // CatalogStarted inversion.
    session.push_rows(catalog_rows());
    let executor: Arc<dyn RemoteExecutor> = Arc::new(FakeRemoteExecutor::new());
    let pool = BatchPool::new(2);

    let action = controller.run(&mut session, executor, &pool).unwrap();
    assert!(matches!(action, LifecycleAction::RanRollback));
    assert!(!PhaseLog::exists(dir.path()));
}

/// Once `PrepareDone` has been recorded, rollback must be refused
/// outright -- the point of no return -- even when invoked through the
/// full `LifecycleController::run` dispatch rather than directly
/// against `RollbackController`.
#[test]
fn rollback_refused_once_prepare_done_is_recorded() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut log = PhaseLog::create(dir.path(), None).unwrap();
        for phase in [
            Phase::PrepareStarted,
            Phase::TemplateStarted,
            Phase::TemplateDone,
            Phase::SegmentsStarted,
            Phase::SegmentsDone,
            Phase::OldSegmentsStarted,
            Phase::OldSegmentsDone,
            Phase::CatalogStarted,
            Phase::CatalogDone,
            Phase::SchemaStarted,
            Phase::SchemaDone,
            Phase::PopulateStarted,
            Phase::PopulateDone,
            Phase::PrepareDone,
        ] {
            log.advance(phase, String::new()).unwrap();
        }
    }

    let mut cfg = base_config(dir.path().join("unused.conf"));
    cfg.rollback = true;
    let mut controller = LifecycleController::new(cfg, dir.path()).unwrap();
    let mut session = FakeSqlSession::new();
    let executor: Arc<dyn RemoteExecutor> = Arc::new(FakeRemoteExecutor::new());
    let pool = BatchPool::new(2);

    let err = controller.run(&mut session, executor, &pool).unwrap_err();
    assert!(matches!(err, GpExpandError::PastPointOfNoReturn(_)));
    assert!(PhaseLog::exists(dir.path()));
}

/// A cluster whose `max_connections` can't admit `2P + 1` redistribution
/// sessions must refuse before ever touching the work queue, reached
/// here through the same database-status dispatch a resumed
/// redistribution run takes.
#[test]
fn redistribution_refuses_when_max_connections_too_low() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = base_config(dir.path().join("unused.conf"));
    cfg.parallelism = 10;
    let mut controller = LifecycleController::new(cfg, dir.path()).unwrap();

    let mut session = FakeSqlSession::new();
    session.push_rows(vec![Row { columns: vec![Some("SETUP DONE".into())] }]);
    session.push_rows(vec![Row { columns: vec![Some("5".into())] }]);
    let executor: Arc<dyn RemoteExecutor> = Arc::new(FakeRemoteExecutor::new());
    let pool = BatchPool::new(2);

    let err = controller.run(&mut session, executor, &pool).unwrap_err();
    assert!(matches!(err, GpExpandError::Validation(_)));
}

/// `--clean` must drop the bookkeeping schema regardless of whatever
/// phase-log or database state happens to be lying around.
#[test]
fn clean_drops_expand_schema_even_with_a_stale_phase_log_present() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut log = PhaseLog::create(dir.path(), None).unwrap();
        log.advance(Phase::PrepareStarted, String::new()).unwrap();
    }

    let mut cfg = base_config(dir.path().join("unused.conf"));
    cfg.clean = true;
    let mut controller = LifecycleController::new(cfg, dir.path()).unwrap();
    let mut session = FakeSqlSession::new();
    let executor: Arc<dyn RemoteExecutor> = Arc::new(FakeRemoteExecutor::new());
    let pool = BatchPool::new(2);

    let action = controller.run(&mut session, executor, &pool).unwrap();
    assert!(matches!(action, LifecycleAction::CleanedSchema));
    assert!(session.log.iter().any(|l| l.contains("DROP SCHEMA")));
}
