//! gpexpand process entry point: argument parsing, logging and PID-file
//! setup, wiring of the real `SqlSession`/`RemoteExecutor`/`InterviewHook`
//! implementations, and exit-code mapping.

mod commands;
mod config;
mod interview;
mod logging;
mod pidfile;
mod remote;
mod signals;
mod sql;

use gpexpand_concurrency::BatchPool;
use gpexpand_core::error::GpExpandError;
use gpexpand_engine::{LifecycleAction, LifecycleController, WorkerSessions};

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    let matches = commands::build_cli().get_matches();
    let verbose = matches.get_flag("verbose");
    logging::init(verbose);

    let lifecycle_config = match config::build_lifecycle_config(&matches) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("gpexpand: {e}");
            return 1;
        }
    };

    let coordinator_data_dir = match config::coordinator_data_dir() {
        Ok(dir) => dir,
        Err(e) => {
            eprintln!("gpexpand: {e}");
            return 1;
        }
    };

    let _pid_guard = match pidfile::PidFile::acquire(&coordinator_data_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("gpexpand: {e}");
            return 1;
        }
    };

    let conninfo = config::conninfo(&lifecycle_config.database);
    let mut session = match sql::PostgresSqlSession::connect(&conninfo) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("gpexpand: {e}");
            return 1;
        }
    };

    let executor: std::sync::Arc<dyn gpexpand_core::traits::RemoteExecutor> =
        std::sync::Arc::new(remote::SshRemoteExecutor::new(std::env::var("GP_SSH_USER").ok()));
    let batch_size = lifecycle_config.batch_size.clamp(1, 128);
    let pool = BatchPool::new(batch_size);

    let worker_conninfo = conninfo.clone();
    let controller = match LifecycleController::new(lifecycle_config, coordinator_data_dir.clone()) {
        Ok(controller) => controller
            .with_interview_hook(Box::new(interview::StubInterviewHook))
            .with_worker_session_factory(move || make_worker_sessions(&worker_conninfo)),
        Err(e) => {
            eprintln!("gpexpand: {e}");
            return 1;
        }
    };

    signals::install(controller.cancellation_token());

    let mut controller = controller;
    match controller.run(&mut session, executor, &pool) {
        Ok(action) => {
            report_success(&action);
            0
        }
        Err(e) => {
            eprintln!("gpexpand: {e}");
            match e {
                GpExpandError::Validation(_) | GpExpandError::InvalidStatus(_) => 1,
                GpExpandError::Cancelled(_) => 2,
                _ => 3,
            }
        }
    }
}

/// Opens the pair of sessions one redistribution worker thread owns: a
/// target-database session plus a controller-status session, opened
/// once per thread and reused for that thread's lifetime. A connect
/// failure here means the environment can't support the requested
/// parallelism at all, so it aborts the worker thread rather than
/// silently degrading.
fn make_worker_sessions(conninfo: &str) -> WorkerSessions {
    let target = sql::PostgresSqlSession::connect(conninfo)
        .expect("redistribution worker could not open its target-database session");
    let status = sql::PostgresSqlSession::connect(conninfo)
        .expect("redistribution worker could not open its status-database session");
    WorkerSessions {
        target: Box::new(target),
        status: Box::new(status),
    }
}

fn report_success(action: &LifecycleAction) {
    match action {
        LifecycleAction::RanRollback => println!("gpexpand: rollback complete"),
        LifecycleAction::RanPreparePipeline => {
            println!("gpexpand: prepare pipeline complete, segments added")
        }
        LifecycleAction::RanRedistribution(report) => println!(
            "gpexpand: redistribution finished, {} table(s) processed, {} cancelled, errors={}",
            report.items_processed, report.items_cancelled, report.had_errors
        ),
        LifecycleAction::EnteredInterview => {}
        LifecycleAction::CleanedSchema => println!("gpexpand: expand schema dropped"),
    }
}
