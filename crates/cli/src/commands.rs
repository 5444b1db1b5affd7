//! Clap command tree definition for the CLI surface.
//!
//! One flat `Command` with every flag declared `global(true)` so it
//! reads the same whether given before or after a value. gpexpand has
//! no subcommands — the mode (prepare / redistribute / rollback /
//! clean / interview) is *inferred* from which flags are present plus
//! on-disk/in-database state (`LifecycleController::run`), not
//! selected by a subcommand name.

use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("gpexpand")
        .about("Adds segment hosts to a running cluster and redistributes table data onto them")
        .arg(
            Arg::new("input-file")
                .short('i')
                .long("input-file")
                .help("Input segment file describing new segments; triggers the prepare pipeline")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("hosts-file")
                .short('f')
                .long("hosts-file")
                .help("Hosts file handed to the interactive interview")
                .value_name("FILE"),
        )
        .arg(
            Arg::new("database")
                .short('D')
                .long("database")
                .help("Database to host the expand schema (must not be a template db or postgres)")
                .value_name("DB"),
        )
        .arg(
            Arg::new("batch-size")
                .short('B')
                .long("batch-size")
                .help("Remote-command batch size, 1-128 (env override GP_MGMT_PROCESS_COUNT)")
                .value_name("N"),
        )
        .arg(
            Arg::new("parallel")
                .short('n')
                .long("parallel")
                .help("Redistribution parallelism, 1-96")
                .value_name("N"),
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .help("Deadline as a duration from now, HH:MM:SS")
                .value_name("DURATION"),
        )
        .arg(
            Arg::new("end-time")
                .short('e')
                .long("end-time")
                .help("Absolute deadline, 'YYYY-MM-DD hh:mm:ss'")
                .value_name("TIMESTAMP"),
        )
        .arg(
            Arg::new("rollback")
                .short('r')
                .long("rollback")
                .help("Roll back an interrupted expansion")
                .action(ArgAction::SetTrue)
                .conflicts_with("clean"),
        )
        .arg(
            Arg::new("clean")
                .short('c')
                .long("clean")
                .help("Drop the expand schema")
                .action(ArgAction::SetTrue)
                .conflicts_with("rollback"),
        )
        .arg(
            Arg::new("skip-vacuum")
                .short('V')
                .long("skip-vacuum")
                .help("Skip the catalog vacuum before building the segment template")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("simple-progress")
                .short('S')
                .long("simple-progress")
                .help("Skip IN PROGRESS status writes and size estimation")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("analyze")
                .short('a')
                .long("analyze")
                .help("Run ANALYZE after each table's redistribution")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("silent")
                .short('s')
                .long("silent")
                .help("Suppress warning prompts")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("tar-dir")
                .short('t')
                .long("tar-dir")
                .help("Directory to hold the segment template tar file")
                .value_name("DIR"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Verbose logging")
                .action(ArgAction::SetTrue),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rollback_and_clean_are_mutually_exclusive() {
        let cli = build_cli();
        let err = cli
            .try_get_matches_from(["gpexpand", "-r", "-c"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ArgumentConflict);
    }

    #[test]
    fn parses_prepare_pipeline_flags() {
        let cli = build_cli();
        let matches = cli
            .try_get_matches_from(["gpexpand", "-i", "segments.conf", "-D", "mydb", "-n", "8"])
            .unwrap();
        assert_eq!(matches.get_one::<String>("input-file").map(String::as_str), Some("segments.conf"));
        assert_eq!(matches.get_one::<String>("parallel").map(String::as_str), Some("8"));
    }
}
