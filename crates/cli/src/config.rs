//! Merges built-in defaults, environment variables, and parsed CLI
//! flags into a [`LifecycleConfig`] (SPEC_FULL.md §1.3's layered
//! configuration, highest precedence last: defaults → env → flags).

use std::path::PathBuf;

use chrono::{DateTime, NaiveDateTime, Utc};
use clap::ArgMatches;
use gpexpand_core::error::{GpExpandError, GpResult};
use gpexpand_engine::LifecycleConfig;

const DEFAULT_BATCH_SIZE: usize = 16;
const DEFAULT_PARALLELISM: usize = 4;

fn env_batch_size() -> Option<usize> {
    std::env::var("GP_MGMT_PROCESS_COUNT").ok()?.parse().ok()
}

fn parse_hh_mm_ss(s: &str) -> GpResult<chrono::Duration> {
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return Err(GpExpandError::Validation(format!(
            "-d duration must be HH:MM:SS, got {s:?}"
        )));
    }
    let hh: i64 = parts[0]
        .parse()
        .map_err(|_| GpExpandError::Validation(format!("malformed duration {s:?}")))?;
    let mm: i64 = parts[1]
        .parse()
        .map_err(|_| GpExpandError::Validation(format!("malformed duration {s:?}")))?;
    let ss: i64 = parts[2]
        .parse()
        .map_err(|_| GpExpandError::Validation(format!("malformed duration {s:?}")))?;
    Ok(chrono::Duration::hours(hh) + chrono::Duration::minutes(mm) + chrono::Duration::seconds(ss))
}

fn parse_absolute_deadline(s: &str) -> GpResult<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map_err(|_| GpExpandError::Validation(format!(
            "-e deadline must be 'YYYY-MM-DD hh:mm:ss', got {s:?}"
        )))?;
    Ok(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
}

/// Builds the validated [`LifecycleConfig`] from CLI flags, environment
/// variables, and defaults. `-d` and `-e` are resolved to the *later*
/// of the two absolute instants when both are given.
pub fn build_lifecycle_config(matches: &ArgMatches) -> GpResult<LifecycleConfig> {
    let input_file = matches.get_one::<String>("input-file").map(PathBuf::from);
    let hosts_file = matches.get_one::<String>("hosts-file").map(PathBuf::from);

    let database = matches
        .get_one::<String>("database")
        .cloned()
        .or_else(|| std::env::var("PGDATABASE").ok())
        .unwrap_or_else(|| "gpadmin".to_string());

    let batch_size = match matches.get_one::<String>("batch-size") {
        Some(s) => s
            .parse()
            .map_err(|_| GpExpandError::Validation(format!("malformed -B value {s:?}")))?,
        None => env_batch_size().unwrap_or(DEFAULT_BATCH_SIZE),
    };

    let parallelism = match matches.get_one::<String>("parallel") {
        Some(s) => s
            .parse()
            .map_err(|_| GpExpandError::Validation(format!("malformed -n value {s:?}")))?,
        None => DEFAULT_PARALLELISM,
    };

    let from_duration = matches
        .get_one::<String>("duration")
        .map(|s| parse_hh_mm_ss(s))
        .transpose()?
        .map(|d| Utc::now() + d);
    let from_end_time = matches
        .get_one::<String>("end-time")
        .map(|s| parse_absolute_deadline(s))
        .transpose()?;
    let deadline = match (from_duration, from_end_time) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (Some(a), None) => Some(a),
        (None, Some(b)) => Some(b),
        (None, None) => None,
    };

    Ok(LifecycleConfig {
        input_file,
        hosts_file,
        database,
        batch_size,
        parallelism,
        deadline,
        rollback: matches.get_flag("rollback"),
        clean: matches.get_flag("clean"),
        skip_vacuum: matches.get_flag("skip-vacuum"),
        simple_progress: matches.get_flag("simple-progress"),
        analyze_after: matches.get_flag("analyze"),
        suppress_prompts: matches.get_flag("silent"),
        tar_dir: matches.get_one::<String>("tar-dir").map(PathBuf::from),
        verbose: matches.get_flag("verbose"),
    })
}

/// Postgres conninfo string from the environment and the resolved
/// database name, reading the conventional `PGHOST`/`PGPORT`/`PGUSER`
/// env vars.
pub fn conninfo(database: &str) -> String {
    let port = std::env::var("PGPORT").unwrap_or_else(|_| "5432".to_string());
    let host = std::env::var("PGHOST").unwrap_or_else(|_| "localhost".to_string());
    let user = std::env::var("PGUSER").unwrap_or_else(|_| "gpadmin".to_string());
    format!("host={host} port={port} dbname={database} user={user}")
}

/// Coordinator data directory, normally obtained from installation
/// helpers outside this crate's scope. The CLI reads the same
/// environment variable those helpers conventionally export.
pub fn coordinator_data_dir() -> GpResult<PathBuf> {
    std::env::var("MASTER_DATA_DIRECTORY")
        .map(PathBuf::from)
        .map_err(|_| GpExpandError::Validation(
            "MASTER_DATA_DIRECTORY must be set in the environment".into(),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::build_cli;

    #[test]
    fn builds_config_from_minimal_flags() {
        let matches = build_cli()
            .try_get_matches_from(["gpexpand", "-i", "segments.conf", "-D", "mydb"])
            .unwrap();
        let cfg = build_lifecycle_config(&matches).unwrap();
        assert_eq!(cfg.database, "mydb");
        assert_eq!(cfg.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(cfg.parallelism, DEFAULT_PARALLELISM);
        assert!(cfg.deadline.is_none());
    }

    #[test]
    fn later_of_duration_and_end_time_wins() {
        let far_future = (Utc::now() + chrono::Duration::days(3650))
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();
        let matches = build_cli()
            .try_get_matches_from([
                "gpexpand",
                "-i",
                "segments.conf",
                "-d",
                "00:00:05",
                "-e",
                &far_future,
            ])
            .unwrap();
        let cfg = build_lifecycle_config(&matches).unwrap();
        let deadline = cfg.deadline.unwrap();
        assert!(deadline > Utc::now() + chrono::Duration::days(3000));
    }

    #[test]
    fn rejects_malformed_duration() {
        let matches = build_cli()
            .try_get_matches_from(["gpexpand", "-i", "segments.conf", "-d", "bogus"])
            .unwrap();
        assert!(build_lifecycle_config(&matches).is_err());
    }
}
