//! Durable, append-only record of preparation phases.
//!
//! A single-writer append-only file, opened for resume on restart,
//! fsynced after every write so that a crash never leaves a record
//! half-written. Unlike a write-ahead log there is no rotation — the
//! phase log is small (at most fifteen lines) and is deleted outright
//! at `PREPARE_DONE` or after a successful rollback.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use gpexpand_core::types::Phase;
use thiserror::Error;
use tracing::{debug, info, warn};

const PHASE_LOG_FILE: &str = "gpexpand.status";
const STANDBY_LOG_FILE: &str = "gpexpand.standby.status";

#[derive(Debug, Error)]
pub enum PhaseLogError {
    #[error("phase log already exists at {0}")]
    AlreadyExists(PathBuf),

    #[error("phase {attempted} is not the successor of current phase {current}")]
    OutOfOrder { current: Phase, attempted: Phase },

    #[error("phase log I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("phase log at {0} is empty or unreadable")]
    Corrupt(PathBuf),

    #[error("standby copy failed, coordinator append not committed: {0}")]
    StandbyCopyFailed(String),
}

pub type Result<T> = std::result::Result<T, PhaseLogError>;

/// One entry in the phase log: a phase and its resumable payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseEntry {
    pub phase: Phase,
    pub payload: String,
}

fn format_entry(entry: &PhaseEntry) -> String {
    format!("{}:{}\n", entry.phase, entry.payload)
}

fn parse_entry(line: &str) -> Result<PhaseEntry> {
    let (phase_str, payload) = line
        .split_once(':')
        .ok_or_else(|| PhaseLogError::Corrupt(PathBuf::from(line)))?;
    let phase: Phase = phase_str
        .parse()
        .map_err(|_| PhaseLogError::Corrupt(PathBuf::from(line)))?;
    Ok(PhaseEntry {
        phase,
        payload: payload.to_string(),
    })
}

/// Append-only phase log. Owned exclusively by the top-level controller.
pub struct PhaseLog {
    path: PathBuf,
    standby_path: Option<PathBuf>,
    standby_host: Option<String>,
    history: Vec<PhaseEntry>,
    loaded_from_standby: bool,
}

impl PhaseLog {
    /// Initializes a new phase log at `<coordinator_data_dir>/gpexpand.status`
    /// with a single `UNINITIALIZED` entry. Fails if the file already
    /// exists — a phase log is created exactly once per expansion attempt.
    pub fn create(coordinator_data_dir: &Path, standby_host: Option<String>) -> Result<Self> {
        let path = coordinator_data_dir.join(PHASE_LOG_FILE);
        if path.exists() {
            return Err(PhaseLogError::AlreadyExists(path));
        }
        let standby_path = standby_host
            .is_some()
            .then(|| coordinator_data_dir.join(STANDBY_LOG_FILE));

        let mut log = PhaseLog {
            path,
            standby_path,
            standby_host,
            history: Vec::new(),
            loaded_from_standby: false,
        };
        let first = PhaseEntry {
            phase: Phase::Uninitialized,
            payload: String::new(),
        };
        log.write_entry(&first, true)?;
        log.history.push(first);
        info!(target: "gpexpand::phaselog", path = %log.path.display(), "created phase log");
        Ok(log)
    }

    /// Reopens an existing phase log, replaying its history. Set
    /// `from_standby` to load the mirrored copy (used when the coordinator
    /// file is unreadable and the standby is being promoted).
    pub fn open(coordinator_data_dir: &Path, from_standby: bool) -> Result<Self> {
        let primary_path = coordinator_data_dir.join(PHASE_LOG_FILE);
        let standby_path = coordinator_data_dir.join(STANDBY_LOG_FILE);
        let read_path = if from_standby { &standby_path } else { &primary_path };

        let file = File::open(read_path)?;
        let reader = BufReader::new(file);
        let mut history = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            history.push(parse_entry(&line)?);
        }
        if history.is_empty() {
            return Err(PhaseLogError::Corrupt(read_path.clone()));
        }
        Ok(PhaseLog {
            path: primary_path,
            standby_path: standby_path.exists().then_some(standby_path),
            standby_host: None,
            history,
            loaded_from_standby: from_standby,
        })
    }

    pub fn exists(coordinator_data_dir: &Path) -> bool {
        coordinator_data_dir.join(PHASE_LOG_FILE).exists()
    }

    /// Last recorded phase and its payload.
    pub fn current(&self) -> &PhaseEntry {
        self.history.last().expect("phase log always has at least UNINITIALIZED")
    }

    pub fn history(&self) -> &[PhaseEntry] {
        &self.history
    }

    pub fn is_standby_record(&self) -> bool {
        self.loaded_from_standby
    }

    /// Appends a new entry. The new phase must be the immediate successor
    /// of `current()`'s phase; any other transition is `OutOfOrder`.
    ///
    /// If a standby is configured, the standby-local file is written and
    /// flushed first; only once that succeeds is the coordinator-local
    /// file appended. This keeps the standby at most one phase behind the
    /// coordinator, never ahead and never stale by more than one entry —
    /// a standby write failure aborts the whole append rather than
    /// letting the coordinator log outrun its mirror.
    pub fn advance(&mut self, phase: Phase, payload: impl Into<String>) -> Result<()> {
        let current = self.current().phase;
        if !phase.is_successor_of(current) {
            return Err(PhaseLogError::OutOfOrder {
                current,
                attempted: phase,
            });
        }
        let entry = PhaseEntry {
            phase,
            payload: payload.into(),
        };
        self.write_entry(&entry, false)?;
        debug!(target: "gpexpand::phaselog", phase = %phase, "advanced phase log");
        self.history.push(entry);
        Ok(())
    }

    fn write_entry(&self, entry: &PhaseEntry, creating: bool) -> Result<()> {
        if let Some(standby_path) = &self.standby_path {
            Self::append_and_sync(standby_path, entry, creating)
                .map_err(|e| PhaseLogError::StandbyCopyFailed(e.to_string()))?;
            if let Some(host) = &self.standby_host {
                debug!(target: "gpexpand::phaselog", host = %host, "mirrored phase entry to standby");
            }
        }
        Self::append_and_sync(&self.path, entry, creating)?;
        Ok(())
    }

    fn append_and_sync(path: &Path, entry: &PhaseEntry, _creating: bool) -> std::io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(format_entry(entry).as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Deletes both the coordinator and standby copies.
    pub fn remove(self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        if let Some(standby_path) = &self.standby_path {
            if standby_path.exists() {
                std::fs::remove_file(standby_path)?;
            }
        }
        warn!(target: "gpexpand::phaselog", "phase log removed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_fails_if_log_already_exists() {
        let dir = tempdir().unwrap();
        let _log = PhaseLog::create(dir.path(), None).unwrap();
        let err = PhaseLog::create(dir.path(), None).unwrap_err();
        assert!(matches!(err, PhaseLogError::AlreadyExists(_)));
    }

    #[test]
    fn advance_only_allows_immediate_successor() {
        let dir = tempdir().unwrap();
        let mut log = PhaseLog::create(dir.path(), None).unwrap();
        log.advance(Phase::PrepareStarted, "").unwrap();
        let err = log.advance(Phase::TemplateDone, "").unwrap_err();
        assert!(matches!(err, PhaseLogError::OutOfOrder { .. }));
        log.advance(Phase::TemplateStarted, "tmp-dir-path").unwrap();
        assert_eq!(log.current().phase, Phase::TemplateStarted);
    }

    #[test]
    fn write_then_reopen_yields_same_history() {
        let dir = tempdir().unwrap();
        {
            let mut log = PhaseLog::create(dir.path(), None).unwrap();
            log.advance(Phase::PrepareStarted, "").unwrap();
            log.advance(Phase::TemplateStarted, "/tmp/scratch").unwrap();
        }
        let reopened = PhaseLog::open(dir.path(), false).unwrap();
        assert_eq!(reopened.history().len(), 3);
        assert_eq!(reopened.current().phase, Phase::TemplateStarted);
        assert_eq!(reopened.current().payload, "/tmp/scratch");
        assert!(!reopened.is_standby_record());
    }

    #[test]
    fn standby_mirror_is_written_alongside_coordinator() {
        let dir = tempdir().unwrap();
        let mut log = PhaseLog::create(dir.path(), Some("standby-host".into())).unwrap();
        log.advance(Phase::PrepareStarted, "").unwrap();
        assert!(dir.path().join(STANDBY_LOG_FILE).exists());
        let standby_history = PhaseLog::open(dir.path(), true).unwrap();
        assert_eq!(standby_history.current().phase, Phase::PrepareStarted);
        assert!(standby_history.is_standby_record());
    }

    #[test]
    fn remove_deletes_both_copies() {
        let dir = tempdir().unwrap();
        let log = PhaseLog::create(dir.path(), Some("standby-host".into())).unwrap();
        let primary = dir.path().join(PHASE_LOG_FILE);
        let standby = dir.path().join(STANDBY_LOG_FILE);
        assert!(primary.exists());
        assert!(standby.exists());
        log.remove().unwrap();
        assert!(!primary.exists());
        assert!(!standby.exists());
    }

    #[test]
    fn exists_reflects_presence_of_primary_file() {
        let dir = tempdir().unwrap();
        assert!(!PhaseLog::exists(dir.path()));
        let _log = PhaseLog::create(dir.path(), None).unwrap();
        assert!(PhaseLog::exists(dir.path()));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use tempfile::tempdir;

    /// The total order's successor chain from `UNINITIALIZED`, used to
    /// generate arbitrary valid prefixes of phase history.
    fn successor_chain() -> Vec<Phase> {
        let mut chain = vec![Phase::Uninitialized];
        while let Some(next) = chain.last().unwrap().successor() {
            chain.push(next);
        }
        chain
    }

    proptest! {
        // Round-trip law from SPEC_FULL.md §8: a phase log write
        // followed by reopen yields the same history, for any valid
        // prefix of the total order the caller might have reached
        // before a crash.
        #[test]
        fn write_then_reopen_round_trips_for_any_valid_prefix(prefix_len in 1usize..=15, payload_seed in 0u32..1000) {
            let chain = successor_chain();
            let prefix_len = prefix_len.min(chain.len());
            let dir = tempdir().unwrap();
            {
                let mut log = PhaseLog::create(dir.path(), None).unwrap();
                for phase in &chain[1..prefix_len] {
                    log.advance(*phase, format!("payload-{payload_seed}")).unwrap();
                }
            }
            let reopened = PhaseLog::open(dir.path(), false).unwrap();
            prop_assert_eq!(reopened.history().len(), prefix_len);
            prop_assert_eq!(reopened.current().phase, chain[prefix_len - 1]);
        }
    }
}
