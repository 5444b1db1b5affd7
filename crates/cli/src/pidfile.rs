//! Single-writer PID-file guard: the phase log is single-writer, so
//! concurrent instances are blocked by a PID file in the coordinator
//! data directory. Lives in the CLI's process-lifecycle layer rather
//! than the core crates.

use std::fs;
use std::path::{Path, PathBuf};

use nix::unistd::Pid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PidFileError {
    #[error("another gpexpand run (pid {0}) is already in progress against this coordinator data directory")]
    AlreadyRunning(i32),

    #[error("pid file I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    /// Creates `<coordinator_data_dir>/gpexpand.pid` containing the
    /// current process id. Refuses if a pid file already exists and
    /// names a process that is still alive (checked via `/proc/<pid>`
    /// on Linux, the platform every example cluster in this pack runs
    /// on); a stale pid file naming a dead process is reclaimed.
    pub fn acquire(coordinator_data_dir: &Path) -> Result<Self, PidFileError> {
        let path = coordinator_data_dir.join("gpexpand.pid");
        if let Ok(existing) = fs::read_to_string(&path) {
            if let Ok(pid) = existing.trim().parse::<i32>() {
                if process_is_alive(pid) {
                    return Err(PidFileError::AlreadyRunning(pid));
                }
            }
        }
        let my_pid = Pid::this().as_raw();
        fs::write(&path, my_pid.to_string())?;
        Ok(PidFile { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

#[cfg(target_os = "linux")]
fn process_is_alive(pid: i32) -> bool {
    Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(not(target_os = "linux"))]
fn process_is_alive(pid: i32) -> bool {
    nix::sys::signal::kill(Pid::from_raw(pid), None).is_ok()
}
