//! Real [`RemoteExecutor`] backed by `ssh`/`scp` subprocesses; remote
//! command execution is treated as an external collaborator behind a
//! contract only. A production fleet would pool persistent SSH
//! sessions; this default implementation shells out once per call,
//! which is correct if unhardened — exactly the line between the core
//! crates and this outer layer.

use std::path::Path;
use std::process::Command;

use gpexpand_core::error::{GpExpandError, GpResult};
use gpexpand_core::traits::{CommandOutcome, RemoteCommand, RemoteExecutor};

pub struct SshRemoteExecutor {
    ssh_user: Option<String>,
}

impl SshRemoteExecutor {
    pub fn new(ssh_user: Option<String>) -> Self {
        SshRemoteExecutor { ssh_user }
    }

    fn target(&self, host: &str) -> String {
        match &self.ssh_user {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        }
    }

    fn command_string(command: &RemoteCommand) -> String {
        match command {
            RemoteCommand::Shell { command } => command.clone(),
            RemoteCommand::CopyFile { remote_source, remote_dest } => {
                format!("cp -r {remote_source} {remote_dest}")
            }
            RemoteCommand::Remove { remote_path } => format!("rm -rf {remote_path}"),
        }
    }
}

impl RemoteExecutor for SshRemoteExecutor {
    fn run(&self, host: &str, command: &RemoteCommand) -> GpResult<CommandOutcome> {
        let output = Command::new("ssh")
            .arg(self.target(host))
            .arg(Self::command_string(command))
            .output()
            .map_err(|e| GpExpandError::Validation(format!("ssh dispatch to {host} failed: {e}")))?;
        Ok(CommandOutcome {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        })
    }

    fn copy_to(&self, host: &str, local: &Path, remote: &Path) -> GpResult<()> {
        let dest = format!("{}:{}", self.target(host), remote.display());
        let status = Command::new("scp")
            .arg(local)
            .arg(&dest)
            .status()
            .map_err(|e| GpExpandError::Validation(format!("scp to {host} failed: {e}")))?;
        if !status.success() {
            return Err(GpExpandError::Validation(format!(
                "scp to {host} exited with {status}"
            )));
        }
        Ok(())
    }
}
