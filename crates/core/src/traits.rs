//! Contracts for the collaborators this crate keeps explicitly out of
//! scope: the blocking SQL client and the remote command-execution
//! backend. Every other crate in the workspace programs against these
//! traits, never against a concrete client, so the orchestrator is
//! free of global state and is testable with in-memory doubles (see
//! [`crate::testing`]).

use std::path::Path;

use crate::error::GpResult;

/// One row returned from a [`SqlSession::query`] call. Column values are
/// kept as their textual representation; callers that need a typed value
/// parse it themselves, mirroring the loose typing of catalog queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    pub columns: Vec<Option<String>>,
}

impl Row {
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.columns.get(idx).and_then(|c| c.as_deref())
    }
}

/// A blocking SQL session: transactions, parameterless queries, and a
/// binary COPY-style bulk loader. Implementations may be a real Postgres
/// connection (utility mode or normal), or a scripted test double.
pub trait SqlSession: Send {
    /// Executes a statement that does not return rows; returns the number
    /// of rows affected.
    fn execute(&mut self, sql: &str) -> GpResult<u64>;

    /// Executes a statement that returns rows.
    fn query(&mut self, sql: &str) -> GpResult<Vec<Row>>;

    fn begin(&mut self) -> GpResult<()>;
    fn commit(&mut self) -> GpResult<()>;
    fn rollback(&mut self) -> GpResult<()>;

    /// Bulk-loads `rows` into the table/column list named by `sql`
    /// (a `COPY <target> FROM STDIN`-shaped statement). Returns the count
    /// of rows loaded. Streams rows directly rather than round-tripping
    /// a temp file through `COPY FROM '<path>'`.
    fn copy_in(
        &mut self,
        sql: &str,
        rows: &mut dyn Iterator<Item = Vec<Option<String>>>,
    ) -> GpResult<u64>;
}

/// A single remote operation dispatched to a segment host. `BatchPool`
/// (see `gpexpand-concurrency`) is generic over this enum via
/// [`RemoteExecutor`].
#[derive(Debug, Clone)]
pub enum RemoteCommand {
    /// Run a shell command on the remote host.
    Shell { command: String },
    /// Copy a local file to a remote path (already staged by the caller
    /// via [`RemoteExecutor::copy_to`] in the common case; this variant
    /// covers remote-to-remote or templated copy steps).
    CopyFile { remote_source: String, remote_dest: String },
    /// Remove a remote path, recursively if it names a directory.
    Remove { remote_path: String },
}

/// Outcome of one dispatched [`RemoteCommand`].
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutcome {
    pub fn ok(stdout: impl Into<String>) -> Self {
        CommandOutcome {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    pub fn failed(stderr: impl Into<String>, exit_code: Option<i32>) -> Self {
        CommandOutcome {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }
}

/// Batch-capable remote execution backend: shell/file operations against
/// a named host, reporting success or failure. Implementations are free
/// to pool SSH connections internally; the contract itself is stateless
/// per call.
pub trait RemoteExecutor: Send + Sync {
    fn run(&self, host: &str, command: &RemoteCommand) -> GpResult<CommandOutcome>;
    fn copy_to(&self, host: &str, local: &Path, remote: &Path) -> GpResult<()>;
}

/// Hand-off contract to the interactive interview that produces an input
/// segment file; that interview itself is treated as an external
/// collaborator, out of scope for this crate. `LifecycleController`
/// invokes this when it finds no input file, no phase log, and no
/// in-database expansion state — the last row of the state routing
/// matrix. The real interactive generator is not part of this crate;
/// callers wire in whatever hosts-file-driven prompting flow they have.
pub trait InterviewHook: Send + Sync {
    fn run(&self, hosts_file: Option<&Path>) -> GpResult<()>;
}
