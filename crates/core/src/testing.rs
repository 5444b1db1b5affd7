//! Fixture builders and in-memory test doubles shared across the
//! workspace's test suites.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crate::error::{GpExpandError, GpResult};
use crate::traits::{CommandOutcome, InterviewHook, RemoteCommand, RemoteExecutor, Row, SqlSession};
use crate::types::{SegmentRole, SegmentSpec};

/// Builds a valid [`SegmentSpec`] for a primary on host `name`, content id
/// `content_id`, with a deterministic dbid derived from `content_id`.
pub fn fixture_primary(name: &str, content_id: i32, dbid: i32) -> SegmentSpec {
    SegmentSpec::new(
        name,
        name,
        40000,
        PathBuf::from(format!("/data/p{content_id}")),
        dbid,
        content_id,
        SegmentRole::Primary,
        None,
        None,
    )
    .expect("fixture_primary builds a valid spec")
}

pub fn fixture_mirror(name: &str, content_id: i32, dbid: i32) -> SegmentSpec {
    SegmentSpec::new(
        name,
        name,
        50000,
        PathBuf::from(format!("/data/m{content_id}")),
        dbid,
        content_id,
        SegmentRole::Mirror,
        Some(51000),
        None,
    )
    .expect("fixture_mirror builds a valid spec")
}

/// A scripted response queue for one SQL statement shape, consumed in
/// order. Lets tests assert the orchestrator issues the SQL it's
/// expected to without standing up a real database.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    Rows(Vec<Row>),
    AffectedRows(u64),
    Fail(String),
}

/// An in-memory [`SqlSession`] double. Every call is logged in
/// `log` for assertions; responses are drained from a FIFO queue keyed by
/// call kind, falling back to a harmless default when the queue is empty.
#[derive(Default)]
pub struct FakeSqlSession {
    pub log: Vec<String>,
    pub query_responses: VecDeque<ScriptedResponse>,
    pub in_transaction: bool,
}

impl FakeSqlSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_rows(&mut self, rows: Vec<Row>) {
        self.query_responses.push_back(ScriptedResponse::Rows(rows));
    }

    pub fn push_failure(&mut self, message: impl Into<String>) {
        self.query_responses.push_back(ScriptedResponse::Fail(message.into()));
    }
}

impl SqlSession for FakeSqlSession {
    fn execute(&mut self, sql: &str) -> GpResult<u64> {
        self.log.push(format!("execute: {sql}"));
        match self.query_responses.pop_front() {
            Some(ScriptedResponse::AffectedRows(n)) => Ok(n),
            Some(ScriptedResponse::Fail(msg)) => Err(GpExpandError::Validation(msg)),
            Some(ScriptedResponse::Rows(_)) | None => Ok(0),
        }
    }

    fn query(&mut self, sql: &str) -> GpResult<Vec<Row>> {
        self.log.push(format!("query: {sql}"));
        match self.query_responses.pop_front() {
            Some(ScriptedResponse::Rows(rows)) => Ok(rows),
            Some(ScriptedResponse::Fail(msg)) => Err(GpExpandError::Validation(msg)),
            Some(ScriptedResponse::AffectedRows(_)) | None => Ok(Vec::new()),
        }
    }

    fn begin(&mut self) -> GpResult<()> {
        self.log.push("begin".into());
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> GpResult<()> {
        self.log.push("commit".into());
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> GpResult<()> {
        self.log.push("rollback".into());
        self.in_transaction = false;
        Ok(())
    }

    fn copy_in(
        &mut self,
        sql: &str,
        rows: &mut dyn Iterator<Item = Vec<Option<String>>>,
    ) -> GpResult<u64> {
        let count = rows.count() as u64;
        self.log.push(format!("copy_in({count} rows): {sql}"));
        Ok(count)
    }
}

/// An in-memory [`RemoteExecutor`] double that always succeeds and
/// records every dispatched command for assertions, or, when configured
/// via [`FakeRemoteExecutor::fail_host`], fails every call against a
/// specific host.
#[derive(Default)]
pub struct FakeRemoteExecutor {
    pub calls: parking_lot_free::Log,
    failing_hosts: Vec<String>,
}

/// A minimal `Mutex<Vec<_>>`-backed log, avoiding a `parking_lot`
/// dependency in this crate purely for a test double.
pub mod parking_lot_free {
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct Log(Mutex<Vec<String>>);

    impl Log {
        pub fn push(&self, entry: String) {
            self.0.lock().unwrap().push(entry);
        }

        pub fn snapshot(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }
}

impl FakeRemoteExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_host(mut self, host: impl Into<String>) -> Self {
        self.failing_hosts.push(host.into());
        self
    }
}

impl RemoteExecutor for FakeRemoteExecutor {
    fn run(&self, host: &str, command: &RemoteCommand) -> GpResult<CommandOutcome> {
        self.calls.push(format!("{host}: {command:?}"));
        if self.failing_hosts.iter().any(|h| h == host) {
            return Ok(CommandOutcome::failed(format!("simulated failure on {host}"), Some(1)));
        }
        Ok(CommandOutcome::ok(""))
    }

    fn copy_to(&self, host: &str, local: &Path, remote: &Path) -> GpResult<()> {
        self.calls
            .push(format!("{host}: copy_to {} -> {}", local.display(), remote.display()));
        if self.failing_hosts.iter().any(|h| h == host) {
            return Err(GpExpandError::Validation(format!("simulated copy failure on {host}")));
        }
        Ok(())
    }
}

/// An [`InterviewHook`] double that records whether it was invoked and
/// with which hosts-file path, without prompting anything.
#[derive(Default)]
pub struct RecordingInterviewHook {
    pub invoked: parking_lot_free::Log,
}

impl RecordingInterviewHook {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InterviewHook for RecordingInterviewHook {
    fn run(&self, hosts_file: Option<&Path>) -> GpResult<()> {
        self.invoked.push(
            hosts_file
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<none>".to_string()),
        );
        Ok(())
    }
}
