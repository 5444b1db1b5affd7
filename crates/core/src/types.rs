//! Data model types shared by every `gpexpand-*` crate: segments, the phase
//! state machine, and the redistribution work-queue row.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GpExpandError;

/// Primary or mirror role of a segment instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SegmentRole {
    Primary,
    Mirror,
}

impl SegmentRole {
    pub fn as_char(self) -> char {
        match self {
            SegmentRole::Primary => 'p',
            SegmentRole::Mirror => 'm',
        }
    }
}

impl FromStr for SegmentRole {
    type Err = GpExpandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "p" => Ok(SegmentRole::Primary),
            "m" => Ok(SegmentRole::Mirror),
            other => Err(GpExpandError::Validation(format!(
                "input-file role must be 'p' or 'm', got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for SegmentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One new segment instance, as described by one line of the input
/// segment file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpec {
    pub host: String,
    pub address: String,
    pub port: u16,
    pub data_directory: PathBuf,
    pub dbid: i32,
    pub content_id: i32,
    pub role: SegmentRole,
    pub replication_port: Option<u16>,
    pub filespaces: Option<BTreeMap<String, PathBuf>>,
}

impl SegmentSpec {
    /// Constructs a segment spec, enforcing the invariants from the data
    /// model: non-empty host/address, non-negative ids, and (when any
    /// non-system filespace is configured) a path for every one of them.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        host: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        data_directory: PathBuf,
        dbid: i32,
        content_id: i32,
        role: SegmentRole,
        replication_port: Option<u16>,
        filespaces: Option<BTreeMap<String, PathBuf>>,
    ) -> Result<Self, GpExpandError> {
        let host = host.into();
        let address = address.into();
        if host.trim().is_empty() {
            return Err(GpExpandError::Validation("segment host must not be empty".into()));
        }
        if address.trim().is_empty() {
            return Err(GpExpandError::Validation(
                "segment address must not be empty".into(),
            ));
        }
        if dbid < 0 || content_id < -1 {
            return Err(GpExpandError::Validation(
                "segment dbid must be non-negative and content id must be -1 (coordinator) or non-negative".into(),
            ));
        }
        if let Some(fs) = &filespaces {
            if fs.values().any(|p| p.as_os_str().is_empty()) {
                return Err(GpExpandError::Validation(
                    "every configured filespace must have a non-empty path".into(),
                ));
            }
        }
        Ok(SegmentSpec {
            host,
            address,
            port,
            data_directory,
            dbid,
            content_id,
            role,
            replication_port,
            filespaces,
        })
    }

    pub fn is_primary(&self) -> bool {
        self.role == SegmentRole::Primary
    }
}

/// A (primary, mirrors…) tuple keyed implicitly by content id in `SegmentSet`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentRow {
    pub primary: SegmentSpec,
    pub mirrors: Vec<SegmentSpec>,
}

/// Current cluster membership: coordinator, optional standby, and the
/// ordered-by-content-id segment rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentSet {
    pub coordinator: Option<SegmentSpec>,
    pub coordinator_standby: Option<SegmentSpec>,
    pub content_rows: BTreeMap<i32, ContentRow>,
}

impl SegmentSet {
    pub fn new() -> Self {
        SegmentSet::default()
    }

    /// Segments present in `self` but absent from `base` — the set of rows
    /// a catalog mutation against `base` must add to arrive at `self`.
    pub fn segments_to_add(&self, base: &SegmentSet) -> Vec<SegmentSpec> {
        let mut added = Vec::new();
        for (content_id, row) in &self.content_rows {
            match base.content_rows.get(content_id) {
                None => {
                    added.push(row.primary.clone());
                    added.extend(row.mirrors.iter().cloned());
                }
                Some(base_row) => {
                    if base_row.primary.dbid != row.primary.dbid {
                        added.push(row.primary.clone());
                    }
                    let base_mirror_dbids: Vec<i32> =
                        base_row.mirrors.iter().map(|m| m.dbid).collect();
                    added.extend(
                        row.mirrors
                            .iter()
                            .filter(|m| !base_mirror_dbids.contains(&m.dbid))
                            .cloned(),
                    );
                }
            }
        }
        added
    }

    /// The highest dbid currently assigned to any segment or the coordinator.
    pub fn max_dbid(&self) -> i32 {
        let mut max = self.coordinator.as_ref().map(|c| c.dbid).unwrap_or(0);
        if let Some(standby) = &self.coordinator_standby {
            max = max.max(standby.dbid);
        }
        for row in self.content_rows.values() {
            max = max.max(row.primary.dbid);
            max = max.max(row.mirrors.iter().map(|m| m.dbid).max().unwrap_or(0));
        }
        max
    }

    /// Every distinct filespace name referenced by any segment.
    pub fn filespace_names(&self) -> Vec<String> {
        let mut names = std::collections::BTreeSet::new();
        let mut collect = |spec: &SegmentSpec| {
            if let Some(fs) = &spec.filespaces {
                for name in fs.keys() {
                    names.insert(name.clone());
                }
            }
        };
        if let Some(c) = &self.coordinator {
            collect(c);
        }
        for row in self.content_rows.values() {
            collect(&row.primary);
            for m in &row.mirrors {
                collect(m);
            }
        }
        names.into_iter().collect()
    }

    pub fn mirroring_enabled(&self) -> bool {
        self.content_rows.values().any(|row| !row.mirrors.is_empty())
    }

    /// Every distinct segment address currently in the set, coordinator
    /// and standby included.
    pub fn all_addresses(&self) -> Vec<String> {
        let mut addresses = std::collections::BTreeSet::new();
        if let Some(c) = &self.coordinator {
            addresses.insert(c.address.clone());
        }
        if let Some(s) = &self.coordinator_standby {
            addresses.insert(s.address.clone());
        }
        for row in self.content_rows.values() {
            addresses.insert(row.primary.address.clone());
            for m in &row.mirrors {
                addresses.insert(m.address.clone());
            }
        }
        addresses.into_iter().collect()
    }
}

/// A named point in the preparation state machine, in strict total order.
/// Transitions are only ever allowed to the immediate successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Uninitialized,
    PrepareStarted,
    TemplateStarted,
    TemplateDone,
    SegmentsStarted,
    SegmentsDone,
    OldSegmentsStarted,
    OldSegmentsDone,
    CatalogStarted,
    CatalogDone,
    SchemaStarted,
    SchemaDone,
    PopulateStarted,
    PopulateDone,
    PrepareDone,
}

const PHASE_ORDER: &[Phase] = &[
    Phase::Uninitialized,
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
];

impl Phase {
    pub fn index(self) -> usize {
        PHASE_ORDER.iter().position(|p| *p == self).expect("exhaustive phase list")
    }

    /// The only phase `advance()` may legally move to from `self`, or `None`
    /// if `self` is already the terminal phase.
    pub fn successor(self) -> Option<Phase> {
        PHASE_ORDER.get(self.index() + 1).copied()
    }

    pub fn is_successor_of(self, prior: Phase) -> bool {
        prior.successor() == Some(self)
    }

    /// `PREPARE_DONE` is the point of no return.
    pub fn is_point_of_no_return(self) -> bool {
        self == Phase::PrepareDone
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Uninitialized => "UNINITIALIZED",
            Phase::PrepareStarted => "PREPARE_STARTED",
            Phase::TemplateStarted => "TEMPLATE_STARTED",
            Phase::TemplateDone => "TEMPLATE_DONE",
            Phase::SegmentsStarted => "SEGMENTS_STARTED",
            Phase::SegmentsDone => "SEGMENTS_DONE",
            Phase::OldSegmentsStarted => "OLD_SEGMENTS_STARTED",
            Phase::OldSegmentsDone => "OLD_SEGMENTS_DONE",
            Phase::CatalogStarted => "CATALOG_STARTED",
            Phase::CatalogDone => "CATALOG_DONE",
            Phase::SchemaStarted => "SCHEMA_STARTED",
            Phase::SchemaDone => "SCHEMA_DONE",
            Phase::PopulateStarted => "POPULATE_STARTED",
            Phase::PopulateDone => "POPULATE_DONE",
            Phase::PrepareDone => "PREPARE_DONE",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Phase {
    type Err = GpExpandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PHASE_ORDER
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| GpExpandError::InvalidStatus(format!("unknown phase {s:?}")))
    }
}

/// Redistribution priority: rank-1 (unique-index) tables drain first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rank {
    Unique = 1,
    Ordinary = 2,
}

/// Lifecycle of one `status_detail` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkStatus {
    NotStarted,
    InProgress,
    Completed,
    NoLongerExists,
}

impl WorkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkStatus::NotStarted => "NOT STARTED",
            WorkStatus::InProgress => "IN PROGRESS",
            WorkStatus::Completed => "COMPLETED",
            WorkStatus::NoLongerExists => "NO LONGER EXISTS",
        }
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the redistribution work queue (`expand.status_detail`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableWorkItem {
    pub database: String,
    pub schema_oid: u32,
    pub relation_oid: u32,
    pub fq_name: String,
    pub policy_colnums: Vec<i16>,
    pub policy_names: Vec<String>,
    pub policy_coloids: Vec<u32>,
    pub storage_options: String,
    pub rank: Rank,
    pub status: WorkStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub source_bytes: i64,
}

impl TableWorkItem {
    /// The uniqueness key the data model requires:
    /// (database, schema id, relation id).
    pub fn key(&self) -> (String, u32, u32) {
        (self.database.clone(), self.schema_oid, self.relation_oid)
    }

    /// Invariant: `status = COMPLETED ⇒ started ≤ finished ∧
    /// source_bytes ≥ 0`.
    pub fn is_consistent(&self) -> bool {
        if self.source_bytes < 0 {
            return false;
        }
        if self.status == WorkStatus::Completed {
            return matches!(
                (self.started_at, self.finished_at),
                (Some(s), Some(f)) if s <= f
            );
        }
        true
    }
}

/// Top-level event recorded in `expand.status` (GlobalStatus log).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalEvent {
    Setup,
    SetupDone,
    ExpansionStarted,
    ExpansionStopped,
    ExpansionComplete,
}

impl GlobalEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            GlobalEvent::Setup => "SETUP",
            GlobalEvent::SetupDone => "SETUP DONE",
            GlobalEvent::ExpansionStarted => "EXPANSION STARTED",
            GlobalEvent::ExpansionStopped => "EXPANSION STOPPED",
            GlobalEvent::ExpansionComplete => "EXPANSION COMPLETE",
        }
    }
}

impl fmt::Display for GlobalEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
