//! Distribute phase of segment templating, `SEGMENTS_STARTED` →
//! `SEGMENTS_DONE`. The build phase (pure filesystem work) is
//! `gpexpand_durability::TemplateBuilder`; this module covers the
//! remaining steps, which need a [`RemoteExecutor`] and therefore live
//! one layer up.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use gpexpand_concurrency::BatchPool;
use gpexpand_core::error::GpResult;
use gpexpand_core::traits::{RemoteCommand, RemoteExecutor};
use tracing::{info, warn};

/// Outcome of distributing a built template to every new segment host.
#[derive(Debug, Clone, Default)]
pub struct DistributeReport {
    pub hosts_contacted: usize,
    pub failed_hosts: Vec<String>,
}

impl DistributeReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed_hosts.is_empty()
    }
}

/// Resolves the unique set of new segment hosts (step 1), copies the tar
/// to each (step 2), runs the segment-configure command on primaries and
/// a validation-only command on mirrors (step 3), and reports per-host
/// success (step 4's new-segment count is the caller's responsibility,
/// since it also needs the parsed `SegmentSpec` list to record in the
/// phase payload).
pub fn distribute_template(
    pool: &BatchPool,
    executor: Arc<dyn RemoteExecutor>,
    tar_path: &Path,
    remote_tar_path: &str,
    primary_hosts: &[String],
    mirror_hosts: &[String],
) -> GpResult<DistributeReport> {
    let unique_hosts: BTreeSet<String> = primary_hosts
        .iter()
        .chain(mirror_hosts.iter())
        .cloned()
        .collect();

    let tar_path = tar_path.to_path_buf();
    let remote_tar_path = remote_tar_path.to_string();
    let jobs: Vec<_> = unique_hosts
        .iter()
        .cloned()
        .map(|host| {
            let tar_path = tar_path.clone();
            let remote_tar_path = remote_tar_path.clone();
            let executor = Arc::clone(&executor);
            move || -> (String, bool) {
                let ok = executor.copy_to(&host, &tar_path, Path::new(&remote_tar_path)).is_ok();
                (host, ok)
            }
        })
        .collect();

    let copy_results = pool.run_batch(jobs);
    let mut failed_hosts = Vec::new();
    let mut copied_hosts = BTreeSet::new();
    for result in copy_results.into_iter().flatten() {
        let (host, ok) = result;
        if ok {
            copied_hosts.insert(host);
        } else {
            failed_hosts.push(host);
        }
    }

    let primary_set: BTreeSet<&String> = primary_hosts.iter().collect();
    let configure_jobs: Vec<_> = copied_hosts
        .iter()
        .cloned()
        .map(|host| {
            let is_primary = primary_set.contains(&host);
            let remote_tar_path = remote_tar_path.clone();
            let executor = Arc::clone(&executor);
            move || -> (String, bool) {
                let command = if is_primary {
                    RemoteCommand::Shell {
                        command: format!("gpexpand_configure_segment --tar {remote_tar_path}"),
                    }
                } else {
                    RemoteCommand::Shell {
                        command: format!("gpexpand_validate_segment --tar {remote_tar_path}"),
                    }
                };
                let ok = executor
                    .run(&host, &command)
                    .map(|o| o.success)
                    .unwrap_or(false);
                (host, ok)
            }
        })
        .collect();

    let configure_results = pool.run_batch(configure_jobs);
    for result in configure_results.into_iter().flatten() {
        let (host, ok) = result;
        if !ok {
            failed_hosts.push(host);
        }
    }

    if failed_hosts.is_empty() {
        info!(target: "gpexpand::template", hosts = unique_hosts.len(), "template distributed to all new segment hosts");
    } else {
        warn!(target: "gpexpand::template", ?failed_hosts, "template distribution failed on some hosts");
    }

    Ok(DistributeReport {
        hosts_contacted: unique_hosts.len(),
        failed_hosts,
    })
}
