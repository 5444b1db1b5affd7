//! Build phase of the segment template. The earlier steps (optional
//! catalog vacuum, source-segment selection, and the stop-cluster/
//! control-data check) need a live `SqlSession` and are orchestrated by
//! `gpexpand-engine::SegmentTemplate` one layer up; by the time
//! `TemplateBuilder::build` runs, the cluster is already confirmed
//! stopped.
//!
//! Builds into a scratch directory, then archives with an atomic
//! temp-file-then-rename and an xxh3 content checksum so a crash
//! mid-archive never leaves a half-written tar behind.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tar::Builder;
use thiserror::Error;
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

/// Directories copied out of a transaction-files filespace when one is
/// configured.
const TRANSACTION_FILE_DIRS: &[&str] = &[
    "pg_xlog",
    "pg_multixact",
    "pg_subtrans",
    "pg_clog",
    "pg_distributedlog",
    "pg_distributedxidmap",
];

/// Artefacts scrubbed from the template before archiving (step 7): log
/// directories, postmaster lock/opts files, prior controller artefacts,
/// and filespace flat files.
const SCRUB_DIRS: &[&str] = &["pg_log", "log"];
const SCRUB_FILES: &[&str] = &[
    "postmaster.pid",
    "postmaster.opts",
    "gpexpand.status",
    "gpexpand.standby.status",
    "gpexpand.gp_segment_configuration",
];
const SCRUB_FILE_SUFFIXES: &[&str] = &[".fs"];

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("template I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("template archive error: {0}")]
    Archive(String),
}

pub type Result<T> = std::result::Result<T, TemplateError>;

/// One resolved host-based-authentication trust entry (step 8).
#[derive(Debug, Clone)]
pub struct TrustEntry {
    pub address: String,
    pub is_ipv6: bool,
}

impl TrustEntry {
    fn mask_len(&self) -> u8 {
        if self.is_ipv6 {
            128
        } else {
            32
        }
    }

    /// `host all all <addr>/<masklen> trust\n`, exactly as SPEC_FULL §2
    /// specifies (preserving the original tool's wire format).
    fn to_line(&self) -> String {
        format!("host\tall\tall\t{}/{}\ttrust\n", self.address, self.mask_len())
    }
}

/// Result of a completed build: the scratch directory (kept until
/// distribution finishes, then cleaned up) and the produced tar archive.
pub struct TemplateBuildResult {
    pub scratch_dir: PathBuf,
    pub tar_path: PathBuf,
    pub checksum: u64,
}

/// Builds a portable template out of a coordinator data directory.
pub struct TemplateBuilder {
    tar_dir: PathBuf,
}

impl TemplateBuilder {
    pub fn new(tar_dir: PathBuf) -> Self {
        TemplateBuilder { tar_dir }
    }

    /// Runs steps 4–9 of the build phase. `scratch_root` is the parent
    /// directory under which a fresh scratch subdirectory is created;
    /// `filespace_dir` is the transaction-files filespace root, if
    /// configured; `hba_conf`/`postgresql_conf` are the selected source
    /// segment's files to overlay; `trust_entries` covers every existing
    /// and new segment host.
    pub fn build(
        &self,
        coordinator_data_dir: &Path,
        scratch_root: &Path,
        filespace_dir: Option<&Path>,
        hba_conf: &Path,
        postgresql_conf: &Path,
        trust_entries: &[TrustEntry],
    ) -> Result<TemplateBuildResult> {
        let scratch_dir = scratch_root.join("gpexpand_template");
        if scratch_dir.exists() {
            fs::remove_dir_all(&scratch_dir)?;
        }
        info!(target: "gpexpand::template", scratch = %scratch_dir.display(), "building segment template");

        copy_dir_recursive(coordinator_data_dir, &scratch_dir)?;
        overlay_file(hba_conf, &scratch_dir.join("pg_hba.conf"))?;
        overlay_file(postgresql_conf, &scratch_dir.join("postgresql.conf"))?;

        if let Some(fs_dir) = filespace_dir {
            for dir_name in TRANSACTION_FILE_DIRS {
                let src = fs_dir.join(dir_name);
                if src.exists() {
                    copy_dir_recursive(&src, &scratch_dir.join(dir_name))?;
                }
            }
        }

        scrub(&scratch_dir)?;
        append_trust_lines(&scratch_dir.join("pg_hba.conf"), trust_entries)?;

        let tar_path = self.tar_dir.join("gpexpand_template.tar");
        let checksum = archive_to_tar(&scratch_dir, &tar_path)?;

        Ok(TemplateBuildResult {
            scratch_dir,
            tar_path,
            checksum,
        })
    }

    /// Deletes the local scratch directory and tar file (used both for
    /// normal cleanup and rollback).
    pub fn cleanup(&self, result: &TemplateBuildResult) -> Result<()> {
        if result.scratch_dir.exists() {
            fs::remove_dir_all(&result.scratch_dir)?;
        }
        if result.tar_path.exists() {
            fs::remove_file(&result.tar_path)?;
        }
        debug!(target: "gpexpand::template", "template scratch dir and tar removed");
        Ok(())
    }
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dst_path = dst.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &dst_path)?;
        } else if file_type.is_file() {
            fs::copy(entry.path(), dst_path)?;
        }
        // symlinks are skipped; the original data directory does not
        // contain any that matter to a template.
    }
    Ok(())
}

fn overlay_file(src: &Path, dst: &Path) -> io::Result<()> {
    fs::copy(src, dst)?;
    Ok(())
}

fn scrub(scratch_dir: &Path) -> io::Result<()> {
    for dir in SCRUB_DIRS {
        let path = scratch_dir.join(dir);
        if path.exists() {
            fs::remove_dir_all(path)?;
        }
    }
    for file in SCRUB_FILES {
        let path = scratch_dir.join(file);
        if path.exists() {
            fs::remove_file(path)?;
        }
    }
    for entry in fs::read_dir(scratch_dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if SCRUB_FILE_SUFFIXES.iter().any(|suf| name.ends_with(suf)) {
            fs::remove_file(entry.path())?;
        }
    }
    Ok(())
}

fn append_trust_lines(hba_conf: &Path, entries: &[TrustEntry]) -> io::Result<()> {
    use std::io::Write;
    let mut seen = BTreeSet::new();
    let mut file = fs::OpenOptions::new().append(true).open(hba_conf)?;
    for entry in entries {
        let key = (entry.address.clone(), entry.is_ipv6);
        if seen.insert(key) {
            file.write_all(entry.to_line().as_bytes())?;
        }
    }
    Ok(())
}

/// Archives `scratch_dir` into a single tar file at `dest`, via a
/// temp-file-then-rename so a crash never leaves a partial tar at `dest`.
/// Returns the xxh3 checksum of the finished archive.
fn archive_to_tar(scratch_dir: &Path, dest: &Path) -> Result<u64> {
    let temp_path = dest.with_extension("tar.tmp");
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    match archive_to_tar_inner(scratch_dir, &temp_path) {
        Ok(()) => {
            fs::rename(&temp_path, dest)?;
        }
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
    }
    let data = fs::read(dest)?;
    Ok(xxh3_64(&data))
}

fn archive_to_tar_inner(scratch_dir: &Path, temp_path: &Path) -> Result<()> {
    let file = fs::File::create(temp_path)?;
    let mut builder = Builder::new(file);
    builder
        .append_dir_all(".", scratch_dir)
        .map_err(|e| TemplateError::Archive(e.to_string()))?;
    builder.finish().map_err(|e| TemplateError::Archive(e.to_string()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_file(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut f = fs::File::create(path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
    }

    #[test]
    fn build_copies_overlays_and_archives() {
        let root = tempdir().unwrap();
        let coordinator_dir = root.path().join("coordinator");
        write_file(&coordinator_dir.join("pg_hba.conf"), "local all all trust\n");
        write_file(&coordinator_dir.join("postgresql.conf"), "port=5432\n");
        write_file(&coordinator_dir.join("base").join("1").join("1"), "data");
        write_file(&coordinator_dir.join("pg_log").join("startup.log"), "log noise");
        write_file(&coordinator_dir.join("postmaster.pid"), "1234");

        let source_hba = root.path().join("source_hba.conf");
        write_file(&source_hba, "host all all 10.0.0.1/32 trust\n");
        let source_conf = root.path().join("source_postgresql.conf");
        write_file(&source_conf, "port=40000\n");

        let scratch_root = root.path().join("scratch");
        fs::create_dir_all(&scratch_root).unwrap();
        let tar_dir = root.path().join("tar");
        fs::create_dir_all(&tar_dir).unwrap();

        let builder = TemplateBuilder::new(tar_dir.clone());
        let trust_entries = vec![
            TrustEntry { address: "10.0.0.2".into(), is_ipv6: false },
            TrustEntry { address: "10.0.0.2".into(), is_ipv6: false }, // dedup check
            TrustEntry { address: "::1".into(), is_ipv6: true },
        ];
        let result = builder
            .build(&coordinator_dir, &scratch_root, None, &source_hba, &source_conf, &trust_entries)
            .unwrap();

        assert!(result.tar_path.exists());
        assert!(!result.scratch_dir.join("pg_log").exists());
        assert!(!result.scratch_dir.join("postmaster.pid").exists());
        let hba_contents = fs::read_to_string(result.scratch_dir.join("pg_hba.conf")).unwrap();
        assert!(hba_contents.contains("host all all 10.0.0.1/32 trust"));
        assert!(hba_contents.contains("host\tall\tall\t10.0.0.2/32\ttrust"));
        assert!(hba_contents.contains("host\tall\tall\t::1/128\ttrust"));
        // deduped: only one line for 10.0.0.2
        assert_eq!(hba_contents.matches("10.0.0.2").count(), 1);

        builder.cleanup(&result).unwrap();
        assert!(!result.scratch_dir.exists());
        assert!(!result.tar_path.exists());
    }

    #[test]
    fn archive_is_a_valid_tar_containing_copied_files() {
        let root = tempdir().unwrap();
        let coordinator_dir = root.path().join("coordinator");
        write_file(&coordinator_dir.join("PG_VERSION"), "9.4");
        let source_hba = root.path().join("source_hba.conf");
        write_file(&source_hba, "local all all trust\n");
        let source_conf = root.path().join("source_postgresql.conf");
        write_file(&source_conf, "port=40000\n");
        let scratch_root = root.path().join("scratch");
        fs::create_dir_all(&scratch_root).unwrap();
        let tar_dir = root.path().join("tar");
        fs::create_dir_all(&tar_dir).unwrap();

        let builder = TemplateBuilder::new(tar_dir);
        let result = builder
            .build(&coordinator_dir, &scratch_root, None, &source_hba, &source_conf, &[])
            .unwrap();

        let tar_bytes = fs::read(&result.tar_path).unwrap();
        let mut archive = tar::Archive::new(&tar_bytes[..]);
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().to_string())
            .collect();
        assert!(names.iter().any(|n| n.contains("PG_VERSION")));
    }
}
