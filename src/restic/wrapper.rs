use duct::{Expression, cmd};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::Path;
use std::process::ExitStatus;

use crate::config::BackupConfig;
use crate::restic::error::ResticError;

/// Snapshot storage for the repository directory.
pub trait BackupStore {
    /// Snapshot `directory` and prune old snapshots.
    fn backup(&self, directory: &Path) -> Result<(), ResticError>;

    /// Restore `directory` from the latest matching snapshot, back into
    /// place below the filesystem root.
    fn restore(&self, directory: &Path, verbose: bool) -> Result<(), ResticError>;

    /// List the snapshots taken of `directory`.
    fn snapshots(&self, directory: &Path) -> Result<Vec<Snapshot>, ResticError>;
}

/// Store backed by the restic command line tool.
///
/// Thin command construction only; restic itself owns deduplication,
/// integrity checking, and snapshot pruning.
#[derive(Debug, Clone)]
pub struct ResticStore {
    repository: String,
    tag: String,
    keep_last: u32,
}

impl ResticStore {
    pub fn new(config: &BackupConfig) -> Self {
        Self {
            repository: config.repository.clone(),
            tag: config.tag.clone(),
            keep_last: config.keep_last,
        }
    }

    fn backup_args(&self, directory: &Path) -> Vec<OsString> {
        vec![
            "backup".into(),
            directory.into(),
            "--tag".into(),
            self.tag.clone().into(),
            "--exclude-caches".into(),
        ]
    }

    fn forget_args(&self, directory: &Path) -> Vec<OsString> {
        vec![
            "forget".into(),
            "--keep-last".into(),
            self.keep_last.to_string().into(),
            "--path".into(),
            directory.into(),
            "--tag".into(),
            self.tag.clone().into(),
            "--prune".into(),
        ]
    }

    fn restore_args(&self, directory: &Path, verbose: bool) -> Vec<OsString> {
        // Restore to / and rely on the path prefixes stored in the snapshot
        // to land the contents back in place.
        let mut args: Vec<OsString> = vec![
            "restore".into(),
            "--tag".into(),
            self.tag.clone().into(),
            "--path".into(),
            directory.into(),
            "--target".into(),
            "/".into(),
            "latest".into(),
        ];
        if verbose {
            args.push("--verbose".into());
        }
        args
    }

    fn snapshots_args(&self, directory: &Path) -> Vec<OsString> {
        vec![
            "snapshots".into(),
            "--json".into(),
            "--tag".into(),
            self.tag.clone().into(),
            "--path".into(),
            directory.into(),
        ]
    }

    fn restic(&self, args: Vec<OsString>) -> Expression {
        let mut full: Vec<OsString> = vec!["-r".into(), self.repository.clone().into()];
        full.extend(args);
        cmd("restic", full)
    }

    /// Run restic with inherited stdio so its progress output stays visible.
    fn run_checked(&self, args: Vec<OsString>) -> Result<(), ResticError> {
        let output = self.restic(args).unchecked().run()?;
        status_to_result(output.status)
    }
}

fn status_to_result(status: ExitStatus) -> Result<(), ResticError> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(ResticError::from_exit_code(code)),
        None => Err(ResticError::CommandFailed(
            "process terminated by signal".to_string(),
        )),
    }
}

impl BackupStore for ResticStore {
    fn backup(&self, directory: &Path) -> Result<(), ResticError> {
        self.run_checked(self.backup_args(directory))?;
        self.run_checked(self.forget_args(directory))
    }

    fn restore(&self, directory: &Path, verbose: bool) -> Result<(), ResticError> {
        self.run_checked(self.restore_args(directory, verbose))
    }

    fn snapshots(&self, directory: &Path) -> Result<Vec<Snapshot>, ResticError> {
        let output = self
            .restic(self.snapshots_args(directory))
            .stdout_capture()
            .unchecked()
            .run()?;
        status_to_result(output.status)?;
        let snapshots: Vec<Snapshot> = serde_json::from_slice(&output.stdout)?;
        Ok(snapshots)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Snapshot {
    pub time: String,
    pub paths: Vec<String>,
    pub hostname: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub short_id: String,
}
