//! Mirror pending changes to a replica, committing only what succeeded.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tidemark_core::{DEFAULT_DELETE_BATCH_SIZE, ScanWarning, TrackError, TrackerConfig, partition};
use tidemark_state::{Change, ChangeKind, StateRepository};

use crate::replica::Replica;

/// What the synchronizer tried to do with an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncAction {
    Upload,
    Delete,
    Commit,
}

impl std::fmt::Display for SyncAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upload => write!(f, "Upload"),
            Self::Delete => write!(f, "Delete"),
            Self::Commit => write!(f, "Commit"),
        }
    }
}

/// A replica operation that did not succeed. The item stays pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncFailure {
    /// Item path relative to the tracked root.
    pub item: PathBuf,
    /// Operation that failed.
    pub action: SyncAction,
    /// A human-readable error message.
    pub message: String,
}

impl SyncFailure {
    /// Create a new failure record.
    pub fn new(item: impl Into<PathBuf>, action: SyncAction, message: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            action,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.action, self.item.display(), self.message)
    }
}

/// Outcome of one synchronization run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    /// Items uploaded and committed.
    pub uploaded: Vec<PathBuf>,
    /// Items deleted from the replica and committed.
    pub deleted: Vec<PathBuf>,
    /// Items committed without an upload because their digest was unchanged.
    pub unchanged: Vec<PathBuf>,
    /// Bytes uploaded.
    pub bytes_uploaded: u64,
    /// Operations that failed; their items are reported again next run.
    pub failures: Vec<SyncFailure>,
    /// Diagnostics raised while scanning.
    pub warnings: Vec<ScanWarning>,
}

impl SyncReport {
    /// True when nothing failed and the scan raised no warnings.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.warnings.is_empty()
    }

    /// Number of changes the run saw, whether or not they succeeded.
    pub fn change_count(&self) -> usize {
        self.uploaded.len() + self.deleted.len() + self.unchanged.len() + self.failures.len()
    }

    /// True when the run saw at least one change.
    pub fn has_changes(&self) -> bool {
        self.change_count() > 0
    }
}

/// Drives one pass of change detection against a [`Replica`].
///
/// Added and modified items are uploaded as they are found and committed
/// once the upload succeeds. Deletions are only known after the scan has
/// finished, so they are collected and sent in groups of at most
/// `delete_batch_size` items, committing exactly the items the replica
/// reports as deleted. Failed items are left uncommitted and reappear on the
/// next run; nothing is retried within a run.
///
/// A commit can fail while a file and a directory of the same name swap
/// places, because the old record still occupies the path. That failure is
/// reported per item and the run goes on, so the deletion that frees the path
/// is still committed and a later run records the new item.
#[derive(Debug, Clone, Copy)]
pub struct Synchronizer {
    delete_batch_size: usize,
}

impl Default for Synchronizer {
    fn default() -> Self {
        Self::new(DEFAULT_DELETE_BATCH_SIZE)
    }
}

impl Synchronizer {
    /// Create a synchronizer. A zero batch size falls back to the default.
    pub fn new(delete_batch_size: usize) -> Self {
        let delete_batch_size = if delete_batch_size == 0 {
            DEFAULT_DELETE_BATCH_SIZE
        } else {
            delete_batch_size
        };
        Self { delete_batch_size }
    }

    /// Create a synchronizer from tracker configuration.
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.delete_batch_size)
    }

    /// Maximum number of items per delete request.
    pub fn delete_batch_size(&self) -> usize {
        self.delete_batch_size
    }

    /// Run one synchronization pass.
    ///
    /// Replica and commit failures are recorded in the report. Only an
    /// invalid batch size is returned as an error.
    pub fn run<R>(&self, repository: &StateRepository, replica: &mut R) -> Result<SyncReport, TrackError>
    where
        R: Replica + ?Sized,
    {
        let mut report = SyncReport::default();
        let mut deletions = Vec::new();

        let mut changes = repository.changes();
        for change in changes.by_ref() {
            match change.kind() {
                ChangeKind::Deleted => {
                    tracing::info!(
                        "Item {} is no longer in filesystem. It will be deleted.",
                        change.item().display()
                    );
                    deletions.push(change);
                }
                ChangeKind::Added | ChangeKind::Modified => {
                    self.upload(change, replica, &mut report);
                }
            }
        }
        report.warnings = changes.take_warnings();
        drop(changes);

        self.delete(deletions, replica, &mut report)?;

        tracing::info!(
            "Synchronized {}: {} uploaded, {} deleted, {} failed",
            repository.root().display(),
            report.uploaded.len(),
            report.deleted.len(),
            report.failures.len()
        );
        Ok(report)
    }

    fn upload<R>(&self, change: Change<'_>, replica: &mut R, report: &mut SyncReport)
    where
        R: Replica + ?Sized,
    {
        let item = change.item().to_path_buf();

        if has_same_digest(&change) {
            tracing::info!("Content of item {} has not changed, skipping upload.", item.display());
            if commit(change, report) {
                report.unchanged.push(item);
            }
            return;
        }

        tracing::info!("Uploading item {}.", item.display());
        match replica.upload(&item, &change.item_path()) {
            Ok(()) => {
                let bytes = change.new_state().map_or(0, |state| state.size());
                if commit(change, report) {
                    report.bytes_uploaded += bytes;
                    report.uploaded.push(item);
                }
            }
            Err(err) => {
                tracing::warn!("Could not upload {}: {err}", item.display());
                report
                    .failures
                    .push(SyncFailure::new(item, SyncAction::Upload, err.to_string()));
            }
        }
    }

    fn delete<R>(&self, deletions: Vec<Change<'_>>, replica: &mut R, report: &mut SyncReport) -> Result<(), TrackError>
    where
        R: Replica + ?Sized,
    {
        let batches: Vec<Vec<PathBuf>> = partition(&deletions, self.delete_batch_size)?
            .map(|group| group.iter().map(|change| change.item().to_path_buf()).collect())
            .collect();

        let mut deletions = deletions.into_iter();
        for batch in batches {
            let group: Vec<_> = deletions.by_ref().take(batch.len()).collect();

            let failures = match replica.delete_batch(&batch) {
                Ok(failures) => failures,
                Err(err) => {
                    tracing::warn!("Delete request for {} items failed: {err}", batch.len());
                    report.failures.extend(
                        batch
                            .into_iter()
                            .map(|item| SyncFailure::new(item, SyncAction::Delete, err.to_string())),
                    );
                    continue;
                }
            };

            let failed: HashSet<&Path> = failures.iter().map(|f| f.item.as_path()).collect();
            for change in group {
                let item = change.item().to_path_buf();
                if failed.contains(item.as_path()) {
                    tracing::warn!("Could not delete {}", item.display());
                } else if commit(change, report) {
                    report.deleted.push(item);
                }
            }

            report.failures.extend(
                failures
                    .into_iter()
                    .map(|f| SyncFailure::new(f.item, SyncAction::Delete, f.message)),
            );
        }
        Ok(())
    }
}

/// Commit a change, recording a failure instead of stopping the run.
fn commit(change: Change<'_>, report: &mut SyncReport) -> bool {
    let item = change.item().to_path_buf();
    match change.commit() {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!("Could not record state of {}: {err}", item.display());
            report
                .failures
                .push(SyncFailure::new(item, SyncAction::Commit, err.to_string()));
            false
        }
    }
}

/// The digest did not change, only how it was recorded.
fn has_same_digest(change: &Change<'_>) -> bool {
    match (change.previous_state(), change.new_state()) {
        (Some(previous), Some(new)) => previous.content_hash() == new.content_hash(),
        _ => false,
    }
}
