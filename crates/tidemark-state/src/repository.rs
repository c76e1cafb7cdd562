//! Change detection over a tracked directory.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tidemark_core::{Fingerprint, ScanWarning, TrackError, TrackerConfig, WarningKind};
use tidemark_scan::{FileIdentity, Files, Fingerprinter, TreeWalker};

use crate::change::Change;
use crate::store::{FingerprintStore, StoredItems};

/// A tracked directory together with the stored state of its files.
///
/// Every repository owns its own root, store and configuration, so several
/// can coexist in one process.
#[derive(Debug)]
pub struct StateRepository {
    root: PathBuf,
    config: TrackerConfig,
    store: FingerprintStore,
    walker: TreeWalker,
    fingerprinter: Fingerprinter,
}

impl StateRepository {
    /// Open a repository using `root`'s own configuration file, if any.
    pub fn open_path(root: impl Into<PathBuf>) -> Result<Self, TrackError> {
        Self::open(TrackerConfig::load(root)?)
    }

    /// Open a repository.
    ///
    /// The metadata directory is created up front so it can be excluded by
    /// identity from the first scan onwards.
    pub fn open(config: TrackerConfig) -> Result<Self, TrackError> {
        config.validate()?;

        let root = config
            .root
            .canonicalize()
            .map_err(|e| TrackError::io(&config.root, e))?;
        if !root.is_dir() {
            return Err(TrackError::NotADirectory { path: root });
        }

        let metadata_dir = root.join(&config.metadata_dir);
        let store = FingerprintStore::open(&metadata_dir)?;
        let metadata_identity =
            FileIdentity::of(&metadata_dir).map_err(|e| TrackError::io(&metadata_dir, e))?;

        tracing::debug!("Opened repository at {}", root.display());

        Ok(Self {
            walker: TreeWalker::new(&root).exclude(metadata_identity),
            fingerprinter: Fingerprinter::from_config(&config),
            root,
            config,
            store,
        })
    }

    /// Canonical path of the tracked root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Configuration the repository was opened with.
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// The fingerprint store.
    pub fn store(&self) -> &FingerprintStore {
        &self.store
    }

    /// Lazily list the absolute paths of every regular file under the root,
    /// excluding the metadata directory.
    pub fn content_paths(&self) -> Files {
        self.walker.files()
    }

    /// Check whether the root holds any file at all.
    pub fn has_content(&self) -> bool {
        self.content_paths().next().is_some()
    }

    /// Start a scan for changes since the last commit of each item.
    ///
    /// The sequence first reports added and modified items in walk order,
    /// then every deleted item. Deletions are only discovered once all files
    /// have been visited, so a consumer that stops early sees none of them;
    /// use [`Changes::is_drained`] to tell a complete scan from a partial one.
    pub fn changes(&self) -> Changes<'_> {
        Changes {
            repository: self,
            phase: Phase::Files(self.content_paths()),
            warnings: Vec::new(),
        }
    }

    fn relative_item(&self, path: &Path) -> Option<PathBuf> {
        path.strip_prefix(&self.root).ok().map(Path::to_path_buf)
    }

    /// Stored state of an item, treating unreadable records as absent.
    fn stored_state(&self, item: &Path, warnings: &mut Vec<ScanWarning>) -> Option<Fingerprint> {
        match self.store.get(item) {
            Ok(state) => state,
            Err(err) => {
                tracing::warn!("Ignoring stored state of {}: {err}", item.display());
                warnings.push(ScanWarning::from_error(&err));
                None
            }
        }
    }

    /// Compare one file on disk with its stored state.
    fn check_file(&self, path: PathBuf, warnings: &mut Vec<ScanWarning>) -> Option<Change<'_>> {
        tracing::debug!("Checking path: {}", path.display());

        let Some(item) = self.relative_item(&path) else {
            tracing::warn!("Path {} is outside the tracked root", path.display());
            return None;
        };

        let current = match self.fingerprinter.fingerprint_file(&path) {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                tracing::warn!("Skipping {} for this scan: {err}", item.display());
                warnings.push(ScanWarning::from_error(&err));
                return None;
            }
        };

        match self.stored_state(&item, warnings) {
            None => {
                tracing::debug!("No state available for {}, it is new", item.display());
                Some(Change::added(&self.root, &self.store, item, current))
            }
            Some(previous) => {
                let change = Change::modified(&self.root, &self.store, item, previous, current);
                if let Some(change) = &change {
                    tracing::debug!("State of {} has changed", change.item().display());
                }
                change
            }
        }
    }

    /// Report a stored item that no longer exists as a regular file.
    fn check_stored(&self, item: PathBuf, warnings: &mut Vec<ScanWarning>) -> Option<Change<'_>> {
        let path = self.root.join(&item);
        match std::fs::symlink_metadata(&path) {
            Ok(metadata) if metadata.is_file() => return None,
            Ok(_) => {}
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {}
            Err(e) => {
                tracing::warn!("Cannot tell whether {} still exists: {e}", item.display());
                warnings.push(ScanWarning::new(
                    path,
                    format!("Metadata error: {e}"),
                    WarningKind::MetadataError,
                ));
                return None;
            }
        }

        match self.stored_state(&item, warnings) {
            Some(previous) => {
                tracing::debug!("{} is no longer on disk", item.display());
                Some(Change::deleted(&self.root, &self.store, item, previous))
            }
            None => None,
        }
    }
}

enum Phase {
    Files(Files),
    Records(StoredItems),
    Done,
}

/// Lazy sequence of [`Change`]s produced by [`StateRepository::changes`].
///
/// Each file is fingerprinted only when the next change is requested, so at
/// most one item is in flight at a time. Abandoning the sequence is safe: the
/// next scan derives the same pending work.
pub struct Changes<'a> {
    repository: &'a StateRepository,
    phase: Phase,
    warnings: Vec<ScanWarning>,
}

impl<'a> Changes<'a> {
    /// Diagnostics raised so far: unreadable files, corrupt records.
    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    /// Take the diagnostics raised so far.
    pub fn take_warnings(&mut self) -> Vec<ScanWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// True once both the file walk and the deletion check have completed.
    pub fn is_drained(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }
}

impl<'a> Iterator for Changes<'a> {
    type Item = Change<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let repository = self.repository;
        loop {
            match &mut self.phase {
                Phase::Files(files) => match files.next() {
                    Some(path) => {
                        if let Some(change) = repository.check_file(path, &mut self.warnings) {
                            return Some(change);
                        }
                    }
                    None => {
                        self.warnings.extend(files.take_warnings());
                        self.phase = Phase::Records(repository.store.items());
                    }
                },
                Phase::Records(items) => match items.next() {
                    Some(item) => {
                        if let Some(change) = repository.check_stored(item, &mut self.warnings) {
                            return Some(change);
                        }
                    }
                    None => {
                        self.warnings.extend(items.take_warnings());
                        self.phase = Phase::Done;
                    }
                },
                Phase::Done => return None,
            }
        }
    }
}

impl std::fmt::Debug for Changes<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Changes")
            .field("root", &self.repository.root)
            .field("drained", &self.is_drained())
            .field("warnings", &self.warnings.len())
            .finish()
    }
}

impl Drop for Changes<'_> {
    fn drop(&mut self) {
        if !self.is_drained() {
            tracing::debug!(
                "Change scan of {} stopped early; deletions were not reported",
                self.repository.root.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_open_creates_metadata_directory() {
        let temp = TempDir::new().unwrap();
        let repository = StateRepository::open(TrackerConfig::new(temp.path())).unwrap();

        assert!(repository.root().join(".tidemark/state").is_dir());
        assert!(!repository.has_content());
    }

    #[test]
    fn test_open_rejects_file_root() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("file");
        fs::write(&file, "x").unwrap();

        let result = StateRepository::open(TrackerConfig::new(&file));
        assert!(matches!(result, Err(TrackError::NotADirectory { .. })));
    }

    #[test]
    fn test_open_rejects_missing_root() {
        let temp = TempDir::new().unwrap();
        let result = StateRepository::open(TrackerConfig::new(temp.path().join("nope")));
        assert!(matches!(result, Err(TrackError::NotFound { .. })));
    }

    #[test]
    fn test_content_paths_skip_metadata() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        let repository = StateRepository::open(TrackerConfig::new(temp.path())).unwrap();
        for change in repository.changes() {
            change.commit().unwrap();
        }

        let paths: Vec<_> = repository.content_paths().collect();
        assert_eq!(paths, vec![repository.root().join("a.txt")]);
    }

    #[test]
    fn test_partial_consumption_is_not_drained() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        fs::write(temp.path().join("b.txt"), "b").unwrap();
        let repository = StateRepository::open(TrackerConfig::new(temp.path())).unwrap();

        let mut changes = repository.changes();
        assert!(changes.next().is_some());
        assert!(!changes.is_drained());

        assert_eq!(changes.by_ref().count(), 1);
        assert!(changes.is_drained());
    }
}
