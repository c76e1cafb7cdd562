//! Durable per-item fingerprint records.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::NamedTempFile;
use tidemark_core::{Fingerprint, TrackError, record};
use tidemark_scan::{FileIdentity, Files, TreeWalker};

/// Directory under the metadata directory holding one record per item.
const STATE_DIR: &str = "state";

/// Directory under the metadata directory for in-flight record writes.
const TEMP_DIR: &str = "tmp";

/// Stores the last committed [`Fingerprint`] of every tracked item.
///
/// Records live under `<metadata>/state/`, mirroring the tracked tree, so the
/// record for `docs/a.txt` is `<metadata>/state/docs/a.txt`. Writes go to a
/// temporary file under `<metadata>/tmp/` and are renamed into place, so a
/// crash never leaves a half-written record behind.
#[derive(Debug)]
pub struct FingerprintStore {
    state_dir: PathBuf,
    temp_dir: PathBuf,
    walker: TreeWalker,
}

impl FingerprintStore {
    /// Open the store kept in `metadata_dir`, creating its directories.
    pub fn open(metadata_dir: impl AsRef<Path>) -> Result<Self, TrackError> {
        let metadata_dir = metadata_dir.as_ref();
        let state_dir = metadata_dir.join(STATE_DIR);
        let temp_dir = metadata_dir.join(TEMP_DIR);

        for dir in [&state_dir, &temp_dir] {
            fs::create_dir_all(dir).map_err(|e| TrackError::io(dir, e))?;
        }

        // Never list the metadata directory itself, even if something inside
        // the state tree resolves back to it.
        let walker = TreeWalker::new(&state_dir)
            .exclude(FileIdentity::of(metadata_dir).map_err(|e| TrackError::io(metadata_dir, e))?)
            .exclude(FileIdentity::of(&temp_dir).map_err(|e| TrackError::io(&temp_dir, e))?);

        Ok(Self {
            state_dir,
            temp_dir,
            walker,
        })
    }

    /// Directory holding the records.
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Location of the record for `item`.
    pub fn record_path(&self, item: &Path) -> Result<PathBuf, TrackError> {
        validate_item(item)?;
        Ok(self.state_dir.join(item))
    }

    /// Read the stored fingerprint for `item`.
    ///
    /// Returns `Ok(None)` when no record exists and
    /// [`TrackError::CorruptRecord`] when one exists but cannot be decoded.
    pub fn get(&self, item: &Path) -> Result<Option<Fingerprint>, TrackError> {
        let path = self.record_path(item)?;

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if is_missing(&e) || path.is_dir() => {
                tracing::debug!("No state stored yet for {}", item.display());
                return Ok(None);
            }
            Err(e) => return Err(TrackError::io(&path, e)),
        };

        let fingerprint = record::decode_bytes(&bytes)
            .map_err(|reason| TrackError::CorruptRecord { path, reason })?;
        tracing::debug!("Stored: {}, {fingerprint}", item.display());
        Ok(Some(fingerprint))
    }

    /// Record `fingerprint` for `item`, or forget `item` when it is `None`.
    ///
    /// Failures are always returned: a write that did not happen must not be
    /// mistaken for one that did.
    pub fn put(&self, item: &Path, fingerprint: Option<&Fingerprint>) -> Result<(), TrackError> {
        let path = self.record_path(item)?;
        match fingerprint {
            Some(fingerprint) => self.write_record(item, &path, fingerprint),
            None => self.remove_record(item, &path),
        }
    }

    /// Lazily list every item with a stored record, relative to the tracked root.
    ///
    /// Each call starts a fresh listing.
    pub fn items(&self) -> StoredItems {
        StoredItems {
            files: self.walker.files(),
            state_dir: self.state_dir.clone(),
        }
    }

    fn write_record(&self, item: &Path, path: &Path, fingerprint: &Fingerprint) -> Result<(), TrackError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| TrackError::store_write(item, e))?;
        }

        let mut temp =
            NamedTempFile::new_in(&self.temp_dir).map_err(|e| TrackError::store_write(item, e))?;
        temp.write_all(fingerprint.to_record().as_bytes())
            .map_err(|e| TrackError::store_write(item, e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| TrackError::store_write(item, e))?;
        temp.persist(path)
            .map_err(|e| TrackError::store_write(item, e.error))?;

        tracing::info!("Stored state for {}: {fingerprint}", item.display());
        Ok(())
    }

    fn remove_record(&self, item: &Path, path: &Path) -> Result<(), TrackError> {
        tracing::debug!("Clearing state for {}", item.display());
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(TrackError::store_write(item, e)),
        }

        // Prune directories emptied by the removal, stopping at the first
        // one that still has entries.
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.state_dir.as_path() || fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
        Ok(())
    }
}

/// Iterator over the items of a [`FingerprintStore`].
#[derive(Debug)]
pub struct StoredItems {
    files: Files,
    state_dir: PathBuf,
}

impl StoredItems {
    /// Take warnings raised while listing records.
    pub fn take_warnings(&mut self) -> Vec<tidemark_core::ScanWarning> {
        self.files.take_warnings()
    }
}

impl Iterator for StoredItems {
    type Item = PathBuf;

    fn next(&mut self) -> Option<Self::Item> {
        for path in self.files.by_ref() {
            match path.strip_prefix(&self.state_dir) {
                Ok(item) => return Some(item.to_path_buf()),
                Err(_) => tracing::warn!("Record outside store: {}", path.display()),
            }
        }
        None
    }
}

/// Item paths must be relative and stay inside the tracked root.
fn validate_item(item: &Path) -> Result<(), TrackError> {
    let valid = item.components().next().is_some()
        && item.components().all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(())
    } else {
        Err(TrackError::InvalidItem {
            item: item.to_path_buf(),
        })
    }
}

fn is_missing(error: &std::io::Error) -> bool {
    matches!(error.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory)
}
