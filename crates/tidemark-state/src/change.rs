//! Pending transitions between stored and current item state.

use std::path::{Path, PathBuf};

use strum::Display;
use tidemark_core::{Fingerprint, TrackError};

use crate::store::FingerprintStore;

/// Kind of transition a [`Change`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ChangeKind {
    /// No stored state; the item is new.
    Added,
    /// Stored state differs from the item's current content.
    Modified,
    /// The item has stored state but is no longer on disk.
    Deleted,
}

/// One pending transition of an item, produced by a change scan.
///
/// At least one of [`previous_state`](Self::previous_state) and
/// [`new_state`](Self::new_state) is present, and when both are they differ.
/// A change reflects the moment it was produced; take a fresh scan rather
/// than holding one across scans.
#[derive(Debug)]
pub struct Change<'a> {
    item: PathBuf,
    previous: Option<Fingerprint>,
    new: Option<Fingerprint>,
    root: &'a Path,
    store: &'a FingerprintStore,
}

impl<'a> Change<'a> {
    pub(crate) fn added(
        root: &'a Path,
        store: &'a FingerprintStore,
        item: PathBuf,
        new: Fingerprint,
    ) -> Self {
        Self {
            item,
            previous: None,
            new: Some(new),
            root,
            store,
        }
    }

    /// `None` when the two fingerprints are equal.
    pub(crate) fn modified(
        root: &'a Path,
        store: &'a FingerprintStore,
        item: PathBuf,
        previous: Fingerprint,
        new: Fingerprint,
    ) -> Option<Self> {
        (previous != new).then(|| Self {
            item,
            previous: Some(previous),
            new: Some(new),
            root,
            store,
        })
    }

    pub(crate) fn deleted(
        root: &'a Path,
        store: &'a FingerprintStore,
        item: PathBuf,
        previous: Fingerprint,
    ) -> Self {
        Self {
            item,
            previous: Some(previous),
            new: None,
            root,
            store,
        }
    }

    /// Item path relative to the tracked root.
    pub fn item(&self) -> &Path {
        &self.item
    }

    /// Item path on the filesystem.
    pub fn item_path(&self) -> PathBuf {
        self.root.join(&self.item)
    }

    /// Last committed state, `None` for a newly discovered item.
    pub fn previous_state(&self) -> Option<&Fingerprint> {
        self.previous.as_ref()
    }

    /// State that [`commit`](Self::commit) will store, `None` for a removed item.
    pub fn new_state(&self) -> Option<&Fingerprint> {
        self.new.as_ref()
    }

    /// Kind of transition.
    pub fn kind(&self) -> ChangeKind {
        match (&self.previous, &self.new) {
            (None, _) => ChangeKind::Added,
            (Some(_), Some(_)) => ChangeKind::Modified,
            (Some(_), None) => ChangeKind::Deleted,
        }
    }

    /// Persist this change so later scans no longer report it.
    ///
    /// Call this only once the corresponding remote effect is known to have
    /// succeeded. Store write failures are returned, never swallowed.
    pub fn commit(self) -> Result<(), TrackError> {
        tracing::debug!("Committing {} {}", self.kind(), self.item.display());
        self.store.put(&self.item, self.new.as_ref())
    }
}
