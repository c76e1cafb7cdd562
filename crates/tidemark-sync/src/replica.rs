//! Destinations that tracked items are mirrored to.

use std::fs::{self, File};
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

/// Directory under a replica root holding item content.
pub const CONTENT_DIR: &str = "content";

/// Errors raised by a replica for a whole request.
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// I/O error while talking to the replica.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Item path cannot be mapped into the replica.
    #[error("Invalid item path: {item}")]
    InvalidItem { item: PathBuf },

    /// The replica would be tracked as content of the tree it mirrors.
    #[error("Replica directory {path} is inside the tracked tree {tracked_root}")]
    InsideTrackedTree { path: PathBuf, tracked_root: PathBuf },
}

impl ReplicaError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// An item a batch delete could not remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFailure {
    /// Item path relative to the tracked root.
    pub item: PathBuf,
    /// Why it was not deleted.
    pub message: String,
}

impl DeleteFailure {
    /// Create a new delete failure.
    pub fn new(item: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            item: item.into(),
            message: message.into(),
        }
    }
}

/// A remote copy of a tracked tree.
///
/// Items are addressed by their path relative to the tracked root.
pub trait Replica {
    /// Store the content of `source` as `item`, replacing any earlier copy.
    fn upload(&mut self, item: &Path, source: &Path) -> Result<(), ReplicaError>;

    /// Remove several items in one request.
    ///
    /// Items that failed individually are returned; every other item is
    /// gone from the replica. An `Err` means nothing can be assumed deleted.
    fn delete_batch(&mut self, items: &[PathBuf]) -> Result<Vec<DeleteFailure>, ReplicaError>;
}

/// Replica kept in a local directory, with each item stored at
/// `<root>/content/<item>`.
#[derive(Debug, Clone)]
pub struct DirectoryReplica {
    root: PathBuf,
    content_dir: PathBuf,
}

impl DirectoryReplica {
    /// Open a replica rooted at `root`, creating it if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ReplicaError> {
        let root = root.into();
        let content_dir = root.join(CONTENT_DIR);
        fs::create_dir_all(&content_dir).map_err(|e| ReplicaError::io(&content_dir, e))?;
        Ok(Self { root, content_dir })
    }

    /// Open a replica at `root` unless it resolves to a location inside
    /// `tracked_root`, which must already be canonical.
    ///
    /// The check happens before anything is created on disk.
    pub fn open_outside(root: &Path, tracked_root: &Path) -> Result<Self, ReplicaError> {
        let resolved = resolve(root)?;
        if resolved.starts_with(tracked_root) {
            return Err(ReplicaError::InsideTrackedTree {
                path: resolved,
                tracked_root: tracked_root.to_path_buf(),
            });
        }
        Self::open(resolved)
    }

    /// Root of the replica.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Where `item` is stored in the replica.
    pub fn object_path(&self, item: &Path) -> Result<PathBuf, ReplicaError> {
        let valid = item.components().next().is_some()
            && item.components().all(|c| matches!(c, Component::Normal(_)));
        if !valid {
            return Err(ReplicaError::InvalidItem {
                item: item.to_path_buf(),
            });
        }
        Ok(self.content_dir.join(item))
    }

    fn delete_one(&self, item: &Path) -> io::Result<()> {
        let path = self
            .object_path(item)
            .map_err(|e| io::Error::new(ErrorKind::InvalidInput, e.to_string()))?;
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::NotADirectory) => {
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == self.content_dir.as_path() || fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
        Ok(())
    }
}

impl Replica for DirectoryReplica {
    fn upload(&mut self, item: &Path, source: &Path) -> Result<(), ReplicaError> {
        let target = self.object_path(item)?;
        let parent = target.parent().unwrap_or(&self.content_dir);
        fs::create_dir_all(parent).map_err(|e| ReplicaError::io(parent, e))?;

        let mut input = File::open(source).map_err(|e| ReplicaError::io(source, e))?;
        let mut temp = NamedTempFile::new_in(parent).map_err(|e| ReplicaError::io(parent, e))?;
        io::copy(&mut input, &mut temp).map_err(|e| ReplicaError::io(&target, e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| ReplicaError::io(&target, e))?;
        temp.persist(&target)
            .map_err(|e| ReplicaError::io(&target, e.error))?;

        tracing::debug!("Copied {} to {}", source.display(), target.display());
        Ok(())
    }

    fn delete_batch(&mut self, items: &[PathBuf]) -> Result<Vec<DeleteFailure>, ReplicaError> {
        if !self.content_dir.is_dir() {
            return Err(ReplicaError::io(
                &self.content_dir,
                io::Error::new(ErrorKind::NotFound, "replica content directory is missing"),
            ));
        }

        let failures = items
            .iter()
            .filter_map(|item| match self.delete_one(item) {
                Ok(()) => None,
                Err(e) => Some(DeleteFailure::new(item, e.to_string())),
            })
            .collect();
        Ok(failures)
    }
}

/// Canonical form of a path that may not exist yet: the deepest existing
/// ancestor is canonicalized and the rest is appended lexically. A `..`
/// below a missing directory cannot be resolved and is an error.
fn resolve(path: &Path) -> Result<PathBuf, ReplicaError> {
    let absolute = std::path::absolute(path).map_err(|e| ReplicaError::io(path, e))?;

    let mut missing = Vec::new();
    let mut existing = absolute.as_path();
    let base = loop {
        match existing.canonicalize() {
            Ok(base) => break base,
            Err(e) => match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    missing.push(name.to_os_string());
                    existing = parent;
                }
                _ => return Err(ReplicaError::io(existing, e)),
            },
        }
    };

    let mut resolved = base;
    for name in missing.into_iter().rev() {
        resolved.push(name);
    }
    Ok(resolved)
}
