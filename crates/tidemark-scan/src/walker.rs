//! Lazy, ordered enumeration of regular files below a directory.

use std::path::{Path, PathBuf};

use jwalk::{Parallelism, WalkDir};
use tidemark_core::{ScanWarning, WarningKind};

use crate::identity::FileIdentity;

/// Walks a directory tree, yielding regular files in name order.
///
/// Directories registered with [`TreeWalker::exclude`] are pruned by
/// identity: a same-named directory elsewhere in the tree is still walked.
/// Symlinks are neither followed nor yielded. Hidden entries are included.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    root: PathBuf,
    excluded: Vec<FileIdentity>,
}

impl TreeWalker {
    /// Create a walker rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            excluded: Vec::new(),
        }
    }

    /// Never descend into the directory with this identity.
    pub fn exclude(mut self, identity: FileIdentity) -> Self {
        self.excluded.push(identity);
        self
    }

    /// Root of the walk.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a new walk. Each call is independent of earlier ones.
    pub fn files(&self) -> Files {
        let excluded = self.excluded.clone();

        let walker = WalkDir::new(&self.root)
            .parallelism(Parallelism::Serial)
            .sort(true)
            .skip_hidden(false)
            .follow_links(false)
            .process_read_dir(move |_depth, _path, _state, children| {
                if excluded.is_empty() {
                    return;
                }
                children.retain(|child| match child {
                    Ok(entry) if entry.file_type.is_dir() => {
                        let path = entry.path();
                        let skip = excluded.iter().any(|identity| identity.matches(&path));
                        if skip {
                            tracing::debug!("Excluding directory {}", path.display());
                        }
                        !skip
                    }
                    _ => true,
                });
            });

        Files {
            inner: walker.into_iter(),
            warnings: Vec::new(),
        }
    }
}

/// Iterator over the absolute paths of regular files produced by a walk.
///
/// Unreadable entries are skipped and recorded as warnings.
pub struct Files {
    inner: <WalkDir as IntoIterator>::IntoIter,
    warnings: Vec<ScanWarning>,
}

impl Files {
    /// Warnings collected so far.
    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    /// Take the warnings collected so far.
    pub fn take_warnings(&mut self) -> Vec<ScanWarning> {
        std::mem::take(&mut self.warnings)
    }
}

impl Iterator for Files {
    type Item = PathBuf;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.inner.next()? {
                Ok(entry) => {
                    if entry.file_type().is_file() {
                        return Some(entry.path());
                    }
                }
                Err(err) => {
                    let path = err.path().map(|p| p.to_path_buf()).unwrap_or_default();
                    tracing::warn!("Skipping unreadable entry {}: {err}", path.display());
                    self.warnings
                        .push(ScanWarning::new(path, err.to_string(), WarningKind::ReadError));
                }
            }
        }
    }
}

impl std::fmt::Debug for Files {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Files")
            .field("warnings", &self.warnings.len())
            .finish_non_exhaustive()
    }
}
