//! Physical identity of directories, for exclusion by identity rather than name.

use std::path::Path;

#[cfg(not(unix))]
use std::path::PathBuf;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

/// Identifies one physical filesystem object.
///
/// On Unix this is the (device, inode) pair, so two paths reaching the same
/// directory compare equal while a same-named directory elsewhere does not.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FileIdentity {
    #[cfg(unix)]
    device: u64,
    #[cfg(unix)]
    inode: u64,
    #[cfg(not(unix))]
    canonical: PathBuf,
}

impl FileIdentity {
    /// Identity of the object at `path`, following symlinks.
    #[cfg(unix)]
    pub fn of(path: &Path) -> std::io::Result<Self> {
        let metadata = std::fs::metadata(path)?;
        Ok(Self {
            device: metadata.dev(),
            inode: metadata.ino(),
        })
    }

    /// Identity of the object at `path`, following symlinks.
    #[cfg(not(unix))]
    pub fn of(path: &Path) -> std::io::Result<Self> {
        Ok(Self {
            canonical: path.canonicalize()?,
        })
    }

    /// Check whether `path` is this object. Unreadable paths never match.
    pub fn matches(&self, path: &Path) -> bool {
        Self::of(path).map(|other| &other == self).unwrap_or(false)
    }
}
