//! Error and warning types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::RecordError;

/// Errors that can occur while tracking a directory.
#[derive(Debug, Error)]
pub enum TrackError {
    /// Permission denied for a path.
    #[error("Permission denied: {path}")]
    PermissionDenied { path: PathBuf },

    /// Path not found.
    #[error("Path not found: {path}")]
    NotFound { path: PathBuf },

    /// Generic I/O error.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Tracked root is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Item path is absolute or escapes the tracked root.
    #[error("Invalid item path: {item}")]
    InvalidItem { item: PathBuf },

    /// A stored record exists but cannot be decoded.
    #[error("Corrupt record at {path}: {reason}")]
    CorruptRecord {
        path: PathBuf,
        #[source]
        reason: RecordError,
    },

    /// A record could not be written or removed.
    #[error("Failed to update stored state for {item}: {source}")]
    StoreWrite {
        item: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Configuration file could not be read or parsed.
    #[error("Failed to load configuration from {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },
}

impl TrackError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied { path },
            std::io::ErrorKind::NotFound => Self::NotFound { path },
            _ => Self::Io { path, source },
        }
    }

    /// Create a store write error for an item.
    pub fn store_write(item: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::StoreWrite {
            item: item.into(),
            source,
        }
    }
}

/// Kind of scan warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// Permission was denied.
    PermissionDenied,
    /// Error reading a file or directory.
    ReadError,
    /// Error reading metadata.
    MetadataError,
    /// Stored record could not be decoded.
    CorruptRecord,
}

/// Non-fatal diagnostic raised while detecting changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanWarning {
    /// Path where the warning occurred.
    pub path: PathBuf,
    /// Human-readable message.
    pub message: String,
    /// Kind of warning.
    pub kind: WarningKind,
}

impl ScanWarning {
    /// Create a new scan warning.
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>, kind: WarningKind) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
            kind,
        }
    }

    /// Create a warning from a tracking error, keeping its path.
    pub fn from_error(error: &TrackError) -> Self {
        match error {
            TrackError::PermissionDenied { path } => Self {
                message: format!("Permission denied: {}", path.display()),
                path: path.clone(),
                kind: WarningKind::PermissionDenied,
            },
            TrackError::CorruptRecord { path, reason } => Self {
                message: format!("Corrupt record: {reason}"),
                path: path.clone(),
                kind: WarningKind::CorruptRecord,
            },
            TrackError::NotFound { path } | TrackError::Io { path, .. } => Self {
                message: format!("Read error: {error}"),
                path: path.clone(),
                kind: WarningKind::ReadError,
            },
            other => Self {
                message: other.to_string(),
                path: PathBuf::new(),
                kind: WarningKind::ReadError,
            },
        }
    }
}
