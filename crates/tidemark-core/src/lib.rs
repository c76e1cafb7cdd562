//! Core types for tidemark.
//!
//! This crate provides the value types shared by the rest of the workspace:
//! content fingerprints and their on-disk record encoding, error and warning
//! types, and tracker configuration.

mod chunk;
mod config;
mod error;
mod fingerprint;
pub mod record;

pub use chunk::partition;
pub use config::{
    CONFIG_FILE_NAME, DEFAULT_DELETE_BATCH_SIZE, DEFAULT_METADATA_DIR, DEFAULT_READ_CHUNK_SIZE,
    TrackerConfig, TrackerConfigBuilder,
};
pub use error::{ScanWarning, TrackError, WarningKind};
pub use fingerprint::{ContentHash, Fingerprint, HashAlgorithm};
pub use record::RecordError;
