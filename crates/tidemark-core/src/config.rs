//! Tracker configuration types.

use std::path::{Component, Path, PathBuf};

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::error::TrackError;
use crate::fingerprint::HashAlgorithm;

/// Name of the metadata directory inside a tracked root.
pub const DEFAULT_METADATA_DIR: &str = ".tidemark";

/// Bytes read per call while fingerprinting a file.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 65536 * 8;

/// Maximum number of deletions sent to a replica in one request.
pub const DEFAULT_DELETE_BATCH_SIZE: usize = 500;

/// File name of the optional per-root configuration file.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration for a tracked directory.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct TrackerConfig {
    /// Root of the tracked tree.
    pub root: PathBuf,

    /// Metadata directory name, relative to the root.
    #[builder(default = "DEFAULT_METADATA_DIR.to_string()")]
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: String,

    /// Digest algorithm for new fingerprints.
    #[builder(default)]
    #[serde(default)]
    pub algorithm: HashAlgorithm,

    /// Read buffer size used while hashing.
    #[builder(default = "DEFAULT_READ_CHUNK_SIZE")]
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// Maximum deletions per replica request.
    #[builder(default = "DEFAULT_DELETE_BATCH_SIZE")]
    #[serde(default = "default_delete_batch_size")]
    pub delete_batch_size: usize,
}

fn default_metadata_dir() -> String {
    DEFAULT_METADATA_DIR.to_string()
}

fn default_read_chunk_size() -> usize {
    DEFAULT_READ_CHUNK_SIZE
}

fn default_delete_batch_size() -> usize {
    DEFAULT_DELETE_BATCH_SIZE
}

/// Overrides read from `<metadata_dir>/config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    algorithm: Option<HashAlgorithm>,
    read_chunk_size: Option<usize>,
    delete_batch_size: Option<usize>,
}

impl TrackerConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err("Root path cannot be empty".to_string());
            }
            None => return Err("Root path is required".to_string()),
            _ => {}
        }
        if let Some(ref name) = self.metadata_dir {
            check_metadata_dir(name)?;
        }
        check_sizes(self.read_chunk_size, self.delete_batch_size)
    }
}

impl TrackerConfig {
    /// Create a new config builder.
    pub fn builder() -> TrackerConfigBuilder {
        TrackerConfigBuilder::default()
    }

    /// Create a config with defaults for a root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            metadata_dir: default_metadata_dir(),
            algorithm: HashAlgorithm::default(),
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
            delete_batch_size: DEFAULT_DELETE_BATCH_SIZE,
        }
    }

    /// Defaults for a root, overridden by its `config.toml` when present.
    pub fn load(root: impl Into<PathBuf>) -> Result<Self, TrackError> {
        Self::new(root).with_config_file()
    }

    /// Apply the overrides of this root's `config.toml`, if the file exists.
    pub fn with_config_file(mut self) -> Result<Self, TrackError> {
        let path = self.config_path();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No configuration file at {}", path.display());
                return Ok(self);
            }
            Err(err) => {
                return Err(TrackError::ConfigParse {
                    path,
                    message: err.to_string(),
                });
            }
        };

        let file: ConfigFile = toml::from_str(&text).map_err(|err| TrackError::ConfigParse {
            path: path.clone(),
            message: err.to_string(),
        })?;

        if let Some(algorithm) = file.algorithm {
            self.algorithm = algorithm;
        }
        if let Some(size) = file.read_chunk_size {
            self.read_chunk_size = size;
        }
        if let Some(size) = file.delete_batch_size {
            self.delete_batch_size = size;
        }

        self.validate()?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(self)
    }

    /// Check every field.
    pub fn validate(&self) -> Result<(), TrackError> {
        let invalid = |message: String| TrackError::InvalidConfig { message };
        if self.root.as_os_str().is_empty() {
            return Err(invalid("Root path cannot be empty".to_string()));
        }
        check_metadata_dir(&self.metadata_dir).map_err(invalid)?;
        check_sizes(Some(self.read_chunk_size), Some(self.delete_batch_size)).map_err(invalid)
    }

    /// Absolute or root-relative path of the metadata directory.
    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(&self.metadata_dir)
    }

    /// Path of the optional configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.metadata_path().join(CONFIG_FILE_NAME)
    }
}

fn check_metadata_dir(name: &str) -> Result<(), String> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(format!(
            "Metadata directory must be a single directory name, got {name:?}"
        )),
    }
}

fn check_sizes(read_chunk_size: Option<usize>, delete_batch_size: Option<usize>) -> Result<(), String> {
    if read_chunk_size == Some(0) {
        return Err("Read chunk size must be greater than zero".to_string());
    }
    if delete_batch_size == Some(0) {
        return Err("Delete batch size must be greater than zero".to_string());
    }
    Ok(())
}
