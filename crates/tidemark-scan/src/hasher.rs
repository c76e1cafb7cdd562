//! Streaming content fingerprints.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use sha3::Sha3_256;
use tidemark_core::{
    ContentHash, DEFAULT_READ_CHUNK_SIZE, Fingerprint, HashAlgorithm, TrackError, TrackerConfig,
};

/// Computes fingerprints by streaming content through a hash in fixed-size reads.
///
/// Memory use is one read buffer regardless of file size. Read failures are
/// returned to the caller unchanged; nothing is retried here.
#[derive(Debug, Clone, Copy)]
pub struct Fingerprinter {
    algorithm: HashAlgorithm,
    chunk_size: usize,
}

impl Fingerprinter {
    /// Create a fingerprinter. A zero chunk size falls back to the default.
    pub fn new(algorithm: HashAlgorithm, chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_READ_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            algorithm,
            chunk_size,
        }
    }

    /// Create a fingerprinter from tracker configuration.
    pub fn from_config(config: &TrackerConfig) -> Self {
        Self::new(config.algorithm, config.read_chunk_size)
    }

    /// Algorithm used for new fingerprints.
    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Fingerprint the file at `path`.
    pub fn fingerprint_file(&self, path: &Path) -> Result<Fingerprint, TrackError> {
        let file = File::open(path).map_err(|e| TrackError::io(path, e))?;
        let fingerprint = self
            .fingerprint_reader(file)
            .map_err(|e| TrackError::io(path, e))?;

        tracing::info!(
            "{}, Size={}, Hash={}",
            path.display(),
            fingerprint.size(),
            fingerprint.content_hash()
        );
        Ok(fingerprint)
    }

    /// Fingerprint everything `reader` yields until end of stream.
    pub fn fingerprint_reader(&self, mut reader: impl Read) -> std::io::Result<Fingerprint> {
        let mut hasher = StreamHasher::new(self.algorithm);
        let mut buffer = vec![0u8; self.chunk_size];
        let mut size: u64 = 0;

        loop {
            let bytes_read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buffer[..bytes_read]);
            size += bytes_read as u64;
        }

        Ok(Fingerprint::new(
            size,
            hasher.finalize(),
            Some(self.algorithm),
        ))
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(HashAlgorithm::default(), DEFAULT_READ_CHUNK_SIZE)
    }
}

enum StreamHasher {
    Sha3_256(Sha3_256),
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl StreamHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha3_256 => Self::Sha3_256(Sha3_256::new()),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, bytes: &[u8]) {
        match self {
            Self::Blake3(hasher) => {
                hasher.update(bytes);
            }
            Self::Sha3_256(hasher) => hasher.update(bytes),
            Self::Sha256(hasher) => hasher.update(bytes),
        }
    }

    fn finalize(self) -> ContentHash {
        match self {
            Self::Blake3(hasher) => ContentHash::new(*hasher.finalize().as_bytes()),
            Self::Sha3_256(hasher) => ContentHash::new(hasher.finalize().into()),
            Self::Sha256(hasher) => ContentHash::new(hasher.finalize().into()),
        }
    }
}
