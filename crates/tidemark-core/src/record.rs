//! Text encoding of stored fingerprint records.
//!
//! A record is a list of `field: value` lines:
//!
//! ```text
//! size: 5
//! content_hash: 1c8b...
//! algorithm: blake3
//! ```
//!
//! The `algorithm` line is omitted for fingerprints whose algorithm is not
//! known. Values never contain newlines, so no escaping is done.

use thiserror::Error;

use crate::fingerprint::{ContentHash, Fingerprint, HashAlgorithm};

const SIZE: &str = "size";
const CONTENT_HASH: &str = "content_hash";
const ALGORITHM: &str = "algorithm";

/// Reasons a record fails to decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    /// The record is not valid UTF-8 text.
    #[error("record is not valid UTF-8")]
    NotUtf8,

    /// A non-blank line without a `:` separator.
    #[error("line {line} is not a `field: value` pair")]
    MalformedLine { line: usize },

    /// The same field appears twice.
    #[error("field `{field}` appears more than once")]
    DuplicateField { field: &'static str },

    /// A required field is absent.
    #[error("missing field `{field}`")]
    MissingField { field: &'static str },

    /// A field value could not be parsed.
    #[error("invalid value for `{field}`: {value:?}")]
    InvalidValue { field: &'static str, value: String },
}

/// Encode a fingerprint. Field order is fixed so output is byte-stable.
pub fn encode(fingerprint: &Fingerprint) -> String {
    let mut text = format!(
        "{SIZE}: {}\n{CONTENT_HASH}: {}\n",
        fingerprint.size(),
        fingerprint.content_hash().to_hex()
    );
    if let Some(algorithm) = fingerprint.algorithm() {
        text.push_str(&format!("{ALGORITHM}: {algorithm}\n"));
    }
    text
}

/// Decode raw record bytes.
pub fn decode_bytes(bytes: &[u8]) -> Result<Fingerprint, RecordError> {
    let text = std::str::from_utf8(bytes).map_err(|_| RecordError::NotUtf8)?;
    decode(text)
}

/// Decode a record, validating every field before building the fingerprint.
pub fn decode(text: &str) -> Result<Fingerprint, RecordError> {
    let mut size = None;
    let mut content_hash = None;
    let mut algorithm = None;

    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let (key, value) = line
            .split_once(':')
            .ok_or(RecordError::MalformedLine { line: index + 1 })?;
        let value = value.trim();

        match key.trim() {
            SIZE => {
                let parsed = value.parse::<u64>().map_err(|_| invalid(SIZE, value))?;
                set_once(&mut size, SIZE, parsed)?;
            }
            CONTENT_HASH => {
                let parsed = ContentHash::from_hex(value).ok_or_else(|| invalid(CONTENT_HASH, value))?;
                set_once(&mut content_hash, CONTENT_HASH, parsed)?;
            }
            ALGORITHM => {
                let parsed = value
                    .parse::<HashAlgorithm>()
                    .map_err(|_| invalid(ALGORITHM, value))?;
                set_once(&mut algorithm, ALGORITHM, parsed)?;
            }
            other => {
                tracing::debug!("Ignoring unknown record field `{other}`");
            }
        }
    }

    let size = size.ok_or(RecordError::MissingField { field: SIZE })?;
    let content_hash = content_hash.ok_or(RecordError::MissingField {
        field: CONTENT_HASH,
    })?;

    Ok(Fingerprint::new(size, content_hash, algorithm))
}

fn set_once<T>(slot: &mut Option<T>, field: &'static str, value: T) -> Result<(), RecordError> {
    if slot.is_some() {
        return Err(RecordError::DuplicateField { field });
    }
    *slot = Some(value);
    Ok(())
}

fn invalid(field: &'static str, value: &str) -> RecordError {
    RecordError::InvalidValue {
        field,
        value: value.to_string(),
    }
}
