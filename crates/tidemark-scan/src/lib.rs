//! Tree walking and content fingerprinting for tidemark.
//!
//! This crate provides the two filesystem-facing pieces of change detection:
//!
//! - **[`TreeWalker`]** - lazy, name-ordered enumeration of regular files,
//!   pruning excluded directories by physical identity rather than by name
//! - **[`Fingerprinter`]** - size + digest of a file's content, streamed in
//!   bounded reads so memory use does not depend on file size
//!
//! # Example
//!
//! ```rust,no_run
//! use tidemark_scan::{FileIdentity, Fingerprinter, TreeWalker};
//!
//! let metadata = FileIdentity::of("/data/.tidemark".as_ref()).unwrap();
//! let walker = TreeWalker::new("/data").exclude(metadata);
//! let fingerprinter = Fingerprinter::default();
//!
//! for path in walker.files() {
//!     let fingerprint = fingerprinter.fingerprint_file(&path).unwrap();
//!     println!("{}: {fingerprint}", path.display());
//! }
//! ```

mod hasher;
mod identity;
mod walker;

pub use hasher::Fingerprinter;
pub use identity::FileIdentity;
pub use walker::{Files, TreeWalker};

// Re-export core types for convenience
pub use tidemark_core::{ContentHash, Fingerprint, HashAlgorithm, ScanWarning, TrackError, WarningKind};
