//! Persistent fingerprint state and change detection for tidemark.
//!
//! A [`StateRepository`] pairs a tracked directory with a
//! [`FingerprintStore`] kept in its metadata directory. Scanning the
//! repository yields one [`Change`] per item whose content differs from its
//! last committed state; committing a change records the new state.
//!
//! Nothing is committed implicitly. A caller mirrors each change somewhere
//! first and commits only once that succeeded, so an interrupted run simply
//! resumes from the remaining work on the next scan.
//!
//! # Example
//!
//! ```rust,no_run
//! use tidemark_state::StateRepository;
//!
//! let repository = StateRepository::open_path("/data").unwrap();
//! for change in repository.changes() {
//!     println!("{} {}", change.kind(), change.item().display());
//!     change.commit().unwrap();
//! }
//! ```

mod change;
mod repository;
mod store;

pub use change::{Change, ChangeKind};
pub use repository::{Changes, StateRepository};
pub use store::{FingerprintStore, StoredItems};

// Re-export core types for convenience
pub use tidemark_core::{
    Fingerprint, HashAlgorithm, ScanWarning, TrackError, TrackerConfig, WarningKind,
};
