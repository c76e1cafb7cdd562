//! Replica synchronization for tidemark.
//!
//! A [`Synchronizer`] walks the pending changes of a
//! [`StateRepository`](tidemark_state::StateRepository), applies each one to a
//! [`Replica`], and commits the change only after the replica accepted it.
//! [`DirectoryReplica`] mirrors a tree into a local directory.

mod replica;
mod sync;

pub use replica::{CONTENT_DIR, DeleteFailure, DirectoryReplica, Replica, ReplicaError};
pub use sync::{SyncAction, SyncFailure, SyncReport, Synchronizer};
