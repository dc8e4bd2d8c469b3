//! storage layer
//!
//! this module provides a read-only abstraction over the bare repositories on
//! disk. The upper layers (directory index, module proxy, push events) use this
//! API and never touch git2 directly.
//!
//!  # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     GitRepository                           │
//! │     (High-level API: refs, commits, ancestry, trees)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!        ┌─────────────────────┼─────────────────────┐
//!        │                     │                     │
//!        ▼                     ▼                     ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │    tree     │       │   commit    │       │    refs     │
//!  │ (dirs/files)│       │  (history)  │       │ (branches)  │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//!         │
//!         ▼
//!  ┌─────────────┐
//!  │    blob     │
//!  │ (contents)  │
//!  └─────────────┘
//!  ```
//!
//! # Usage
//!
//! ```ignore
//! use codehost::storage::{BranchName, GitRepository};
//!
//! let repo = GitRepository::open("/srv/repos/kebabcase")?;
//! let master = repo.resolve_branch(&BranchName::master())?;
//! let commit = repo.find_commit_by_prefix("0123456789ab")?;
//! let tree = repo.tree_at(commit.id)?;
//! ```

mod blob;
mod commit;
mod error;
mod refs;
mod repository;
mod tree;
mod types;

pub use commit::{CommitInfo, HistoryIterator};
pub use error::{StorageError, StorageResult};
pub use repository::{is_bare_repository, GitRepository};
pub use tree::{TreeFile, TreeHandle};
pub use types::{BlobId, BranchName, CommitId};
