//!   Bare repository wrapper.
//!
//!  This is the central component of the storage layer. It wraps a
//!  `git2::Repository` opened on a bare repository directory and provides the
//!  read operations the directory index, module proxy and push events need.
//!
//! `git2::Repository` is `Send` but not `Sync`, so a `GitRepository` is opened
//! per request (inside a blocking task) rather than shared.

use std::path::{Path, PathBuf};

use git2::Repository;

use crate::storage::commit::{self, CommitInfo, HistoryIterator};
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::refs::RefManager;
use crate::storage::tree::TreeHandle;
use crate::storage::types::{BranchName, CommitId};

/// A bare Git repository on local disk.
pub struct GitRepository {
    repo: Repository,
    path: PathBuf,
}

impl GitRepository {
    /// Open an existing bare repository.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let repo = Repository::open_bare(path).map_err(|_| StorageError::NotARepository(path.to_path_buf()))?;

        Ok(Self {
            repo,
            path: path.to_path_buf(),
        })
    }

    /// Get the repository path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ==================== Refs ====================

    /// Get the current HEAD commit.
    pub fn head(&self) -> StorageResult<CommitId> {
        RefManager::head_commit(&self.repo)
    }

    /// Get the commit ID for a branch, `None` if the branch does not exist.
    pub fn resolve_branch(&self, branch: &BranchName) -> StorageResult<Option<CommitId>> {
        RefManager::resolve_branch(&self.repo, branch)
    }

    // ==================== Commits ====================

    /// Resolve an abbreviated commit hash.
    pub fn find_commit_by_prefix(&self, prefix: &str) -> StorageResult<CommitInfo> {
        commit::find_commit_by_prefix(&self.repo, prefix)
    }

    /// Check whether `ancestor` equals `descendant` or is reachable from it.
    pub fn is_ancestor_or_equal(&self, ancestor: CommitId, descendant: CommitId) -> StorageResult<bool> {
        commit::is_ancestor_or_equal(&self.repo, ancestor, descendant)
    }

    /// Get commit history, newest first.
    pub fn history(&self, from: CommitId) -> StorageResult<HistoryIterator<'_>> {
        commit::history(&self.repo, from)
    }

    /// Commits made reachable by moving a ref from `old` to `new`, oldest first.
    pub fn commits_between(&self, old: Option<CommitId>, new: CommitId) -> StorageResult<Vec<CommitInfo>> {
        commit::commits_between(&self.repo, old, new)
    }

    // ==================== Trees ====================

    /// Get the tree at a specific commit.
    pub fn tree_at(&self, commit_id: CommitId) -> StorageResult<TreeHandle<'_>> {
        commit::get_tree_at_commit(&self.repo, commit_id)
    }

    /// Get the tree of the HEAD commit.
    pub fn head_tree(&self) -> StorageResult<TreeHandle<'_>> {
        let head = self.head()?;
        self.tree_at(head)
    }
}

/// Bare repository detection: a directory holding a regular `HEAD` file.
pub fn is_bare_repository(dir: &Path) -> bool {
    std::fs::metadata(dir.join("HEAD"))
        .map(|meta| !meta.is_dir())
        .unwrap_or(false)
}
