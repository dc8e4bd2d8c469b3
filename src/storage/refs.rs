//! Branch and reference resolution.
//!
//! Git refs are pointers to commits. Repositories served here are only ever
//! written by `git-receive-pack`, so this module is read-only: it resolves
//! branches and HEAD to commits.

use git2::{ErrorCode, Repository};

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::{BranchName, CommitId};

/// Resolves Git references (branches, HEAD).
pub struct RefManager;

impl RefManager {
    /// Resolve a branch name to its current commit ID.
    ///
    /// Returns `None` when the branch does not exist.
    pub fn resolve_branch(repo: &Repository, branch: &BranchName) -> StorageResult<Option<CommitId>> {
        let reference = match repo.find_reference(&branch.as_ref_path()) {
            Ok(reference) => reference,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Git(e)),
        };

        let commit = reference
            .peel_to_commit()
            .map_err(|_| StorageError::RefNotFound(branch.to_string()))?;

        Ok(Some(CommitId::new(commit.id())))
    }

    /// Get the current HEAD commit.
    pub fn head_commit(repo: &Repository) -> StorageResult<CommitId> {
        let head = repo.head().map_err(|e| match e.code() {
            ErrorCode::UnbornBranch | ErrorCode::NotFound => StorageError::EmptyRepository,
            _ => StorageError::Git(e),
        })?;

        let commit = head.peel_to_commit()?;
        Ok(CommitId::new(commit.id()))
    }
}
