//! Storage layer error types
//!
//! All errors that can occur while reading repositories are defined here.
//! We use `thiserror` for ergonomic error definition and better error messages

use std::path::PathBuf;

use thiserror::Error;

/// the main error type for storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    /// error from the underlying Git library
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// the directory does not hold a git repository
    #[error("not a git repository: {0}")]
    NotARepository(PathBuf),

    /// the specified branch/ref was not found
    #[error("ref not found: {0}")]
    RefNotFound(String),

    /// the commit was not found (or an abbreviation was ambiguous)
    #[error("commit not found: {0}")]
    CommitNotFound(String),

    /// repo is empty (HEAD is unborn)
    #[error("repository is empty: no commits found")]
    EmptyRepository,

    /// internal error that shouldn't happen
    #[error("internal error: {0}")]
    Internal(String),
}

impl StorageError {
    /// check if this error indicates the resource doesn't exist
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StorageError::NotARepository(_)
                | StorageError::RefNotFound(_)
                | StorageError::CommitNotFound(_)
                | StorageError::EmptyRepository
        )
    }
}

/// result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(StorageError::CommitNotFound("abc".into()).is_not_found());
        assert!(StorageError::NotARepository(PathBuf::from("/tmp/x")).is_not_found());
        assert!(StorageError::EmptyRepository.is_not_found());
        assert!(!StorageError::Internal("boom".into()).is_not_found());
    }
}
