use thiserror::Error;

use crate::storage::StorageError;

/// errors from loading a single directory as a Go package
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackageError {
    #[error("found packages {first} ({first_file}) and {second} ({second_file})")]
    MultiplePackages {
        first: String,
        first_file: String,
        second: String,
        second_file: String,
    },

    #[error("{file}: syntax error: {reason}")]
    Syntax { file: String, reason: String },

    #[error("invalid build constraint {line:?}: {reason}")]
    BadConstraint { line: String, reason: String },
}

/// errors from walking the repository store
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("walking repository store: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("loading package {import_path}: {source}")]
    Package {
        import_path: String,
        #[source]
        source: PackageError,
    },
}

pub type IndexResult<T> = Result<T, IndexError>;
