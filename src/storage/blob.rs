//! Blob access.
//!
//! Blobs are file contents. Source files are read to discover Go packages,
//! and every blob of a commit ends up in a module zip.

use git2::Repository;

use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::BlobId;

/// read raw bytes from a blob
pub fn read_blob(repo: &Repository, id: BlobId) -> StorageResult<Vec<u8>> {
    let blob = repo
        .find_blob(id.raw())
        .map_err(|_| StorageError::Internal(format!("blob {} missing from object store", id)))?;
    Ok(blob.content().to_vec())
}
