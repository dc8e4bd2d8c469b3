//! Tree traversal.
//!
//! In Git, a tree is a directory. Two consumers walk trees here:
//! - the directory index, which visits every directory of the `HEAD` tree
//!   (pruning excluded names) to discover Go packages
//! - the module proxy, which lists every file of a commit to build a zip
//!
//! Submodule entries (gitlinks) are neither files nor directories and are skipped.

use std::path::Path;

use git2::{ObjectType, Repository, Tree};

use crate::storage::blob;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::types::BlobId;

/// A file (blob entry) inside a tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeFile {
    /// slash-separated path relative to the tree root, or the bare name
    /// when produced by [`TreeHandle::walk_dirs`]
    pub path: String,
    pub id: BlobId,
    /// git file mode (0o100644, 0o100755, 0o120000)
    pub mode: i32,
}

/// A read only handle to a git tree at a specific commit
///
/// think of it as a snapshot - it won't change even if new commits are pushed.
pub struct TreeHandle<'repo> {
    repo: &'repo Repository,
    tree: Tree<'repo>,
}

impl<'repo> TreeHandle<'repo> {
    pub(crate) fn new(repo: &'repo Repository, tree: Tree<'repo>) -> Self {
        Self { repo, tree }
    }

    /// Visit every directory of the tree in pre-order.
    ///
    /// `skip` receives a directory's name; returning true prunes that directory
    /// and everything below it. `visit` receives the slash-separated directory
    /// path ("" for the root) and the files directly inside it, in tree order.
    pub fn walk_dirs<S, V>(&self, skip: S, mut visit: V) -> StorageResult<()>
    where
        S: Fn(&str) -> bool,
        V: FnMut(&str, &[TreeFile]) -> StorageResult<()>,
    {
        self.walk_dirs_inner(&self.tree, "", &skip, &mut visit)
    }

    fn walk_dirs_inner(
        &self,
        tree: &Tree<'repo>,
        dir: &str,
        skip: &dyn Fn(&str) -> bool,
        visit: &mut dyn FnMut(&str, &[TreeFile]) -> StorageResult<()>,
    ) -> StorageResult<()> {
        let mut files = Vec::new();
        let mut subdirs = Vec::new();

        for entry in tree.iter() {
            let Some(name) = entry.name() else {
                continue;
            };
            match entry.kind() {
                Some(ObjectType::Blob) => files.push(TreeFile {
                    path: name.to_string(),
                    id: BlobId::new(entry.id()),
                    mode: entry.filemode(),
                }),
                Some(ObjectType::Tree) if !skip(name) => {
                    subdirs.push((name.to_string(), entry.id()));
                }
                _ => {}
            }
        }

        visit(dir, &files)?;

        for (name, id) in subdirs {
            let subtree = self.repo.find_tree(id)?;
            let path = join(dir, &name);
            self.walk_dirs_inner(&subtree, &path, skip, visit)?;
        }
        Ok(())
    }

    /// List every file in the tree, depth first, in tree order.
    pub fn files(&self) -> StorageResult<Vec<TreeFile>> {
        let mut out = Vec::new();
        self.collect_files(&self.tree, "", &mut out)?;
        Ok(out)
    }

    fn collect_files(&self, tree: &Tree<'repo>, dir: &str, out: &mut Vec<TreeFile>) -> StorageResult<()> {
        for entry in tree.iter() {
            let Some(name) = entry.name() else {
                continue;
            };
            match entry.kind() {
                Some(ObjectType::Blob) => out.push(TreeFile {
                    path: join(dir, name),
                    id: BlobId::new(entry.id()),
                    mode: entry.filemode(),
                }),
                Some(ObjectType::Tree) => {
                    let subtree = self.repo.find_tree(entry.id())?;
                    self.collect_files(&subtree, &join(dir, name), out)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Read the file at a slash-separated path, `None` if there is no such file.
    pub fn read_file(&self, path: &str) -> StorageResult<Option<Vec<u8>>> {
        let entry = match self.tree.get_path(Path::new(path)) {
            Ok(entry) => entry,
            Err(e) if e.code() == git2::ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Git(e)),
        };
        if entry.kind() != Some(ObjectType::Blob) {
            return Ok(None);
        }
        blob::read_blob(self.repo, BlobId::new(entry.id())).map(Some)
    }

    /// Read the contents of a file listed by this tree.
    pub fn read(&self, file: &TreeFile) -> StorageResult<Vec<u8>> {
        blob::read_blob(self.repo, file.id)
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}
