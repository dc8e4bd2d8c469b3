//! Repository store discovery.
//!
//! The OS walk stops at every bare repository it finds; from there the walk
//! continues through the Git tree at `HEAD`, one `Directory` per tree directory.

use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;

use crate::index::constraint::BuildContext;
use crate::index::directory::{sort_and_dedup, Directory};
use crate::index::error::{IndexError, IndexResult};
use crate::index::package::{is_candidate, load_package};
use crate::storage::{is_bare_repository, GitRepository, StorageError};

/// Directories skipped by both the filesystem walk and the tree walk.
pub fn is_excluded(name: &str) -> bool {
    name.starts_with('.') || name.starts_with('_') || name == "testdata"
}

/// Import path for a slash-separated path relative to the store root.
pub fn import_path(domain: &str, rel: &str) -> String {
    if rel.is_empty() {
        domain.to_string()
    } else {
        format!("{}/{}", domain, rel)
    }
}

/// Walk `repos_dir` and every repository in it.
///
/// The result is sorted by import path with at most one entry per import path.
pub fn discover(repos_dir: &Path, domain: &str) -> IndexResult<Vec<Directory>> {
    let mut dirs = Vec::new();
    let mut walker = WalkDir::new(repos_dir)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    while let Some(entry) = walker.next() {
        let entry = entry?;
        if !entry.file_type().is_dir() {
            continue;
        }
        if entry.depth() > 0 && is_excluded(&entry.file_name().to_string_lossy()) {
            walker.skip_current_dir();
            continue;
        }
        if !is_bare_repository(entry.path()) {
            continue;
        }

        let rel = relative_slash_path(repos_dir, entry.path());
        let repo_root = import_path(domain, &rel);
        debug!(repo = %repo_root, path = %entry.path().display(), "discovered repository");
        dirs.extend(discover_repository(entry.path(), &repo_root)?);
        walker.skip_current_dir();
    }

    sort_and_dedup(&mut dirs);
    Ok(dirs)
}

/// Walk the `HEAD` tree of one bare repository.
///
/// A repository without commits yields just its root entry, so it can still be
/// resolved (and pushed to).
pub fn discover_repository(dir: &Path, repo_root: &str) -> IndexResult<Vec<Directory>> {
    let repo = GitRepository::open(dir)?;
    let tree = match repo.head_tree() {
        Ok(tree) => tree,
        Err(StorageError::EmptyRepository) => return Ok(vec![Directory::new(repo_root, repo_root, None)]),
        Err(e) => return Err(e.into()),
    };

    let ctx = BuildContext::linux_amd64();
    let mut dirs = Vec::new();
    let mut failure: Option<IndexError> = None;

    tree.walk_dirs(is_excluded, |rel, files| {
        let import_path = import_path(repo_root, rel);

        let mut sources = Vec::new();
        for file in files.iter().filter(|f| is_candidate(&f.path)) {
            sources.push((file.path.clone(), tree.read(file)?));
        }

        match load_package(&ctx, &sources) {
            Ok(package) => {
                dirs.push(Directory::new(import_path, repo_root, package));
                Ok(())
            }
            Err(source) => {
                failure = Some(IndexError::Package { import_path, source });
                Err(StorageError::Internal("package load failed".to_string()))
            }
        }
    })
    .or_else(|e| match failure.take() {
        Some(failure) => Err(failure),
        None => Err(IndexError::from(e)),
    })?;

    sort_and_dedup(&mut dirs);
    Ok(dirs)
}

fn relative_slash_path(root: &Path, path: &Path) -> String {
    let rel = path.strip_prefix(root).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
