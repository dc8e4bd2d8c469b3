//! The shared catalog of discovered directories.
//!
//! Readers take a cheap `Arc` clone of the current snapshot and never wait on
//! a tree walk. Writers serialize on `writer`, build a whole new snapshot off
//! to the side and swap it in, so no reader ever observes a partially replaced
//! repository.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::index::directory::{sort_and_dedup, Directory, RepoInfo};
use crate::index::discover::{discover, discover_repository};
use crate::index::error::IndexResult;
use crate::storage::is_bare_repository;

/// An immutable view of the catalog.
#[derive(Debug, Default)]
pub struct IndexSnapshot {
    sorted: Vec<Directory>,
    by_import_path: HashMap<String, usize>,
}

impl IndexSnapshot {
    fn new(sorted: Vec<Directory>) -> Self {
        let by_import_path = sorted
            .iter()
            .enumerate()
            .map(|(i, dir)| (dir.import_path.clone(), i))
            .collect();
        Self { sorted, by_import_path }
    }

    /// All directories, sorted by import path.
    pub fn sorted(&self) -> &[Directory] {
        &self.sorted
    }

    pub fn lookup(&self, import_path: &str) -> Option<&Directory> {
        self.by_import_path.get(import_path).map(|&i| &self.sorted[i])
    }

    pub fn len(&self) -> usize {
        self.sorted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sorted.is_empty()
    }
}

/// Directory index over a store of bare repositories.
pub struct CodeIndex {
    repos_dir: PathBuf,
    domain: String,
    snapshot: RwLock<Arc<IndexSnapshot>>,
    writer: Mutex<()>,
}

impl CodeIndex {
    /// Build the index with a full walk of `repos_dir`.
    pub fn open(repos_dir: impl Into<PathBuf>, domain: impl Into<String>) -> IndexResult<Self> {
        let repos_dir = repos_dir.into();
        let domain = domain.into();
        let dirs = discover(&repos_dir, &domain)?;
        info!(dirs = dirs.len(), repos_dir = %repos_dir.display(), "directory index built");
        Ok(Self::from_dirs(repos_dir, domain, dirs))
    }

    /// Build the index from already discovered directories.
    pub fn from_dirs(repos_dir: impl Into<PathBuf>, domain: impl Into<String>, mut dirs: Vec<Directory>) -> Self {
        sort_and_dedup(&mut dirs);
        Self {
            repos_dir: repos_dir.into(),
            domain: domain.into(),
            snapshot: RwLock::new(Arc::new(IndexSnapshot::new(dirs))),
            writer: Mutex::new(()),
        }
    }

    pub fn repos_dir(&self) -> &Path {
        &self.repos_dir
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.snapshot.read())
    }

    /// All directories, sorted by import path.
    pub fn sorted(&self) -> Vec<Directory> {
        self.snapshot().sorted().to_vec()
    }

    pub fn lookup(&self, import_path: &str) -> Option<Directory> {
        self.snapshot().lookup(import_path).cloned()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Resolve a domain-relative URL path (`/kebabcase`) to a repository root.
    ///
    /// `""` and `/` name a repository at the root of the store.
    pub fn resolve_repo(&self, url_path: &str) -> Option<RepoInfo> {
        let import_path = match url_path {
            "" | "/" => self.domain.clone(),
            _ => format!("{}/{}", self.domain, url_path.strip_prefix('/')?),
        };
        self.repo_for_import_path(&import_path)
    }

    /// Resolve a full import path to a repository root.
    pub fn repo_for_import_path(&self, import_path: &str) -> Option<RepoInfo> {
        let dir = self.lookup(import_path)?;
        if !dir.is_repo_root() {
            return None;
        }
        let path = match import_path.strip_prefix(&self.domain)? {
            "" => "/",
            rel if rel.starts_with('/') => rel,
            _ => return None,
        };
        Some(RepoInfo {
            path: path.to_string(),
            dir: self.repo_dir(import_path)?,
            spec: dir.import_path,
        })
    }

    /// Re-walk one repository and replace its entries. Returns the old entries.
    ///
    /// A repository that no longer exists on disk ends up with no entries.
    pub fn rediscover(&self, repo_root: &str) -> IndexResult<Vec<Directory>> {
        let _writer = self.writer.lock();

        let new_dirs = match self.repo_dir(repo_root) {
            Some(dir) if is_bare_repository(&dir) => discover_repository(&dir, repo_root)?,
            _ => Vec::new(),
        };
        let old = self.splice(repo_root, new_dirs);
        debug!(repo = repo_root, removed = old.len(), "rediscovered repository");
        Ok(old)
    }

    /// Replace every entry of `repo_root` with `new_dirs`. Returns the old entries.
    pub fn replace_dirs(&self, repo_root: &str, new_dirs: Vec<Directory>) -> Vec<Directory> {
        let _writer = self.writer.lock();
        self.splice(repo_root, new_dirs)
    }

    /// Caller holds `writer`.
    fn splice(&self, repo_root: &str, mut new_dirs: Vec<Directory>) -> Vec<Directory> {
        let current = self.snapshot();
        sort_and_dedup(&mut new_dirs);

        let (old, kept): (Vec<Directory>, Vec<Directory>) =
            current.sorted().iter().cloned().partition(|d| d.repo_root == repo_root);

        let mut merged = Vec::with_capacity(kept.len() + new_dirs.len());
        let mut kept = kept.into_iter().peekable();
        let mut added = new_dirs.into_iter().peekable();
        loop {
            let take_kept = match (kept.peek(), added.peek()) {
                (Some(k), Some(a)) => k.import_path <= a.import_path,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => break,
            };
            let next = if take_kept { kept.next() } else { added.next() };
            merged.extend(next);
        }
        // an import path claimed by another repository stays with the first entry
        merged.dedup_by(|next, prev| next.import_path == prev.import_path);

        *self.snapshot.write() = Arc::new(IndexSnapshot::new(merged));
        old
    }

    fn repo_dir(&self, repo_root: &str) -> Option<PathBuf> {
        if repo_root == self.domain {
            return Some(self.repos_dir.clone());
        }
        let rel = repo_root.strip_prefix(&self.domain)?.strip_prefix('/')?;
        Some(self.repos_dir.join(rel))
    }
}
