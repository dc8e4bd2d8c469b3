use std::path::PathBuf;

use serde::Serialize;

/// One directory discovered inside a repository tree, keyed by import path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Directory {
    pub import_path: String,
    /// import path of the enclosing repository, empty outside any repository
    pub repo_root: String,
    pub package: Option<Package>,
}

impl Directory {
    pub fn new(import_path: impl Into<String>, repo_root: impl Into<String>, package: Option<Package>) -> Self {
        Self {
            import_path: import_path.into(),
            repo_root: repo_root.into(),
            package,
        }
    }

    pub fn is_repo_root(&self) -> bool {
        self.import_path == self.repo_root
    }

    pub fn within_repo(&self) -> bool {
        !self.repo_root.is_empty()
    }
}

/// A buildable Go package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub name: String,
    pub synopsis: String,
    pub doc_html: String,
}

/// Physical location of a repository root, resolved per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoInfo {
    /// repository root import path, e.g. `dmitri.shuralyov.com/kebabcase`
    pub spec: String,
    /// domain-stripped URL path, e.g. `/kebabcase`
    pub path: String,
    /// bare repository directory on disk
    pub dir: PathBuf,
}

/// Sort by import path and drop duplicate import paths, keeping the first.
pub(crate) fn sort_and_dedup(dirs: &mut Vec<Directory>) {
    dirs.sort_by(|a, b| a.import_path.cmp(&b.import_path));
    dirs.dedup_by(|next, prev| next.import_path == prev.import_path);
}
