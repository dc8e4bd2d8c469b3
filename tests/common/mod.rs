#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use git2::{FileMode, Oid, Repository, Signature, Time};
use tempfile::TempDir;
use tower::ServiceExt;

use codehost::index::CodeIndex;

pub const DOMAIN: &str = "dmitri.shuralyov.com";
pub const MODULE: &str = "dmitri.shuralyov.com/kebabcase";

pub const T1: i64 = 1_518_000_000;
pub const T2: i64 = 1_518_003_600;
pub const T3: i64 = 1_518_003_660;

pub const KEBABCASE_V1: &str = "// Package kebabcase provides a parser for identifier names
// using kebab-case naming convention.
package kebabcase
";

pub const KEBABCASE_V2: &str = "// Package kebabcase provides a parser for identifier names
// using kebab-case naming convention.
package kebabcase

// Parse splits a kebab-case identifier into words.
func Parse(s string) []string { return nil }
";

pub const KEBABCASE_TEST: &str = "package kebabcase_test\n";
pub const WORDS: &str = "// Package words lists common words.\npackage words\n";

pub fn c1_files() -> Vec<(&'static str, &'static str)> {
    vec![("kebabcase.go", KEBABCASE_V1)]
}

pub fn c2_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("kebabcase.go", KEBABCASE_V2),
        ("kebabcase_test.go", KEBABCASE_TEST),
        ("internal/words/words.go", WORDS),
    ]
}

/// A store with one bare repository, `kebabcase`:
///
/// ```text
///   c1 (T1) ── c2 (T2)        master
///                 └── c3 (T3) feature
/// ```
pub struct Store {
    pub tmp: TempDir,
    pub repos_dir: PathBuf,
    pub repo_dir: PathBuf,
    pub c1: Oid,
    pub c2: Oid,
    pub c3: Oid,
}

impl Store {
    pub fn repo(&self) -> Repository {
        Repository::open_bare(&self.repo_dir).unwrap()
    }

    pub fn index(&self) -> Arc<CodeIndex> {
        Arc::new(CodeIndex::open(&self.repos_dir, DOMAIN).unwrap())
    }
}

/// An empty bare `kebabcase` repository whose HEAD points at master.
pub fn empty_store() -> (TempDir, PathBuf, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let repos_dir = tmp.path().join("repos");
    let repo_dir = repos_dir.join("kebabcase");
    let repo = Repository::init_bare(&repo_dir).unwrap();
    repo.set_head("refs/heads/master").unwrap();
    (tmp, repos_dir, repo_dir)
}

/// Only c1 on master.
pub fn initial_store() -> Store {
    let (tmp, repos_dir, repo_dir) = empty_store();
    let repo = Repository::open_bare(&repo_dir).unwrap();
    let c1 = commit(&repo, &[], &c1_files(), T1, "Initial commit.\n");
    set_ref(&repo, "refs/heads/master", c1);
    Store {
        tmp,
        repos_dir,
        repo_dir,
        c1,
        c2: Oid::zero(),
        c3: Oid::zero(),
    }
}

pub fn kebabcase_store() -> Store {
    let mut store = initial_store();
    let repo = store.repo();
    store.c2 = commit(&repo, &[store.c1], &c2_files(), T2, "Add Parse and words package.\n");
    set_ref(&repo, "refs/heads/master", store.c2);

    let mut c3_files = c2_files();
    c3_files.push(("feature.go", "package kebabcase\n"));
    store.c3 = commit(&repo, &[store.c2], &c3_files, T3, "Add feature.\n");
    set_ref(&repo, "refs/heads/feature", store.c3);
    store
}

pub fn commit(repo: &Repository, parents: &[Oid], files: &[(&str, &str)], seconds: i64, message: &str) -> Oid {
    let tree_id = write_tree(repo, files);
    let tree = repo.find_tree(tree_id).unwrap();
    let sig = Signature::new("Dmitri Shuralyov", "dmitri@shuralyov.com", &Time::new(seconds, 0)).unwrap();
    let parents: Vec<git2::Commit<'_>> = parents.iter().map(|p| repo.find_commit(*p).unwrap()).collect();
    let parent_refs: Vec<&git2::Commit<'_>> = parents.iter().collect();
    repo.commit(None, &sig, &sig, message, &tree, &parent_refs).unwrap()
}

pub fn set_ref(repo: &Repository, name: &str, id: Oid) {
    repo.reference(name, id, true, "test").unwrap();
}

fn write_tree(repo: &Repository, files: &[(&str, &str)]) -> Oid {
    let mut blobs = Vec::new();
    let mut dirs: BTreeMap<&str, Vec<(&str, &str)>> = BTreeMap::new();
    for (path, contents) in files {
        match path.split_once('/') {
            Some((dir, rest)) => dirs.entry(dir).or_default().push((rest, *contents)),
            None => blobs.push((*path, *contents)),
        }
    }

    let mut builder = repo.treebuilder(None).unwrap();
    for (name, contents) in blobs {
        let blob = repo.blob(contents.as_bytes()).unwrap();
        builder.insert(name, blob, FileMode::Blob.into()).unwrap();
    }
    for (name, entries) in dirs {
        let subtree = write_tree(repo, &entries);
        builder.insert(name, subtree, FileMode::Tree.into()).unwrap();
    }
    builder.write().unwrap()
}

/// Write an executable shell script.
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    TestResponse {
        status,
        headers,
        body: body.to_vec(),
    }
}

pub async fn get(router: &Router, uri: &str) -> TestResponse {
    send(router, Request::get(uri).body(Body::empty()).unwrap()).await
}
