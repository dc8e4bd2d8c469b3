//! Module proxy request handling.
//!
//! Every repository root serves exactly one module, its root import path.
//! A version is accepted only if it is the pseudo-version of a commit that is
//! reachable from `master`; every other version is indistinguishable from a
//! version that does not exist.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::index::{CodeIndex, RepoInfo};
use crate::module::archive::build_module_zip;
use crate::module::error::{ModuleError, ModuleResult};
use crate::module::gomod;
use crate::module::pseudo::{parse_pseudo_version, pseudo_version};
use crate::module::request::{ModuleRequest, RequestKind};
use crate::storage::{BranchName, CommitInfo, GitRepository};

/// The `.info` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct RevInfo {
    pub version: String,
    pub time: DateTime<Utc>,
}

impl RevInfo {
    /// JSON with tab indentation and a trailing newline.
    pub fn to_json(&self) -> ModuleResult<Vec<u8>> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        self.serialize(&mut serializer)
            .map_err(|e| ModuleError::Internal(format!("encoding info: {}", e)))?;
        out.push(b'\n');
        Ok(out)
    }
}

/// Serves repository roots through the module proxy protocol.
pub struct ModuleProxy {
    index: Arc<CodeIndex>,
}

impl ModuleProxy {
    pub fn new(index: Arc<CodeIndex>) -> Self {
        Self { index }
    }

    /// Pseudo-versions of every commit on `master`, oldest first.
    pub fn list(&self, module: &str) -> ModuleResult<Vec<String>> {
        let repo = self.open_module(module)?;
        let Some(tip) = repo.resolve_branch(&BranchName::master())? else {
            return Ok(Vec::new());
        };

        let mut versions = repo
            .history(tip)?
            .map(|commit| commit.map(|c| pseudo_version(c.committer_time, &c.id.to_hex())))
            .collect::<Result<Vec<_>, _>>()?;
        versions.reverse();
        Ok(versions)
    }

    pub fn info(&self, module: &str, version: &str) -> ModuleResult<RevInfo> {
        let repo = self.open_module(module)?;
        let commit = resolve_version(&repo, version)?;
        Ok(RevInfo {
            version: version.to_string(),
            time: commit.committer_time,
        })
    }

    /// The module's go.mod at `version`, synthesized when the tree has none.
    pub fn go_mod(&self, module: &str, version: &str) -> ModuleResult<Vec<u8>> {
        let repo = self.open_module(module)?;
        let commit = resolve_version(&repo, version)?;
        let tree = repo.tree_at(commit.id)?;
        match tree.read_file("go.mod")? {
            Some(contents) => Ok(contents),
            None => Ok(gomod::synthesize(module).into_bytes()),
        }
    }

    pub fn zip(&self, module: &str, version: &str) -> ModuleResult<Vec<u8>> {
        let repo = self.open_module(module)?;
        let commit = resolve_version(&repo, version)?;
        let tree = repo.tree_at(commit.id)?;
        build_module_zip(&tree, module, version)
    }

    /// Answer a request whose path has the mount prefix already stripped.
    pub async fn serve(self: Arc<Self>, method: &Method, path: &str) -> Response {
        if method != Method::GET && method != Method::HEAD {
            return ModuleError::MethodNotAllowed.into_response();
        }
        let request = match ModuleRequest::parse(path) {
            Ok(request) => request,
            Err(e) => {
                debug!(path, error = %e, "unresolvable module proxy path");
                return e.into_response();
            }
        };

        let proxy = Arc::clone(&self);
        let result = tokio::task::spawn_blocking(move || proxy.respond(&request))
            .await
            .unwrap_or_else(|e| Err(ModuleError::Internal(format!("module proxy task failed: {}", e))));

        match result {
            Ok(response) => response,
            Err(e) => {
                debug!(path, error = %e, "module proxy request rejected");
                e.into_response()
            }
        }
    }

    fn respond(&self, request: &ModuleRequest) -> ModuleResult<Response> {
        let module = request.module.as_str();
        let version = request.version.as_str();
        let (content_type, body) = match request.kind {
            RequestKind::List => {
                let body: String = self.list(module)?.into_iter().map(|v| v + "\n").collect();
                ("text/plain; charset=utf-8", body.into_bytes())
            }
            RequestKind::Info => ("application/json", self.info(module, version)?.to_json()?),
            RequestKind::Mod => ("text/plain; charset=utf-8", self.go_mod(module, version)?),
            RequestKind::Zip => ("application/zip", self.zip(module, version)?),
        };
        Ok((StatusCode::OK, [(header::CONTENT_TYPE, content_type)], Body::from(body)).into_response())
    }

    fn open_module(&self, module: &str) -> ModuleResult<GitRepository> {
        let RepoInfo { dir, .. } = self
            .index
            .repo_for_import_path(module)
            .ok_or_else(|| ModuleError::NotFound(format!("no module {}", module)))?;
        Ok(GitRepository::open(dir)?)
    }
}

/// Resolve a pseudo-version to the one commit it names.
fn resolve_version(repo: &GitRepository, version: &str) -> ModuleResult<CommitInfo> {
    let not_found = |reason: &str| ModuleError::NotFound(format!("version {}: {}", version, reason));

    let (time, short) = parse_pseudo_version(version).map_err(|e| ModuleError::NotFound(e.to_string()))?;
    let commit = repo.find_commit_by_prefix(&short)?;
    if commit.committer_time != time {
        return Err(not_found("timestamp does not match commit"));
    }

    let tip = repo
        .resolve_branch(&BranchName::master())?
        .ok_or_else(|| not_found("no master branch"))?;
    if !repo.is_ancestor_or_equal(commit.id, tip)? {
        return Err(not_found("commit is not on master"));
    }
    Ok(commit)
}
