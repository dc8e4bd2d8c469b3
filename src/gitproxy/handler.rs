//! Smart HTTP routing.
//!
//! ```text
//!   GET  <repo>/info/refs?service=git-upload-pack    advertise refs
//!   GET  <repo>/info/refs?service=git-receive-pack   advertise refs (admin)
//!   POST <repo>/git-upload-pack                      fetch negotiation
//!   POST <repo>/git-receive-pack                     push (admin)
//! ```
//!
//! Anything else, or a repository the index does not know, is left to the
//! caller.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderValue, Method, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use chrono::Utc;
use flate2::write::GzDecoder;
use futures::stream::{self, StreamExt};
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tracing::{debug, info, warn};

use crate::gitproxy::auth::{Authenticator, User};
use crate::gitproxy::command::{Completion, PackCommand, PackOutput, DEFAULT_MAX_BUFFERED_OUTPUT};
use crate::gitproxy::error::GitHttpError;
use crate::gitproxy::events::{payload_for, Event, EventLog, RefUpdate};
use crate::gitproxy::receive::{ReportStatus, UpdateRequest};
use crate::gitproxy::service::Service;
use crate::index::{CodeIndex, RepoInfo};
use crate::storage::GitRepository;

/// Leading bytes of a receive-pack body kept for reading the ref update commands.
const MAX_COMMAND_SECTION_BYTES: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    InfoRefs,
    Rpc(Service),
}

/// Split `<repo>/<suffix>` into the repository URL path and the route.
fn split_route(path: &str) -> Option<(&str, Route)> {
    if let Some(repo) = path.strip_suffix("/info/refs") {
        return Some((repo, Route::InfoRefs));
    }
    if let Some(repo) = path.strip_suffix("/git-upload-pack") {
        return Some((repo, Route::Rpc(Service::UploadPack)));
    }
    if let Some(repo) = path.strip_suffix("/git-receive-pack") {
        return Some((repo, Route::Rpc(Service::ReceivePack)));
    }
    None
}

fn query_service(query: Option<&str>) -> Option<Service> {
    query?
        .split('&')
        .find_map(|pair| pair.strip_prefix("service="))
        .and_then(Service::from_name)
}

pub struct GitProxy {
    index: Arc<CodeIndex>,
    auth: Arc<dyn Authenticator>,
    events: Arc<dyn EventLog>,
    upload_pack: PathBuf,
    receive_pack: PathBuf,
    /// `None` means unlimited
    max_request_bytes: Option<usize>,
    max_buffered_output: usize,
}

impl GitProxy {
    pub fn new(index: Arc<CodeIndex>, auth: Arc<dyn Authenticator>, events: Arc<dyn EventLog>) -> Self {
        Self {
            index,
            auth,
            events,
            upload_pack: PathBuf::from(Service::UploadPack.name()),
            receive_pack: PathBuf::from(Service::ReceivePack.name()),
            max_request_bytes: None,
            max_buffered_output: DEFAULT_MAX_BUFFERED_OUTPUT,
        }
    }

    /// Override the pack binaries (names are looked up on `PATH`).
    pub fn with_binaries(mut self, upload_pack: impl Into<PathBuf>, receive_pack: impl Into<PathBuf>) -> Self {
        self.upload_pack = upload_pack.into();
        self.receive_pack = receive_pack.into();
        self
    }

    /// Reject request bodies larger than `max` bytes (after inflating).
    pub fn with_max_request_bytes(mut self, max: usize) -> Self {
        self.max_request_bytes = Some(max);
        self
    }

    /// How much pack output is held back to judge the exit status before
    /// the response is committed.
    pub fn with_max_buffered_output(mut self, max: usize) -> Self {
        self.max_buffered_output = max;
        self
    }

    /// `None` when the request is not a git request for a known repository.
    pub async fn serve(&self, request: Request<Body>) -> Option<Response> {
        let path = request.uri().path().to_string();
        let (repo_path, route) = split_route(&path)?;
        let (service, advertise) = match route {
            Route::InfoRefs => (query_service(request.uri().query())?, true),
            Route::Rpc(service) => (service, false),
        };
        let repo = self.index.resolve_repo(repo_path)?;

        let allowed = if advertise {
            request.method() == Method::GET || request.method() == Method::HEAD
        } else {
            request.method() == Method::POST
        };
        if !allowed {
            return Some(GitHttpError::MethodNotAllowed.into_response());
        }

        let result = if advertise {
            self.advertise(request.headers(), &repo, service).await
        } else {
            self.rpc(request, &repo, service).await
        };
        Some(result.unwrap_or_else(|e| {
            debug!(repo = %repo.spec, %service, error = %e, "git request rejected");
            e.into_response()
        }))
    }

    async fn advertise(&self, headers: &HeaderMap, repo: &RepoInfo, service: Service) -> Result<Response, GitHttpError> {
        if service.requires_auth() {
            self.authorize(headers).await?;
        }
        let output = self
            .command(service, &repo.dir, true)
            .run(Vec::new(), self.max_buffered_output)
            .await?;

        let announcement = service.announcement();
        let body = match output {
            PackOutput::Finished { stdout, completion } => {
                check_completion(service, &completion)?;
                let mut body = announcement;
                body.extend_from_slice(&stdout);
                Body::from(body)
            }
            PackOutput::Streaming(output) => {
                let announcement = stream::once(async move { Ok::<_, std::io::Error>(Bytes::from(announcement)) });
                Body::from_stream(announcement.chain(output.into_stream()))
            }
        };
        Ok(pack_response(service.advertisement_content_type(), body))
    }

    async fn rpc(&self, request: Request<Body>, repo: &RepoInfo, service: Service) -> Result<Response, GitHttpError> {
        let user = if service.requires_auth() {
            Some(self.authorize(request.headers()).await?)
        } else {
            None
        };

        let content_type = request.headers().get(header::CONTENT_TYPE).and_then(|v| v.to_str().ok());
        if content_type != Some(service.request_content_type()) {
            return Err(GitHttpError::BadRequest(format!(
                "expected Content-Type {}",
                service.request_content_type()
            )));
        }

        let mut process = self.command(service, &repo.dir, false).spawn()?;
        let sink = BodySink {
            stdin: process.take_stdin(),
            written: 0,
            limit: self.max_request_bytes,
            captured: Vec::new(),
            capture: match service {
                Service::ReceivePack => MAX_COMMAND_SECTION_BYTES,
                Service::UploadPack => 0,
            },
        };
        let gzipped = is_gzipped(request.headers());
        let feed = tokio::spawn(feed_body(request.into_body(), gzipped, sink));
        process.abort_on_drop(feed.abort_handle());

        match process.output(self.max_buffered_output).await? {
            PackOutput::Finished { stdout, completion } => {
                // request errors take precedence over the exit status
                let commands = feed
                    .await
                    .map_err(|e| GitHttpError::Internal(format!("request body task failed: {}", e)))??;
                check_completion(service, &completion)?;

                if let Some(user) = user {
                    self.post_receive(repo, &user, &commands, &stdout).await;
                }
                Ok(pack_response(service.result_content_type(), Body::from(stdout)))
            }
            PackOutput::Streaming(output) => {
                let output = match user {
                    Some(_) => {
                        let index = Arc::clone(&self.index);
                        let repo_root = repo.spec.clone();
                        output.on_exit(move |completion| {
                            if completion.is_ok() {
                                warn!(repo = %repo_root, "receive-pack output too large to read, skipping push events");
                                tokio::spawn(reindex(index, repo_root));
                            }
                        })
                    }
                    None => output,
                };
                Ok(pack_response(
                    service.result_content_type(),
                    Body::from_stream(output.into_stream()),
                ))
            }
        }
    }

    async fn authorize(&self, headers: &HeaderMap) -> Result<User, GitHttpError> {
        match self.auth.authenticate(headers).await? {
            None => Err(GitHttpError::Unauthorized),
            Some(user) if !user.admin => Err(GitHttpError::Forbidden(user.login)),
            Some(user) => Ok(user),
        }
    }

    fn command(&self, service: Service, dir: &Path, advertise: bool) -> PackCommand {
        let program = match service {
            Service::UploadPack => &self.upload_pack,
            Service::ReceivePack => &self.receive_pack,
        };
        PackCommand::for_service(program, service, dir, advertise)
    }

    /// Refresh the index, then log one event per accepted ref update.
    ///
    /// Nothing here can fail the push. Command sections this proxy cannot
    /// read (signed pushes, for one) only cost the events.
    async fn post_receive(&self, repo: &RepoInfo, user: &User, commands: &[u8], response: &[u8]) {
        reindex(Arc::clone(&self.index), repo.spec.clone()).await;

        let request = match UpdateRequest::parse(commands) {
            Ok(request) => request,
            Err(e) => {
                warn!(repo = %repo.spec, error = %e, "unreadable receive-pack commands, skipping push events");
                return;
            }
        };
        let accepted = accepted_updates(&request, response);
        if accepted.is_empty() {
            return;
        }

        let dir = repo.dir.clone();
        let payloads = tokio::task::spawn_blocking(move || {
            let git = GitRepository::open(&dir)?;
            Ok::<_, crate::storage::StorageError>(
                accepted
                    .into_iter()
                    .map(|update| {
                        let payload = payload_for(&git, &update);
                        (update, payload)
                    })
                    .collect::<Vec<_>>(),
            )
        })
        .await;
        let payloads = match payloads {
            Ok(Ok(payloads)) => payloads,
            Ok(Err(e)) => {
                warn!(repo = %repo.spec, error = %e, "opening repository for push events failed");
                return;
            }
            Err(e) => {
                warn!(repo = %repo.spec, error = %e, "push event task failed");
                return;
            }
        };

        let now = Utc::now();
        for (update, payload) in payloads {
            match payload {
                Ok(Some(payload)) => {
                    if let Err(e) = self.events.log(Event::new(&repo.spec, user, now, payload)).await {
                        warn!(repo = %repo.spec, ref_name = %update.ref_name, error = %e, "logging push event failed");
                    }
                }
                Ok(None) => warn!(
                    repo = %repo.spec,
                    ref_name = %update.ref_name,
                    old = %update.old,
                    new = %update.new,
                    "ignoring unrecognized ref update"
                ),
                Err(e) => warn!(repo = %repo.spec, ref_name = %update.ref_name, error = %e, "building push event failed"),
            }
        }
    }
}

async fn reindex(index: Arc<CodeIndex>, repo_root: String) {
    let spec = repo_root.clone();
    match tokio::task::spawn_blocking(move || index.rediscover(&spec)).await {
        Ok(Ok(_)) => info!(repo = %repo_root, "re-indexed after push"),
        Ok(Err(e)) => warn!(repo = %repo_root, error = %e, "re-indexing after push failed"),
        Err(e) => warn!(repo = %repo_root, error = %e, "re-indexing task failed"),
    }
}

fn check_completion(service: Service, completion: &Completion) -> Result<(), GitHttpError> {
    match completion {
        Completion::Success => Ok(()),
        Completion::Benign(code) => {
            debug!(%service, code, "pack process exited with benign status");
            Ok(())
        }
        Completion::Failed { code, stderr } => Err(GitHttpError::Internal(format!(
            "{} exited with {:?}: {}",
            service, code, stderr
        ))),
    }
}

/// Where request body bytes go: the pack process, and the first `capture`
/// bytes into `captured`.
struct BodySink {
    stdin: Option<ChildStdin>,
    written: usize,
    limit: Option<usize>,
    captured: Vec<u8>,
    capture: usize,
}

impl BodySink {
    async fn write(&mut self, data: &[u8]) -> Result<(), GitHttpError> {
        self.written += data.len();
        if let Some(limit) = self.limit {
            if self.written > limit {
                return Err(GitHttpError::PayloadTooLarge(limit));
            }
        }

        let room = self.capture.saturating_sub(self.captured.len());
        self.captured.extend_from_slice(&data[..room.min(data.len())]);

        if let Some(stdin) = self.stdin.as_mut() {
            // the process may exit without reading all of its input
            if let Err(e) = stdin.write_all(data).await {
                debug!(error = %e, "pack process stopped reading stdin");
                self.stdin = None;
            }
        }
        Ok(())
    }

    fn closed(&self) -> bool {
        self.stdin.is_none()
    }
}

/// Copy the request body into the pack process as it arrives, inflating
/// gzip on the way. Returns the captured leading bytes.
///
/// stdin is closed when this returns.
async fn feed_body(body: Body, gzipped: bool, mut sink: BodySink) -> Result<Vec<u8>, GitHttpError> {
    let invalid_gzip = |e: std::io::Error| GitHttpError::BadRequest(format!("invalid gzip body: {}", e));
    let mut inflater = gzipped.then(|| GzDecoder::new(Vec::new()));
    let mut chunks = body.into_data_stream();

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk.map_err(|e| GitHttpError::BadRequest(format!("reading request body: {}", e)))?;
        match inflater.as_mut() {
            Some(inflater) => {
                inflater.write_all(&chunk).map_err(invalid_gzip)?;
                let inflated = std::mem::take(inflater.get_mut());
                sink.write(&inflated).await?;
            }
            None => sink.write(&chunk).await?,
        }
        if sink.closed() {
            return Ok(sink.captured);
        }
    }

    if let Some(mut inflater) = inflater {
        inflater.try_finish().map_err(invalid_gzip)?;
        let rest = std::mem::take(inflater.get_mut());
        sink.write(&rest).await?;
    }
    Ok(sink.captured)
}

/// Updates receive-pack did not reject.
fn accepted_updates(request: &UpdateRequest, response: &[u8]) -> Vec<RefUpdate> {
    if !request.wants_report() {
        return request.updates.clone();
    }
    match ReportStatus::parse(response, request.uses_sideband()) {
        Ok(status) => request.updates.iter().filter(|u| status.accepted(u)).cloned().collect(),
        Err(e) => {
            warn!(error = %e, "unreadable report-status, skipping push events");
            Vec::new()
        }
    }
}

fn is_gzipped(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("gzip") || v.eq_ignore_ascii_case("x-gzip"))
        .unwrap_or(false)
}

fn pack_response(content_type: &'static str, body: Body) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-cache")),
        ],
        body,
    )
        .into_response()
}
