//! Pack subprocesses.
//!
//! `git-upload-pack` and `git-receive-pack` run in their own process group
//! so the whole group can be killed when the request goes away.
//!
//! Output is held back until the process exits or `buffer_limit` bytes have
//! been read, whichever comes first. A process that finishes within the
//! limit is judged before any response byte is sent, so a benign non-zero
//! exit still answers with everything it wrote and a failure becomes a 500.
//! Past the limit the response is committed and the rest is streamed; a
//! failure then ends the stream with an error.

use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use bytes::Bytes;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use futures::stream::{self, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, ChildStdout, Command};
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error};

use crate::gitproxy::error::CommandError;
use crate::gitproxy::service::Service;

/// Exit code git uses when the remote end hung up (shallow clones trigger it).
pub const HANGUP_EXIT_CODE: i32 = 128;

/// Output held back before a response is committed.
pub const DEFAULT_MAX_BUFFERED_OUTPUT: usize = 1 << 20;

/// stderr kept for the failure message; the rest is drained.
const MAX_STDERR_BYTES: usize = 64 << 10;

const STREAM_CHUNK_BYTES: usize = 32 << 10;

/// How non-zero exits are judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitPolicy {
    /// every non-zero exit is a failure
    Strict,
    /// exit 128 is benign
    AllowHangup,
}

/// How a finished process is judged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Success,
    Benign(i32),
    /// `code` is `None` when the process was killed by a signal
    Failed { code: Option<i32>, stderr: String },
}

impl Completion {
    pub fn is_ok(&self) -> bool {
        !matches!(self, Completion::Failed { .. })
    }
}

/// What a pack process produced by the time a response has to be chosen.
pub enum PackOutput {
    /// the process exited within the buffer limit
    Finished { stdout: Vec<u8>, completion: Completion },
    /// the process is still running and has written more than the limit
    Streaming(PackStream),
}

/// A pack subprocess invocation.
#[derive(Debug, Clone)]
pub struct PackCommand {
    program: PathBuf,
    args: Vec<String>,
    policy: ExitPolicy,
}

impl PackCommand {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            policy: ExitPolicy::Strict,
        }
    }

    /// `<program> --stateless-rpc [--advertise-refs] <repo_dir>`.
    ///
    /// upload-pack tolerates the hangup exit code, receive-pack does not.
    pub fn for_service(program: impl Into<PathBuf>, service: Service, repo_dir: &Path, advertise: bool) -> Self {
        let mut args = vec!["--stateless-rpc".to_string()];
        if advertise {
            args.push("--advertise-refs".to_string());
        }
        args.push(repo_dir.to_string_lossy().into_owned());

        let policy = match service {
            Service::UploadPack => ExitPolicy::AllowHangup,
            Service::ReceivePack => ExitPolicy::Strict,
        };
        Self::new(program, args).exit_policy(policy)
    }

    pub fn exit_policy(mut self, policy: ExitPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Start the process in a new process group.
    pub fn spawn(&self) -> Result<PackProcess, CommandError> {
        let program = self.program.to_string_lossy().into_owned();
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.group_spawn().map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                CommandError::NotFound(program.clone())
            } else {
                CommandError::Spawn {
                    program: program.clone(),
                    source,
                }
            }
        })?;

        let stdin = child.inner().stdin.take();
        let stdout = child.inner().stdout.take();
        let stderr = tokio::spawn(read_bounded(child.inner().stderr.take(), MAX_STDERR_BYTES));

        Ok(PackProcess {
            program,
            policy: self.policy,
            child: GroupGuard::new(child),
            stdin,
            stdout,
            stderr,
        })
    }

    /// Spawn, feed `input` on stdin and collect the output.
    pub async fn run(&self, input: Vec<u8>, buffer_limit: usize) -> Result<PackOutput, CommandError> {
        let mut process = self.spawn()?;
        if let Some(mut stdin) = process.take_stdin() {
            let feed = tokio::spawn(async move {
                // the process may exit without reading all of its input
                if let Err(e) = stdin.write_all(&input).await {
                    debug!(error = %e, "pack process stopped reading stdin");
                }
            });
            process.abort_on_drop(feed.abort_handle());
        }
        process.output(buffer_limit).await
    }
}

/// A running pack process. Dropping it kills the process group.
pub struct PackProcess {
    program: String,
    policy: ExitPolicy,
    child: GroupGuard,
    stdin: Option<ChildStdin>,
    stdout: Option<ChildStdout>,
    stderr: JoinHandle<Vec<u8>>,
}

impl PackProcess {
    /// The write end of the process's stdin. Dropping it signals EOF.
    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    /// Abort `task` if the process is killed before it exits.
    pub fn abort_on_drop(&mut self, task: AbortHandle) {
        self.child.helpers.push(task);
    }

    /// Read stdout until the process exits or writes more than `buffer_limit` bytes.
    pub async fn output(mut self, buffer_limit: usize) -> Result<PackOutput, CommandError> {
        let Some(mut stdout) = self.stdout.take() else {
            let completion = self.finish().await?;
            return Ok(PackOutput::Finished {
                stdout: Vec::new(),
                completion,
            });
        };

        let mut head = Vec::new();
        (&mut stdout).take(buffer_limit as u64 + 1).read_to_end(&mut head).await?;
        if head.len() > buffer_limit {
            debug!(program = %self.program, buffered = head.len(), "pack output outgrew the buffer, streaming");
            return Ok(PackOutput::Streaming(PackStream {
                head,
                stdout,
                process: self,
                on_exit: None,
            }));
        }

        let completion = self.finish().await?;
        Ok(PackOutput::Finished { stdout: head, completion })
    }

    async fn finish(&mut self) -> Result<Completion, CommandError> {
        let status = self.child.wait().await?;
        let stderr = (&mut self.stderr).await.unwrap_or_default();
        debug!(program = %self.program, status = ?status.code(), "pack process finished");
        Ok(judge(self.policy, status, &stderr))
    }
}

fn judge(policy: ExitPolicy, status: ExitStatus, stderr: &[u8]) -> Completion {
    match status.code() {
        Some(0) => Completion::Success,
        Some(HANGUP_EXIT_CODE) if policy == ExitPolicy::AllowHangup => Completion::Benign(HANGUP_EXIT_CODE),
        code => Completion::Failed {
            code,
            stderr: String::from_utf8_lossy(stderr).trim().to_string(),
        },
    }
}

type ExitHook = Box<dyn FnOnce(&Completion) + Send>;

/// Output of a pack process that is still running.
pub struct PackStream {
    head: Vec<u8>,
    stdout: ChildStdout,
    process: PackProcess,
    on_exit: Option<ExitHook>,
}

impl PackStream {
    /// Run `hook` with the completion once the process exits.
    pub fn on_exit(mut self, hook: impl FnOnce(&Completion) + Send + 'static) -> Self {
        self.on_exit = Some(Box::new(hook));
        self
    }

    /// Everything the process writes, starting with what was already buffered.
    ///
    /// A failed exit ends the stream with an error. Dropping the stream kills
    /// the process group.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        let PackStream {
            head,
            stdout,
            process,
            on_exit,
        } = self;
        let tail = StreamTail {
            stdout,
            process,
            on_exit,
        };

        let rest = stream::unfold(Some(tail), |state| async move {
            let mut tail = state?;
            let mut buf = vec![0u8; STREAM_CHUNK_BYTES];
            match tail.stdout.read(&mut buf).await {
                Ok(0) => {}
                Ok(n) => {
                    buf.truncate(n);
                    return Some((Ok(Bytes::from(buf)), Some(tail)));
                }
                Err(e) => return Some((Err(e), None)),
            }

            let completion = match tail.process.finish().await {
                Ok(completion) => completion,
                Err(e) => return Some((Err(io::Error::other(e)), None)),
            };
            if let Some(hook) = tail.on_exit.take() {
                hook(&completion);
            }
            match completion {
                Completion::Failed { code, stderr } => {
                    error!(program = %tail.process.program, ?code, %stderr, "pack process failed mid-stream");
                    let message = format!("{} exited with {:?}", tail.process.program, code);
                    Some((Err(io::Error::other(message)), None))
                }
                _ => None,
            }
        });
        stream::once(async move { Ok(Bytes::from(head)) }).chain(rest)
    }
}

struct StreamTail {
    stdout: ChildStdout,
    process: PackProcess,
    on_exit: Option<ExitHook>,
}

/// Keep the first `limit` bytes and drain the rest.
async fn read_bounded<R: AsyncRead + Unpin>(pipe: Option<R>, limit: usize) -> Vec<u8> {
    let mut buf = Vec::new();
    let Some(mut pipe) = pipe else {
        return buf;
    };
    if let Err(e) = (&mut pipe).take(limit as u64).read_to_end(&mut buf).await {
        debug!(error = %e, "reading pack process stderr");
        return buf;
    }
    let _ = tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await;
    buf
}

/// Kills the process group on drop unless the process was waited for.
struct GroupGuard {
    child: AsyncGroupChild,
    reaped: bool,
    /// tasks that only make sense while the process runs
    helpers: Vec<AbortHandle>,
}

impl GroupGuard {
    fn new(child: AsyncGroupChild) -> Self {
        Self {
            child,
            reaped: false,
            helpers: Vec::new(),
        }
    }

    async fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        self.reaped = true;
        Ok(status)
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        if let Err(e) = self.child.start_kill() {
            debug!(error = %e, "failed to kill pack process group");
        }
        for task in &self.helpers {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> PackCommand {
        PackCommand::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    fn finished(output: PackOutput) -> (Vec<u8>, Completion) {
        match output {
            PackOutput::Finished { stdout, completion } => (stdout, completion),
            PackOutput::Streaming(_) => panic!("expected the process to finish within the buffer"),
        }
    }

    #[test]
    fn test_for_service_args() {
        let cmd = PackCommand::for_service("git-upload-pack", Service::UploadPack, Path::new("/srv/r"), true);
        assert_eq!(cmd.args(), ["--stateless-rpc", "--advertise-refs", "/srv/r"]);
        assert_eq!(cmd.policy, ExitPolicy::AllowHangup);

        let cmd = PackCommand::for_service("git-receive-pack", Service::ReceivePack, Path::new("/srv/r"), false);
        assert_eq!(cmd.args(), ["--stateless-rpc", "/srv/r"]);
        assert_eq!(cmd.policy, ExitPolicy::Strict);
    }

    #[tokio::test]
    async fn test_run_pipes_stdin_to_stdout() {
        let input = vec![b'x'; 1 << 20];
        let output = PackCommand::new("cat", Vec::new()).run(input.clone(), 2 << 20).await.unwrap();
        let (stdout, completion) = finished(output);
        assert_eq!(completion, Completion::Success);
        assert_eq!(stdout, input);
    }

    #[tokio::test]
    async fn test_hangup_is_benign_when_allowed() {
        let output = sh("printf partial; exit 128")
            .exit_policy(ExitPolicy::AllowHangup)
            .run(Vec::new(), DEFAULT_MAX_BUFFERED_OUTPUT)
            .await
            .unwrap();
        assert_eq!(finished(output), (b"partial".to_vec(), Completion::Benign(128)));
    }

    #[tokio::test]
    async fn test_hangup_fails_when_strict() {
        let output = sh("echo boom >&2; exit 128")
            .run(Vec::new(), DEFAULT_MAX_BUFFERED_OUTPUT)
            .await
            .unwrap();
        let (_, completion) = finished(output);
        assert_eq!(
            completion,
            Completion::Failed {
                code: Some(128),
                stderr: "boom".to_string()
            }
        );
        assert!(!completion.is_ok());
    }

    #[tokio::test]
    async fn test_process_ignoring_stdin() {
        let output = sh("exit 0").run(vec![b'y'; 1 << 20], DEFAULT_MAX_BUFFERED_OUTPUT).await.unwrap();
        assert_eq!(finished(output).1, Completion::Success);
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let err = PackCommand::new("/nonexistent/git-upload-pack", Vec::new())
            .run(Vec::new(), DEFAULT_MAX_BUFFERED_OUTPUT)
            .await
            .err()
            .unwrap();
        assert!(err.is_not_found());
    }

    async fn collect(stream: PackStream) -> (Vec<u8>, Option<io::Error>) {
        let mut chunks = Box::pin(stream.into_stream());
        let mut out = Vec::new();
        while let Some(chunk) = chunks.next().await {
            match chunk {
                Ok(bytes) => out.extend_from_slice(&bytes),
                Err(e) => return (out, Some(e)),
            }
        }
        (out, None)
    }

    #[tokio::test]
    async fn test_large_output_is_streamed() {
        let output = sh("head -c 100000 /dev/zero; exit 128")
            .exit_policy(ExitPolicy::AllowHangup)
            .run(Vec::new(), 1024)
            .await
            .unwrap();
        let PackOutput::Streaming(stream) = output else {
            panic!("expected a stream");
        };

        let (tx, rx) = std::sync::mpsc::channel();
        let stream = stream.on_exit(move |completion| tx.send(completion.clone()).unwrap());
        let (body, err) = collect(stream).await;
        assert_eq!(body.len(), 100000);
        assert!(err.is_none());
        assert_eq!(rx.recv().unwrap(), Completion::Benign(128));
    }

    #[tokio::test]
    async fn test_streamed_failure_ends_with_error() {
        let output = sh("head -c 5000 /dev/zero; exit 1").run(Vec::new(), 1024).await.unwrap();
        let PackOutput::Streaming(stream) = output else {
            panic!("expected a stream");
        };
        let (body, err) = collect(stream).await;
        assert_eq!(body.len(), 5000);
        assert!(err.is_some());
    }

    /// `true` when `pid` is gone or a zombie waiting to be reaped.
    #[cfg(target_os = "linux")]
    fn is_dead(pid: &str) -> bool {
        match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
            Err(_) => true,
            Ok(stat) => stat
                .rsplit(')')
                .next()
                .and_then(|rest| rest.split_whitespace().next())
                .map(|state| state == "Z" || state == "X")
                .unwrap_or(false),
        }
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropping_run_kills_process_group() {
        let dir = tempfile::TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let cmd = sh(&format!("sleep 30 & echo $! > '{}'; wait", pid_file.display()));

        let result = tokio::time::timeout(Duration::from_millis(300), cmd.run(Vec::new(), 1024)).await;
        assert!(result.is_err(), "the process should still be running");

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let pid = pid.trim();
        let mut dead = false;
        for _ in 0..50 {
            if is_dead(pid) {
                dead = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(dead, "grandchild {} survived", pid);
    }
}
