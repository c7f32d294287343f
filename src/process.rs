//! Per-iteration execution of the external agent command.
//!
//! [`ProcessExecutor`] spawns the configured command, feeds it the prompt on
//! stdin and captures stdout and stderr into one bounded buffer. The call
//! waits on three things at once and returns on the first:
//!
//! ```text
//!            ┌── child exits ──────────► exit code, output
//! execute ───┼── timeout elapses ──────► terminate, Timeout
//!            └── cancellation fires ───► terminate, Interrupted
//! ```
//!
//! Nothing is returned as `Err`. Every failure mode is encoded in
//! [`ExecutionResult::error`] so the loop can switch on it explicitly.

pub mod buffer;
pub mod terminate;

pub use buffer::TailBuffer;
pub use terminate::{terminate, Termination};

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// How long to keep draining pipes after the child is gone. A grandchild
/// that inherited stdout can otherwise hold the pipe open indefinitely.
const IO_CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8 * 1024;

/// Default wait after the graceful stop request.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Default wait after the forced kill.
pub const DEFAULT_KILL_CONFIRM: Duration = Duration::from_secs(1);

/// Why an execution did not produce a natural exit.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// The command string was empty or could not be split.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The iteration timeout elapsed.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Cancellation fired while the child was running.
    #[error("interrupted")]
    Interrupted,

    /// The process could not be started.
    #[error("failed to start agent: {0}")]
    Spawn(String),

    /// Completion of the process could not be observed.
    #[error("failed waiting for agent: {0}")]
    Wait(String),
}

/// One iteration's invocation parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub command: String,
    pub prompt: String,
    pub timeout_secs: Option<u64>,
    pub max_output_bytes: usize,
    pub echo: bool,
}

impl ExecutionRequest {
    /// Create a request with no timeout, a 10 MiB buffer and no echo.
    #[must_use]
    pub fn new(command: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            prompt: prompt.into(),
            timeout_secs: None,
            max_output_bytes: 10 * 1024 * 1024,
            echo: false,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, secs: Option<u64>) -> Self {
        self.timeout_secs = secs;
        self
    }

    #[must_use]
    pub fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Mirror captured output to stdout as it arrives.
    #[must_use]
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }
}

/// Outcome of a single execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    /// Combined stdout and stderr, trailing bytes only when truncated.
    pub output: Vec<u8>,
    /// Exit code on natural exit; `-1` otherwise.
    pub exit_code: i32,
    pub duration: Duration,
    /// Whether the oldest output was dropped to stay within the limit.
    pub truncated: bool,
    pub error: Option<ExecutionError>,
}

impl ExecutionResult {
    /// A natural exit with the given code and output.
    #[must_use]
    pub fn exited(exit_code: i32, output: impl Into<Vec<u8>>, duration: Duration) -> Self {
        Self {
            output: output.into(),
            exit_code,
            duration,
            truncated: false,
            error: None,
        }
    }

    /// A result carrying only an error.
    #[must_use]
    pub fn failed(error: ExecutionError, duration: Duration) -> Self {
        Self {
            output: Vec::new(),
            exit_code: -1,
            duration,
            truncated: false,
            error: Some(error),
        }
    }

    /// Output decoded lossily as UTF-8.
    #[must_use]
    pub fn output_text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

/// Runs one agent invocation.
///
/// The loop controller depends on this seam rather than on
/// [`ProcessExecutor`], so iteration logic can be tested with a scripted
/// runner.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Execute `request`, honouring `cancel`. Never fails; errors are
    /// reported in the result.
    async fn execute(&self, request: &ExecutionRequest, cancel: &CancellationToken)
        -> ExecutionResult;
}

/// Spawns real OS processes.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    working_dir: Option<PathBuf>,
    grace_period: Duration,
    kill_confirm: Duration,
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            working_dir: None,
            grace_period: DEFAULT_GRACE_PERIOD,
            kill_confirm: DEFAULT_KILL_CONFIRM,
        }
    }

    /// Run the agent in `dir` instead of the current directory.
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set how long to wait after the graceful stop request.
    #[must_use]
    pub fn with_grace_period(mut self, grace: Duration) -> Self {
        self.grace_period = grace;
        self
    }

    /// Set how long to wait after the forced kill.
    #[must_use]
    pub fn with_kill_confirm(mut self, confirm: Duration) -> Self {
        self.kill_confirm = confirm;
        self
    }

    fn build_command(&self, argv: &[String]) -> Command {
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);
        cmd
    }
}

enum Waited {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut,
}

#[async_trait]
impl AgentRunner for ProcessExecutor {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let argv = match shell_words::split(&request.command) {
            Ok(argv) if !argv.is_empty() => argv,
            Ok(_) => {
                return ExecutionResult::failed(
                    ExecutionError::InvalidCommand("command is empty".to_string()),
                    Duration::ZERO,
                )
            }
            Err(e) => {
                return ExecutionResult::failed(
                    ExecutionError::InvalidCommand(format!("{}: {}", request.command, e)),
                    Duration::ZERO,
                )
            }
        };

        if cancel.is_cancelled() {
            debug!("cancelled before spawn");
            return ExecutionResult::failed(ExecutionError::Interrupted, Duration::ZERO);
        }

        let started = Instant::now();
        debug!(program = %argv[0], args = argv.len() - 1, "spawning agent");

        let mut child = match self.build_command(&argv).spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionResult::failed(
                    ExecutionError::Spawn(format!("{}: {}", argv[0], e)),
                    started.elapsed(),
                )
            }
        };

        let buffer = Arc::new(Mutex::new(TailBuffer::new(request.max_output_bytes)));
        let stdin_task = child
            .stdin
            .take()
            .map(|stdin| tokio::spawn(write_prompt(stdin, request.prompt.clone())));
        let stdout_task = child
            .stdout
            .take()
            .map(|out| tokio::spawn(capture(out, Arc::clone(&buffer), request.echo)));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| tokio::spawn(capture(err, Arc::clone(&buffer), request.echo)));

        // A deadline past the clock's range never fires.
        let deadline = request
            .timeout_secs
            .and_then(|secs| tokio::time::Instant::now().checked_add(Duration::from_secs(secs)));
        let timer = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        let waited = tokio::select! {
            biased;
            status = child.wait() => Waited::Exited(status),
            () = cancel.cancelled() => Waited::Cancelled,
            () = timer => Waited::TimedOut,
        };

        let (exit_code, error) = match waited {
            Waited::Exited(Ok(status)) => (exit_code_of(status), None),
            Waited::Exited(Err(e)) => {
                warn!(error = %e, "lost track of agent process");
                terminate(&mut child, self.grace_period, self.kill_confirm).await;
                (-1, Some(ExecutionError::Wait(e.to_string())))
            }
            Waited::Cancelled => {
                debug!("cancellation requested, stopping agent");
                terminate(&mut child, self.grace_period, self.kill_confirm).await;
                (-1, Some(ExecutionError::Interrupted))
            }
            Waited::TimedOut => {
                let secs = request.timeout_secs.unwrap_or_default();
                debug!(secs, "iteration timeout elapsed, stopping agent");
                terminate(&mut child, self.grace_period, self.kill_confirm).await;
                (-1, Some(ExecutionError::Timeout { secs }))
            }
        };

        join_reader(stdout_task, "stdout").await;
        join_reader(stderr_task, "stderr").await;
        if let Some(task) = stdin_task {
            task.abort();
        }
        let duration = started.elapsed();

        let (output, truncated) = {
            let buf = buffer.lock().unwrap_or_else(PoisonError::into_inner);
            if buf.truncated() {
                debug!(dropped = buf.dropped(), kept = buf.len(), "agent output truncated");
            }
            (buf.to_vec(), buf.truncated())
        };

        ExecutionResult {
            output,
            exit_code,
            duration,
            truncated,
            error,
        }
    }
}

async fn write_prompt(mut stdin: ChildStdin, prompt: String) {
    if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
        if e.kind() != std::io::ErrorKind::BrokenPipe {
            debug!(error = %e, "failed to write prompt to agent stdin");
        }
        return;
    }
    let _ = stdin.shutdown().await;
}

async fn capture<R>(mut reader: R, buffer: Arc<Mutex<TailBuffer>>, echo: bool)
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    let mut echo_to = echo.then(tokio::io::stdout);

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "agent output read failed");
                break;
            }
        };

        buffer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(&chunk[..n]);

        if let Some(out) = echo_to.as_mut() {
            if let Err(e) = echo_chunk(out, &chunk[..n]).await {
                debug!(error = %e, "live echo failed, continuing capture only");
                echo_to = None;
            }
        }
    }
}

async fn echo_chunk(out: &mut tokio::io::Stdout, bytes: &[u8]) -> std::io::Result<()> {
    out.write_all(bytes).await?;
    out.flush().await
}

async fn join_reader(task: Option<JoinHandle<()>>, stream: &'static str) {
    let Some(mut task) = task else {
        return;
    };
    if tokio::time::timeout(IO_CAPTURE_TIMEOUT, &mut task)
        .await
        .is_err()
    {
        debug!(stream, "pipe still open after agent exit, abandoning capture");
        task.abort();
    }
}

#[cfg(unix)]
fn exit_code_of(status: ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;
    status
        .code()
        .or_else(|| status.signal().map(|sig| 128 + sig))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code_of(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}
