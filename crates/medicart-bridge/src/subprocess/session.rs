//! Device tool process session.
//!
//! A `ProcessSession` owns one invocation of the device tool: the child
//! process, its stdout line reader and its cancellation token. Lines are
//! pulled with [`ProcessSession::next_line`] until it returns `None`, then
//! [`ProcessSession::wait`] reaps the child and reports how it ended.
//!
//! ```text
//! Running -> Draining -> Exited
//! ```
//!
//! Cancellation is honoured in every state before `Exited`: a tool that has
//! closed stdout but keeps running is still killed once the session is
//! cancelled during `wait`.

use std::fmt;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use medicart_core::DeviceKind;

use super::launcher::DeviceTool;

/// Longest accepted output line, terminator excluded.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Lifecycle of a process session. A session only exists once its child has
/// been spawned, so it starts out `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Child is running and lines are being read.
    Running,
    /// Output is finished or cancelled; the child has not been reaped yet.
    Draining,
    /// Child has been reaped.
    Exited,
}

/// How a session's process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// Exited with status 0 on its own.
    Success,
    /// Terminated because the session was cancelled.
    Cancelled,
    /// Exited on its own with a non-zero status (`None` if killed by a signal).
    Failed { code: Option<i32> },
    /// The exit status could not be collected.
    WaitFailed { reason: String },
}

impl ExitOutcome {
    /// Whether this outcome should be reported as an error.
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Failed { .. } | Self::WaitFailed { .. })
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => f.write_str("exited successfully"),
            Self::Cancelled => f.write_str("stopped by cancellation"),
            Self::Failed { code: Some(code) } => write!(f, "exited with status {code}"),
            Self::Failed { code: None } => f.write_str("terminated by signal"),
            Self::WaitFailed { reason } => write!(f, "wait failed: {reason}"),
        }
    }
}

/// Cloneable handle that cancels a session from any task.
///
/// Cancelling is idempotent and safe after the process has already exited.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the session has been cancelled.
    pub async fn cancelled(&self) {
        self.token.cancelled().await;
    }
}

/// Errors from launching the device tool.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Failed to attach to stdout of {program}")]
    StreamUnavailable { program: String },
}

/// One running invocation of the device tool.
#[derive(Debug)]
pub struct ProcessSession {
    id: String,
    kind: DeviceKind,
    pid: Option<u32>,
    child: Child,
    stdout: BufReader<ChildStdout>,
    cancel: CancellationToken,
    state: SessionState,
}

impl ProcessSession {
    /// Launch `tool` in `kind` mode with a fresh cancellation token.
    pub fn start(tool: &DeviceTool, kind: DeviceKind) -> Result<Self, LaunchError> {
        Self::start_with_cancel(tool, kind, CancellationToken::new())
    }

    /// Launch `tool` in `kind` mode, cancelled through `cancel`.
    pub fn start_with_cancel(
        tool: &DeviceTool,
        kind: DeviceKind,
        cancel: CancellationToken,
    ) -> Result<Self, LaunchError> {
        let program = tool.resolve();
        let args = tool.args_for(kind);
        info!(
            program = %program.display(),
            ?args,
            kind = kind.label(),
            "Starting device tool"
        );
        Self::spawn(&program, &args, kind, cancel)
    }

    /// Spawn `program` with `args` and attach to its stdout.
    pub fn spawn(
        program: &Path,
        args: &[String],
        kind: DeviceKind,
        cancel: CancellationToken,
    ) -> Result<Self, LaunchError> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| LaunchError::SpawnFailed {
            program: program.display().to_string(),
            reason: e.to_string(),
        })?;

        // `child` is kill-on-drop, so bailing out here does not leak it.
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| LaunchError::StreamUnavailable {
                program: program.display().to_string(),
            })?;

        let id = uuid::Uuid::new_v4().to_string();
        let pid = child.id();

        if let Some(stderr) = child.stderr.take() {
            let sid = id.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    warn!(session_id = %sid, "stderr: {}", line);
                }
                debug!(session_id = %sid, "stderr reader finished");
            });
        }

        debug!(session_id = %id, ?pid, "Device tool spawned");

        Ok(Self {
            id,
            kind,
            pid,
            child,
            stdout: BufReader::new(stdout),
            cancel,
            state: SessionState::Running,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn kind(&self) -> DeviceKind {
        self.kind
    }

    pub const fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub const fn state(&self) -> SessionState {
        self.state
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            token: self.cancel.clone(),
        }
    }

    /// Read the next line of output, without its line terminator.
    ///
    /// Returns `None` at end of output, on a read error, or as soon as the
    /// session is cancelled, and keeps returning `None` afterwards. Invalid
    /// UTF-8 is replaced rather than treated as an error. A line longer than
    /// [`MAX_LINE_BYTES`] ends the stream and the child is killed.
    pub async fn next_line(&mut self) -> Option<String> {
        if self.state != SessionState::Running {
            return None;
        }

        let mut buf = Vec::new();
        // One extra byte leaves room for the `\n` of a line at the limit.
        let mut limited = (&mut self.stdout).take(MAX_LINE_BYTES as u64 + 1);
        let read = tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            result = limited.read_until(b'\n', &mut buf) => match result {
                Ok(0) => None,
                Ok(_) => Some(buf),
                Err(e) => {
                    warn!(session_id = %self.id, error = %e, "Failed to read device tool output");
                    None
                }
            },
        };

        match read {
            Some(bytes) if bytes.len() > MAX_LINE_BYTES && bytes.last() != Some(&b'\n') => {
                warn!(
                    session_id = %self.id,
                    limit = MAX_LINE_BYTES,
                    "Device tool line too long, stopping"
                );
                self.begin_draining();
                self.kill();
                None
            }
            Some(mut bytes) => {
                strip_line_terminator(&mut bytes);
                Some(String::from_utf8_lossy(&bytes).into_owned())
            }
            None => {
                self.begin_draining();
                None
            }
        }
    }

    fn begin_draining(&mut self) {
        self.state = SessionState::Draining;
        if self.cancel.is_cancelled() {
            self.kill();
        }
    }

    fn kill(&mut self) {
        // Fails only if the child was already reaped, which is fine.
        if let Err(e) = self.child.start_kill() {
            debug!(session_id = %self.id, error = %e, "Kill skipped");
        } else {
            debug!(session_id = %self.id, pid = ?self.pid, "Kill signal sent");
        }
    }

    /// Reap the child and classify how it ended.
    ///
    /// Consumes the session. If cancellation is requested before the child
    /// exits, including while already waiting, the child is killed and the
    /// outcome is `Cancelled` regardless of status.
    pub async fn wait(mut self) -> ExitOutcome {
        if self.state == SessionState::Running {
            self.state = SessionState::Draining;
        }

        let status = tokio::select! {
            biased;
            () = self.cancel.cancelled() => {
                self.kill();
                self.child.wait().await
            }
            status = self.child.wait() => status,
        };
        self.state = SessionState::Exited;

        let outcome = match status {
            Ok(_) if self.cancel.is_cancelled() => ExitOutcome::Cancelled,
            Ok(status) if status.success() => ExitOutcome::Success,
            Ok(status) => ExitOutcome::Failed {
                code: status.code(),
            },
            Err(e) => ExitOutcome::WaitFailed {
                reason: e.to_string(),
            },
        };
        debug!(session_id = %self.id, %outcome, "Device tool reaped");
        outcome
    }
}

fn strip_line_terminator(bytes: &mut Vec<u8>) {
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
        if bytes.last() == Some(&b'\r') {
            bytes.pop();
        }
    }
}
