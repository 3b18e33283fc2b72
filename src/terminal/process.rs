//! Assistant CLI process handle.
//!
//! [`PtyProcess`] owns exactly one child process whose stdin is a
//! pseudo-terminal and whose stdout/stderr are pipes. It offers line reads
//! from stdout, line writes to the terminal, a forceful kill and an exit
//! wait. Everything the handle acquired (pty master, pipes, the child itself)
//! is released when it drops, including on early-return and panic paths.
//!
//! On Unix the child runs in its own process group and [`PtyProcess::kill`]
//! signals the whole group, so helper processes that inherited stdout cannot
//! keep the stream open after the CLI is gone.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tracing::{debug, info};

use crate::terminal::codec::StreamCodec;
use crate::terminal::pty::{self, TerminalInput};
use crate::{AppError, Result};

/// Upper bound for a single terminal write.
pub const WRITE_DEADLINE: Duration = Duration::from_secs(5);

/// How long to wait for buffered stderr once the child has exited.
const STDERR_GRACE: Duration = Duration::from_secs(2);

/// What to launch and where.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// Executable name or path.
    pub program: String,
    /// Full argument list.
    pub args: Vec<String>,
    /// Working directory; must exist.
    pub working_dir: PathBuf,
}

/// One live assistant CLI process bound to a pseudo-terminal.
#[derive(Debug)]
pub struct PtyProcess {
    child: Child,
    pid: Option<u32>,
    stdout: FramedRead<ChildStdout, StreamCodec>,
    stderr: Option<JoinHandle<String>>,
    input: Option<TerminalInput>,
    exit: Option<ExitStatus>,
    killed: bool,
}

impl PtyProcess {
    /// Launch the CLI described by `spec`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`AppError::DirectoryNotFound`] if `spec.working_dir` is not a directory.
    /// - [`AppError::ProcessSpawn`] if the executable is missing, a pty cannot
    ///   be allocated, or the OS refuses to spawn.
    pub fn spawn(spec: &SpawnSpec) -> Result<Self> {
        if !spec.working_dir.is_dir() {
            return Err(AppError::DirectoryNotFound(
                spec.working_dir.display().to_string(),
            ));
        }

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        let input = {
            cmd.process_group(0);
            let (input, slave) = pty::open()?;
            cmd.stdin(Stdio::from(slave));
            input
        };
        #[cfg(not(unix))]
        cmd.stdin(Stdio::piped());

        let spawned = cmd.spawn();
        // The command holds the parent's copy of the pty slave.
        drop(cmd);

        let mut child = spawned.map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => {
                AppError::ProcessSpawn(format!("{}: executable not found", spec.program))
            }
            _ => AppError::ProcessSpawn(format!("{}: {err}", spec.program)),
        })?;

        #[cfg(not(unix))]
        let input = TerminalInput::Pipe(
            child
                .stdin
                .take()
                .ok_or_else(|| AppError::ProcessSpawn("failed to capture CLI stdin".into()))?,
        );

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AppError::ProcessSpawn("failed to capture CLI stdout".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AppError::ProcessSpawn("failed to capture CLI stderr".into()))?;

        let pid = child.id();
        info!(pid, program = %spec.program, "assistant CLI spawned");

        Ok(Self {
            child,
            pid,
            stdout: FramedRead::new(stdout, StreamCodec::new()),
            stderr: Some(tokio::spawn(drain_stderr(stderr))),
            input: Some(input),
            exit: None,
            killed: false,
        })
    }

    /// OS process id, if the child has not been reaped yet.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether [`kill`](Self::kill) has been called.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.killed
    }

    /// Read the next stdout line.
    ///
    /// Returns `Ok(None)` once stdout is closed. Callers bound the wait with
    /// their own deadline.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if reading the pipe fails.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        self.stdout.next().await.transpose()
    }

    /// Write one line to the terminal and flush it.
    ///
    /// # Errors
    ///
    /// - [`AppError::Io`] if the terminal is closed or rejects the write.
    /// - [`AppError::WriteTimeout`] if the write stalls past [`WRITE_DEADLINE`].
    pub async fn write_line(&mut self, text: &str) -> Result<()> {
        let Some(input) = self.input.as_mut() else {
            return Err(AppError::Io("terminal input already closed".into()));
        };
        input.write_line(text, WRITE_DEADLINE).await
    }

    /// Forcefully terminate the child (and its process group on Unix).
    ///
    /// Idempotent; a no-op once the child has been reaped.
    pub fn kill(&mut self) {
        if self.exit.is_some() || self.killed {
            return;
        }
        self.killed = true;

        #[cfg(unix)]
        if let Some(pgid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            if let Err(err) = killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
                debug!(pgid, %err, "killpg failed; falling back to direct kill");
            }
        }

        if let Err(err) = self.child.start_kill() {
            debug!(pid = self.pid, %err, "start_kill failed; child already gone");
        }
    }

    /// Reap the child and return its exit status.
    ///
    /// Closes the terminal input once the child is gone. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if waiting on the child fails.
    pub async fn wait(&mut self) -> Result<ExitStatus> {
        if let Some(status) = self.exit {
            return Ok(status);
        }
        let status = self.child.wait().await?;
        self.exit = Some(status);
        self.input = None;
        debug!(pid = self.pid, ?status, "assistant CLI reaped");
        Ok(status)
    }

    /// Everything the child wrote to stderr.
    ///
    /// Meant to be called after [`wait`](Self::wait); returns an empty string
    /// if the output is not available within a short grace period or was
    /// already collected.
    pub async fn stderr_output(&mut self) -> String {
        let Some(handle) = self.stderr.take() else {
            return String::new();
        };
        match tokio::time::timeout(STDERR_GRACE, handle).await {
            Ok(Ok(text)) => text,
            Ok(Err(err)) => {
                debug!(%err, "stderr drain task failed");
                String::new()
            }
            Err(_elapsed) => {
                debug!(pid = self.pid, "stderr still open after exit; ignoring");
                String::new()
            }
        }
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        if self.exit.is_none() {
            self.kill();
        }
        if let Some(handle) = self.stderr.take() {
            handle.abort();
        }
    }
}

/// Collect stderr in the background so a chatty child never blocks on a full pipe.
async fn drain_stderr(mut stderr: ChildStderr) -> String {
    let mut buf = Vec::new();
    if let Err(err) = stderr.read_to_end(&mut buf).await {
        debug!(%err, "stderr read failed");
    }
    String::from_utf8_lossy(&buf).into_owned()
}
