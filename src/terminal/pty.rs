//! Terminal-side input for the assistant CLI.
//!
//! On Unix the CLI's stdin is the slave end of a pseudo-terminal allocated
//! with `openpty`, so the CLI believes it is interactive and accepts
//! line-oriented replies. The master end is owned by [`TerminalInput`] and is
//! closed when the value drops, on every exit path. Other platforms fall back
//! to a plain stdin pipe behind the same interface.

use std::time::Duration;

#[cfg(unix)]
use std::fs::File;
#[cfg(unix)]
use std::io::Write;
#[cfg(unix)]
use std::os::fd::OwnedFd;
#[cfg(unix)]
use std::sync::Arc;

#[cfg(not(unix))]
use tokio::io::AsyncWriteExt;
#[cfg(not(unix))]
use tokio::process::ChildStdin;
#[cfg(unix)]
use tracing::debug;

use crate::{AppError, Result};

/// Writable terminal end connected to the child's stdin.
#[derive(Debug)]
pub enum TerminalInput {
    /// Master side of a pseudo-terminal; the child holds the slave.
    #[cfg(unix)]
    Pty(Arc<File>),
    /// Plain pipe used where pseudo-terminals are unavailable.
    #[cfg(not(unix))]
    Pipe(ChildStdin),
}

impl TerminalInput {
    /// Write `text` followed by a newline and flush it.
    ///
    /// # Errors
    ///
    /// - [`AppError::WriteTimeout`] if the write does not finish within `deadline`.
    /// - [`AppError::Io`] if the terminal rejects the write (e.g. the child exited).
    pub async fn write_line(&mut self, text: &str, deadline: Duration) -> Result<()> {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(b'\n');

        match self {
            #[cfg(unix)]
            Self::Pty(master) => {
                // Pty writes are blocking; keep them off the async workers.
                let master = Arc::clone(master);
                let task = tokio::task::spawn_blocking(move || -> std::io::Result<()> {
                    let mut writer: &File = master.as_ref();
                    writer.write_all(&bytes)?;
                    writer.flush()
                });

                match tokio::time::timeout(deadline, task).await {
                    Ok(Ok(result)) => result.map_err(AppError::from),
                    Ok(Err(err)) => Err(AppError::Io(format!("terminal write task failed: {err}"))),
                    Err(_elapsed) => Err(AppError::WriteTimeout(deadline)),
                }
            }
            #[cfg(not(unix))]
            Self::Pipe(stdin) => {
                let write = async {
                    stdin.write_all(&bytes).await?;
                    stdin.flush().await
                };
                match tokio::time::timeout(deadline, write).await {
                    Ok(result) => result.map_err(AppError::from),
                    Err(_elapsed) => Err(AppError::WriteTimeout(deadline)),
                }
            }
        }
    }
}

/// Allocate a pseudo-terminal pair.
///
/// Returns the master wrapped as [`TerminalInput`] and the slave descriptor to
/// be installed as the child's stdin. The caller must drop its copy of the
/// slave once the child has been spawned.
///
/// # Errors
///
/// Returns [`AppError::ProcessSpawn`] if the OS refuses to allocate a pty.
#[cfg(unix)]
pub fn open() -> Result<(TerminalInput, OwnedFd)> {
    use nix::pty::{openpty, Winsize};
    use nix::sys::termios::Termios;

    let pair = openpty(None::<&Winsize>, None::<&Termios>)
        .map_err(|err| AppError::ProcessSpawn(format!("failed to allocate pty: {err}")))?;

    disable_echo(&pair.slave);

    Ok((TerminalInput::Pty(Arc::new(File::from(pair.master))), pair.slave))
}

/// Replies written by the driver should not bounce back through the master.
#[cfg(unix)]
fn disable_echo(slave: &OwnedFd) {
    use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg};

    match tcgetattr(slave) {
        Ok(mut attrs) => {
            attrs.local_flags.remove(LocalFlags::ECHO);
            if let Err(err) = tcsetattr(slave, SetArg::TCSANOW, &attrs) {
                debug!(%err, "failed to disable pty echo");
            }
        }
        Err(err) => debug!(%err, "failed to read pty attributes"),
    }
}
