//! Console surface.
//!
//! Stands in for a chat platform: each stdin line is a message in one
//! channel, and every [`SessionEvent`] is printed to stdout. A single task
//! owns stdout so output from different sessions never interleaves
//! mid-block.

pub mod render;

use std::pin::pin;

use futures_util::future::join_all;
use futures_util::StreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::driver::SessionEvent;
use crate::orchestrator::{Dispatch, Dispatcher};
use crate::terminal::codec::StreamCodec;
use crate::Result;

pub use render::{render_dispatch, render_event, split_output};

/// Console loop settings.
#[derive(Debug, Clone)]
pub struct ConsoleOptions {
    /// Channel every stdin line is sent to.
    pub channel_id: String,
    /// Maximum characters per output block.
    pub max_output_length: usize,
}

/// Feed stdin to `dispatcher` and print `events` until stdin closes and
/// every started session has settled, or until `cancel` fires.
///
/// # Errors
///
/// Returns `AppError::Io` if stdout cannot be written.
pub async fn run(
    dispatcher: Dispatcher,
    mut events: mpsc::Receiver<SessionEvent>,
    options: ConsoleOptions,
    cancel: CancellationToken,
) -> Result<()> {
    let mut out = tokio::io::stdout();
    let mut input = FramedRead::new(tokio::io::stdin(), StreamCodec::new());
    let mut sessions: Vec<JoinHandle<()>> = Vec::new();

    write_block(
        &mut out,
        &format!(
            "[{}] ready. Type a message, or `!help` for commands.",
            options.channel_id
        ),
    )
    .await?;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            Some(event) = events.recv() => print_event(&mut out, &event, &options).await?,
            line = input.next() => {
                let Some(line) = line else {
                    info!("stdin closed; waiting for running sessions");
                    break;
                };
                let line = match line {
                    Ok(line) => line,
                    Err(err) => {
                        error!(%err, "failed to read stdin");
                        break;
                    }
                };
                if let Some(reply) = dispatch(&dispatcher, &options.channel_id, &line, &mut sessions).await {
                    write_block(&mut out, &reply).await?;
                }
            }
        }
    }

    let mut settled = pin!(join_all(sessions));
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            Some(event) = events.recv() => print_event(&mut out, &event, &options).await?,
            _ = &mut settled => break,
        }
    }
    while let Ok(event) = events.try_recv() {
        print_event(&mut out, &event, &options).await?;
    }
    Ok(())
}

async fn dispatch(
    dispatcher: &Dispatcher,
    channel_id: &str,
    line: &str,
    sessions: &mut Vec<JoinHandle<()>>,
) -> Option<String> {
    let dispatch = match dispatcher.handle_message(channel_id, line).await {
        Ok(dispatch) => dispatch,
        Err(err) => {
            error!(%err, "message dispatch failed");
            return Some(format!("[{channel_id}] error: {err}"));
        }
    };
    let notice = render_dispatch(channel_id, &dispatch);
    match dispatch {
        Dispatch::Answered { request_id } => {
            debug!(%request_id, "decision answered from console");
        }
        Dispatch::Started(handle) => {
            sessions.retain(|session| !session.is_finished());
            sessions.push(handle);
        }
        Dispatch::Reply(_) | Dispatch::Unbound | Dispatch::Ignored => {}
    }
    notice
}

async fn print_event<W>(out: &mut W, event: &SessionEvent, options: &ConsoleOptions) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    for block in render_event(event, options.max_output_length) {
        write_block(out, &block).await?;
    }
    Ok(())
}

async fn write_block<W>(out: &mut W, block: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(block.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}
