//! The upgraded half of a connection: frames from the client become lines
//! on the process input, lines from the process output become text frames.

use crate::frame::codec::Limits;
use crate::frame::Frame;
use crate::process::{self, Input, Output, Process};
use crate::socket::{FrameSender, Socket};
use crate::{Config, Error, Result};
use futures::{pin_mut, StreamExt};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn, Instrument};

const PING_PAYLOAD: &[u8] = b"hb";

/// Lines read from the client but not yet written to the process.
const LINE_BACKLOG: usize = 64;

/// Upper bound on the goodbye: the final close frame and stream shutdown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Why the read loop stopped.
#[derive(Debug)]
enum End {
    /// The client sent a close frame, which was acknowledged.
    Closed,
    /// The client's stream ended.
    Eof,
    /// A background activity asked for teardown.
    Teardown,
}

pub(crate) async fn run<R, W>(
    reader: R,
    sender: FrameSender<W>,
    process: Process,
    config: &Config,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    let (input, output, mut handle) = process.into_parts();
    let teardown = CancellationToken::new();
    let limits = Limits {
        max_payload: config.max_message_size,
        require_mask: !config.allow_unmasked,
    };

    let (lines_tx, lines_rx) = mpsc::channel(LINE_BACKLOG);
    let background = [
        tokio::spawn(
            keep_alive(sender.clone(), config.ping_interval, teardown.clone()).in_current_span(),
        ),
        tokio::spawn(forward_output(output, sender.clone(), teardown.clone()).in_current_span()),
        tokio::spawn(forward_input(lines_rx, input, teardown.clone()).in_current_span()),
    ];

    let mut socket = Socket::new(reader, sender.clone(), limits);
    let end = loop {
        // only the read is raced; a reply being written is never cut short
        let frame = tokio::select! {
            _ = teardown.cancelled() => break Ok(End::Teardown),
            frame = socket.next_frame() => frame,
        };
        let frame = match frame {
            Ok(Some(frame)) => frame,
            Ok(None) if socket.is_closed() => break Ok(End::Closed),
            Ok(None) => break Ok(End::Eof),
            Err(err) => break Err(err),
        };
        match socket.dispatch(frame).await {
            Ok(Some(line)) => {
                if lines_tx.send(line).await.is_err() {
                    break Ok(End::Teardown);
                }
            }
            Ok(None) if socket.is_closed() => break Ok(End::Closed),
            Ok(None) => {}
            Err(err) => break Err(err),
        }
    };
    debug!(?end, "read loop finished");

    teardown.cancel();
    drop(lines_tx);
    let failure = join(background).await;
    handle.terminate(config.kill_grace).await;

    let goodbye = match (&end, &failure) {
        (Ok(End::Teardown), None) => Some(Frame::close(1000, "process exited")),
        (Err(Error::Protocol(reason)), _) => Some(Frame::close(1002, reason)),
        _ => None,
    };
    let finish = async {
        if let Some(frame) = goodbye {
            sender.send(&frame).await?;
        }
        sender.shutdown().await?;
        Ok::<_, Error>(())
    };
    match time::timeout(CLOSE_TIMEOUT, finish).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => debug!(%err, "closing the stream failed"),
        Err(_) => debug!("closing the stream timed out"),
    }

    match end {
        Err(err) => Err(err),
        Ok(_) => failure.map_or(Ok(()), Err),
    }
}

/// Waits for every background activity; returns the first failure.
async fn join(tasks: [JoinHandle<Result<()>>; 3]) -> Option<Error> {
    let mut failure = None;
    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                failure.get_or_insert(err);
            }
            Err(err) => warn!(%err, "background task panicked"),
        }
    }
    failure
}

/// Sends a ping every `period` until teardown.
async fn keep_alive<W>(
    sender: FrameSender<W>,
    period: Duration,
    teardown: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut ticker = time::interval_at(Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = teardown.cancelled() => return Ok(()),
            _ = ticker.tick() => {}
        }

        trace!("keep-alive ping");
        if let Err(err) = sender.send(&Frame::ping(PING_PAYLOAD)).await {
            teardown.cancel();
            return Err(err);
        }
    }
}

/// Sends each line of process output as a text frame. The connection is torn
/// down when this ends, whatever the reason.
async fn forward_output<W>(
    output: Output,
    sender: FrameSender<W>,
    teardown: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let _teardown = teardown.clone().drop_guard();
    let lines = process::lines(output);
    pin_mut!(lines);

    loop {
        let line = tokio::select! {
            _ = teardown.cancelled() => return Ok(()),
            line = lines.next() => line,
        };
        match line {
            Some(Ok(line)) => {
                debug!(%line, "process -> client");
                sender.send(&Frame::text(line)).await?;
            }
            Some(Err(err)) => return Err(Error::Io(err)),
            None => {
                info!("process closed its output");
                return Ok(());
            }
        }
    }
}

/// Writes each decoded client line to the process input.
async fn forward_input(
    mut lines: mpsc::Receiver<String>,
    mut input: Input,
    teardown: CancellationToken,
) -> Result<()> {
    loop {
        let line = tokio::select! {
            _ = teardown.cancelled() => break,
            line = lines.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        debug!(%line, "client -> process");
        let written = tokio::select! {
            _ = teardown.cancelled() => break,
            written = process::write_line(&mut input, &line) => written,
        };
        if let Err(err) = written {
            warn!(%err, "process input closed");
            teardown.cancel();
            break;
        }
    }
    Ok(())
}
