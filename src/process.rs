use futures::Stream;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::time;
use tracing::{debug, warn};

pub type Input = Box<dyn AsyncWrite + Send + Unpin>;
pub type Output = Box<dyn AsyncRead + Send + Unpin>;

/// The process on the other end of a connection: a line-oriented input, a
/// line-oriented output, and a handle to end it.
pub struct Process {
    input: Input,
    output: Output,
    handle: Handle,
}

impl Process {
    /// Spawns `program` with `arg` as its only argument.
    ///
    /// Standard error is inherited so the child's diagnostics end up next to
    /// ours.
    pub fn spawn(program: &Path, arg: &str) -> io::Result<Self> {
        let mut child = Command::new(program)
            .arg(arg)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        let input = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child stdin not piped"))?;
        let output = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "child stdout not piped"))?;

        Ok(Self {
            input: Box::new(input),
            output: Box::new(output),
            handle: Handle { child: Some(child) },
        })
    }

    /// A process made of plain pipes, with nothing to terminate.
    pub fn from_pipes<I, O>(input: I, output: O) -> Self
    where
        I: AsyncWrite + Send + Unpin + 'static,
        O: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            input: Box::new(input),
            output: Box::new(output),
            handle: Handle { child: None },
        }
    }

    pub fn id(&self) -> Option<u32> {
        self.handle.id()
    }

    pub fn into_parts(self) -> (Input, Output, Handle) {
        (self.input, self.output, self.handle)
    }
}

pub struct Handle {
    child: Option<Child>,
}

impl Handle {
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }

    /// Gives the process `grace` to exit on its own, then asks it to stop
    /// with SIGTERM and gives it `grace` again, then kills it. Returns how it
    /// exited, or `None` if there was nothing left to reap.
    ///
    /// A signal that races with a natural exit is ignored.
    pub async fn terminate(&mut self, grace: Duration) -> Option<ExitStatus> {
        let mut child = self.child.take()?;

        let waited = time::timeout(grace, child.wait()).await;
        let status = match waited {
            Ok(status) => status,
            Err(_) => {
                debug!("process still running, sending SIGTERM");
                signal_terminate(&child);
                let waited = time::timeout(grace, child.wait()).await;
                match waited {
                    Ok(status) => status,
                    Err(_) => {
                        debug!("process ignored SIGTERM, killing it");
                        if let Err(err) = child.start_kill() {
                            debug!(%err, "kill failed");
                        }
                        child.wait().await
                    }
                }
            }
        };

        match status {
            Ok(status) => {
                debug!(%status, "process exited");
                Some(status)
            }
            Err(err) => {
                warn!(%err, "failed to reap process");
                None
            }
        }
    }
}

#[cfg(unix)]
fn signal_terminate(child: &Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = match child.id() {
        Some(pid) => pid,
        None => return,
    };
    if let Err(err) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        debug!(%err, "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn signal_terminate(_child: &Child) {}

/// Writes one line, newline-terminated, and flushes it through.
pub async fn write_line<W>(input: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    input.write_all(line.as_bytes()).await?;
    input.write_all(b"\n").await?;
    input.flush().await
}

/// The lines a process writes, without their terminators.
///
/// Output that is not valid UTF-8 is converted lossily. A last line without a
/// trailing newline is still yielded.
pub fn lines<O>(output: O) -> impl Stream<Item = io::Result<String>>
where
    O: AsyncRead + Unpin,
{
    async_stream::try_stream! {
        let mut reader = BufReader::new(output);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
            }
            yield String::from_utf8_lossy(&buf).into_owned();
        }
    }
}
