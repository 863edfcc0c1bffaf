use crate::frame::codec::{self, Limits};
use crate::frame::{Frame, Opcode};
use crate::{Error, Result};
use bytes::{Bytes, BytesMut};
use std::mem;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, trace, warn};

mod shared;
pub use shared::FrameSender;

/// Reassembly state of a fragmented message.
#[derive(Debug)]
enum Partial {
    Idle,
    /// A text message whose final fragment has not arrived yet.
    Accumulating(BytesMut),
    /// A fragmented binary message; its continuations are dropped.
    Skipping,
}

/// The read half of an upgraded connection.
///
/// Decodes frames one at a time, answers control frames through the shared
/// [`FrameSender`], and yields each complete text message as a line.
pub struct Socket<R, W> {
    reader: R,
    sender: FrameSender<W>,
    partial: Partial,
    limits: Limits,
    closed: bool,
}

impl<R, W> Socket<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, sender: FrameSender<W>, limits: Limits) -> Self {
        Self {
            reader,
            sender,
            partial: Partial::Idle,
            limits,
            closed: false,
        }
    }

    /// Returns the next complete text message.
    ///
    /// `None` means the connection is over: either the stream ended or a
    /// close frame was received and acknowledged (see [`Socket::is_closed`]).
    pub async fn next_line(&mut self) -> Result<Option<String>> {
        while let Some(frame) = self.next_frame().await? {
            if let Some(line) = self.dispatch(frame).await? {
                return Ok(Some(line));
            }
        }
        Ok(None)
    }

    /// Reads the next frame without acting on it. Returns `None` at the end
    /// of the stream or once a close frame has been handled.
    ///
    /// Only reads, so dropping the future loses input but never leaves a
    /// partial frame on the write side.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.closed {
            return Ok(None);
        }
        let frame = codec::read_frame(&mut self.reader, self.limits).await?;
        if frame.is_none() {
            if let Partial::Accumulating(buf) = &self.partial {
                debug!(buffered = buf.len(), "stream ended inside a fragmented message");
            }
        }
        Ok(frame)
    }

    /// True once a close frame has been received and echoed back.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Applies one frame: control frames are answered, text is reassembled,
    /// and a finished text message is returned.
    ///
    /// A reply is written as a whole frame; the future should be driven to
    /// completion.
    pub async fn dispatch(&mut self, frame: Frame) -> Result<Option<String>> {
        trace!(?frame, "frame received");

        match frame.opcode {
            Opcode::Text if frame.fin => return decode_text(frame.payload).map(Some),
            Opcode::Text => {
                if let Partial::Accumulating(buf) = &self.partial {
                    warn!(dropped = buf.len(), "new text message before previous one finished");
                }
                self.partial = Partial::Accumulating(BytesMut::from(&frame.payload[..]));
            }
            Opcode::Continue => return self.continuation(frame),
            Opcode::Binary => {
                warn!(len = frame.payload.len(), "dropping binary message");
                if !frame.fin {
                    self.partial = Partial::Skipping;
                }
            }
            Opcode::Ping => {
                debug!(len = frame.payload.len(), "ping");
                self.sender.send(&Frame::pong(frame.payload)).await?;
            }
            Opcode::Pong => debug!(len = frame.payload.len(), "pong"),
            Opcode::Close => {
                debug!(payload = ?&frame.payload[..], "close received");
                let ack = Frame::new(Opcode::Close, frame.fin, frame.payload);
                self.closed = true;
                self.sender.send(&ack).await?;
            }
            Opcode::Reserved(code) => warn!(code, "dropping frame with unsupported opcode"),
        }

        Ok(None)
    }

    fn continuation(&mut self, frame: Frame) -> Result<Option<String>> {
        match &mut self.partial {
            Partial::Idle => {
                return Err(Error::Protocol("continuation without a started message"));
            }
            Partial::Skipping => {}
            Partial::Accumulating(buf) => {
                if buf.len() + frame.payload.len() > self.limits.max_payload {
                    return Err(Error::Protocol("message too large"));
                }
                buf.extend_from_slice(&frame.payload);
            }
        }

        if !frame.fin {
            return Ok(None);
        }
        match mem::replace(&mut self.partial, Partial::Idle) {
            Partial::Accumulating(buf) => decode_text(buf.freeze()).map(Some),
            Partial::Skipping | Partial::Idle => Ok(None),
        }
    }
}

fn decode_text(payload: Bytes) -> Result<String> {
    String::from_utf8(payload.to_vec()).map_err(|_| Error::Protocol("text message is not UTF-8"))
}
