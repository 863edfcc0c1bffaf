use crate::frame::Frame;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

/// The single outbound byte stream, shared by every task that sends frames.
///
/// A frame is encoded before the lock is taken and written whole while it is
/// held, so bytes of two frames never interleave. Frames from different
/// senders are ordered only by who gets the lock first.
pub struct FrameSender<W> {
    inner: Arc<Mutex<W>>,
}

impl<W> Clone for FrameSender<W> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<W> FrameSender<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(transport: W) -> Self {
        Self {
            inner: Arc::new(Mutex::new(transport)),
        }
    }

    pub async fn send(&self, frame: &Frame) -> Result<()> {
        self.send_bytes(&frame.encode()).await
    }

    /// Writes already-encoded bytes as one unit.
    pub async fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        let mut transport = self.inner.lock().await;
        transport.write_all(bytes).await.map_err(Error::WriteFailed)?;
        transport.flush().await.map_err(Error::WriteFailed)
    }

    /// Shuts down the write side once any in-flight frame is finished.
    pub async fn shutdown(&self) -> Result<()> {
        let mut transport = self.inner.lock().await;
        transport.shutdown().await.map_err(Error::WriteFailed)
    }
}
