use super::bridge;
use super::service::{HttpService, Reply};
use crate::frame::Frame;
use crate::process::Process;
use crate::request::Request;
use crate::socket::FrameSender;
use crate::{handshake, Config, Error, Result};
use futures::future;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tower_service::Service;
use tracing::{debug, info, info_span, warn, Instrument};

/// One accepted stream, from the first request byte until it is closed.
pub struct Connection<R, W> {
    reader: BufReader<R>,
    writer: W,
    peer: String,
    config: Arc<Config>,
}

impl<R, W> Connection<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    pub fn new(reader: R, writer: W, peer: impl Into<String>, config: Arc<Config>) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
            peer: peer.into(),
            config,
        }
    }

    /// Serves the connection to completion. `processes` is called with the
    /// request path once the upgrade succeeded.
    ///
    /// Every log line emitted for the connection carries the peer address,
    /// including the final outcome, which is also returned.
    pub async fn serve<S>(self, processes: S) -> Result<()>
    where
        S: Service<String, Response = Process, Error = io::Error>,
    {
        let span = info_span!("connection", peer = %self.peer);
        let res = self.run(processes).instrument(span.clone()).await;

        span.in_scope(|| match &res {
            Ok(()) => info!("connection closed"),
            Err(err) => warn!(%err, "connection failed"),
        });
        res
    }

    async fn run<S>(mut self, mut processes: S) -> Result<()>
    where
        S: Service<String, Response = Process, Error = io::Error>,
    {
        let reply = match self.handshake().await {
            Ok(reply) => reply,
            Err(err) => {
                if let Some(status) = err.status() {
                    self.finish(&handshake::error(status).encode()).await;
                }
                return Err(err);
            }
        };
        let (response, path) = match reply {
            Reply::Upgrade { response, path } => (response, path),
            Reply::Page(response) => {
                debug!(status = %response.status(), "responding");
                self.finish(&response.encode()).await;
                return Ok(());
            }
        };

        self.writer
            .write_all(&response.encode())
            .await
            .map_err(Error::WriteFailed)?;
        self.writer.flush().await.map_err(Error::WriteFailed)?;
        info!(%path, "upgraded");

        let sender = FrameSender::new(self.writer);
        let spawned = match future::poll_fn(|cx| processes.poll_ready(cx)).await {
            Ok(()) => processes.call(path).await,
            Err(err) => Err(err),
        };
        let process = match spawned {
            Ok(process) => process,
            Err(err) => {
                let _ = sender.send(&Frame::close(1011, "process unavailable")).await;
                let _ = sender.shutdown().await;
                return Err(Error::Spawn(err));
            }
        };
        info!(pid = ?process.id(), "process started");

        bridge::run(self.reader, sender, process, &self.config).await
    }

    async fn handshake(&mut self) -> Result<Reply> {
        let req = Request::read(&mut self.reader, &self.config).await?;
        info!(method = %req.method, path = %req.path, "request");
        HttpService::new(self.config.clone()).call(req).await
    }

    /// Sends a final HTTP response and closes the write side.
    async fn finish(&mut self, response: &[u8]) {
        let mut sent = self.writer.write_all(response).await;
        if sent.is_ok() {
            sent = self.writer.shutdown().await;
        }
        if let Err(err) = sent {
            debug!(%err, "failed to send response");
        }
    }
}
