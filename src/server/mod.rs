use crate::{Config, Result};
use std::env;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::time;
use tracing::{error, info};

mod bridge;

mod connection;
pub use connection::Connection;

mod factory;
pub use factory::ProcessFactory;

mod service;
pub use service::{HttpService, Reply};

/// A listener serving each accepted connection in its own task, with its own
/// process.
pub struct Server {
    listener: TcpListener,
    config: Arc<Config>,
}

impl Server {
    /// Creates a new Server bound to the specified address.
    pub async fn bind<A: ToSocketAddrs>(addr: A, config: Config) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections forever. A failing connection only affects itself.
    pub async fn run(self) -> io::Result<()> {
        info!(addr = %self.local_addr()?, "listening");
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    error!(%err, "accept failed");
                    time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            let config = self.config.clone();
            tokio::spawn(async move {
                let factory = ProcessFactory::new(config.program.clone());
                let (reader, writer) = stream.into_split();
                // the outcome is logged by `serve`
                let _ = Connection::new(reader, writer, peer.to_string(), config)
                    .serve(factory)
                    .await;
            });
        }
    }
}

/// Serves the single connection on stdin and stdout, for use under a
/// listener that starts one process per accepted socket.
pub async fn serve_stdio(config: Config) -> Result<()> {
    let factory = ProcessFactory::new(config.program.clone());
    Connection::new(tokio::io::stdin(), tokio::io::stdout(), stdio_peer(), Arc::new(config))
        .serve(factory)
        .await
}

/// The remote address as exported by common socket-activating listeners.
fn stdio_peer() -> String {
    if let (Ok(addr), Ok(port)) = (env::var("SOCAT_PEERADDR"), env::var("SOCAT_PEERPORT")) {
        return format!("{}:{}", addr, port);
    }
    ["REMOTE_ADDR", "TCPREMOTEIP"]
        .iter()
        .find_map(|name| env::var(name).ok())
        .unwrap_or_else(|| "stdio".to_owned())
}
