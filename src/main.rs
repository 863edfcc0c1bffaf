use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tokio::runtime;
use tracing::error;
use tracing_subscriber::EnvFilter;
use ws_bridge::{Config, Server, DEFAULT_PROTOCOL};

#[derive(Parser, Debug)]
#[command(
    name = "ws-bridge",
    about = "Bridge WebSocket text messages to a process's stdin and stdout, line by line",
    version
)]
struct Cli {
    /// Program started for every WebSocket connection; it gets the request
    /// path as its only argument.
    #[arg(value_name = "PROGRAM")]
    program: PathBuf,

    /// Listen on this address instead of serving one connection on stdin/stdout.
    #[arg(long, value_name = "ADDR", env = "WS_BRIDGE_LISTEN")]
    listen: Option<SocketAddr>,

    /// Subprotocol clients must offer.
    #[arg(long, default_value = DEFAULT_PROTOCOL)]
    protocol: String,

    /// Seconds between keep-alive pings.
    #[arg(long, value_name = "SECS", default_value_t = 300)]
    ping_interval: u64,

    /// Accept frames from clients that did not mask them.
    #[arg(long)]
    allow_unmasked: bool,

    /// Log filter, e.g. `info` or `ws_bridge=debug`. Overrides RUST_LOG.
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            protocol: self.protocol.clone(),
            ping_interval: Duration::from_secs(self.ping_interval.max(1)),
            allow_unmasked: self.allow_unmasked,
            ..Config::new(self.program.clone())
        }
    }
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(filter) => EnvFilter::new(filter),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    // stdout may be the socket itself
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// How long runtime shutdown waits for blocking work, such as a pending read
/// on stdin, before the process exits regardless.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(100);

async fn run(cli: Cli) -> ws_bridge::Result<()> {
    let config = cli.config();
    match cli.listen {
        Some(addr) => {
            let server = Server::bind(addr, config).await?;
            server.run().await?;
            Ok(())
        }
        None => ws_bridge::serve_stdio(config).await,
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref());

    let runtime = match runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            error!(%err, "failed to start the runtime");
            return ExitCode::FAILURE;
        }
    };
    let res = runtime.block_on(run(cli));
    // stdin is read on a blocking thread that only returns once the peer
    // sends more or hangs up
    runtime.shutdown_timeout(SHUTDOWN_TIMEOUT);

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(%err, "exiting");
            ExitCode::FAILURE
        }
    }
}
