use std::path::PathBuf;
use std::time::Duration;

/// Subprotocol a client must offer in `Sec-WebSocket-Protocol`.
pub const DEFAULT_PROTOCOL: &str = "madness";

/// Settings shared by every connection.
#[derive(Clone, Debug)]
pub struct Config {
    /// Executable spawned for each upgraded connection.
    pub program: PathBuf,
    pub protocol: String,
    pub ping_interval: Duration,
    /// Per-line read timeout while reading the HTTP request.
    pub handshake_timeout: Duration,
    pub max_headers: usize,
    pub max_line_len: usize,
    /// Largest accepted frame payload, and largest reassembled text message.
    pub max_message_size: usize,
    /// Accept frames from the client that carry no mask.
    pub allow_unmasked: bool,
    /// How long the child gets to exit once its input is closed, and again
    /// after SIGTERM, before it is killed.
    pub kill_grace: Duration,
}

impl Config {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            program: PathBuf::new(),
            protocol: DEFAULT_PROTOCOL.to_owned(),
            ping_interval: Duration::from_secs(300),
            handshake_timeout: Duration::from_secs(10),
            max_headers: 32,
            max_line_len: 256,
            max_message_size: 16 * 1024 * 1024,
            allow_unmasked: false,
            kill_grace: Duration::from_secs(1),
        }
    }
}
