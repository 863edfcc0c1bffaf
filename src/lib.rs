//! Bridges WebSocket text messages to the standard input and output of a
//! spawned process, one line per message.

mod config;
pub use config::{Config, DEFAULT_PROTOCOL};

mod error;
pub use error::{Error, Result};

pub mod frame;

pub mod handshake;

mod page;

pub mod process;
pub use process::Process;

pub mod request;
pub use request::Request;

pub mod server;
pub use server::{serve_stdio, Connection, Server};

mod socket;
pub use socket::{FrameSender, Socket};
