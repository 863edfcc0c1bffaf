use crate::request::Request;
use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::{BufMut, Bytes, BytesMut};
use http::StatusCode;
use sha1::{Digest, Sha1};

pub const SEC_WEBSOCKET_ACCEPT: &str = "Sec-WebSocket-Accept";
pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";
pub const SEC_WEBSOCKET_PROTOCOL: &str = "Sec-WebSocket-Protocol";
pub const SEC_WEBSOCKET_VERSION: &str = "Sec-WebSocket-Version";

const GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const VERSION: &str = "13";

/// Computes the `Sec-WebSocket-Accept` value for a client key.
pub fn accept(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(GUID);
    STANDARD.encode(sha1.finalize())
}

/// Checks the upgrade preconditions and returns the client key.
pub fn validate<'a>(req: &'a Request, protocol: &str) -> Result<&'a str> {
    if !req.has_token(SEC_WEBSOCKET_PROTOCOL, protocol) {
        return Err(Error::BadRequest("unsupported subprotocol"));
    }
    if !req.has_token(SEC_WEBSOCKET_VERSION, VERSION) {
        return Err(Error::BadRequest("unsupported websocket version"));
    }
    match req.header(SEC_WEBSOCKET_KEY) {
        Some(key) if !key.is_empty() => Ok(key),
        _ => Err(Error::BadRequest("missing websocket key")),
    }
}

/// An HTTP response head plus body, always rendered with CRLF line endings.
#[derive(Clone, Debug)]
pub struct Response {
    status: StatusCode,
    headers: Vec<(&'static str, String)>,
    body: Bytes,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    /// Sets a body. Responses with a body close the connection after sending.
    pub fn body(self, content_type: &'static str, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        let mut me = self
            .header("Content-Type", content_type)
            .header("Content-Length", body.len().to_string())
            .header("Connection", "close");
        me.body = body;
        me
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(128 + self.body.len());
        buf.put_slice(b"HTTP/1.1 ");
        buf.put_slice(self.status.as_str().as_bytes());
        buf.put_u8(b' ');
        buf.put_slice(self.status.canonical_reason().unwrap_or("").as_bytes());
        buf.put_slice(b"\r\n");
        for (name, value) in &self.headers {
            buf.put_slice(name.as_bytes());
            buf.put_slice(b": ");
            buf.put_slice(value.as_bytes());
            buf.put_slice(b"\r\n");
        }
        buf.put_slice(b"\r\n");
        buf.put_slice(&self.body);
        buf.freeze()
    }
}

pub fn switching_protocols(key: &str, protocol: &str) -> Response {
    Response::new(StatusCode::SWITCHING_PROTOCOLS)
        .header("Upgrade", "websocket")
        .header("Connection", "Upgrade")
        .header(SEC_WEBSOCKET_ACCEPT, accept(key))
        .header(SEC_WEBSOCKET_PROTOCOL, protocol)
}

/// A terminal error response with a plain-text body.
pub fn error(status: StatusCode) -> Response {
    let reason = status.canonical_reason().unwrap_or("Error");
    let body = format!("{} {}\n", status.as_str(), reason);
    Response::new(status).body("text/plain; charset=utf-8", body)
}
