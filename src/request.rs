use crate::{Config, Error, Result};
use http::Method;
use std::collections::HashMap;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::time;

/// The HTTP request that opens a connection. Only lives through the handshake.
#[derive(Clone, Debug)]
pub struct Request {
    pub method: Method,
    pub path: String,
    headers: HashMap<String, String>,
}

impl Request {
    /// Reads the request line and headers up to the blank line.
    ///
    /// Each line must arrive within `config.handshake_timeout`; the line
    /// length and header count are bounded by `config.max_line_len` and
    /// `config.max_headers`.
    pub async fn read<R>(reader: &mut R, config: &Config) -> Result<Self>
    where
        R: AsyncBufRead + Unpin,
    {
        let first = next_line(reader, config).await?;
        let (method, path) = parse_request_line(&first)?;

        let mut headers: HashMap<String, String> = HashMap::new();
        let mut count = 0;
        loop {
            let line = next_line(reader, config).await?;
            if line.trim().is_empty() {
                break;
            }
            let (key, value) = match line.split_once(':') {
                Some(header) => header,
                None => continue,
            };

            count += 1;
            if count > config.max_headers {
                return Err(Error::BadRequest("too many headers"));
            }

            let value = value.trim();
            headers
                .entry(key.trim().to_ascii_lowercase())
                .and_modify(|joined| {
                    joined.push_str(", ");
                    joined.push_str(value);
                })
                .or_insert_with(|| value.to_owned());
        }

        Ok(Self {
            method,
            path,
            headers,
        })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// The comma-separated values of a header, trimmed.
    pub fn header_values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.header(name)
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn has_token(&self, name: &str, token: &str) -> bool {
        self.header_values(name).any(|value| value == token)
    }
}

/// Parses `GET <path> HTTP/1.1`; the method is matched case-insensitively.
pub fn parse_request_line(line: &str) -> Result<(Method, String)> {
    let mut parts = line.split(' ');
    match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(method), Some(path), Some("HTTP/1.1"), None) if !path.is_empty() => {
            if method.eq_ignore_ascii_case("GET") {
                Ok((Method::GET, path.to_owned()))
            } else {
                Err(Error::BadRequest("method not allowed"))
            }
        }
        _ => Err(Error::BadRequest("malformed request line")),
    }
}

async fn next_line<R>(reader: &mut R, config: &Config) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    read_line(reader, config.max_line_len, config.handshake_timeout).await
}

async fn read_line<R>(reader: &mut R, max_len: usize, timeout: Duration) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    time::timeout(timeout, read_bounded_line(reader, max_len))
        .await
        .map_err(|_| Error::Timeout)?
}

/// Reads one line without its terminator, never buffering much more than
/// `max_len` bytes of it.
async fn read_bounded_line<R>(reader: &mut R, max_len: usize) -> Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    loop {
        let available = reader.fill_buf().await.map_err(Error::Io)?;
        if available.is_empty() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed during handshake",
            )));
        }

        let done = match available.iter().position(|&b| b == b'\n') {
            Some(end) => {
                line.extend_from_slice(&available[..end]);
                reader.consume(end + 1);
                true
            }
            None => {
                let len = available.len();
                line.extend_from_slice(available);
                reader.consume(len);
                false
            }
        };

        // one extra byte for a trailing '\r'
        if line.len() > max_len + 1 {
            return Err(Error::BadRequest("header line too long"));
        }
        if done {
            break;
        }
    }

    if line.last() == Some(&b'\r') {
        line.pop();
    }
    if line.len() > max_len {
        return Err(Error::BadRequest("header line too long"));
    }
    String::from_utf8(line).map_err(|_| Error::BadRequest("request is not valid UTF-8"))
}
