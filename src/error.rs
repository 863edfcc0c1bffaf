use http::StatusCode;
use std::error::Error as StdError;
use std::fmt;
use std::io;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Malformed or disallowed HTTP request; answered with `400`.
    BadRequest(&'static str),
    /// Unknown request path; answered with `404`.
    NotFound(String),
    /// A request line did not arrive within the handshake timeout.
    Timeout,
    /// The stream ended in the middle of a frame.
    TruncatedFrame,
    Protocol(&'static str),
    /// The peer is gone; writing to the outbound stream failed.
    WriteFailed(io::Error),
    Spawn(io::Error),
    Io(io::Error),
}

impl Error {
    fn description(&self) -> &str {
        match self {
            Error::BadRequest(_) => "bad request",
            Error::NotFound(_) => "not found",
            Error::Timeout => "handshake timed out",
            Error::TruncatedFrame => "truncated frame",
            Error::Protocol(_) => "protocol error",
            Error::WriteFailed(_) => "write failed",
            Error::Spawn(_) => "failed to spawn process",
            Error::Io(_) => "IO error",
        }
    }

    /// The HTTP status answering this error, for errors of the HTTP phase.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::BadRequest(_) => Some(StatusCode::BAD_REQUEST),
            Error::NotFound(_) => Some(StatusCode::NOT_FOUND),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::BadRequest(reason) | Error::Protocol(reason) => {
                write!(f, "{}: {}", self.description(), reason)
            }
            Error::NotFound(path) => write!(f, "{}: {}", self.description(), path),
            Error::WriteFailed(err) | Error::Spawn(err) | Error::Io(err) => {
                write!(f, "{}: {}", self.description(), err)
            }
            Error::Timeout | Error::TruncatedFrame => f.write_str(self.description()),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::WriteFailed(err) | Error::Spawn(err) | Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => Error::TruncatedFrame,
            _ => Error::Io(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_eof_is_truncation() {
        let err = Error::from(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, Error::TruncatedFrame));

        let err = Error::from(io::Error::from(io::ErrorKind::BrokenPipe));
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn http_statuses() {
        assert_eq!(
            Error::BadRequest("x").status(),
            Some(StatusCode::BAD_REQUEST)
        );
        assert_eq!(
            Error::NotFound("/x".into()).status(),
            Some(StatusCode::NOT_FOUND)
        );
        assert_eq!(Error::Timeout.status(), None);
    }

    #[test]
    fn display_includes_reason() {
        let err = Error::BadRequest("too many headers");
        assert_eq!(err.to_string(), "bad request: too many headers");
        assert_eq!(Error::TruncatedFrame.to_string(), "truncated frame");
    }
}
