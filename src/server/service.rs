use crate::handshake::{self, Response};
use crate::request::Request;
use crate::{page, Config, Error, Result};
use futures::future;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower_service::Service;

/// The successful answer to the HTTP phase of a connection.
#[derive(Debug)]
pub enum Reply {
    /// A complete response; the connection ends after it is sent.
    Page(Response),
    /// `101 Switching Protocols`; frames follow.
    Upgrade { response: Response, path: String },
}

impl Reply {
    pub fn response(&self) -> &Response {
        match self {
            Reply::Page(response) | Reply::Upgrade { response, .. } => response,
        }
    }
}

/// Routes a parsed request: `/` gets the landing page, `/socket` and
/// `/socket/...` are upgraded, everything else is not found.
#[derive(Clone, Debug)]
pub struct HttpService {
    config: Arc<Config>,
}

impl HttpService {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    pub fn route(&self, req: &Request) -> Result<Reply> {
        let protocol = &self.config.protocol;
        let path = req.path.as_str();

        if path == "/" {
            Ok(Reply::Page(page::landing(req, protocol)))
        } else if path == "/socket" || path.starts_with("/socket/") {
            let key = handshake::validate(req, protocol)?;
            Ok(Reply::Upgrade {
                response: handshake::switching_protocols(key, protocol),
                path: req.path.clone(),
            })
        } else {
            Err(Error::NotFound(req.path.clone()))
        }
    }
}

impl Service<Request> for HttpService {
    type Response = Reply;
    type Error = Error;
    type Future = future::Ready<Result<Reply>>;

    fn poll_ready(&mut self, _cx: &mut Context) -> Poll<Result<()>> {
        Ok(()).into()
    }

    fn call(&mut self, req: Request) -> Self::Future {
        future::ready(self.route(&req))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use tokio::io::BufReader;

    async fn reply(raw: &str) -> Result<Reply> {
        let config = Arc::new(Config::default());
        let req = Request::read(&mut BufReader::new(raw.as_bytes()), &config)
            .await
            .unwrap();
        HttpService::new(config).call(req).await
    }

    const UPGRADE: &str = "Host: x\r\n\
        Sec-WebSocket-Protocol: madness\r\n\
        Sec-WebSocket-Version: 13\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";

    #[tokio::test]
    async fn upgrades_socket_paths() {
        for path in ["/socket", "/socket/", "/socket/a/b"] {
            let reply = reply(&format!("GET {} HTTP/1.1\r\n{}", path, UPGRADE))
                .await
                .unwrap();
            let res = reply.response();
            assert_eq!(res.status(), StatusCode::SWITCHING_PROTOCOLS);
            assert_eq!(
                res.get_header("sec-websocket-accept"),
                Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
            );
            match reply {
                Reply::Upgrade { path: upgraded, .. } => assert_eq!(upgraded, path),
                Reply::Page(_) => panic!("expected an upgrade for {}", path),
            }
        }
    }

    #[tokio::test]
    async fn serves_page_at_root() {
        let reply = reply("GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        assert!(matches!(&reply, Reply::Page(_)));
        assert_eq!(reply.response().status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        for path in ["/sockets", "/index.html", "/socket?x=1"] {
            let res = reply(&format!("GET {} HTTP/1.1\r\n{}", path, UPGRADE)).await;
            assert!(matches!(res, Err(Error::NotFound(_))), "{}", path);
        }
    }

    #[tokio::test]
    async fn failed_preconditions_are_bad_requests() {
        let res =
            reply("GET /socket HTTP/1.1\r\nHost: x\r\nSec-WebSocket-Version: 13\r\n\r\n").await;
        assert!(matches!(res, Err(Error::BadRequest(_))));
    }
}
