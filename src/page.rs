use crate::handshake::Response;
use crate::request::Request;
use http::StatusCode;

/// The page served at `/`: a bare console that talks to `/socket`.
pub fn landing(req: &Request, protocol: &str) -> Response {
    let host = req.header("host").unwrap_or("localhost");
    let url = format!("ws://{}/socket", host);
    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>ws-bridge</title></head>
<body>
<pre id="log"></pre>
<input id="line" autofocus size="80">
<script>
const log = document.getElementById("log");
const ws = new WebSocket({url:?}, {protocol:?});
ws.onmessage = (e) => {{ log.textContent += e.data + "\n"; }};
ws.onclose = () => {{ log.textContent += "[closed]\n"; }};
document.getElementById("line").onkeydown = (e) => {{
  if (e.key === "Enter") {{ ws.send(e.target.value); e.target.value = ""; }}
}};
</script>
</body>
</html>
"#,
        url = url,
        protocol = protocol,
    );

    Response::new(StatusCode::OK).body("text/html; charset=utf-8", html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Config;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn advertises_socket_url_from_host() {
        let raw = "GET / HTTP/1.1\r\nHost: example.com:8080\r\n\r\n";
        let req = Request::read(&mut BufReader::new(raw.as_bytes()), &Config::default())
            .await
            .unwrap();

        let res = landing(&req, "madness");
        assert_eq!(res.status(), StatusCode::OK);
        let text = String::from_utf8(res.encode().to_vec()).unwrap();
        assert!(text.contains(r#"new WebSocket("ws://example.com:8080/socket", "madness")"#));
    }
}
