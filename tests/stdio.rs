#![cfg(unix)]

use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::timeout;

const UPGRADE: &str = "GET /socket HTTP/1.1\r\n\
    Host: x\r\n\
    Sec-WebSocket-Protocol: madness\r\n\
    Sec-WebSocket-Version: 13\r\n\
    Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";

#[tokio::test]
async fn exits_when_the_process_does_while_stdin_stays_open() {
    let mut server = Command::new(env!("CARGO_BIN_EXE_ws-bridge"))
        .arg("true")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    // kept open until the end, like a peer that is still connected
    let mut stdin = server.stdin.take().unwrap();
    stdin.write_all(UPGRADE.as_bytes()).await.unwrap();
    stdin.flush().await.unwrap();

    let status = timeout(Duration::from_secs(10), server.wait())
        .await
        .expect("server outlived its connection")
        .unwrap();
    assert!(status.success());

    let mut out = Vec::new();
    server
        .stdout
        .take()
        .unwrap()
        .read_to_end(&mut out)
        .await
        .unwrap();
    assert!(out.starts_with(b"HTTP/1.1 101 Switching Protocols\r\n"));
    // the goodbye close frame: 1000, "process exited"
    let close = [&[0x88, 16, 0x03, 0xe8][..], b"process exited"].concat();
    assert!(out.ends_with(&close));

    drop(stdin);
}
