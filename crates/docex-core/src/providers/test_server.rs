//! One-shot HTTP/1.1 server for driving the reqwest transports in tests.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What the server sends back.
pub(crate) struct Reply {
    /// Status line tail, e.g. `200 OK`.
    pub status: &'static str,
    /// Written as separate HTTP chunks with a pause between them.
    pub chunks: Vec<String>,
    /// Leave the body unterminated and the connection open.
    pub hold_open: bool,
}

impl Reply {
    pub fn ok(chunks: &[&str]) -> Self {
        Self {
            status: "200 OK",
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            hold_open: false,
        }
    }

    pub fn status(status: &'static str, body: &str) -> Self {
        Self {
            status,
            chunks: vec![body.to_string()],
            hold_open: false,
        }
    }
}

/// Client that talks to the loopback server directly, ignoring proxy settings.
pub(crate) fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// Serve one connection. Returns the base URL and a handle resolving to the
/// raw request (head and body).
pub(crate) async fn serve_once(reply: Reply) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let request = read_request(&mut socket).await;

        let head = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
            reply.status
        );
        socket.write_all(head.as_bytes()).await.unwrap();
        for chunk in &reply.chunks {
            let frame = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
            socket.write_all(frame.as_bytes()).await.unwrap();
            socket.flush().await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        if reply.hold_open {
            tokio::time::sleep(Duration::from_secs(60)).await;
        } else {
            socket.write_all(b"0\r\n\r\n").await.unwrap();
            socket.flush().await.unwrap();
        }
        request
    });

    (base_url, handle)
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let head_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "client closed before sending headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    String::from_utf8_lossy(&buf).into_owned()
}
