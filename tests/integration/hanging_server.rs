//! A raw TCP server whose streaming responses stall after the first increment.
//!
//! mockito only serves complete bodies, so cancellation mid-stream needs a hand-driven socket.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub struct HangingServer {
    pub base_url: String,
    continue_calls: Arc<AtomicUsize>,
    handle: JoinHandle<()>,
}

impl HangingServer {
    /// Start a server that creates session `session_id` and streams `first_delta` then stalls.
    pub async fn start(session_id: &str, first_delta: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind test listener");
        let addr = listener.local_addr().expect("listener address");
        let continue_calls = Arc::new(AtomicUsize::new(0));

        let calls = continue_calls.clone();
        let session_id = session_id.to_string();
        let first_event = format!(
            "data: {}\n\n",
            serde_json::json!({ "content": first_delta })
        );
        let handle = tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else {
                    return;
                };
                let calls = calls.clone();
                let session_id = session_id.clone();
                let first_event = first_event.clone();
                tokio::spawn(async move {
                    let _ = serve(socket, &session_id, &first_event, &calls).await;
                });
            }
        });

        Self {
            base_url: format!("http://{}", addr),
            continue_calls,
            handle,
        }
    }

    pub fn continue_calls(&self) -> usize {
        self.continue_calls.load(Ordering::SeqCst)
    }
}

impl Drop for HangingServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(
    mut socket: TcpStream,
    session_id: &str,
    first_event: &str,
    calls: &AtomicUsize,
) -> std::io::Result<()> {
    let request_line = read_request(&mut socket).await?;

    if request_line.starts_with("POST /api/chats ") {
        let body = format!(r#"{{"data":{{"id":"{}"}}}}"#, session_id);
        let resp = format!(
            "HTTP/1.1 201 Created\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        socket.write_all(resp.as_bytes()).await?;
        return socket.shutdown().await;
    }

    if request_line.contains("/continue") {
        calls.fetch_add(1, Ordering::SeqCst);
        let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\n";
        socket.write_all(head.as_bytes()).await?;
        let chunk = format!("{:x}\r\n{}\r\n", first_event.len(), first_event);
        socket.write_all(chunk.as_bytes()).await?;
        socket.flush().await?;
        // Hold the connection open without sending anything else.
        tokio::time::sleep(Duration::from_secs(600)).await;
        return Ok(());
    }

    socket
        .write_all(b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
        .await?;
    socket.shutdown().await
}

/// Read one request (headers plus a `content-length` body) and return its request line.
async fn read_request(socket: &mut TcpStream) -> std::io::Result<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            return Err(std::io::ErrorKind::UnexpectedEof.into());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    Ok(head.lines().next().unwrap_or_default().to_string())
}
