//! Shared utilities for integration tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A request seen by the mock site: method and path.
pub type SeenRequest = (String, String);

/// Throwaway HTTP server serving canned pages by path.
pub struct MockSite {
    pub addr: SocketAddr,
    seen: Arc<Mutex<Vec<SeenRequest>>>,
}

#[allow(dead_code)]
impl MockSite {
    /// Absolute URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests served so far, in arrival order.
    pub fn seen(&self) -> Vec<SeenRequest> {
        self.seen.lock().unwrap().clone()
    }
}

/// Start a mock site on an ephemeral port.
///
/// `pages` maps a path to `(status, body)`. For 3xx statuses the body is sent
/// as the `Location` header instead. Unknown paths answer 404.
pub async fn start_mock_site(pages: &[(&str, u16, &str)]) -> MockSite {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let pages: Arc<HashMap<String, (u16, String)>> = Arc::new(
        pages
            .iter()
            .map(|(path, status, body)| (path.to_string(), (*status, body.to_string())))
            .collect(),
    );
    let seen = Arc::new(Mutex::new(Vec::new()));

    let seen_server = seen.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let pages = pages.clone();
                    let seen = seen_server.clone();
                    tokio::spawn(async move {
                        serve(socket, &pages, &seen).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    MockSite { addr, seen }
}

async fn serve(
    mut socket: TcpStream,
    pages: &HashMap<String, (u16, String)>,
    seen: &Mutex<Vec<SeenRequest>>,
) {
    let Some((method, path)) = read_request(&mut socket).await else {
        return;
    };
    seen.lock().unwrap().push((method, path.clone()));

    let (status, body) = pages
        .get(&path)
        .cloned()
        .unwrap_or((404, "<h1>Not Found</h1>".to_string()));
    let status_text = match status {
        200 => "200 OK",
        301 => "301 Moved Permanently",
        302 => "302 Found",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        _ => "200 OK",
    };

    let response = if (300..400).contains(&status) {
        format!("HTTP/1.1 {status_text}\r\nLocation: {body}\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
    } else {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_text,
            body.len(),
            body
        )
    };
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
    tokio::time::sleep(Duration::from_millis(10)).await;
}

/// Read the request head (and body, if any) and return method and path.
async fn read_request(socket: &mut TcpStream) -> Option<(String, String)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut parts = head.lines().next()?.split_whitespace();
    let method = parts.next()?.to_string();
    let path = parts.next()?.to_string();
    Some((method, path))
}
