//! Scriptable HTTP/1.1 mock server and CONNECT proxy for integration tests.

// not every test binary uses every helper
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A request as received on the wire.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub raw: String,
}

impl RecordedRequest {
    pub fn request_line(&self) -> &str {
        self.raw.lines().next().unwrap_or("")
    }

    pub fn method(&self) -> &str {
        self.request_line().split_whitespace().next().unwrap_or("")
    }

    pub fn path(&self) -> &str {
        self.request_line().split_whitespace().nth(1).unwrap_or("")
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let head = self.raw.split("\r\n\r\n").next()?;
        for line in head.lines().skip(1) {
            if let Some((key, value)) = line.split_once(':') {
                if key.trim().eq_ignore_ascii_case(name) {
                    return Some(value.trim());
                }
            }
        }
        None
    }

    pub fn body(&self) -> &str {
        self.raw
            .split_once("\r\n\r\n")
            .map(|(_, body)| body)
            .unwrap_or("")
    }
}

/// Serves one scripted response per connection, in accept order.
/// Connections arriving with an empty script are dropped.
pub struct MockServer {
    pub port: u16,
    script: Arc<Mutex<VecDeque<Vec<u8>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockServer {
    /// Bind a random local port and serve the scripted responses.
    pub async fn start(responses: Vec<Vec<u8>>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let script = Arc::new(Mutex::new(VecDeque::from(responses)));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let accept_script = Arc::clone(&script);
        let recorded = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let Some(response) = accept_script.lock().unwrap().pop_front() else {
                    continue;
                };
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    serve_one(stream, response, recorded).await;
                });
            }
        });

        Ok(Self {
            port,
            script,
            requests,
            handle,
        })
    }

    /// A server that accepts and reads requests but never answers.
    pub async fn start_silent() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = [0u8; 8192];
                    while let Ok(n) = stream.read(&mut buf).await {
                        if n == 0 {
                            break;
                        }
                    }
                });
            }
        });

        Ok(Self {
            port,
            script: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            handle,
        })
    }

    /// Append responses to the script after binding (so the script can refer
    /// to this server's own URL).
    pub fn enqueue(&self, responses: Vec<Vec<u8>>) {
        self.script.lock().unwrap().extend(responses);
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_one(
    mut stream: TcpStream,
    response: Vec<u8>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
) {
    let mut request = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let Ok(n) = stream.read(&mut buf).await else {
            return;
        };
        if n == 0 {
            break;
        }
        request.extend_from_slice(&buf[..n]);
        if request_complete(&request) {
            break;
        }
    }

    recorded.lock().unwrap().push(RecordedRequest {
        raw: String::from_utf8_lossy(&request).into_owned(),
    });

    let _ = stream.write_all(&response).await;
    let _ = stream.flush().await;
}

/// Whether the buffered request carries its full body (Content-Length or
/// chunked terminator; bodyless otherwise).
fn request_complete(request: &[u8]) -> bool {
    let Some(header_end) = find_double_crlf(request) else {
        return false;
    };
    let head_lower = String::from_utf8_lossy(&request[..header_end]).to_ascii_lowercase();

    if head_lower.contains("transfer-encoding: chunked") {
        return request.ends_with(b"0\r\n\r\n");
    }

    let content_length = head_lower
        .lines()
        .find(|line| line.starts_with("content-length:"))
        .and_then(|line| line.split(':').nth(1))
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    request.len() >= header_end + content_length
}

fn find_double_crlf(buffer: &[u8]) -> Option<usize> {
    for i in 0..buffer.len().saturating_sub(3) {
        if &buffer[i..i + 4] == b"\r\n\r\n" {
            return Some(i + 4);
        }
    }
    None
}

/// Build a canned response with a computed Content-Length.
pub fn response(status: u16, reason: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut out = format!("HTTP/1.1 {} {}\r\n", status, reason).into_bytes();
    for (name, value) in headers {
        out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
    }
    out.extend_from_slice(format!("Content-Length: {}\r\n\r\n", body.len()).as_bytes());
    out.extend_from_slice(body);
    out
}

/// Build a redirect response pointing at `location`.
pub fn redirect(status: u16, location: &str) -> Vec<u8> {
    response(status, "Found", &[("Location", location)], b"")
}

/// Answers every CONNECT with a fixed status line, recording the request.
pub struct MockProxy {
    pub port: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: tokio::task::JoinHandle<()>,
}

impl MockProxy {
    pub async fn start(status_line: &'static str) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        let handle = tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else {
                    break;
                };
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 8192];
                    loop {
                        let Ok(n) = stream.read(&mut buf).await else {
                            return;
                        };
                        if n == 0 {
                            return;
                        }
                        request.extend_from_slice(&buf[..n]);
                        if find_double_crlf(&request).is_some() {
                            break;
                        }
                    }
                    recorded.lock().unwrap().push(RecordedRequest {
                        raw: String::from_utf8_lossy(&request).into_owned(),
                    });
                    let reply = format!("{}\r\n\r\n", status_line);
                    let _ = stream.write_all(reply.as_bytes()).await;
                    let _ = stream.flush().await;
                });
            }
        });

        Ok(Self {
            port,
            requests,
            handle,
        })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for MockProxy {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
