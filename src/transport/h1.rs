//! Hand-driven HTTP/1.1 exchange over a (possibly tunneled) stream.
//!
//! Uses httparse for response parsing and raw I/O for full control over
//! request formatting. Response bodies are consumed incrementally through
//! [`H1Connection::next_chunk`] so the engine can buffer them in memory or
//! stream them straight to disk for attachment downloads.

use std::time::Duration;

use bytes::Bytes;
use http::Method;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};

use crate::error::{Error, Result};
use crate::response::find_header_value;
use crate::transport::connector::MaybeTlsStream;

/// Maximum response header size (64KB).
const MAX_HEADERS_SIZE: usize = 64 * 1024;

/// Maximum number of headers to parse.
const MAX_HEADERS_COUNT: usize = 100;

/// Read granularity for socket and payload-stream reads.
const READ_CHUNK: usize = 8192;

/// Request body forms accepted by the transport.
pub enum RequestBody {
    Empty,
    /// Sent raw with a computed `Content-Length`.
    Bytes(Bytes),
    /// Piped with chunked transfer encoding.
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

/// Parsed response status line and headers. The body stays on the wire
/// until consumed through the connection.
#[derive(Debug)]
pub struct ResponseHead {
    pub status: u16,
    /// Raw `Name: value` lines in wire order.
    pub headers: Vec<String>,
}

impl ResponseHead {
    /// Look up a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header_value(&self.headers, name)
    }

    /// All values of a repeated header, e.g. `Set-Cookie`.
    pub fn headers_named(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                if key.trim().eq_ignore_ascii_case(name) {
                    Some(value.trim())
                } else {
                    None
                }
            })
            .collect()
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_redirect(&self) -> bool {
        (300..400).contains(&self.status)
    }
}

/// Body framing per RFC 9112 Section 6.
#[derive(Debug, Clone, Copy)]
enum BodyFraming {
    /// No body (1xx/204/304 or HEAD).
    None,
    Fixed { remaining: usize },
    Chunked { state: ChunkState },
    UntilClose { done: bool },
}

#[derive(Debug, Clone, Copy)]
enum ChunkState {
    /// Expecting a chunk-size line.
    Size,
    /// Inside chunk data; `remaining` excludes the trailing CRLF.
    Data { remaining: usize },
    /// Consuming the trailer section after the last chunk.
    Trailers,
    Done,
}

/// One HTTP/1.1 exchange over a dedicated connection.
///
/// Connections are never reused across hops: each request (and each redirect
/// hop) gets a fresh connection or tunnel, and `Connection: close` is sent
/// unless the caller overrides it.
pub struct H1Connection {
    stream: MaybeTlsStream,
    idle: Option<Duration>,
    /// Read-ahead not yet claimed by head or body parsing.
    buffer: Vec<u8>,
    framing: BodyFraming,
}

impl H1Connection {
    pub fn new(stream: MaybeTlsStream, idle: Option<Duration>) -> Self {
        Self {
            stream,
            idle,
            buffer: Vec::with_capacity(READ_CHUNK),
            framing: BodyFraming::None,
        }
    }

    /// Send a request and read the response head.
    ///
    /// The response body remains on the wire; consume it with
    /// [`next_chunk`](Self::next_chunk) or [`read_body`](Self::read_body).
    pub async fn send_request(
        &mut self,
        method: &Method,
        host: &str,
        path: &str,
        headers: &[(String, String)],
        body: RequestBody,
    ) -> Result<ResponseHead> {
        let head = build_request(method, host, path, headers, &body)?;
        self.write(&head).await?;

        match body {
            RequestBody::Empty => {}
            RequestBody::Bytes(bytes) => self.write(&bytes).await?,
            RequestBody::Stream(mut reader) => self.write_chunked(&mut *reader).await?,
        }
        self.flush().await?;

        self.read_head(method).await
    }

    /// Pull the next piece of the response body. `None` once complete.
    pub async fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.framing {
                BodyFraming::None => return Ok(None),
                BodyFraming::Fixed { remaining: 0 } => return Ok(None),
                BodyFraming::Fixed { remaining } => {
                    if self.buffer.is_empty() && self.fill_buffer().await? == 0 {
                        return Err(Error::http_protocol(format!(
                            "connection closed with {} body bytes outstanding",
                            remaining
                        )));
                    }
                    let take = self.buffer.len().min(remaining);
                    let chunk = self.take_buffered(take);
                    self.framing = BodyFraming::Fixed {
                        remaining: remaining - take,
                    };
                    return Ok(Some(chunk));
                }
                BodyFraming::UntilClose { done: true } => return Ok(None),
                BodyFraming::UntilClose { done: false } => {
                    if !self.buffer.is_empty() {
                        let take = self.buffer.len();
                        return Ok(Some(self.take_buffered(take)));
                    }
                    if self.fill_buffer().await? == 0 {
                        self.framing = BodyFraming::UntilClose { done: true };
                        return Ok(None);
                    }
                }
                BodyFraming::Chunked { .. } => return self.next_chunked_piece().await,
            }
        }
    }

    /// Buffer the remaining body fully.
    pub async fn read_body(&mut self) -> Result<Bytes> {
        let mut body = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            body.extend_from_slice(&chunk);
        }
        Ok(Bytes::from(body))
    }

    async fn next_chunked_piece(&mut self) -> Result<Option<Bytes>> {
        loop {
            let BodyFraming::Chunked { state } = self.framing else {
                return Ok(None);
            };
            match state {
                ChunkState::Size => {
                    if let Some((size, line_end)) = find_chunk_size(&self.buffer) {
                        self.buffer.drain(..line_end);
                        self.framing = BodyFraming::Chunked {
                            state: if size == 0 {
                                ChunkState::Trailers
                            } else {
                                ChunkState::Data { remaining: size }
                            },
                        };
                        continue;
                    }
                    if self.fill_buffer().await? == 0 {
                        return Err(Error::http_protocol(
                            "connection closed while reading chunk size",
                        ));
                    }
                }
                ChunkState::Data { remaining: 0 } => {
                    // chunk data is followed by CRLF
                    while self.buffer.len() < 2 {
                        if self.fill_buffer().await? == 0 {
                            return Err(Error::http_protocol(
                                "connection closed at chunk boundary",
                            ));
                        }
                    }
                    self.buffer.drain(..2);
                    self.framing = BodyFraming::Chunked {
                        state: ChunkState::Size,
                    };
                }
                ChunkState::Data { remaining } => {
                    if self.buffer.is_empty() && self.fill_buffer().await? == 0 {
                        return Err(Error::http_protocol(
                            "connection closed while reading chunk data",
                        ));
                    }
                    let take = self.buffer.len().min(remaining);
                    let chunk = self.take_buffered(take);
                    self.framing = BodyFraming::Chunked {
                        state: ChunkState::Data {
                            remaining: remaining - take,
                        },
                    };
                    return Ok(Some(chunk));
                }
                ChunkState::Trailers => {
                    // trailer-section = *( field-line CRLF ) CRLF
                    if let Some(position) = find_crlf(&self.buffer) {
                        if position == 0 {
                            self.buffer.drain(..2);
                            self.framing = BodyFraming::Chunked {
                                state: ChunkState::Done,
                            };
                            return Ok(None);
                        }
                        self.buffer.drain(..position + 2);
                        continue;
                    }
                    if self.fill_buffer().await? == 0 {
                        // closed with trailers absent, which is fine
                        self.framing = BodyFraming::Chunked {
                            state: ChunkState::Done,
                        };
                        return Ok(None);
                    }
                }
                ChunkState::Done => return Ok(None),
            }
        }
    }

    /// Read response headers, skipping 1xx informational responses
    /// (RFC 9112 Section 6), and set up body framing.
    async fn read_head(&mut self, method: &Method) -> Result<ResponseHead> {
        loop {
            loop {
                if self.buffer.len() >= MAX_HEADERS_SIZE {
                    return Err(Error::http_protocol("response headers too large"));
                }
                if find_header_end(&self.buffer).is_some() {
                    break;
                }
                if self.fill_buffer().await? == 0 {
                    return Err(Error::http_protocol(
                        "connection closed before response head was complete",
                    ));
                }
            }

            let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS_COUNT];
            let mut parsed = httparse::Response::new(&mut headers);
            let head_len = match parsed
                .parse(&self.buffer)
                .map_err(|e| Error::http_protocol(format!("failed to parse response: {}", e)))?
            {
                httparse::Status::Complete(len) => len,
                httparse::Status::Partial => {
                    return Err(Error::http_protocol("incomplete response head"));
                }
            };

            let status = parsed
                .code
                .ok_or_else(|| Error::http_protocol("missing status code"))?;
            let header_lines: Vec<String> = parsed
                .headers
                .iter()
                .filter(|header| !header.name.is_empty())
                .map(|header| {
                    format!("{}: {}", header.name, String::from_utf8_lossy(header.value))
                })
                .collect();
            self.buffer.drain(..head_len);

            // 1xx responses have no body; keep reading for the final response
            if (100..200).contains(&status) {
                continue;
            }

            let head = ResponseHead {
                status,
                headers: header_lines,
            };
            self.framing = determine_framing(&head, method)?;
            return Ok(head);
        }
    }

    fn take_buffered(&mut self, length: usize) -> Bytes {
        Bytes::from(self.buffer.drain(..length).collect::<Vec<u8>>())
    }

    async fn fill_buffer(&mut self) -> Result<usize> {
        let mut read_buf = [0u8; READ_CHUNK];
        let n = self.read(&mut read_buf).await?;
        self.buffer.extend_from_slice(&read_buf[..n]);
        Ok(n)
    }

    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let read = self.stream.read(buf);
        let result = match self.idle {
            Some(idle) => tokio::time::timeout(idle, read)
                .await
                .map_err(|_| Error::Timeout)?,
            None => read.await,
        };
        result.map_err(|e| Error::transport(format!("socket read failed: {}", e)))
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        let write = self.stream.write_all(data);
        let result = match self.idle {
            Some(idle) => tokio::time::timeout(idle, write)
                .await
                .map_err(|_| Error::Timeout)?,
            None => write.await,
        };
        result.map_err(|e| Error::transport(format!("socket write failed: {}", e)))
    }

    async fn flush(&mut self) -> Result<()> {
        self.stream
            .flush()
            .await
            .map_err(|e| Error::transport(format!("socket flush failed: {}", e)))
    }

    /// Pipe a payload stream as chunked transfer encoding.
    async fn write_chunked(
        &mut self,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<()> {
        let mut buf = [0u8; READ_CHUNK];
        loop {
            let n = reader
                .read(&mut buf)
                .await
                .map_err(|e| Error::transport(format!("payload stream read failed: {}", e)))?;
            if n == 0 {
                break;
            }
            self.write(format!("{:x}\r\n", n).as_bytes()).await?;
            self.write(&buf[..n]).await?;
            self.write(b"\r\n").await?;
        }
        self.write(b"0\r\n\r\n").await
    }
}

/// Build the HTTP/1.1 request head (and framing headers) as bytes.
fn build_request(
    method: &Method,
    host: &str,
    path: &str,
    headers: &[(String, String)],
    body: &RequestBody,
) -> Result<Vec<u8>> {
    for (name, value) in headers {
        validate_header_name(name)?;
        validate_header_value(value)?;
    }

    let mut request = Vec::with_capacity(1024);

    // Request line: METHOD origin-form HTTP/1.1
    request.extend_from_slice(method.as_str().as_bytes());
    request.push(b' ');
    request.extend_from_slice(if path.is_empty() { b"/" } else { path.as_bytes() });
    request.extend_from_slice(b" HTTP/1.1\r\n");

    // Host header (required per RFC 9112 Section 3.2)
    request.extend_from_slice(b"Host: ");
    request.extend_from_slice(host.as_bytes());
    request.extend_from_slice(b"\r\n");

    let mut has_connection = false;
    let mut has_content_length = false;
    let mut has_transfer_encoding = false;
    for (name, value) in headers {
        if name.eq_ignore_ascii_case("host") {
            continue;
        }
        if name.eq_ignore_ascii_case("connection") {
            has_connection = true;
        }
        if name.eq_ignore_ascii_case("content-length") {
            has_content_length = true;
        }
        if name.eq_ignore_ascii_case("transfer-encoding") {
            has_transfer_encoding = true;
        }
        request.extend_from_slice(name.as_bytes());
        request.extend_from_slice(b": ");
        request.extend_from_slice(value.as_bytes());
        request.extend_from_slice(b"\r\n");
    }

    // Each hop runs on its own connection
    if !has_connection {
        request.extend_from_slice(b"Connection: close\r\n");
    }

    match body {
        RequestBody::Bytes(bytes) if !has_content_length && !has_transfer_encoding => {
            request.extend_from_slice(b"Content-Length: ");
            request.extend_from_slice(bytes.len().to_string().as_bytes());
            request.extend_from_slice(b"\r\n");
        }
        RequestBody::Stream(_) if !has_transfer_encoding => {
            request.extend_from_slice(b"Transfer-Encoding: chunked\r\n");
        }
        _ => {}
    }

    request.extend_from_slice(b"\r\n");
    Ok(request)
}

/// Decide body framing per RFC 9112 Section 6.3.
fn determine_framing(head: &ResponseHead, method: &Method) -> Result<BodyFraming> {
    if matches!(head.status, 100..=199 | 204 | 304) || *method == Method::HEAD {
        return Ok(BodyFraming::None);
    }

    let transfer_encoding = head.header("transfer-encoding");
    let is_chunked = transfer_encoding
        .map(|value| {
            // chunked must be the final transfer coding
            value
                .split(',')
                .next_back()
                .map(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
                .unwrap_or(false)
        })
        .unwrap_or(false);

    if is_chunked {
        return Ok(BodyFraming::Chunked {
            state: ChunkState::Size,
        });
    }
    if transfer_encoding.is_some() {
        // non-chunked Transfer-Encoding: delimited by connection close
        return Ok(BodyFraming::UntilClose { done: false });
    }
    if let Some(value) = head.header("content-length") {
        return Ok(BodyFraming::Fixed {
            remaining: parse_content_length(value)?,
        });
    }
    Ok(BodyFraming::UntilClose { done: false })
}

/// Find the end of HTTP headers (\r\n\r\n).
pub(crate) fn find_header_end(buffer: &[u8]) -> Option<usize> {
    for i in 0..buffer.len().saturating_sub(3) {
        if &buffer[i..i + 4] == b"\r\n\r\n" {
            return Some(i + 4);
        }
    }
    None
}

/// Parse a chunk size from the buffer, returning (size, end_of_line_position).
fn find_chunk_size(buffer: &[u8]) -> Option<(usize, usize)> {
    for i in 0..buffer.len().saturating_sub(1) {
        if &buffer[i..i + 2] == b"\r\n" {
            // hex size, possibly followed by chunk extensions after ;
            let line = String::from_utf8_lossy(&buffer[..i]);
            let size_part = line.split(';').next()?;
            let size = usize::from_str_radix(size_part.trim(), 16).ok()?;
            return Some((size, i + 2));
        }
    }
    None
}

/// Find the first CRLF in a buffer, returning its position.
fn find_crlf(buffer: &[u8]) -> Option<usize> {
    (0..buffer.len().saturating_sub(1)).find(|&i| &buffer[i..i + 2] == b"\r\n")
}

/// Validate a header name per RFC 9110 Section 5.1.
fn validate_header_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::http_protocol("empty header name"));
    }
    for byte in name.bytes() {
        if !is_tchar(byte) {
            return Err(Error::http_protocol(format!(
                "invalid character in header name: {:?}",
                name
            )));
        }
    }
    Ok(())
}

/// Check if a byte is a valid token character per RFC 9110.
fn is_tchar(byte: u8) -> bool {
    matches!(byte,
        b'!' | b'#' | b'$' | b'%' | b'&' | b'\'' | b'*' | b'+' | b'-' | b'.' |
        b'^' | b'_' | b'`' | b'|' | b'~' | b'0'..=b'9' | b'A'..=b'Z' | b'a'..=b'z'
    )
}

/// Validate a header value per RFC 9110 Section 5.5 (no CR/LF/NUL,
/// prevents header injection).
fn validate_header_value(value: &str) -> Result<()> {
    for byte in value.bytes() {
        if byte == 0 || byte == b'\r' || byte == b'\n' {
            return Err(Error::http_protocol(
                "invalid character in header value (CR/LF/NUL not allowed)",
            ));
        }
    }
    Ok(())
}

/// Parse and validate Content-Length per RFC 9112 Section 6.2.
/// Multiple comma-separated values must all be identical.
fn parse_content_length(value: &str) -> Result<usize> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let first = parts[0]
        .parse::<usize>()
        .map_err(|_| Error::http_protocol(format!("invalid Content-Length: {}", value)))?;
    for part in &parts[1..] {
        let parsed = part
            .parse::<usize>()
            .map_err(|_| Error::http_protocol(format!("invalid Content-Length: {}", value)))?;
        if parsed != first {
            return Err(Error::http_protocol(format!(
                "conflicting Content-Length values: {}",
                value
            )));
        }
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_header_end() {
        let data = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello";
        assert_eq!(find_header_end(data), Some(38));

        let partial = b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n";
        assert_eq!(find_header_end(partial), None);
    }

    #[test]
    fn test_find_chunk_size() {
        assert_eq!(find_chunk_size(b"5\r\nhello"), Some((5, 3)));
        assert_eq!(find_chunk_size(b"a\r\n0123456789"), Some((10, 3)));
        assert_eq!(find_chunk_size(b"0\r\n"), Some((0, 3)));
        assert_eq!(find_chunk_size(b"5;ext=val\r\ndata"), Some((5, 11)));
        assert_eq!(find_chunk_size(b"XYZ\r\n"), None);
        assert_eq!(find_chunk_size(b"10"), None);
    }

    #[test]
    fn test_validate_header_name() {
        assert!(validate_header_name("Content-Type").is_ok());
        assert!(validate_header_name("X-Custom-Header").is_ok());
        assert!(validate_header_name("").is_err());
        assert!(validate_header_name("Content Type").is_err());
        assert!(validate_header_name("Content:Type").is_err());
    }

    #[test]
    fn test_validate_header_value_rejects_injection() {
        assert!(validate_header_value("text/html").is_ok());
        assert!(validate_header_value("").is_ok());
        assert!(validate_header_value("value\r\nEvil-Header: injected").is_err());
        assert!(validate_header_value("value\nmore").is_err());
        assert!(validate_header_value("value\x00more").is_err());
    }

    #[test]
    fn test_parse_content_length() {
        assert_eq!(parse_content_length("0").unwrap(), 0);
        assert_eq!(parse_content_length("100").unwrap(), 100);
        assert_eq!(parse_content_length("100, 100").unwrap(), 100);
        assert!(parse_content_length("100, 200").is_err());
        assert!(parse_content_length("abc").is_err());
        assert!(parse_content_length("-1").is_err());
    }

    #[test]
    fn test_build_request_shape() {
        let request = build_request(
            &Method::GET,
            "example.com",
            "/index.html?q=1",
            &[("Accept".to_string(), "text/html".to_string())],
            &RequestBody::Empty,
        )
        .unwrap();
        let text = String::from_utf8(request).unwrap();

        assert!(text.starts_with("GET /index.html?q=1 HTTP/1.1\r\n"));
        assert!(text.contains("Host: example.com\r\n"));
        assert!(text.contains("Accept: text/html\r\n"));
        assert!(text.contains("Connection: close\r\n"));
        assert!(text.ends_with("\r\n\r\n"));
    }

    #[test]
    fn test_build_request_adds_content_length_once() {
        let body = RequestBody::Bytes(Bytes::from_static(b"hello"));
        let request = build_request(&Method::POST, "example.com", "/", &[], &body).unwrap();
        let text = String::from_utf8(request).unwrap();
        assert!(text.contains("Content-Length: 5\r\n"));

        // explicit Content-Length is not duplicated
        let preset = vec![("Content-Length".to_string(), "5".to_string())];
        let request = build_request(&Method::POST, "example.com", "/", &preset, &body).unwrap();
        let text = String::from_utf8(request).unwrap();
        assert_eq!(text.matches("Content-Length").count(), 1);
    }

    #[test]
    fn test_build_request_streams_are_chunked() {
        let body = RequestBody::Stream(Box::new(tokio::io::empty()));
        let request = build_request(&Method::PUT, "example.com", "/up", &[], &body).unwrap();
        let text = String::from_utf8(request).unwrap();
        assert!(text.contains("Transfer-Encoding: chunked\r\n"));
        assert!(!text.contains("Content-Length"));
    }

    #[test]
    fn test_determine_framing() {
        let head = ResponseHead {
            status: 200,
            headers: vec!["Content-Length: 10".to_string()],
        };
        assert!(matches!(
            determine_framing(&head, &Method::GET).unwrap(),
            BodyFraming::Fixed { remaining: 10 }
        ));

        let head = ResponseHead {
            status: 200,
            headers: vec!["Transfer-Encoding: chunked".to_string()],
        };
        assert!(matches!(
            determine_framing(&head, &Method::GET).unwrap(),
            BodyFraming::Chunked { .. }
        ));

        let head = ResponseHead {
            status: 204,
            headers: vec![],
        };
        assert!(matches!(
            determine_framing(&head, &Method::GET).unwrap(),
            BodyFraming::None
        ));

        let head = ResponseHead {
            status: 200,
            headers: vec![],
        };
        assert!(matches!(
            determine_framing(&head, &Method::GET).unwrap(),
            BodyFraming::UntilClose { done: false }
        ));
    }
}
