//! HTTP response representation with explicit decompression.

use std::io::Read;

use bytes::Bytes;

use crate::error::{Error, Result};

/// Representation the caller wants the payload in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadKind {
    /// UTF-8 text (lossy).
    #[default]
    Text,
    /// Raw bytes.
    Binary,
}

/// Decoded response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Text(String),
    Binary(Bytes),
}

/// A resolved HTTP response.
///
/// `payload` is `None` when the body was streamed to disk as a download.
#[derive(Debug)]
pub struct HttpResponse {
    /// Raw `Name: value` header lines in wire order.
    pub headers: Vec<String>,
    pub payload: Option<ResponseBody>,
}

impl HttpResponse {
    /// Look up a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        find_header_value(&self.headers, name)
    }

    /// All values of a repeated header.
    pub fn headers_named(&self, name: &str) -> Vec<&str> {
        self.headers
            .iter()
            .filter_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
            })
            .collect()
    }

    /// Text payload, if the call asked for text.
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            Some(ResponseBody::Text(text)) => Some(text),
            _ => None,
        }
    }

    /// Binary payload, if the call asked for bytes.
    pub fn bytes(&self) -> Option<&Bytes> {
        match &self.payload {
            Some(ResponseBody::Binary(bytes)) => Some(bytes),
            _ => None,
        }
    }
}

/// Find a header value by name in raw header lines (case-insensitive).
pub(crate) fn find_header_value<'a>(headers: &'a [String], name: &str) -> Option<&'a str> {
    for line in headers {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim().eq_ignore_ascii_case(name) {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Decode a buffered body per its `Content-Encoding`.
///
/// Only `gzip` and `br` are decoded; anything else passes through untouched.
pub(crate) fn decode_body(encoding: Option<&str>, body: Bytes) -> Result<Bytes> {
    match encoding.map(|value| value.to_ascii_lowercase()).as_deref() {
        Some("gzip") | Some("x-gzip") => decode_gzip(&body),
        Some("br") => decode_brotli(&body),
        _ => Ok(body),
    }
}

fn decode_gzip(data: &[u8]) -> Result<Bytes> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::http_protocol(format!("gzip decode failed: {}", e)))?;
    Ok(Bytes::from(decoded))
}

fn decode_brotli(data: &[u8]) -> Result<Bytes> {
    let mut decoder = brotli::Decompressor::new(data, 4096);
    let mut decoded = Vec::new();
    decoder
        .read_to_end(&mut decoded)
        .map_err(|e| Error::http_protocol(format!("brotli decode failed: {}", e)))?;
    Ok(Bytes::from(decoded))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn response_with_headers(headers: &[&str]) -> HttpResponse {
        HttpResponse {
            headers: headers.iter().map(|line| line.to_string()).collect(),
            payload: None,
        }
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let response = response_with_headers(&["Content-Type: text/html", "Content-Length: 5"]);
        assert_eq!(response.header("content-type"), Some("text/html"));
        assert_eq!(response.header("CONTENT-LENGTH"), Some("5"));
        assert_eq!(response.header("missing"), None);
    }

    #[test]
    fn test_repeated_headers_collected() {
        let response = response_with_headers(&["Set-Cookie: a=1", "Set-Cookie: b=2"]);
        assert_eq!(response.headers_named("set-cookie"), vec!["a=1", "b=2"]);
    }

    #[test]
    fn test_gzip_body_decodes() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"hello gzip").unwrap();
        let compressed = encoder.finish().unwrap();

        let decoded = decode_body(Some("gzip"), Bytes::from(compressed)).unwrap();
        assert_eq!(&decoded[..], b"hello gzip");
    }

    #[test]
    fn test_brotli_body_decodes() {
        let mut compressed = Vec::new();
        {
            let mut encoder = brotli::CompressorWriter::new(&mut compressed, 4096, 5, 22);
            encoder.write_all(b"hello brotli").unwrap();
        }

        let decoded = decode_body(Some("br"), Bytes::from(compressed)).unwrap();
        assert_eq!(&decoded[..], b"hello brotli");
    }

    #[test]
    fn test_unknown_encoding_passes_through() {
        let body = Bytes::from_static(b"\x00\x01\x02raw");
        let decoded = decode_body(Some("zstd"), body.clone()).unwrap();
        assert_eq!(decoded, body);

        let identity = decode_body(None, body.clone()).unwrap();
        assert_eq!(identity, body);
    }
}
