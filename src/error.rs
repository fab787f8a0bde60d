//! Error types for the guise crate.

use std::io;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during HTTP operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket inactivity exceeded the configured timeout.
    #[error("http request timed out, the server may not have responded")]
    Timeout,

    /// The proxy did not answer 200 to the CONNECT.
    #[error("could not connect to proxy: {0}")]
    ProxyConnect(String),

    /// A 3xx response carried no Location header.
    #[error("received http redirection, but no location header found")]
    MissingLocation,

    /// Redirect chain exceeded the limit.
    #[error("count of http redirection exceeds limit ({count})")]
    RedirectLimit { count: u32 },

    /// Non-2xx status after body decode.
    #[error("received an error status {status}")]
    HttpStatus { status: u16 },

    /// Invalid download destination path or filename.
    #[error("download resolution failed: {0}")]
    DownloadResolution(String),

    /// Low-level socket failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// HTTP protocol error.
    #[error("HTTP protocol error: {0}")]
    HttpProtocol(String),

    /// URL parsing error.
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create an HTTP status error.
    pub fn http_status(status: u16) -> Self {
        Self::HttpStatus { status }
    }

    /// Create a proxy CONNECT error.
    pub fn proxy_connect(message: impl Into<String>) -> Self {
        Self::ProxyConnect(message.into())
    }

    /// Create a download resolution error.
    pub fn download(message: impl Into<String>) -> Self {
        Self::DownloadResolution(message.into())
    }

    /// Create a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Create a TLS error.
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// Create an HTTP protocol error.
    pub fn http_protocol(message: impl Into<String>) -> Self {
        Self::HttpProtocol(message.into())
    }

    /// Create an IO error with custom message.
    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(io::Error::other(message.into()))
    }
}
