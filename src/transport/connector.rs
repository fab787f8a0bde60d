//! BoringSSL TLS connector.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use boring::ssl::{SslConnector, SslMethod, SslVersion};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_boring::SslStream;

use crate::error::{Error, Result};

/// TLS connector carrying a context's cipher preference.
///
/// The cipher string comes from the fingerprint profile; `None` keeps the
/// library defaults (an unmasked client).
#[derive(Debug, Clone)]
pub struct TlsConnector {
    cipher_list: Option<String>,
}

impl TlsConnector {
    pub fn new(cipher_list: Option<String>) -> Self {
        Self { cipher_list }
    }

    /// The cipher string this connector negotiates with, if masked.
    pub fn cipher_list(&self) -> Option<&str> {
        self.cipher_list.as_deref()
    }

    fn configure_ssl(&self) -> Result<SslConnector> {
        let mut builder = SslConnector::builder(SslMethod::tls_client())
            .map_err(|e| Error::tls(format!("failed to create SSL connector: {}", e)))?;

        if let Some(ciphers) = &self.cipher_list {
            builder
                .set_cipher_list(ciphers)
                .map_err(|e| Error::tls(format!("failed to set cipher list: {}", e)))?;
        }

        builder
            .set_min_proto_version(Some(SslVersion::TLS1_2))
            .map_err(|e| Error::tls(format!("failed to set min TLS version: {}", e)))?;
        builder
            .set_max_proto_version(Some(SslVersion::TLS1_3))
            .map_err(|e| Error::tls(format!("failed to set max TLS version: {}", e)))?;

        // HTTP/1.1 only; HTTP/2 and HTTP/3 are out of scope.
        builder
            .set_alpn_protos(b"\x08http/1.1")
            .map_err(|e| Error::tls(format!("failed to set ALPN: {}", e)))?;

        Ok(builder.build())
    }

    /// Run the TLS handshake over an already-connected stream.
    ///
    /// The stream may be a direct TCP connection or a CONNECT tunnel; TLS
    /// always runs end-to-end to `host`.
    pub async fn handshake(&self, host: &str, stream: TcpStream) -> Result<MaybeTlsStream> {
        let connector = self.configure_ssl()?;
        let config = connector
            .configure()
            .map_err(|e| Error::tls(format!("failed to configure SSL: {}", e)))?;

        let tls = tokio_boring::connect(config, host, stream)
            .await
            .map_err(|e| Error::tls(format!("TLS handshake failed: {}", e)))?;

        Ok(MaybeTlsStream::Tls(tls))
    }
}

/// Open a TCP connection to `host:port`.
pub async fn open_tcp(host: &str, port: u16) -> Result<TcpStream> {
    TcpStream::connect((host, port))
        .await
        .map_err(|e| Error::transport(format!("failed to connect to {}:{}: {}", host, port, e)))
}

/// Stream that is either plain TCP (http) or TLS (https).
#[derive(Debug)]
pub enum MaybeTlsStream {
    Plain(TcpStream),
    Tls(SslStream<TcpStream>),
}

impl AsyncRead for MaybeTlsStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_read(cx, buf),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for MaybeTlsStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut *self {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_write(cx, buf),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_flush(cx),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut *self {
            MaybeTlsStream::Plain(stream) => Pin::new(stream).poll_shutdown(cx),
            MaybeTlsStream::Tls(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
