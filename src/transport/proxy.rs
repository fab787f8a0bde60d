//! HTTP CONNECT proxy tunneling.
//!
//! A tunnel is scoped to exactly one logical request hop: the engine opens
//! one per call (and one per redirect hop when the target host changes),
//! hands its socket to the TLS layer, and releases it when the call settles.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::{Error, Result};
use crate::transport::h1::find_header_end;
use crate::transport::io_timeout;

/// CONNECT responses larger than this are malformed.
const MAX_CONNECT_RESPONSE: usize = 16 * 1024;

/// Proxy endpoint configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub host: String,
    pub port: u16,
    pub auth: Option<ProxyAuth>,
}

/// Basic-auth credentials for the proxy.
#[derive(Debug, Clone)]
pub struct ProxyAuth {
    pub username: String,
    pub password: String,
}

impl ProxyConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            auth: None,
        }
    }

    pub fn with_basic_auth(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auth = Some(ProxyAuth {
            username: username.into(),
            password: password.into(),
        });
        self
    }
}

/// An established CONNECT tunnel.
#[derive(Debug)]
pub struct ProxyTunnel {
    stream: TcpStream,
    target: String,
}

impl ProxyTunnel {
    /// Open a tunnel to `target_host:443` through the proxy.
    ///
    /// Fails with [`Error::ProxyConnect`] when the proxy answers anything
    /// but 200, with [`Error::Timeout`] when it is unresponsive within the
    /// call's timeout, and with [`Error::Transport`] on socket failure.
    pub async fn open(
        config: &ProxyConfig,
        target_host: &str,
        idle: Option<Duration>,
    ) -> Result<Self> {
        let mut stream = io_timeout(idle, async {
            TcpStream::connect((config.host.as_str(), config.port))
                .await
                .map_err(|e| {
                    Error::transport(format!(
                        "failed to connect to proxy {}:{}: {}",
                        config.host, config.port, e
                    ))
                })
        })
        .await?;

        let request = connect_request(config, target_host);
        io_timeout(idle, async {
            stream
                .write_all(request.as_bytes())
                .await
                .map_err(|e| Error::transport(format!("failed to write CONNECT: {}", e)))
        })
        .await?;

        let mut buffer = Vec::with_capacity(1024);
        loop {
            if buffer.len() >= MAX_CONNECT_RESPONSE {
                return Err(Error::proxy_connect("CONNECT response too large"));
            }
            let mut read_buf = [0u8; 1024];
            let n = io_timeout(idle, async {
                stream
                    .read(&mut read_buf)
                    .await
                    .map_err(|e| Error::transport(format!("failed to read CONNECT response: {}", e)))
            })
            .await?;
            if n == 0 {
                return Err(Error::proxy_connect(
                    "proxy closed the connection during CONNECT",
                ));
            }
            buffer.extend_from_slice(&read_buf[..n]);
            if find_header_end(&buffer).is_some() {
                break;
            }
        }

        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut response = httparse::Response::new(&mut headers);
        response
            .parse(&buffer)
            .map_err(|e| Error::proxy_connect(format!("malformed CONNECT response: {}", e)))?;
        let status = response
            .code
            .ok_or_else(|| Error::proxy_connect("CONNECT response missing status"))?;
        if status != 200 {
            return Err(Error::proxy_connect(format!(
                "proxy answered {} to CONNECT",
                status
            )));
        }

        tracing::debug!(host = target_host, "proxy tunnel established");
        Ok(Self {
            stream,
            target: target_host.to_string(),
        })
    }

    /// Host this tunnel was opened for.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Hand the connected socket to the TLS layer. Consumes the tunnel.
    pub fn into_stream(self) -> TcpStream {
        self.stream
    }

    /// Shut the tunnel down without using it.
    pub async fn release(mut self) {
        let _ = self.stream.shutdown().await;
    }
}

/// Format the CONNECT request head for `target_host:443`.
fn connect_request(config: &ProxyConfig, target_host: &str) -> String {
    let mut request = format!(
        "CONNECT {host}:443 HTTP/1.1\r\nHost: {host}:443\r\n",
        host = target_host
    );
    if let Some(auth) = &config.auth {
        let credentials = BASE64.encode(format!("{}:{}", auth.username, auth.password));
        request.push_str(&format!("Proxy-Authorization: Basic {}\r\n", credentials));
    }
    request.push_str("\r\n");
    request
}
