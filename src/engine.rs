//! The per-call request engine.
//!
//! Every logical call owns a [`RequestContext`]: the redirect counter, the
//! active proxy tunnel and the caller's options travel through it explicitly,
//! so concurrent calls on one context can never touch each other's redirect
//! or tunnel state. Only the cookie jar and the fingerprint are shared.

use std::path::PathBuf;
use std::time::Duration;

use bytes::Bytes;
use http::Method;
use tokio::io::AsyncRead;
use url::Url;

use crate::client::ClientContext;
use crate::download;
use crate::error::{Error, Result};
use crate::headers;
use crate::response::{decode_body, HttpResponse, PayloadKind, ResponseBody};
use crate::transport::connector::{self, MaybeTlsStream};
use crate::transport::h1::{H1Connection, RequestBody, ResponseHead};
use crate::transport::io_timeout;
use crate::transport::proxy::ProxyTunnel;

/// Redirect chain hard limit.
pub(crate) const REDIRECT_LIMIT: u32 = 5;

/// Per-call request options, immutable once a call starts.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Extra request headers. The fingerprint set still wins on collision.
    pub headers: Vec<(String, String)>,
    /// Strip the query part from the request target.
    pub ignore_query: bool,
    /// Destination directory or file path for attachment downloads.
    pub download_path: Option<PathBuf>,
    /// Socket-inactivity timeout. `None` waits forever.
    pub timeout: Option<Duration>,
    /// Representation of the returned payload.
    pub payload_kind: PayloadKind,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn ignore_query(mut self, ignore: bool) -> Self {
        self.ignore_query = ignore;
        self
    }

    pub fn download_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.download_path = Some(path.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Ask for the payload as raw bytes instead of text.
    pub fn binary(mut self) -> Self {
        self.payload_kind = PayloadKind::Binary;
        self
    }
}

/// Request payload forms for POST/PUT.
pub enum Payload {
    /// Raw bytes, sent as-is.
    Bytes(Bytes),
    /// Structured data, JSON-encoded with explicit content headers.
    Json(serde_json::Value),
    /// Byte stream, piped with chunked transfer encoding.
    Stream(Box<dyn AsyncRead + Send + Unpin>),
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Bytes(Bytes::from(text.into()))
    }

    pub fn json(value: impl serde::Serialize) -> Result<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }
}

impl From<Bytes> for Payload {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<serde_json::Value> for Payload {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Call-scoped state carried across an initial request and its redirects.
///
/// Owned exclusively by one top-level call; never shared across concurrent
/// calls on the same context.
pub(crate) struct RequestContext {
    pub(crate) redirect_count: u32,
    /// Redirects restart as brand-new top-level requests instead of being
    /// followed in-context.
    pub(crate) outer: bool,
    pub(crate) tunnel: Option<ProxyTunnel>,
    pub(crate) options: RequestOptions,
}

impl RequestContext {
    fn new(options: RequestOptions, outer_redirect_count: Option<u32>) -> Self {
        Self {
            redirect_count: outer_redirect_count.unwrap_or(0),
            outer: outer_redirect_count.is_some(),
            tunnel: None,
            options,
        }
    }
}

/// How one engine run settled.
pub(crate) enum Outcome {
    Resolved(HttpResponse),
    /// Destination of a redirect the factory should replay as a brand-new
    /// top-level request.
    RedirectTo(String),
}

enum RedirectStep {
    Follow(Url),
    Restart(String),
}

impl ClientContext {
    /// Run one logical call: initial request plus any in-context redirects.
    ///
    /// The proxy tunnel, if any, is released on every settle path.
    pub(crate) async fn execute(
        &self,
        method: Method,
        url: &str,
        payload: Option<Payload>,
        options: RequestOptions,
        outer_redirect_count: Option<u32>,
    ) -> Result<Outcome> {
        let url = Url::parse(url)?;
        let mut ctx = RequestContext::new(options, outer_redirect_count);
        let outcome = self.drive(&mut ctx, method, url, payload).await;
        if let Some(tunnel) = ctx.tunnel.take() {
            tunnel.release().await;
        }
        outcome
    }

    async fn drive(
        &self,
        ctx: &mut RequestContext,
        mut method: Method,
        mut url: Url,
        mut payload: Option<Payload>,
    ) -> Result<Outcome> {
        loop {
            if let Some(proxy) = self.proxy() {
                if ctx.tunnel.is_none() {
                    let host = host_of(&url)?;
                    ctx.tunnel =
                        Some(ProxyTunnel::open(proxy, host, ctx.options.timeout).await?);
                }
            }

            let (body, payload_headers) = serialize_payload(payload.take())?;
            let request_headers = self.build_headers(ctx, payload_headers);
            let path = request_path(&url, ctx.options.ignore_query);
            let host_header = host_with_port(&url)?;

            let mut connection = self.open_connection(ctx, &url).await?;
            let head = connection
                .send_request(&method, &host_header, &path, &request_headers, body)
                .await?;

            // cookies are absorbed for every response, redirects and errors
            // included
            let set_cookie = head.headers_named("set-cookie");
            if !set_cookie.is_empty() {
                self.jar().absorb(&set_cookie);
            }

            if head.is_redirect() {
                match self.next_redirect(ctx, &head, &url).await? {
                    RedirectStep::Follow(next) => {
                        url = next;
                        method = Method::GET;
                        payload = None;
                        continue;
                    }
                    RedirectStep::Restart(destination) => {
                        return Ok(Outcome::RedirectTo(destination));
                    }
                }
            }

            let response = self.dispatch(ctx, &mut connection, head).await?;
            return Ok(Outcome::Resolved(response));
        }
    }

    /// Classify a 3xx response and decide how the chain continues.
    async fn next_redirect(
        &self,
        ctx: &mut RequestContext,
        head: &ResponseHead,
        url: &Url,
    ) -> Result<RedirectStep> {
        let location = head.header("location").ok_or(Error::MissingLocation)?;

        ctx.redirect_count += 1;
        if ctx.redirect_count > REDIRECT_LIMIT {
            return Err(Error::RedirectLimit {
                count: ctx.redirect_count,
            });
        }
        tracing::debug!(
            location,
            count = ctx.redirect_count,
            "following http redirection"
        );

        // scheme-less locations resolve against the current host under https
        let destination = if location.starts_with("http") {
            location.to_string()
        } else {
            format!("https://{}{}", host_with_port(url)?, location)
        };

        if ctx.outer {
            return Ok(RedirectStep::Restart(destination));
        }

        let next = Url::parse(&destination)?;
        if let Some(proxy) = self.proxy() {
            // the old tunnel is tied to the previous target; replace it
            if let Some(old) = ctx.tunnel.take() {
                old.release().await;
            }
            let host = host_of(&next)?;
            ctx.tunnel = Some(ProxyTunnel::open(proxy, host, ctx.options.timeout).await?);
        }
        Ok(RedirectStep::Follow(next))
    }

    /// Settle a non-redirect response: stream an attachment to disk, or
    /// buffer, decode and classify by status.
    async fn dispatch(
        &self,
        ctx: &RequestContext,
        connection: &mut H1Connection,
        head: ResponseHead,
    ) -> Result<HttpResponse> {
        let attachment = head
            .header("content-disposition")
            .is_some_and(|value| value.trim().starts_with("attachment"));
        if attachment {
            let disposition = head
                .header("content-disposition")
                .unwrap_or_default()
                .to_string();
            let destination = download::resolve_download_path(
                ctx.options.download_path.as_deref(),
                &disposition,
            )?;
            download::save_body(connection, &destination).await?;
            tracing::debug!(path = %destination.display(), "attachment saved");
            return Ok(HttpResponse {
                headers: head.headers,
                payload: None,
            });
        }

        let raw = connection.read_body().await?;
        let decoded = decode_body(head.header("content-encoding"), raw)?;

        if !head.is_success() {
            if ctx.options.payload_kind == PayloadKind::Text {
                let text = String::from_utf8_lossy(&decoded);
                if !text.trim().is_empty() {
                    tracing::warn!(status = head.status, body = %text, "error response body");
                }
            }
            return Err(Error::http_status(head.status));
        }

        let payload = match ctx.options.payload_kind {
            PayloadKind::Text => {
                ResponseBody::Text(String::from_utf8_lossy(&decoded).into_owned())
            }
            PayloadKind::Binary => ResponseBody::Binary(decoded),
        };
        Ok(HttpResponse {
            headers: head.headers,
            payload: Some(payload),
        })
    }

    /// Merge caller, payload and fingerprint headers and inject the cookie
    /// header when the jar has content.
    fn build_headers(
        &self,
        ctx: &RequestContext,
        payload_headers: Vec<(String, String)>,
    ) -> Vec<(String, String)> {
        let mut merged = ctx.options.headers.clone();
        merged.extend(payload_headers);
        headers::merge_fingerprint(&mut merged, self.fingerprint_headers());
        if let Some(cookie) = self.jar().render() {
            merged.retain(|(name, _)| !name.eq_ignore_ascii_case("cookie"));
            merged.push(("Cookie".to_string(), cookie));
        }
        merged
    }

    /// Open the transport for one hop: through the active tunnel when one is
    /// attached, otherwise directly per the URL scheme.
    async fn open_connection(
        &self,
        ctx: &mut RequestContext,
        url: &Url,
    ) -> Result<H1Connection> {
        let idle = ctx.options.timeout;
        let host = host_of(url)?.to_string();

        let stream = if let Some(tunnel) = ctx.tunnel.take() {
            // TLS runs end-to-end through the proxied socket
            io_timeout(idle, self.connector().handshake(&host, tunnel.into_stream())).await?
        } else if url.scheme() == "https" {
            let port = url.port().unwrap_or(443);
            let tcp = io_timeout(idle, connector::open_tcp(&host, port)).await?;
            io_timeout(idle, self.connector().handshake(&host, tcp)).await?
        } else {
            let port = url.port().unwrap_or(80);
            MaybeTlsStream::Plain(io_timeout(idle, connector::open_tcp(&host, port)).await?)
        };

        Ok(H1Connection::new(stream, idle))
    }
}

/// Request target in origin form, honoring the ignore-query option.
fn request_path(url: &Url, ignore_query: bool) -> String {
    match (ignore_query, url.query()) {
        (false, Some(query)) => format!("{}?{}", url.path(), query),
        _ => url.path().to_string(),
    }
}

fn host_of(url: &Url) -> Result<&str> {
    url.host_str()
        .ok_or_else(|| Error::transport("target URL has no host"))
}

/// Host with explicit port when the URL carries one.
fn host_with_port(url: &Url) -> Result<String> {
    let host = host_of(url)?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

fn serialize_payload(payload: Option<Payload>) -> Result<(RequestBody, Vec<(String, String)>)> {
    match payload {
        None => Ok((RequestBody::Empty, Vec::new())),
        Some(Payload::Bytes(bytes)) => Ok((RequestBody::Bytes(bytes), Vec::new())),
        Some(Payload::Json(value)) => {
            let encoded = serde_json::to_string(&value)?;
            let content_headers = vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Content-Length".to_string(), encoded.len().to_string()),
            ];
            Ok((RequestBody::Bytes(Bytes::from(encoded)), content_headers))
        }
        Some(Payload::Stream(reader)) => Ok((RequestBody::Stream(reader), Vec::new())),
    }
}
