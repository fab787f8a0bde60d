//! # Guise
//!
//! HTTPS client that wears a mainstream browser's network fingerprint:
//! TLS cipher-suite ordering and header mimicry for Chrome and Firefox,
//! with explicit control over proxying (HTTP CONNECT tunnels), redirects,
//! cookies and response handling (in-memory payloads or streamed
//! downloads).
//!
//! One cookie jar is shared by every call on a [`ClientContext`] and
//! applies to every host the context reaches; independent one-shot calls on
//! [`Client`] never share cookies.

pub mod client;
pub mod cookie;
pub mod download;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod fsutil;
pub mod headers;
pub mod response;
pub mod transport;

// Re-exports
pub use client::{CallOptions, Client, ClientContext, ClientOptions};
pub use cookie::CookieJar;
pub use engine::{Payload, RequestOptions};
pub use error::{Error, Result};
pub use fingerprint::FingerprintProfile;
pub use response::{HttpResponse, PayloadKind, ResponseBody};
pub use transport::proxy::{ProxyAuth, ProxyConfig};
