//! Transport layer: TLS connector, HTTP/1.1 exchange, CONNECT tunneling.

pub mod connector;
pub mod h1;
pub mod proxy;

use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};

/// Bound a transport operation by the call's socket-inactivity timeout.
///
/// `None` means no timeout, matching the request option's default.
pub(crate) async fn io_timeout<T>(
    idle: Option<Duration>,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    match idle {
        Some(limit) => tokio::time::timeout(limit, operation)
            .await
            .map_err(|_| Error::Timeout)?,
        None => operation.await,
    }
}
