//! Client factory and reusable client contexts.

use http::Method;
use rand::Rng;

use crate::cookie::CookieJar;
use crate::engine::{Outcome, Payload, RequestOptions};
use crate::error::{Error, Result};
use crate::fingerprint::{self, FingerprintProfile};
use crate::headers;
use crate::response::HttpResponse;
use crate::transport::connector::TlsConnector;
use crate::transport::proxy::ProxyConfig;

/// Default Chrome major version the factory impersonates.
const DEFAULT_BASE_VERSION: u32 = 138;

/// Randomization window: the effective version is base minus 0..RANGE.
const VERSION_RANGE: u32 = 5;

/// Options fixed at context construction.
#[derive(Debug, Clone, Default)]
pub struct ClientOptions {
    /// Browser identity to imitate. Default is a random pick between
    /// Chrome and Firefox.
    pub mode: Option<FingerprintProfile>,
    /// Proxy configuration for CONNECT tunneling.
    pub proxy: Option<ProxyConfig>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: FingerprintProfile) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }
}

/// Options for one-shot factory calls: per-request options plus the
/// throwaway context's options.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    pub request: RequestOptions,
    pub client: ClientOptions,
    /// GET only: replay each redirect as a brand-new top-level request.
    /// Useful behind proxies that are themselves reverse proxies and route
    /// by top-level target.
    pub redirect_as_new_request: bool,
}

impl CallOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request = self.request.header(name, value);
        self
    }

    pub fn ignore_query(mut self, ignore: bool) -> Self {
        self.request = self.request.ignore_query(ignore);
        self
    }

    pub fn download_path(mut self, path: impl Into<std::path::PathBuf>) -> Self {
        self.request = self.request.download_path(path);
        self
    }

    pub fn timeout(mut self, timeout: std::time::Duration) -> Self {
        self.request = self.request.timeout(timeout);
        self
    }

    pub fn binary(mut self) -> Self {
        self.request = self.request.binary();
        self
    }

    pub fn mode(mut self, mode: FingerprintProfile) -> Self {
        self.client = self.client.mode(mode);
        self
    }

    pub fn proxy(mut self, proxy: ProxyConfig) -> Self {
        self.client = self.client.proxy(proxy);
        self
    }

    pub fn redirect_as_new_request(mut self, enable: bool) -> Self {
        self.redirect_as_new_request = enable;
        self
    }
}

/// The caller-facing factory.
///
/// One-shot calls spin up a fresh context each (no cookie persistence
/// between them); [`Client::new_context`] yields a reusable context whose
/// cookies and fingerprint persist across calls.
#[derive(Debug, Clone)]
pub struct Client {
    base_version: u32,
}

impl Client {
    pub fn new() -> Self {
        Self {
            base_version: DEFAULT_BASE_VERSION,
        }
    }

    /// Use a different base browser version for user-agent rendering.
    pub fn with_base_version(base_version: u32) -> Self {
        Self { base_version }
    }

    /// Create a reusable context. The effective browser version is the base
    /// lowered by a random 0..=4 offset so many contexts do not share one
    /// static fingerprint.
    pub fn new_context(&self, options: ClientOptions) -> ClientContext {
        ClientContext::new(self.pick_version(), options)
    }

    /// One-shot GET with a throwaway context.
    ///
    /// With `redirect_as_new_request` set, every redirect restarts as a
    /// brand-new top-level call against the destination, reusing the same
    /// cookie jar and fingerprint; the outer hop counter feeds the next
    /// call's starting redirect count so the limit spans the whole chain.
    pub async fn get(&self, url: &str, options: CallOptions) -> Result<HttpResponse> {
        let context = self.new_context(options.client.clone());
        if !options.redirect_as_new_request {
            return context.get(url, options.request).await;
        }

        let mut outer = 0u32;
        let mut target = url.to_string();
        loop {
            let outcome = context
                .execute(Method::GET, &target, None, options.request.clone(), Some(outer))
                .await?;
            match outcome {
                Outcome::Resolved(response) => return Ok(response),
                Outcome::RedirectTo(destination) => {
                    outer += 1;
                    tracing::debug!(%destination, outer, "restarting redirect as new request");
                    target = destination;
                }
            }
        }
    }

    /// One-shot POST with a throwaway context.
    pub async fn post(
        &self,
        url: &str,
        payload: Payload,
        options: CallOptions,
    ) -> Result<HttpResponse> {
        self.new_context(options.client)
            .post(url, payload, options.request)
            .await
    }

    /// One-shot PUT with a throwaway context.
    pub async fn put(
        &self,
        url: &str,
        payload: Payload,
        options: CallOptions,
    ) -> Result<HttpResponse> {
        self.new_context(options.client)
            .put(url, payload, options.request)
            .await
    }

    fn pick_version(&self) -> u32 {
        let offset = rand::thread_rng().gen_range(0..VERSION_RANGE);
        self.base_version.saturating_sub(offset)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// A reusable client context.
///
/// The browser identity, cipher order and cookie jar are fixed at
/// construction and shared by every call made through this context. The jar
/// applies to every host the context touches, with no domain or path
/// scoping; see [`CookieJar`].
pub struct ClientContext {
    profile: FingerprintProfile,
    version: u32,
    connector: TlsConnector,
    fingerprint_headers: Vec<(String, String)>,
    proxy: Option<ProxyConfig>,
    jar: CookieJar,
}

impl ClientContext {
    fn new(version: u32, options: ClientOptions) -> Self {
        let profile = options
            .mode
            .unwrap_or_else(FingerprintProfile::random_browser);
        let cipher_list = profile.cipher_reorder().map(|rule| {
            fingerprint::reorder_cipher_list(rule, fingerprint::DEFAULT_CIPHER_LIST)
        });
        Self {
            profile,
            version,
            connector: TlsConnector::new(cipher_list),
            fingerprint_headers: headers::headers_for(profile, version),
            proxy: options.proxy,
            jar: CookieJar::new(),
        }
    }

    /// The impersonated browser identity.
    pub fn profile(&self) -> FingerprintProfile {
        self.profile
    }

    /// The effective major browser version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// The jar shared by every call on this context.
    pub fn cookie_jar(&self) -> &CookieJar {
        &self.jar
    }

    /// Request GET to the url.
    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<HttpResponse> {
        self.resolve(Method::GET, url, None, options).await
    }

    /// Request POST to the url.
    pub async fn post(
        &self,
        url: &str,
        payload: Payload,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        self.resolve(Method::POST, url, Some(payload), options).await
    }

    /// Request PUT to the url.
    pub async fn put(
        &self,
        url: &str,
        payload: Payload,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        self.resolve(Method::PUT, url, Some(payload), options).await
    }

    async fn resolve(
        &self,
        method: Method,
        url: &str,
        payload: Option<Payload>,
        options: RequestOptions,
    ) -> Result<HttpResponse> {
        match self.execute(method, url, payload, options, None).await? {
            Outcome::Resolved(response) => Ok(response),
            // unreachable without an outer redirect count
            Outcome::RedirectTo(destination) => Err(Error::http_protocol(format!(
                "unexpected redirect signal to {}",
                destination
            ))),
        }
    }

    pub(crate) fn connector(&self) -> &TlsConnector {
        &self.connector
    }

    pub(crate) fn fingerprint_headers(&self) -> &[(String, String)] {
        &self.fingerprint_headers
    }

    pub(crate) fn proxy(&self) -> Option<&ProxyConfig> {
        self.proxy.as_ref()
    }

    pub(crate) fn jar(&self) -> &CookieJar {
        &self.jar
    }
}
