//! Cookie jar shared by every call on one client context.
//!
//! This is deliberately not an RFC 6265 store: cookies are flattened into a
//! single name/value map with no domain or path scoping, so a cookie set by
//! one host is sent to every host the context touches, including redirect
//! targets. Expiry is coarse as well: a past `expires` attribute discards
//! the whole jar, not one key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDateTime, Utc};

/// Well-known attributes that never become jar entries.
const DROPPED_ATTRIBUTES: &[&str] = &["secure", "path", "domain", "samesite"];

/// Bookkeeping keys stored in the jar but never rendered.
const RESERVED_KEYS: &[&str] = &["expires", "max-age"];

/// Best-effort cookie store, cloned handles share one map.
#[derive(Debug, Clone, Default)]
pub struct CookieJar {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `Set-Cookie` header values into the jar.
    ///
    /// Each line is split on `;`; within a segment the first `=` delimits
    /// name and value (the value may contain further `=`). Names are
    /// trimmed and lower-cased. Segments without `=` and the well-known
    /// non-value attributes are skipped; `expires`/`max-age` are retained
    /// to gate expiry.
    pub fn absorb<S: AsRef<str>>(&self, set_cookie: &[S]) {
        let mut jar = self.inner.lock().expect("cookie jar mutex poisoned");
        for segment in set_cookie.iter().flat_map(|line| line.as_ref().split(';')) {
            let Some(idx) = segment.find('=') else {
                continue;
            };
            let name = segment[..idx].trim().to_lowercase();
            if name.is_empty() || DROPPED_ATTRIBUTES.contains(&name.as_str()) {
                continue;
            }
            jar.insert(name, segment[idx + 1..].to_string());
        }
        tracing::debug!(count = jar.len(), "stored cookies from set-cookie headers");
    }

    /// Render the `Cookie` request header value.
    ///
    /// Expiry is checked lazily here: an `expires` entry at or before now
    /// discards the entire jar and yields nothing for this call. The
    /// bookkeeping keys are never rendered.
    pub fn render(&self) -> Option<String> {
        let mut jar = self.inner.lock().expect("cookie jar mutex poisoned");
        if let Some(expires) = jar.get("expires") {
            if parse_expires(expires).is_some_and(|at| at <= Utc::now()) {
                jar.clear();
                tracing::debug!("cookies cleared due to an expiration");
                return None;
            }
        }
        let header = jar
            .iter()
            .filter(|(name, _)| !RESERVED_KEYS.contains(&name.as_str()))
            .map(|(name, value)| format!("{}={};", name, value))
            .collect::<Vec<_>>()
            .join(" ");
        if header.is_empty() {
            None
        } else {
            Some(header)
        }
    }

    /// Look up a stored value by (lower-cased) name.
    pub fn get(&self, name: &str) -> Option<String> {
        let jar = self.inner.lock().expect("cookie jar mutex poisoned");
        jar.get(&name.to_lowercase()).cloned()
    }

    pub fn clear(&self) {
        self.inner.lock().expect("cookie jar mutex poisoned").clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("cookie jar mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Parse an `expires` attribute value. Unparseable dates never expire.
fn parse_expires(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ["%A, %d-%b-%y %H:%M:%S GMT", "%a, %d-%b-%Y %H:%M:%S GMT"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Some(parsed.and_utc());
        }
    }
    None
}
