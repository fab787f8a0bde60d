//! Browser fingerprint profiles.

use rand::Rng;

use super::tls::CipherReorder;

/// Browser identity a client context impersonates.
///
/// The profile fixes the TLS cipher-suite ordering and the static header set
/// for every request made through a context. `None` applies no mimicry at
/// all and behaves as a plain HTTPS client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FingerprintProfile {
    /// No impersonation: runtime-default ciphers, no extra headers.
    None,
    Chrome,
    Firefox,
}

impl FingerprintProfile {
    /// Pick randomly between the browser profiles (never `None`).
    ///
    /// Used when the caller does not choose an identity, so a fleet of
    /// contexts does not share a single static fingerprint.
    pub fn random_browser() -> Self {
        if rand::thread_rng().gen_bool(0.5) {
            Self::Chrome
        } else {
            Self::Firefox
        }
    }

    /// Cipher reorder rule for this profile.
    ///
    /// The three indices name which suites of the default list are moved to
    /// the front, approximating the browser's real negotiation order.
    /// `None` keeps the runtime order untouched.
    pub fn cipher_reorder(&self) -> Option<CipherReorder> {
        match self {
            Self::None => None,
            Self::Chrome => Some([2, 0, 1]),
            Self::Firefox => Some([2, 1, 0]),
        }
    }

    /// Whether this profile applies any mimicry.
    pub fn is_masked(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Short lowercase name of the profile.
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Chrome => "chrome",
            Self::Firefox => "firefox",
        }
    }
}
