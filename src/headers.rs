//! Browser header presets for impersonated requests.
//!
//! The header set is fixed at context construction and applied to every
//! outbound request by overwrite, after caller headers: callers can add to
//! the set but cannot mask the fingerprint.

use crate::fingerprint::FingerprintProfile;

/// Chrome headers for page navigation, parameterized by major version.
///
/// The `Sec-Ch-Ua` brand list changed layout in Chrome 130, and the
/// `Priority` header only appears from Chrome 124.
pub fn chrome_headers(version: u32) -> Vec<(String, String)> {
    let brands = if version < 130 {
        format!(
            r#""Not/A)Brand";v="8", "Chromium";v="{v}", "Google Chrome";v="{v}""#,
            v = version
        )
    } else {
        format!(
            r#""Chromium";v="{v}", "Not:A-Brand";v="24", "Google Chrome";v="{v}""#,
            v = version
        )
    };
    let mut headers = vec![
        ("Accept".to_string(), "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7".to_string()),
        ("Accept-Encoding".to_string(), "gzip, deflate, br, zstd".to_string()),
        ("Accept-Language".to_string(), "en-US,en;q=0.9".to_string()),
        ("Sec-Ch-Ua".to_string(), brands),
        ("Sec-Ch-Ua-Mobile".to_string(), "?0".to_string()),
        ("Sec-Ch-Ua-Platform".to_string(), r#""Windows""#.to_string()),
        ("Sec-Fetch-Dest".to_string(), "document".to_string()),
        ("Sec-Fetch-Mode".to_string(), "navigate".to_string()),
        ("Sec-Fetch-Site".to_string(), "none".to_string()),
        ("Sec-Fetch-User".to_string(), "?1".to_string()),
        ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
        ("User-Agent".to_string(), format!(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{version}.0.0.0 Safari/537.36"
        )),
    ];
    if version >= 124 {
        headers.push(("Priority".to_string(), "u=0, i".to_string()));
    }
    headers
}

/// Firefox headers for page navigation, parameterized by major version.
///
/// Firefox never emits the Chromium-only `Sec-Ch-Ua*`/`Priority` headers.
pub fn firefox_headers(version: u32) -> Vec<(String, String)> {
    vec![
        ("Accept".to_string(), "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8".to_string()),
        ("Accept-Encoding".to_string(), "gzip, deflate, br".to_string()),
        ("Accept-Language".to_string(), "en-US,en;q=0.5".to_string()),
        ("Sec-Fetch-Dest".to_string(), "document".to_string()),
        ("Sec-Fetch-Mode".to_string(), "navigate".to_string()),
        ("Sec-Fetch-Site".to_string(), "none".to_string()),
        ("Sec-Fetch-User".to_string(), "?1".to_string()),
        ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
        ("User-Agent".to_string(), format!(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:{version}.0) Gecko/20100101 Firefox/{version}.0"
        )),
    ]
}

/// Fingerprint header set for a profile; `None` contributes nothing.
pub fn headers_for(profile: FingerprintProfile, version: u32) -> Vec<(String, String)> {
    match profile {
        FingerprintProfile::Chrome => chrome_headers(version),
        FingerprintProfile::Firefox => firefox_headers(version),
        FingerprintProfile::None => Vec::new(),
    }
}

/// Apply the fingerprint set over caller headers by overwrite.
pub fn merge_fingerprint(base: &mut Vec<(String, String)>, fingerprint: &[(String, String)]) {
    for (name, value) in fingerprint {
        base.retain(|(existing, _)| !existing.eq_ignore_ascii_case(name));
        base.push((name.clone(), value.clone()));
    }
}
