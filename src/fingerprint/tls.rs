//! TLS cipher-suite ordering.
//!
//! Impersonation only reorders the runtime's default preference list: the
//! three suites a browser negotiates first are moved to the front in the
//! profile's order, and the remainder is appended shuffled so repeated
//! contexts do not present one identical tail.

use rand::seq::SliceRandom;

/// Indices of the default list moved to the front, in order.
pub type CipherReorder = [usize; 3];

/// Default cipher-suite preference of the runtime, TLS 1.3 suites first.
pub const DEFAULT_CIPHER_LIST: &[&str] = &[
    "TLS_AES_256_GCM_SHA384",
    "TLS_CHACHA20_POLY1305_SHA256",
    "TLS_AES_128_GCM_SHA256",
    "ECDHE-RSA-AES128-GCM-SHA256",
    "ECDHE-ECDSA-AES128-GCM-SHA256",
    "ECDHE-RSA-AES256-GCM-SHA384",
    "ECDHE-ECDSA-AES256-GCM-SHA384",
    "ECDHE-RSA-CHACHA20-POLY1305",
    "ECDHE-ECDSA-CHACHA20-POLY1305",
    "DHE-RSA-AES128-GCM-SHA256",
    "DHE-RSA-AES256-GCM-SHA384",
    "ECDHE-RSA-AES128-SHA256",
    "ECDHE-RSA-AES256-SHA384",
    "AES128-GCM-SHA256",
    "AES256-GCM-SHA384",
];

/// Build the `:`-joined cipher string for a reorder rule.
///
/// The chosen three suites lead in rule order; everything past the third
/// default entry follows in randomized order.
pub fn reorder_cipher_list(rule: CipherReorder, default_list: &[&str]) -> String {
    let mut suites = vec![
        default_list[rule[0]],
        default_list[rule[1]],
        default_list[rule[2]],
    ];
    let mut tail: Vec<&str> = default_list[3..].to_vec();
    tail.shuffle(&mut rand::thread_rng());
    suites.extend(tail);
    suites.join(":")
}
