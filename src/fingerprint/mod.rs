//! Browser fingerprint configuration: profiles and cipher-suite ordering.

pub mod profiles;
pub mod tls;

pub use profiles::FingerprintProfile;
pub use tls::{reorder_cipher_list, CipherReorder, DEFAULT_CIPHER_LIST};
