//! HMAC-SHA256 signing primitives.
//!
//! Inbound webhook bodies are signed by the platform with the extension's
//! API secret and the hex digest is sent in the `x-fp-signature` header.
//!
//! # Example
//!
//! ```rust
//! use fp_extension::auth::oauth::hmac::{compute_signature, constant_time_compare};
//!
//! let signature = compute_signature(b"{\"event\":{}}", "my-api-secret");
//! assert_eq!(signature.len(), 64);
//! assert!(constant_time_compare(&signature, &signature.clone()));
//! ```

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Computes the lowercase hex HMAC-SHA256 of `message` keyed with `secret`.
#[must_use]
#[allow(clippy::missing_panics_doc)] // HMAC accepts any key size, so this never panics
pub fn compute_signature(message: &[u8], secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message);
    hex::encode(mac.finalize().into_bytes())
}

/// Compares two strings in time independent of where they differ.
#[must_use]
pub fn constant_time_compare(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}
