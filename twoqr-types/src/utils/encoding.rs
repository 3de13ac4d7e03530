//! Utility functions for encoding datatypes in a consistent way across the `twoqr` libraries.
//!
//! Everything the device emits is URL-safe base64 without padding. Decoding accepts input with or
//! without padding since relying parties are not consistent about it, but only canonical input:
//! padding must be exactly what the length calls for and unused trailing bits must be zero. Two
//! accepted strings for the same bytes therefore only differ by their padding.

use data_encoding::{BASE64URL, BASE64URL_NOPAD};

/// The padding character of base64url.
pub const PADDING: char = '=';

/// Convert bytes to base64url without padding
pub fn base64url(data: &[u8]) -> String {
    BASE64URL_NOPAD.encode(data)
}

/// Try parsing from canonical base64url with or without padding
pub fn try_from_base64url(input: &str) -> Option<Vec<u8>> {
    let encoding = if input.ends_with(PADDING) {
        &BASE64URL
    } else {
        &BASE64URL_NOPAD
    };
    encoding.decode(input.as_bytes()).ok()
}

/// The unpadded form of base64url `input`, identical for every accepted spelling of the same
/// bytes.
pub fn unpadded(input: &str) -> &str {
    input.trim_end_matches(PADDING)
}

/// Decode base64url input which must hold exactly `N` bytes.
pub fn try_fixed_from_base64url<const N: usize>(input: &str) -> Option<[u8; N]> {
    try_from_base64url(input)?.try_into().ok()
}
