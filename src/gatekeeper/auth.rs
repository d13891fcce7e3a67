//! Gatekeeper authentication
//!
//! Shared-secret check on the `x-api-key` header.

use axum::http::HeaderMap;

use crate::api::API_KEY_HEADER;

/// Check the credential header against the configured token
pub fn check_auth(headers: &HeaderMap, api_token: &str) -> bool {
    let supplied = match headers.get(API_KEY_HEADER) {
        Some(value) => value.as_bytes(),
        None => return false,
    };

    constant_time_eq(supplied, api_token.as_bytes())
}

/// Compare two byte strings without short-circuiting on the first mismatch.
/// Only the length is observable through timing.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"secure-token-123", b"secure-token-123"));
        assert!(!constant_time_eq(b"secure-token-123", b"secure-token-124"));
        assert!(!constant_time_eq(b"secure", b"secure-token-123"));
        assert!(constant_time_eq(b"", b""));
    }

    #[test]
    fn test_check_auth() {
        let mut headers = HeaderMap::new();
        assert!(!check_auth(&headers, "secure-token-123"));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("wrong"));
        assert!(!check_auth(&headers, "secure-token-123"));

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("secure-token-123"));
        assert!(check_auth(&headers, "secure-token-123"));
    }

    #[test]
    fn test_match_is_exact() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("Secure-Token-123"));
        assert!(!check_auth(&headers, "secure-token-123"));
    }
}
