//! SASL initial responses that carry the access token to the mail server.
//!
//! Implements:
//! - XOAUTH2 (Google/Microsoft/Yahoo) - `AUTH XOAUTH2`
//! - OAUTHBEARER (RFC 7628) - `AUTH OAUTHBEARER`

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Generates the XOAUTH2 initial response.
///
/// Format: `user=<user>\x01auth=Bearer <token>\x01\x01` (base64 encoded)
///
/// # Example
///
/// ```
/// use mailgrant_oauth::sasl::xoauth2_response;
///
/// let response = xoauth2_response("user@gmail.com", "ya29.a0...");
/// // Send: AUTH XOAUTH2 {response}
/// ```
#[must_use]
pub fn xoauth2_response(user: &str, access_token: &str) -> String {
    let auth_string = format!("user={user}\x01auth=Bearer {access_token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

/// Generates the OAUTHBEARER initial response (RFC 7628).
///
/// Format: `n,a=<user>,\x01auth=Bearer <token>\x01\x01` (base64 encoded)
#[must_use]
pub fn oauthbearer_response(user: &str, access_token: &str) -> String {
    let auth_string = format!("n,a={user},\x01auth=Bearer {access_token}\x01\x01");
    STANDARD.encode(auth_string.as_bytes())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn decode(response: &str) -> String {
        String::from_utf8(STANDARD.decode(response).unwrap()).unwrap()
    }

    #[test]
    fn test_xoauth2_format() {
        assert_eq!(
            decode(&xoauth2_response("test@gmail.com", "AT1")),
            "user=test@gmail.com\x01auth=Bearer AT1\x01\x01"
        );
    }

    #[test]
    fn test_oauthbearer_format() {
        assert_eq!(
            decode(&oauthbearer_response("test@live.com", "AT1")),
            "n,a=test@live.com,\x01auth=Bearer AT1\x01\x01"
        );
    }

    #[test]
    fn test_token_is_not_sent_in_clear() {
        let response = xoauth2_response("user@yahoo.com", "secret-token");
        assert!(!response.contains("secret-token"));
    }
}
