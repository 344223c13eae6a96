//! CSRF state nonce and redirect callback parameters.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;
use url::Url;
use url::form_urlencoded;

/// The one authorization attempt currently awaiting its redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAuthorization {
    state_nonce: String,
}

impl PendingAuthorization {
    /// Generates a fresh random nonce (32 bytes, URL-safe base64).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill(&mut bytes[..]);
        Self {
            state_nonce: URL_SAFE_NO_PAD.encode(bytes),
        }
    }

    /// Returns the nonce sent as the `state` parameter.
    #[must_use]
    pub fn state_nonce(&self) -> &str {
        &self.state_nonce
    }

    /// Returns true if the state returned by the provider belongs to this attempt.
    #[must_use]
    pub fn matches(&self, returned_state: Option<&str>) -> bool {
        returned_state.is_some_and(|state| state == self.state_nonce)
    }
}

/// Query parameters the provider appends to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantCallback {
    /// Grant code, absent when the user declined.
    pub code: Option<String>,
    /// Echoed state nonce.
    pub state: Option<String>,
    /// Provider error such as `access_denied`.
    pub error: Option<String>,
}

impl GrantCallback {
    /// Creates a callback from already extracted parameters.
    #[must_use]
    pub fn new(code: Option<String>, state: Option<String>) -> Self {
        Self {
            code,
            state,
            error: None,
        }
    }

    /// Parses a raw query string such as `code=abc&state=xyz`.
    #[must_use]
    pub fn from_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let mut callback = Self::default();
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            let value = Some(value.into_owned()).filter(|v| !v.is_empty());
            match key.as_ref() {
                "code" => callback.code = value,
                "state" => callback.state = value,
                "error" => callback.error = value,
                _ => {}
            }
        }
        callback
    }

    /// Parses the full redirect URL the browser landed on.
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        Self::from_query(url.query().unwrap_or_default())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_nonces_are_unique() {
        let first = PendingAuthorization::generate();
        let second = PendingAuthorization::generate();
        assert_ne!(first, second);
        assert_eq!(first.state_nonce().len(), 43);
    }

    #[test]
    fn test_matches_requires_exact_state() {
        let pending = PendingAuthorization::generate();
        let nonce = pending.state_nonce().to_string();
        assert!(pending.matches(Some(&nonce)));
        assert!(!pending.matches(Some("forged")));
        assert!(!pending.matches(None));
    }

    #[test]
    fn test_callback_from_url() {
        let url = Url::parse("http://localhost:8080/callback?code=4%2F0Ab&state=xyz&scope=mail").unwrap();
        let callback = GrantCallback::from_url(&url);
        assert_eq!(callback.code.as_deref(), Some("4/0Ab"));
        assert_eq!(callback.state.as_deref(), Some("xyz"));
        assert!(callback.error.is_none());
    }

    #[test]
    fn test_callback_denied() {
        let callback = GrantCallback::from_query("?error=access_denied&state=xyz");
        assert!(callback.code.is_none());
        assert_eq!(callback.error.as_deref(), Some("access_denied"));
    }

    #[test]
    fn test_callback_empty_code_is_absent() {
        assert!(GrantCallback::from_query("code=&state=xyz").code.is_none());
    }
}
