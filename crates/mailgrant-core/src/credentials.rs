//! Secure token storage using the system keyring.
//!
//! The authorization token is kept in the platform's native credential store:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use keyring::Entry;
use mailgrant_oauth::{AuthorizationToken, TokenPersistence};
use tracing::{debug, warn};

/// Service name used for keyring entries.
const SERVICE_NAME: &str = "mailgrant";

/// Credential type identifier for `OAuth2` tokens.
const OAUTH_TOKEN_CREDENTIAL: &str = "oauth_token";

/// Error type for credential operations.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// Stored token could not be encoded or decoded.
    #[error("Stored token is corrupt: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Result type for credential operations.
pub type CredentialResult<T> = std::result::Result<T, CredentialError>;

/// Generates the keyring entry key for a mail host.
fn credential_key(hostname: &str) -> String {
    format!(
        "{SERVICE_NAME}_{OAUTH_TOKEN_CREDENTIAL}_{}",
        hostname.trim().to_ascii_lowercase()
    )
}

/// Keyring-backed [`TokenPersistence`], one entry per mail host.
///
/// The token is serialized as JSON. Saving an unset token deletes the entry.
#[derive(Debug, Clone)]
pub struct KeyringPersistence {
    key: String,
}

impl KeyringPersistence {
    /// Creates persistence for the token of `hostname`.
    #[must_use]
    pub fn new(hostname: &str) -> Self {
        Self {
            key: credential_key(hostname),
        }
    }

    fn entry(&self) -> CredentialResult<Entry> {
        Ok(Entry::new(SERVICE_NAME, &self.key)?)
    }

    /// Retrieves the stored token.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring operation fails or the entry is corrupt.
    pub fn load_token(&self) -> CredentialResult<Option<AuthorizationToken>> {
        match self.entry()?.get_password() {
            Ok(token_json) => Ok(Some(serde_json::from_str(&token_json)?)),
            Err(keyring::Error::NoEntry) => {
                debug!(key = %self.key, "No OAuth2 token found");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stores the token, replacing any previous entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring operation fails.
    pub fn store_token(&self, token: &AuthorizationToken) -> CredentialResult<()> {
        let token_json = serde_json::to_string(token)?;
        self.entry()?.set_password(&token_json)?;
        debug!(key = %self.key, "Stored OAuth2 token");
        Ok(())
    }

    /// Deletes the stored token. A missing entry is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the keyring operation fails.
    pub fn clear(&self) -> CredentialResult<()> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                debug!(key = %self.key, "Deleted OAuth2 token");
                Ok(())
            }
            Err(keyring::Error::NoEntry) => {
                debug!(key = %self.key, "No OAuth2 token to delete");
                Ok(())
            }
            Err(e) => {
                warn!("Failed to delete OAuth2 token: {e}");
                Err(e.into())
            }
        }
    }
}

impl TokenPersistence for KeyringPersistence {
    fn load(&self) -> mailgrant_oauth::Result<AuthorizationToken> {
        self.load_token()
            .map(Option::unwrap_or_default)
            .map_err(|e| mailgrant_oauth::Error::Persistence(e.to_string()))
    }

    fn save(&self, token: &AuthorizationToken) -> mailgrant_oauth::Result<()> {
        let saved = if token.is_unset() {
            self.clear()
        } else {
            self.store_token(token)
        };
        saved.map_err(|e| mailgrant_oauth::Error::Persistence(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    // Note: the round-trip tests interact with the actual system keyring.
    // They are marked as ignored by default to avoid polluting the keyring
    // during automated testing. Run manually with `cargo test -- --ignored`

    use super::*;
    use chrono::{Duration, Utc};

    #[test]
    fn test_credential_key_is_per_host() {
        assert_eq!(
            credential_key(" SMTP.Gmail.com "),
            "mailgrant_oauth_token_smtp.gmail.com"
        );
        assert_ne!(credential_key("smtp.gmail.com"), credential_key("smtp.live.com"));
    }

    #[test]
    #[ignore = "Interacts with system keyring"]
    fn test_store_and_load_token() {
        let persistence = KeyringPersistence::new("test.mailgrant.invalid");
        let token = AuthorizationToken::new("AT1", Utc::now() + Duration::seconds(3600))
            .with_refresh_token("RT1");

        persistence.save(&token).unwrap();
        assert_eq!(persistence.load().unwrap(), token);

        persistence.save(&AuthorizationToken::default()).unwrap();
        assert!(persistence.load_token().unwrap().is_none());
    }

    #[test]
    #[ignore = "Interacts with system keyring"]
    fn test_delete_missing_token() {
        KeyringPersistence::new("missing.mailgrant.invalid")
            .clear()
            .unwrap();
    }
}
