//! `OAuth2` token types and token endpoint response decoding.

use crate::error::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Response field carrying the access token.
pub const ACCESS_TOKEN: &str = "access_token";
/// Response field carrying the refresh token.
pub const REFRESH_TOKEN: &str = "refresh_token";
/// Response field carrying the access token lifetime in seconds.
pub const EXPIRES_IN: &str = "expires_in";
/// Response field carrying a provider error code.
pub const ERROR: &str = "error";
/// Response field carrying a provider error description.
pub const ERROR_DESCRIPTION: &str = "error_description";

/// The stored authorization token.
///
/// An empty access token means the token is unset and the user has to
/// go through the authorization flow before anything can be sent.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationToken {
    /// Bearer credential.
    #[serde(default)]
    pub access_token: String,
    /// Long-lived credential used to obtain new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Instant after which the access token is stale.
    #[serde(default = "unix_epoch")]
    pub expiry_time: DateTime<Utc>,
}

const fn unix_epoch() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH
}

impl Default for AuthorizationToken {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            refresh_token: None,
            expiry_time: unix_epoch(),
        }
    }
}

impl fmt::Debug for AuthorizationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationToken")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(redact))
            .field("expiry_time", &self.expiry_time)
            .finish()
    }
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() { "" } else { "<redacted>" }
}

impl AuthorizationToken {
    /// Creates a token without a refresh token.
    #[must_use]
    pub fn new(access_token: impl Into<String>, expiry_time: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expiry_time,
        }
    }

    /// Sets the refresh token.
    #[must_use]
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Returns true if no access token has been granted yet.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        self.access_token.is_empty()
    }

    /// Returns the refresh token if available.
    ///
    /// # Errors
    ///
    /// Returns an error if no refresh token is available.
    pub fn refresh_token(&self) -> Result<&str> {
        self.refresh_token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or(Error::NoRefreshToken)
    }

    /// Writes a freshly decoded grant into this token.
    ///
    /// The refresh token is only replaced when the provider rotated it.
    pub fn apply(&mut self, grant: TokenGrant) {
        self.access_token = grant.access_token;
        self.expiry_time = grant.expiry_time;
        if let Some(refresh_token) = grant.refresh_token {
            self.refresh_token = Some(refresh_token);
        }
    }
}

/// A successfully decoded token endpoint response.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenGrant {
    /// New access token.
    pub access_token: String,
    /// `now + expires_in` at the moment the response was decoded.
    pub expiry_time: DateTime<Utc>,
    /// Rotated refresh token, if the provider sent one.
    pub refresh_token: Option<String>,
}

impl fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &redact(&self.access_token))
            .field("expiry_time", &self.expiry_time)
            .field("refresh_token", &self.refresh_token.as_deref().map(redact))
            .finish()
    }
}

/// Reasons a token endpoint response could not be turned into a grant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Body is not a JSON object.
    #[error("malformed response: {body}")]
    Malformed {
        /// Raw response body.
        body: String,
    },

    /// Provider reported an error.
    #[error("{description} ({code})")]
    Provider {
        /// Error code.
        code: String,
        /// Error description.
        description: String,
    },

    /// A required field is missing or empty.
    #[error("{0}")]
    ProtocolViolation(String),
}

/// Decodes a token endpoint response body.
///
/// Used for both the authorization code exchange and the refresh.
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] if the body is not a JSON object,
/// [`DecodeError::Provider`] if it carries an `error` field, and
/// [`DecodeError::ProtocolViolation`] if `expires_in` or `access_token`
/// is missing, empty or out of range.
pub fn decode_token_response(
    body: &str,
    now: DateTime<Utc>,
) -> std::result::Result<TokenGrant, DecodeError> {
    let object = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(object)) => object,
        _ => {
            return Err(DecodeError::Malformed {
                body: body.to_string(),
            });
        }
    };

    if let Some(code) = object.get(ERROR).filter(|code| !code.is_null()) {
        return Err(DecodeError::Provider {
            code: text(code),
            description: object.get(ERROR_DESCRIPTION).map(text).unwrap_or_default(),
        });
    }

    let expires_in = object
        .get(EXPIRES_IN)
        .and_then(lifetime_seconds)
        .ok_or_else(|| missing(EXPIRES_IN))?;

    let expiry_time = Duration::try_seconds(expires_in)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .ok_or_else(|| {
            DecodeError::ProtocolViolation(format!(
                "[{EXPIRES_IN}] value {expires_in} is out of range"
            ))
        })?;

    let access_token = non_empty_str(&object, ACCESS_TOKEN).ok_or_else(|| missing(ACCESS_TOKEN))?;
    let refresh_token = non_empty_str(&object, REFRESH_TOKEN);

    Ok(TokenGrant {
        access_token,
        expiry_time,
        refresh_token,
    })
}

fn missing(field: &str) -> DecodeError {
    DecodeError::ProtocolViolation(format!(
        "[{field}] value is missing from the authorization token"
    ))
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn non_empty_str(object: &Map<String, Value>, field: &str) -> Option<String> {
    object
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

// Some providers send the lifetime as a string.
fn lifetime_seconds(value: &Value) -> Option<i64> {
    let seconds = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (seconds > 0).then_some(seconds)
}
