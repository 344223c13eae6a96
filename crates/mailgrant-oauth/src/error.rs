//! Error types for `OAuth2` token lifecycle operations.

use crate::token::DecodeError;

/// Result type alias for `OAuth2` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Provider error code reported when a grant or refresh token has been revoked.
pub const REVOKED_GRANT: &str = "invalid_grant";

/// `OAuth2` error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Token endpoint did not answer in time.
    #[error("Token endpoint did not respond within {0} seconds")]
    Timeout(u64),

    /// Returned state does not match the pending nonce.
    #[error("Authorization state mismatch, the grant code may be a forgery")]
    StateMismatch,

    /// Token endpoint returned something that is not a JSON object.
    #[error("Malformed token response: {body}")]
    MalformedResponse {
        /// Raw response body, kept for diagnostics.
        body: String,
    },

    /// Token response is missing a required field.
    #[error("Token response violates the protocol: {0}")]
    ProtocolViolation(String),

    /// `OAuth2` error reported by the provider.
    #[error("OAuth2 error: {code} - {description}")]
    Provider {
        /// Error code (e.g., `invalid_grant`).
        code: String,
        /// Human-readable description.
        description: String,
    },

    /// No refresh token available.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The configured mail host has no `OAuth2` provider.
    #[error("Host {0} does not support OAuth2")]
    NotOAuthHost(String),

    /// URL parsing error.
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Durable token storage failed.
    #[error("Token persistence error: {0}")]
    Persistence(String),
}

impl Error {
    /// Creates a provider error from error code and description.
    #[must_use]
    pub fn provider(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Provider {
            code: code.into(),
            description: description.into(),
        }
    }

    /// Returns true if the provider revoked the stored grant.
    ///
    /// Stored credentials are useless after this and the user has to authorize again.
    #[must_use]
    pub fn is_revocation(&self) -> bool {
        matches!(self, Self::Provider { code, .. } if code == REVOKED_GRANT)
    }

    /// Returns true if retrying the outer send later may succeed without re-authorization.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) => true,
            Self::Provider { .. } => !self.is_revocation(),
            _ => false,
        }
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::Malformed { body } => Self::MalformedResponse { body },
            DecodeError::Provider { code, description } => Self::Provider { code, description },
            DecodeError::ProtocolViolation(reason) => Self::ProtocolViolation(reason),
        }
    }
}
