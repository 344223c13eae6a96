//! Access token expiry tracking and refresh.

use crate::clock::Clock;
use crate::error::Result;
use crate::flow::OAuthClient;
use crate::token::AuthorizationToken;
use chrono::Duration;
use tracing::{debug, info};

/// Seconds before the real expiry at which a token is already treated as expired.
///
/// Keeps the token valid for the duration of the send that is about to use it.
pub const SAFETY_MARGIN_SECS: i64 = 60;

/// Decides when a token needs refreshing and performs the refresh.
#[derive(Debug, Clone, Copy)]
pub struct TokenRefresher {
    safety_margin: Duration,
}

impl Default for TokenRefresher {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenRefresher {
    /// Creates a refresher with the standard 60 second margin.
    #[must_use]
    pub fn new() -> Self {
        Self {
            safety_margin: Duration::seconds(SAFETY_MARGIN_SECS),
        }
    }

    /// Margin subtracted from the expiry time.
    #[must_use]
    pub const fn safety_margin(&self) -> Duration {
        self.safety_margin
    }

    /// Returns true when `now > expiry_time - safety_margin`.
    ///
    /// Exactly at `expiry_time - safety_margin` the token is still valid.
    #[must_use]
    pub fn is_expired(&self, token: &AuthorizationToken, clock: &dyn Clock) -> bool {
        let now = clock.now();
        let refresh_at = token.expiry_time - self.safety_margin;
        let expired = now > refresh_at;
        debug!(
            %refresh_at,
            expires_in = (refresh_at - now).num_seconds(),
            expired,
            "Checked access token expiry"
        );
        expired
    }

    /// Requests a new access token and writes it into `token`.
    ///
    /// The refresh token is kept unless the provider sends a new one.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::NoRefreshToken`] if the token cannot refresh
    /// itself, or any error from the token endpoint. On error `token` is left
    /// untouched.
    pub async fn refresh(
        &self,
        client: &OAuthClient,
        token: &mut AuthorizationToken,
        clock: &dyn Clock,
    ) -> Result<()> {
        let refresh_token = token.refresh_token()?;
        let grant = client.refresh(refresh_token, clock).await?;
        let rotated = grant.refresh_token.is_some();
        token.apply(grant);
        info!(expiry_time = %token.expiry_time, rotated, "Refreshed access token");
        Ok(())
    }
}
