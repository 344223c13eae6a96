//! `OAuth2` authorization code flow and token endpoint client.

mod code;
mod state;

pub use code::{AuthorizationFlow, AuthorizationRequest, FlowState, GrantOutcome};
pub use state::{GrantCallback, PendingAuthorization};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::provider::ProviderProfile;
use crate::token::{TokenGrant, decode_token_response};
use reqwest::Client;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error};

/// Default bound on a single token endpoint request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Registered application credentials plus the provider they belong to.
///
/// The request payloads are identical for every provider; only the
/// profile's endpoints differ.
#[derive(Clone)]
pub struct OAuthClient {
    /// Client ID from provider.
    pub client_id: String,
    client_secret: String,
    /// Redirect URI registered with the provider.
    pub redirect_uri: String,
    /// Provider configuration.
    pub profile: ProviderProfile,
    request_timeout: Duration,
    http_client: Client,
}

impl fmt::Debug for OAuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthClient")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("profile", &self.profile.kind())
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl OAuthClient {
    /// Creates a new OAuth client.
    #[must_use]
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        profile: ProviderProfile,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            profile,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            http_client: Client::new(),
        }
    }

    /// Sets the bound on each token endpoint request.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Replaces the HTTP client (proxies, custom TLS roots).
    #[must_use]
    pub fn with_http_client(mut self, http_client: Client) -> Self {
        self.http_client = http_client;
        self
    }

    /// Returns the request timeout.
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Exchanges an authorization code for tokens.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be decoded.
    pub(crate) async fn exchange_code(&self, code: &str, clock: &dyn Clock) -> Result<TokenGrant> {
        debug!(provider = ?self.profile.kind(), "Exchanging authorization code");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("grant_type", "authorization_code"),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("code", code),
        ];
        self.post_token_request(&params, clock).await
    }

    /// Requests a new access token with a refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response cannot be decoded.
    pub(crate) async fn refresh(&self, refresh_token: &str, clock: &dyn Clock) -> Result<TokenGrant> {
        debug!(provider = ?self.profile.kind(), "Refreshing access token");
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
        ];
        self.post_token_request(&params, clock).await
    }

    async fn post_token_request(
        &self,
        params: &[(&str, &str)],
        clock: &dyn Clock,
    ) -> Result<TokenGrant> {
        if !self.profile.is_oauth_host() || self.profile.token_url().is_empty() {
            return Err(Error::NotOAuthHost(format!("{:?}", self.profile.kind())));
        }

        let request = async {
            let response = self
                .http_client
                .post(self.profile.token_url())
                .form(params)
                .send()
                .await?;
            let status = response.status();
            let body = response.text().await?;
            Ok::<_, Error>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| Error::Timeout(self.request_timeout.as_secs()))??;
        debug!(%status, "Token endpoint responded");

        // Providers report failures in the body regardless of status.
        let grant = decode_token_response(&body, clock.now()).map_err(Error::from);
        match &grant {
            Err(Error::MalformedResponse { body }) => {
                error!(%status, %body, "Token endpoint returned an unparsable response");
            }
            Err(Error::Provider { code, description }) => {
                error!(%code, %description, "Token endpoint reported an error");
            }
            Err(err) => error!(%err, "Token endpoint response rejected"),
            Ok(grant) => debug!(
                expires = %grant.expiry_time,
                rotated_refresh_token = grant.refresh_token.is_some(),
                "Decoded token response"
            ),
        }
        grant
    }
}
