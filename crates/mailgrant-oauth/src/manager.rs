//! The authentication façade consumed by the mail transport.
//!
//! [`AuthenticationManager`] ties a provider profile, the authorization flow,
//! the refresher and the token store together. A transport only ever asks it
//! three things: is a usable access token available, give it to me, and
//! where should the user be sent to authorize.

use crate::clock::{Clock, SystemClock};
use crate::error::{Error, Result};
use crate::flow::{AuthorizationFlow, AuthorizationRequest, GrantCallback, GrantOutcome, OAuthClient};
use crate::provider::ProviderProfile;
use crate::refresh::TokenRefresher;
use crate::sasl;
use crate::store::TokenStore;
use crate::token::AuthorizationToken;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of [`AuthenticationManager::ensure_authenticated`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    /// A valid access token.
    Ready(String),
    /// The user has to go through the authorization flow first.
    AuthorizationRequired,
}

impl AuthStatus {
    /// Returns the access token if ready.
    #[must_use]
    pub fn access_token(&self) -> Option<&str> {
        match self {
            Self::Ready(token) => Some(token),
            Self::AuthorizationRequired => None,
        }
    }
}

/// Single entry point for obtaining and maintaining `OAuth2` credentials.
///
/// Safe to share between concurrent senders: refreshes and grant exchanges
/// are serialized on the token store lock.
#[derive(Debug)]
pub struct AuthenticationManager {
    client: OAuthClient,
    store: TokenStore,
    flow: Mutex<AuthorizationFlow>,
    refresher: TokenRefresher,
    clock: Arc<dyn Clock>,
}

impl AuthenticationManager {
    /// Creates a manager using the wall clock.
    #[must_use]
    pub fn new(client: OAuthClient, store: TokenStore) -> Self {
        Self {
            client,
            store,
            flow: Mutex::new(AuthorizationFlow::new()),
            refresher: TokenRefresher::new(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Provider this manager authenticates against.
    #[must_use]
    pub const fn profile(&self) -> &ProviderProfile {
        &self.client.profile
    }

    /// Returns a copy of the stored token.
    pub async fn token(&self) -> AuthorizationToken {
        self.store.snapshot().await
    }

    /// Returns true if the stored access token is expired or about to expire.
    pub async fn is_access_token_expired(&self) -> bool {
        let token = self.store.lock().await;
        self.refresher.is_expired(&token, self.clock.as_ref())
    }

    /// Returns true if a redirect back from the provider is expected.
    pub async fn is_authorization_in_progress(&self) -> bool {
        self.flow.lock().await.is_in_progress()
    }

    /// Makes sure a usable access token is available, refreshing if needed.
    ///
    /// Returns [`AuthStatus::AuthorizationRequired`] when no token is stored,
    /// when the stored token cannot refresh itself, and when the provider
    /// revoked the grant (the stored token is then discarded).
    ///
    /// # Errors
    ///
    /// Network failures, timeouts and other provider errors are returned as
    /// errors. Stored credentials are kept so the send can be retried later.
    pub async fn ensure_authenticated(&self) -> Result<AuthStatus> {
        let mut token = self.store.lock().await;

        if token.is_unset() {
            debug!("No access token stored, authorization required");
            return Ok(AuthStatus::AuthorizationRequired);
        }

        // A concurrent sender may have refreshed while we waited for the lock.
        if !self.refresher.is_expired(&token, self.clock.as_ref()) {
            return Ok(AuthStatus::Ready(token.access_token.clone()));
        }

        let mut refreshed = token.clone();
        match self
            .refresher
            .refresh(&self.client, &mut refreshed, self.clock.as_ref())
            .await
        {
            Ok(()) => {
                token.replace(refreshed)?;
                Ok(AuthStatus::Ready(token.access_token.clone()))
            }
            Err(Error::NoRefreshToken) => {
                info!("Access token expired and cannot be refreshed, authorization required");
                Ok(AuthStatus::AuthorizationRequired)
            }
            Err(err) if err.is_revocation() => {
                warn!(%err, "Grant was revoked, discarding stored credentials");
                token.replace(AuthorizationToken::default())?;
                Ok(AuthStatus::AuthorizationRequired)
            }
            Err(err) => {
                warn!(%err, transient = err.is_transient(), "Access token refresh failed");
                Err(err)
            }
        }
    }

    /// Builds the provider URL the user must visit to grant access.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider does not support `OAuth2` or its
    /// authorization URL is invalid.
    pub async fn request_verification_code(&self) -> Result<AuthorizationRequest> {
        self.flow.lock().await.request_verification_code(&self.client)
    }

    /// Handles the grant code and state returned on the redirect.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StateMismatch`] for a forged or stale redirect, or any
    /// error from the token exchange.
    pub async fn handle_grant_code(
        &self,
        code: Option<&str>,
        state: Option<&str>,
    ) -> Result<GrantOutcome> {
        let mut flow = self.flow.lock().await;
        flow.handle_grant_code(&self.client, &self.store, code, state, self.clock.as_ref())
            .await
    }

    /// Handles a parsed redirect callback.
    ///
    /// # Errors
    ///
    /// See [`Self::handle_grant_code`].
    pub async fn handle_callback(&self, callback: &GrantCallback) -> Result<GrantOutcome> {
        if let Some(error) = &callback.error {
            debug!(%error, "Provider redirected back with an error");
        }
        self.handle_grant_code(callback.code.as_deref(), callback.state.as_deref())
            .await
    }

    /// Forgets the stored credentials and any pending authorization.
    ///
    /// # Errors
    ///
    /// Returns an error if the empty token cannot be persisted.
    pub async fn deauthorize(&self) -> Result<()> {
        self.flow.lock().await.cancel();
        self.store.reset().await?;
        info!(provider = ?self.profile().kind(), "Deauthorized");
        Ok(())
    }

    /// Builds the SASL XOAUTH2 initial response for `user`.
    ///
    /// Returns `None` if the user has to authorize first.
    ///
    /// # Errors
    ///
    /// See [`Self::ensure_authenticated`].
    pub async fn xoauth2_for(&self, user: &str) -> Result<Option<String>> {
        Ok(self
            .ensure_authenticated()
            .await?
            .access_token()
            .map(|token| sasl::xoauth2_response(user, token)))
    }
}
