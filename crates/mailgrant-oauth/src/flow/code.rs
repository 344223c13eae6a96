//! Authorization Code Flow state machine.

use super::{OAuthClient, PendingAuthorization};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::store::TokenStore;
use tracing::{debug, error, info, warn};
use url::Url;

/// Where the authorization attempt currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowState {
    /// No attempt in flight.
    #[default]
    Idle,
    /// User was sent to the provider, waiting for the redirect back.
    AwaitingGrant,
    /// Grant code is being exchanged for tokens.
    Exchanging,
    /// Tokens were stored.
    Authorized,
    /// User declined consent.
    Denied,
    /// Returned state did not match the pending nonce.
    ForgeryRejected,
}

/// Outcome of handling the provider's redirect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// Tokens were obtained and stored.
    Authorized,
    /// No grant code was returned, the user declined. Not an error.
    Denied,
}

/// Where to send the user, and the nonce bound to that redirect.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// Provider authorization URL with all query parameters.
    pub url: Url,
    /// State nonce embedded in [`Self::url`].
    pub state: String,
}

/// Authorization Code Flow for `OAuth2`.
///
/// Holds the single pending authorization slot. Starting a new attempt
/// replaces the previous nonce, so a redirect from an older attempt is
/// rejected as a state mismatch.
#[derive(Debug, Default)]
pub struct AuthorizationFlow {
    state: FlowState,
    pending: Option<PendingAuthorization>,
}

impl AuthorizationFlow {
    /// Creates an idle flow.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: FlowState::Idle,
            pending: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> FlowState {
        self.state
    }

    /// Returns true while a redirect back from the provider is expected.
    #[must_use]
    pub fn is_in_progress(&self) -> bool {
        self.state == FlowState::AwaitingGrant
    }

    /// Drops the pending attempt, if any.
    pub fn cancel(&mut self) {
        if self.pending.take().is_some() {
            debug!("Cancelled pending authorization");
        }
        self.state = FlowState::Idle;
    }

    /// Builds the authorization URL the user should be redirected to.
    ///
    /// A fresh state nonce is generated and replaces any previous one.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider has no `OAuth2` support or its
    /// authorization URL is invalid.
    pub fn request_verification_code(&mut self, client: &OAuthClient) -> Result<AuthorizationRequest> {
        let profile = &client.profile;
        if !profile.is_oauth_host() {
            return Err(Error::NotOAuthHost(format!("{:?}", profile.kind())));
        }

        let mut url = Url::parse(profile.authorization_url())?;
        let pending = PendingAuthorization::generate();

        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("response_type", "code")
                .append_pair("redirect_uri", &client.redirect_uri)
                .append_pair("client_id", &client.client_id)
                .append_pair("state", pending.state_nonce());

            for (key, value) in profile.extra_authorization_params() {
                pairs.append_pair(key, value);
            }
        }

        if self.pending.is_some() {
            debug!("Replacing the nonce of an unfinished authorization");
        }
        let state = pending.state_nonce().to_string();
        self.pending = Some(pending);
        self.state = FlowState::AwaitingGrant;

        info!(provider = ?profile.kind(), "Requesting verification code");
        Ok(AuthorizationRequest { url, state })
    }

    /// Handles the provider's redirect back to the application.
    ///
    /// A missing code means the user declined and yields
    /// [`GrantOutcome::Denied`] without contacting the token endpoint.
    /// Otherwise the returned state must equal the pending nonce, which is
    /// consumed, and the code is exchanged while holding the token store lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StateMismatch`] if the state is absent or does not
    /// match, or any error from the token exchange.
    pub async fn handle_grant_code(
        &mut self,
        client: &OAuthClient,
        store: &TokenStore,
        code: Option<&str>,
        returned_state: Option<&str>,
        clock: &dyn Clock,
    ) -> Result<GrantOutcome> {
        let Some(code) = code.filter(|code| !code.is_empty()) else {
            debug!("Expected a grant code in the redirect but found none, user probably denied the request");
            self.pending = None;
            self.state = FlowState::Denied;
            return Ok(GrantOutcome::Denied);
        };

        let pending = self.pending.take();
        if !pending.is_some_and(|pending| pending.matches(returned_state)) {
            error!("The grant code had no matching state and may be a forgery");
            self.state = FlowState::ForgeryRejected;
            return Err(Error::StateMismatch);
        }
        debug!("Found valid state in the redirect");

        self.state = FlowState::Exchanging;
        let mut token = store.lock().await;
        let exchanged = match client.exchange_code(code, clock).await {
            Ok(grant) => {
                let mut authorized = token.clone();
                authorized.apply(grant);
                token.replace(authorized)
            }
            Err(err) => Err(err),
        };

        match exchanged {
            Ok(()) => {
                self.state = FlowState::Authorized;
                info!(
                    provider = ?client.profile.kind(),
                    refreshable = token.refresh_token().is_ok(),
                    "Authorization granted"
                );
                Ok(GrantOutcome::Authorized)
            }
            Err(err) => {
                warn!(%err, "Grant code exchange failed");
                self.state = FlowState::Idle;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::provider::ProviderProfile;
    use chrono::Duration;
    use proptest::prelude::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(profile: ProviderProfile) -> OAuthClient {
        OAuthClient::new("test_client", "test_secret", "http://localhost:8080", profile)
    }

    async fn token_server(body: &str, expected_calls: u64) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(expected_calls)
            .mount(&server)
            .await;
        server
    }

    fn mock_client(server: &MockServer) -> OAuthClient {
        client(ProviderProfile::google().with_endpoints(
            format!("{}/auth", server.uri()),
            format!("{}/token", server.uri()),
        ))
    }

    #[test]
    fn test_authorization_url() {
        let mut flow = AuthorizationFlow::new();
        let request = flow
            .request_verification_code(&client(ProviderProfile::yahoo()))
            .unwrap();
        let url = request.url.as_str();

        assert!(url.starts_with("https://api.login.yahoo.com/oauth2/request_auth?"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("client_id=test_client"));
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A8080"));
        assert!(url.contains(&format!("state={}", request.state)));
        assert!(url.contains("language=en-us"));
        assert_eq!(flow.state(), FlowState::AwaitingGrant);
        assert!(flow.is_in_progress());
    }

    #[test]
    fn test_google_extra_params() {
        let mut flow = AuthorizationFlow::new();
        let request = flow
            .request_verification_code(&client(ProviderProfile::google()))
            .unwrap();
        let url = request.url.as_str();

        assert!(url.contains("access_type=offline"));
        assert!(url.contains("prompt=consent"));
        assert!(url.contains("scope=https%3A%2F%2Fmail.google.com%2F"));
    }

    #[test]
    fn test_each_request_gets_fresh_state() {
        let mut flow = AuthorizationFlow::new();
        let client = client(ProviderProfile::microsoft());
        let first = flow.request_verification_code(&client).unwrap();
        let second = flow.request_verification_code(&client).unwrap();
        assert_ne!(first.state, second.state);
    }

    #[test]
    fn test_non_oauth_host_cannot_authorize() {
        let mut flow = AuthorizationFlow::new();
        let err = flow
            .request_verification_code(&client(ProviderProfile::non_oauth()))
            .unwrap_err();
        assert!(matches!(err, Error::NotOAuthHost(_)));
        assert_eq!(flow.state(), FlowState::Idle);
    }

    #[tokio::test]
    async fn test_missing_code_is_denied_without_exchange() {
        let server = token_server(r#"{"access_token":"AT1","expires_in":3600}"#, 0).await;
        let client = mock_client(&server);
        let store = TokenStore::in_memory();
        let mut flow = AuthorizationFlow::new();
        let request = flow.request_verification_code(&client).unwrap();

        let outcome = flow
            .handle_grant_code(&client, &store, None, Some(&request.state), &ManualClock::starting_now())
            .await
            .unwrap();

        assert_eq!(outcome, GrantOutcome::Denied);
        assert_eq!(flow.state(), FlowState::Denied);
        assert!(store.snapshot().await.is_unset());
    }

    #[tokio::test]
    async fn test_mismatched_state_is_rejected() {
        let server = token_server(r#"{"access_token":"AT1","expires_in":3600}"#, 0).await;
        let client = mock_client(&server);
        let store = TokenStore::in_memory();
        let mut flow = AuthorizationFlow::new();
        flow.request_verification_code(&client).unwrap();

        let err = flow
            .handle_grant_code(&client, &store, Some("code"), Some("forged"), &ManualClock::starting_now())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::StateMismatch));
        assert_eq!(flow.state(), FlowState::ForgeryRejected);
    }

    #[tokio::test]
    async fn test_code_without_pending_attempt_is_rejected() {
        let server = token_server(r#"{"access_token":"AT1","expires_in":3600}"#, 0).await;
        let client = mock_client(&server);
        let mut flow = AuthorizationFlow::new();

        let err = flow
            .handle_grant_code(&client, &TokenStore::in_memory(), Some("code"), Some("anything"), &ManualClock::starting_now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StateMismatch));
    }

    #[tokio::test]
    async fn test_stale_state_is_rejected_after_new_request() {
        let server = token_server(r#"{"access_token":"AT1","expires_in":3600}"#, 0).await;
        let client = mock_client(&server);
        let mut flow = AuthorizationFlow::new();
        let stale = flow.request_verification_code(&client).unwrap();
        flow.request_verification_code(&client).unwrap();

        let err = flow
            .handle_grant_code(&client, &TokenStore::in_memory(), Some("code"), Some(&stale.state), &ManualClock::starting_now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StateMismatch));
    }

    #[tokio::test]
    async fn test_successful_exchange_populates_store_and_consumes_nonce() {
        let server = token_server(
            r#"{"access_token":"AT1","expires_in":3600,"refresh_token":"RT1"}"#,
            1,
        )
        .await;
        let client = mock_client(&server);
        let store = TokenStore::in_memory();
        let clock = ManualClock::starting_now();
        let mut flow = AuthorizationFlow::new();
        let request = flow.request_verification_code(&client).unwrap();

        let outcome = flow
            .handle_grant_code(&client, &store, Some("code"), Some(&request.state), &clock)
            .await
            .unwrap();
        assert_eq!(outcome, GrantOutcome::Authorized);
        assert_eq!(flow.state(), FlowState::Authorized);

        let token = store.snapshot().await;
        assert_eq!(token.access_token, "AT1");
        assert_eq!(token.refresh_token.as_deref(), Some("RT1"));
        assert_eq!(token.expiry_time, clock.now() + Duration::seconds(3600));

        // Replaying the same redirect must fail: the nonce is single use.
        let err = flow
            .handle_grant_code(&client, &store, Some("code"), Some(&request.state), &clock)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::StateMismatch));
    }

    #[tokio::test]
    async fn test_exchange_not_kept_when_save_fails() {
        #[derive(Debug)]
        struct FailingSave;

        impl crate::store::TokenPersistence for FailingSave {
            fn load(&self) -> Result<crate::token::AuthorizationToken> {
                Ok(crate::token::AuthorizationToken::default())
            }

            fn save(&self, _token: &crate::token::AuthorizationToken) -> Result<()> {
                Err(Error::Persistence("disk full".into()))
            }
        }

        let server = token_server(
            r#"{"access_token":"AT1","expires_in":3600,"refresh_token":"RT1"}"#,
            1,
        )
        .await;
        let client = mock_client(&server);
        let store = TokenStore::open(std::sync::Arc::new(FailingSave)).unwrap();
        let mut flow = AuthorizationFlow::new();
        let request = flow.request_verification_code(&client).unwrap();

        let err = flow
            .handle_grant_code(&client, &store, Some("code"), Some(&request.state), &ManualClock::starting_now())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Persistence(_)));
        assert_eq!(flow.state(), FlowState::Idle);
        assert!(store.snapshot().await.is_unset());
    }

    #[tokio::test]
    async fn test_failed_exchange_returns_to_idle() {
        let server = token_server(r#"{"error":"invalid_grant","error_description":"Bad code"}"#, 1).await;
        let client = mock_client(&server);
        let store = TokenStore::in_memory();
        let mut flow = AuthorizationFlow::new();
        let request = flow.request_verification_code(&client).unwrap();

        let err = flow
            .handle_grant_code(&client, &store, Some("code"), Some(&request.state), &ManualClock::starting_now())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Provider { .. }));
        assert_eq!(flow.state(), FlowState::Idle);
        assert!(store.snapshot().await.is_unset());
    }

    proptest! {
        #[test]
        fn prop_foreign_state_always_mismatches(code in "[A-Za-z0-9/_-]{1,40}", forged in "[A-Za-z0-9_-]{0,43}") {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let client = client(ProviderProfile::google());
            let mut flow = AuthorizationFlow::new();
            let request = flow.request_verification_code(&client).unwrap();
            prop_assume!(forged != request.state);

            let result = runtime.block_on(flow.handle_grant_code(
                &client,
                &TokenStore::in_memory(),
                Some(&code),
                Some(&forged),
                &ManualClock::starting_now(),
            ));
            prop_assert!(matches!(result, Err(Error::StateMismatch)));
        }

        #[test]
        fn prop_missing_code_always_denied(state in proptest::option::of("[A-Za-z0-9_-]{0,43}")) {
            let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let client = client(ProviderProfile::non_oauth());
            let mut flow = AuthorizationFlow::new();

            let result = runtime.block_on(flow.handle_grant_code(
                &client,
                &TokenStore::in_memory(),
                None,
                state.as_deref(),
                &ManualClock::starting_now(),
            ));
            prop_assert_eq!(result.unwrap(), GrantOutcome::Denied);
        }
    }
}
