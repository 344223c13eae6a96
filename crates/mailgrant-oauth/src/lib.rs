//! # mailgrant-oauth
//!
//! `OAuth2` token lifecycle management for outbound mail transports.
//!
//! ## Features
//!
//! - **Provider profiles**: Gmail, Outlook.com and Yahoo selected by mail host suffix,
//!   with a non-OAuth fallback
//! - **Authorization Code Flow**: redirect URL building, CSRF state nonce, grant code exchange
//! - **Token refresh**: expiry tracking with a 60 second safety margin, refresh token rotation
//! - **Serialized access**: one refresh or exchange in flight at a time
//! - **SASL mechanisms**: XOAUTH2 and OAUTHBEARER (RFC 7628) initial responses
//!
//! ## Quick Start
//!
//! ```ignore
//! use mailgrant_oauth::{AuthStatus, AuthenticationManager, OAuthClient, TokenStore, select_profile};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let profile = select_profile("smtp.gmail.com");
//!     let client = OAuthClient::new("client_id", "client_secret", "http://localhost:8080", profile);
//!     let manager = AuthenticationManager::new(client, TokenStore::in_memory());
//!
//!     match manager.ensure_authenticated().await? {
//!         AuthStatus::Ready(access_token) => println!("Send with {access_token}"),
//!         AuthStatus::AuthorizationRequired => {
//!             let request = manager.request_verification_code().await?;
//!             println!("Visit: {}", request.url);
//!             // ... the provider redirects back with `code` and `state` ...
//!             manager.handle_grant_code(Some("code"), Some(&request.state)).await?;
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Using with SMTP
//!
//! ```ignore
//! if let Some(initial_response) = manager.xoauth2_for("user@gmail.com").await? {
//!     // Send: AUTH XOAUTH2 {initial_response}
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod clock;
mod error;
pub mod flow;
pub mod manager;
pub mod provider;
pub mod refresh;
pub mod sasl;
pub mod store;
pub mod token;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{Error, REVOKED_GRANT, Result};
pub use flow::{
    AuthorizationFlow, AuthorizationRequest, FlowState, GrantCallback, GrantOutcome, OAuthClient,
    PendingAuthorization,
};
pub use manager::{AuthStatus, AuthenticationManager};
pub use provider::{EncryptionType, ProviderKind, ProviderProfile, select_profile};
pub use refresh::{SAFETY_MARGIN_SECS, TokenRefresher};
pub use store::{MemoryPersistence, TokenPersistence, TokenStore};
pub use token::{AuthorizationToken, DecodeError, TokenGrant};
