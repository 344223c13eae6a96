//! # mailgrant-core
//!
//! Glue between the `OAuth2` token lifecycle and the local machine.
//!
//! This crate provides:
//! - Settings for one outbound mail host, stored as JSON
//! - Keyring-backed token persistence
//! - Construction of a ready-to-use [`AuthenticationManager`]

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod config;
pub mod credentials;
mod error;

use std::sync::Arc;

use mailgrant_oauth::{AuthenticationManager, TokenStore};

pub use config::{
    OAuthSettings, SettingsError, load_settings, load_settings_from, save_settings,
    save_settings_to, settings_path,
};
pub use credentials::{CredentialError, CredentialResult, KeyringPersistence};
pub use error::{Error, Result};

/// Opens the authentication manager for `settings`, loading any token the
/// keyring holds for the configured host.
///
/// # Errors
///
/// Returns an error if the settings are invalid or the keyring cannot be read.
pub fn open_manager(settings: &OAuthSettings) -> Result<AuthenticationManager> {
    let client = settings.client()?;
    let persistence = Arc::new(KeyringPersistence::new(&settings.hostname));
    let store = TokenStore::open(persistence)?;

    tracing::debug!(hostname = %settings.hostname, "Opened authentication manager");
    Ok(AuthenticationManager::new(client, store))
}
