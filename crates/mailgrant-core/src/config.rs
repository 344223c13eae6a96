//! `OAuth2` settings for one outbound mail host.
//!
//! Settings live as pretty-printed JSON in the user's config directory. The
//! client secret is stored alongside the other settings; the tokens issued
//! for them go to the keyring (see [`crate::credentials`]).

use std::path::{Path, PathBuf};
use std::time::Duration;

use mailgrant_oauth::{OAuthClient, ProviderProfile, select_profile};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};

/// Default bound on each token endpoint request, in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

/// Settings entered when registering the application with a provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthSettings {
    /// Outbound mail host, e.g. `smtp.gmail.com`.
    pub hostname: String,
    /// Client ID issued by the provider.
    pub client_id: String,
    /// Client secret issued by the provider.
    pub client_secret: String,
    /// Redirect URI registered with the provider.
    pub redirect_uri: String,
    /// Sender address used for SASL authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_email: Option<String>,
    /// Bound on each token endpoint request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for OAuthSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthSettings")
            .field("hostname", &self.hostname)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("redirect_uri", &self.redirect_uri)
            .field("sender_email", &self.sender_email)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// A field of [`OAuthSettings`] that fails validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// Hostname is empty.
    EmptyHostname,
    /// Hostname has no `OAuth2` provider.
    UnsupportedHost,
    /// Client ID is empty.
    EmptyClientId,
    /// Client secret is empty.
    EmptyClientSecret,
    /// Redirect URI is not an absolute URL.
    InvalidRedirectUri,
    /// Request timeout is zero.
    ZeroTimeout,
}

impl SettingsError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyHostname => "Mail host is required",
            Self::UnsupportedHost => "Mail host does not support OAuth2",
            Self::EmptyClientId => "Client ID is required",
            Self::EmptyClientSecret => "Client secret is required",
            Self::InvalidRedirectUri => "Redirect URI must be an absolute URL",
            Self::ZeroTimeout => "Request timeout must be at least one second",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyHostname | Self::UnsupportedHost => "hostname",
            Self::EmptyClientId => "client_id",
            Self::EmptyClientSecret => "client_secret",
            Self::InvalidRedirectUri => "redirect_uri",
            Self::ZeroTimeout => "request_timeout_secs",
        }
    }
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for SettingsError {}

impl OAuthSettings {
    /// Creates settings with the default request timeout.
    #[must_use]
    pub fn new(
        hostname: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            sender_email: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }

    /// Sets the sender address.
    #[must_use]
    pub fn with_sender_email(mut self, sender: impl Into<String>) -> Self {
        self.sender_email = Some(sender.into());
        self
    }

    /// Profile selected for the configured host.
    #[must_use]
    pub fn profile(&self) -> ProviderProfile {
        select_profile(&self.hostname)
    }

    /// Checks every field.
    ///
    /// # Errors
    ///
    /// Returns all failing fields at once.
    pub fn validate(&self) -> std::result::Result<(), Vec<SettingsError>> {
        let mut errors = Vec::new();

        if self.hostname.trim().is_empty() {
            errors.push(SettingsError::EmptyHostname);
        } else if !self.profile().is_oauth_host() {
            errors.push(SettingsError::UnsupportedHost);
        }
        if self.client_id.trim().is_empty() {
            errors.push(SettingsError::EmptyClientId);
        }
        if self.client_secret.is_empty() {
            errors.push(SettingsError::EmptyClientSecret);
        }
        if Url::parse(&self.redirect_uri).is_err() {
            errors.push(SettingsError::InvalidRedirectUri);
        }
        if self.request_timeout_secs == 0 {
            errors.push(SettingsError::ZeroTimeout);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Builds the token endpoint client for these settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] listing every invalid field.
    pub fn client(&self) -> Result<OAuthClient> {
        self.validate().map_err(|errors| {
            let messages: Vec<&str> = errors.iter().map(SettingsError::message).collect();
            Error::Config(messages.join("; "))
        })?;

        Ok(OAuthClient::new(
            self.client_id.trim(),
            self.client_secret.as_str(),
            self.redirect_uri.as_str(),
            self.profile(),
        )
        .with_request_timeout(Duration::from_secs(self.request_timeout_secs)))
    }
}

/// Default location of the settings file.
#[must_use]
pub fn settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailgrant")
        .join("settings.json")
}

/// Loads settings from the default location.
///
/// # Errors
///
/// See [`load_settings_from`].
pub async fn load_settings() -> Result<Option<OAuthSettings>> {
    load_settings_from(&settings_path()).await
}

/// Loads settings from `path`. A missing file yields `None`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid settings JSON.
pub async fn load_settings_from(path: &Path) -> Result<Option<OAuthSettings>> {
    let contents = match tokio::fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    Ok(Some(serde_json::from_str(&contents)?))
}

/// Saves settings to the default location.
///
/// # Errors
///
/// See [`save_settings_to`].
pub async fn save_settings(settings: &OAuthSettings) -> Result<PathBuf> {
    let path = settings_path();
    save_settings_to(&path, settings).await?;
    Ok(path)
}

/// Saves settings to `path`, creating parent directories.
///
/// # Errors
///
/// Returns an error if the directory or file cannot be written.
pub async fn save_settings_to(path: &Path, settings: &OAuthSettings) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let contents = serde_json::to_string_pretty(settings)?;
    tokio::fs::write(path, contents).await?;

    tracing::info!("Settings saved to {:?}", path);
    Ok(())
}
