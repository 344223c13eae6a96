//! `OAuth2` provider profiles.
//!
//! A profile is selected from the configured mail host by suffix. Providers
//! differ only in data (endpoints, SMTP port, labels), never in protocol
//! behavior, so the whole variation lives in one table.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a provider profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Gmail.
    Google,
    /// Outlook.com / Hotmail.
    Microsoft,
    /// Yahoo Mail.
    Yahoo,
    /// Any host without `OAuth2` support.
    None,
}

/// Transport encryption used on the provider's `OAuth2` SMTP port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionType {
    /// Implicit TLS from the first byte.
    Ssl,
    /// STARTTLS upgrade.
    Tls,
    /// Plain text.
    None,
}

impl fmt::Display for EncryptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ssl => "ssl",
            Self::Tls => "tls",
            Self::None => "none",
        })
    }
}

/// Display strings shown when asking the user to register an application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileLabels {
    /// Name of the client id field in the provider's console.
    pub client_id: &'static str,
    /// Name of the client secret field.
    pub client_secret: &'static str,
    /// Name of the redirect URI field.
    pub callback_url: &'static str,
    /// Company operating the provider.
    pub owner_name: &'static str,
    /// Mail service name.
    pub service_name: &'static str,
    /// What kind of application to create.
    pub application_description: &'static str,
    /// Developer portal name.
    pub portal_name: &'static str,
    /// Developer portal URL.
    pub portal_url: &'static str,
}

struct ProfileSpec {
    kind: ProviderKind,
    host_suffix: &'static str,
    authorization_url: &'static str,
    token_url: &'static str,
    oauth_port: u16,
    encryption_type: EncryptionType,
    extra_authorization_params: &'static [(&'static str, &'static str)],
    labels: ProfileLabels,
}

const YAHOO_LABELS: ProfileLabels = ProfileLabels {
    client_id: "Consumer Key",
    client_secret: "Consumer Secret",
    callback_url: "Home Page URL",
    owner_name: "Yahoo",
    service_name: "Yahoo Mail",
    application_description: "an Application",
    portal_name: "Yahoo Developer Network",
    portal_url: "https://developer.apps.yahoo.com/projects",
};

// Order matters: first matching suffix wins.
const PROFILES: [ProfileSpec; 3] = [
    ProfileSpec {
        kind: ProviderKind::Google,
        host_suffix: "gmail.com",
        authorization_url: "https://accounts.google.com/o/oauth2/v2/auth",
        token_url: "https://oauth2.googleapis.com/token",
        oauth_port: 465,
        encryption_type: EncryptionType::Ssl,
        extra_authorization_params: &[
            ("scope", "https://mail.google.com/"),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
        labels: ProfileLabels {
            client_id: "Client ID",
            client_secret: "Client Secret",
            callback_url: "Authorized Redirect URI",
            owner_name: "Google",
            service_name: "Gmail",
            application_description: "a Client ID for web application",
            portal_name: "Google Developer Console",
            portal_url: "https://console.developers.google.com/",
        },
    },
    ProfileSpec {
        kind: ProviderKind::Microsoft,
        host_suffix: "live.com",
        authorization_url: "https://login.microsoftonline.com/common/oauth2/v2.0/authorize",
        token_url: "https://login.microsoftonline.com/common/oauth2/v2.0/token",
        oauth_port: 587,
        encryption_type: EncryptionType::Tls,
        extra_authorization_params: &[(
            "scope",
            "https://outlook.office.com/SMTP.Send offline_access",
        )],
        labels: ProfileLabels {
            client_id: "Client ID",
            client_secret: "Client secret",
            callback_url: "Redirect URL",
            owner_name: "Microsoft",
            service_name: "Outlook.com",
            application_description: "an Application",
            portal_name: "Microsoft Developer Center",
            portal_url: "https://account.live.com/developers/applications/index",
        },
    },
    ProfileSpec {
        kind: ProviderKind::Yahoo,
        host_suffix: "yahoo.com",
        authorization_url: "https://api.login.yahoo.com/oauth2/request_auth",
        token_url: "https://api.login.yahoo.com/oauth2/get_token",
        oauth_port: 465,
        encryption_type: EncryptionType::Ssl,
        extra_authorization_params: &[("language", "en-us")],
        labels: YAHOO_LABELS,
    },
];

const FALLBACK: ProfileSpec = ProfileSpec {
    kind: ProviderKind::None,
    host_suffix: "",
    authorization_url: "",
    token_url: "",
    oauth_port: 465,
    encryption_type: EncryptionType::Ssl,
    extra_authorization_params: &[],
    labels: YAHOO_LABELS,
};

/// Static facts about one `OAuth2` provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderProfile {
    kind: ProviderKind,
    authorization_url: String,
    token_url: String,
    oauth_port: u16,
    encryption_type: EncryptionType,
    extra_authorization_params: &'static [(&'static str, &'static str)],
    labels: ProfileLabels,
}

/// Selects the profile for a mail host by suffix.
///
/// `smtp.gmail.com` selects Google, `smtp.live.com` Microsoft and
/// `smtp.mail.yahoo.com` Yahoo. Anything else selects the non-OAuth profile.
#[must_use]
pub fn select_profile(hostname: &str) -> ProviderProfile {
    let host = hostname.trim().trim_end_matches('.').to_ascii_lowercase();
    PROFILES
        .iter()
        .find(|spec| host.ends_with(spec.host_suffix))
        .map_or_else(|| ProviderProfile::from_spec(&FALLBACK), ProviderProfile::from_spec)
}

impl ProviderProfile {
    fn from_spec(spec: &ProfileSpec) -> Self {
        Self {
            kind: spec.kind,
            authorization_url: spec.authorization_url.to_string(),
            token_url: spec.token_url.to_string(),
            oauth_port: spec.oauth_port,
            encryption_type: spec.encryption_type,
            extra_authorization_params: spec.extra_authorization_params,
            labels: spec.labels,
        }
    }

    /// Google profile.
    #[must_use]
    pub fn google() -> Self {
        Self::from_spec(&PROFILES[0])
    }

    /// Microsoft profile.
    #[must_use]
    pub fn microsoft() -> Self {
        Self::from_spec(&PROFILES[1])
    }

    /// Yahoo profile.
    #[must_use]
    pub fn yahoo() -> Self {
        Self::from_spec(&PROFILES[2])
    }

    /// Profile for hosts without `OAuth2`.
    #[must_use]
    pub fn non_oauth() -> Self {
        Self::from_spec(&FALLBACK)
    }

    /// Returns a copy pointing at different endpoints.
    ///
    /// Used for self-hosted gateways and for tests against a local server.
    #[must_use]
    pub fn with_endpoints(
        mut self,
        authorization_url: impl Into<String>,
        token_url: impl Into<String>,
    ) -> Self {
        self.authorization_url = authorization_url.into();
        self.token_url = token_url.into();
        self
    }

    /// Provider identity.
    #[must_use]
    pub const fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Authorization endpoint the browser is redirected to.
    #[must_use]
    pub fn authorization_url(&self) -> &str {
        &self.authorization_url
    }

    /// Token endpoint for exchange and refresh.
    #[must_use]
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// SMTP port to use with `OAuth2`.
    #[must_use]
    pub const fn oauth_port(&self) -> u16 {
        self.oauth_port
    }

    /// Encryption used on [`Self::oauth_port`].
    #[must_use]
    pub const fn encryption_type(&self) -> EncryptionType {
        self.encryption_type
    }

    /// Provider-specific query parameters appended to the authorization URL.
    #[must_use]
    pub const fn extra_authorization_params(&self) -> &'static [(&'static str, &'static str)] {
        self.extra_authorization_params
    }

    /// Display strings.
    #[must_use]
    pub const fn labels(&self) -> &ProfileLabels {
        &self.labels
    }

    /// Returns true for Gmail.
    #[must_use]
    pub fn is_google(&self) -> bool {
        self.kind == ProviderKind::Google
    }

    /// Returns true for Outlook.com.
    #[must_use]
    pub fn is_microsoft(&self) -> bool {
        self.kind == ProviderKind::Microsoft
    }

    /// Returns true for Yahoo Mail.
    #[must_use]
    pub fn is_yahoo(&self) -> bool {
        self.kind == ProviderKind::Yahoo
    }

    /// Returns true if the host supports `OAuth2` at all.
    #[must_use]
    pub fn is_oauth_host(&self) -> bool {
        self.is_google() || self.is_microsoft() || self.is_yahoo()
    }

    /// One-sentence instructions for registering an application with the provider.
    #[must_use]
    pub fn oauth_help(&self) -> String {
        let l = &self.labels;
        format!(
            "Open the {} ({}), create {} using the {} below, and enter the {} and {}. \
             See the FAQ for help on how to get a {} {}.",
            l.portal_name,
            l.portal_url,
            l.application_description,
            l.callback_url,
            l.client_id,
            l.client_secret,
            l.owner_name,
            l.client_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_google() {
        let profile = select_profile("smtp.gmail.com");
        assert!(profile.is_google());
        assert_eq!(profile.oauth_port(), 465);
        assert_eq!(profile.encryption_type(), EncryptionType::Ssl);
        assert!(profile.token_url().starts_with("https://"));
    }

    #[test]
    fn test_select_microsoft() {
        let profile = select_profile("smtp.live.com");
        assert!(profile.is_microsoft());
        assert_eq!(profile.oauth_port(), 587);
        assert_eq!(profile.encryption_type(), EncryptionType::Tls);
        assert_eq!(profile.labels().callback_url, "Redirect URL");
    }

    #[test]
    fn test_select_yahoo() {
        let profile = select_profile("smtp.mail.yahoo.com");
        assert!(profile.is_yahoo());
        assert_eq!(profile.labels().client_id, "Consumer Key");
        assert_eq!(profile.extra_authorization_params(), &[("language", "en-us")]);
    }

    #[test]
    fn test_select_is_case_insensitive() {
        assert!(select_profile("SMTP.GMAIL.COM.").is_google());
    }

    #[test]
    fn test_unknown_host_falls_back() {
        let profile = select_profile("mail.example.org");
        assert_eq!(profile.kind(), ProviderKind::None);
        assert!(!profile.is_oauth_host());
        assert!(profile.token_url().is_empty());
        assert_eq!(profile.oauth_port(), 465);
        assert_eq!(profile, ProviderProfile::non_oauth());
    }

    #[test]
    fn test_empty_host_falls_back() {
        assert!(!select_profile("").is_oauth_host());
    }

    #[test]
    fn test_with_endpoints_keeps_identity() {
        let profile = ProviderProfile::google()
            .with_endpoints("http://127.0.0.1/auth", "http://127.0.0.1/token");
        assert!(profile.is_google());
        assert_eq!(profile.token_url(), "http://127.0.0.1/token");
    }

    #[test]
    fn test_oauth_help_mentions_portal() {
        let help = ProviderProfile::microsoft().oauth_help();
        assert!(help.contains("Microsoft Developer Center"));
        assert!(help.contains("Client secret"));
    }

    #[test]
    fn test_encryption_display() {
        assert_eq!(EncryptionType::Tls.to_string(), "tls");
    }
}
