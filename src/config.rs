//! Client credentials and endpoint configuration
//!
//! [`ClientCredentials`] is the immutable identity of the marketplace app,
//! loaded once at startup and passed to every component. [`OAuthConfig`]
//! carries the endpoints, API version and network bounds.

use crate::error::{HighLevelError, Result};
use std::time::Duration;
use typed_builder::TypedBuilder;

/// Marketplace authorization page (location chooser)
pub const DEFAULT_AUTH_URL: &str = "https://marketplace.gohighlevel.com/oauth/chooselocation";
/// OAuth token endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://services.leadconnectorhq.com/oauth/token";
/// Base URL of the REST API v2
pub const DEFAULT_API_BASE_URL: &str = "https://services.leadconnectorhq.com";
/// Value of the `Version` header sent on every API call
pub const DEFAULT_API_VERSION: &str = "2021-07-28";
/// Redirect URI used by the local callback listener
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:3000/oauth/callback";

/// Scopes requested when none are configured
pub const DEFAULT_SCOPES: &[&str] = &[
    "calendars/events.readonly",
    "contacts.readonly",
    "forms.readonly",
    "invoices.readonly",
    "locations.readonly",
    "opportunities.readonly",
    "surveys.readonly",
    "workflows.readonly",
    "businesses.readonly",
    "users.readonly",
    "companies.readonly",
    "calendars.readonly",
];

/// Environment variable holding the client id
pub const ENV_CLIENT_ID: &str = "GHL_API_V2_CLIENT_ID";
/// Environment variable holding the client secret
pub const ENV_CLIENT_SECRET: &str = "GHL_API_V2_SECRET_KEY";
/// Environment variable holding the scopes (space or comma separated)
pub const ENV_SCOPES: &str = "GHL_SCOPES";
/// Environment variable holding the redirect URI
pub const ENV_REDIRECT_URI: &str = "GHL_REDIRECT_URI";

/// Marketplace app credentials
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    scopes: Vec<String>,
}

impl ClientCredentials {
    /// Create credentials from explicit values
    ///
    /// Values are not checked here; see [`ClientCredentials::validate`].
    pub fn new<I, S>(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_uri: impl Into<String>,
        scopes: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_uri: redirect_uri.into(),
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    /// Load credentials from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`HighLevelError::Configuration`] when a required variable is
    /// missing or the resulting credentials are invalid.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load credentials through an arbitrary key lookup
    ///
    /// # Errors
    ///
    /// Same as [`ClientCredentials::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| HighLevelError::configuration(format!("{key} is not set")))
        };

        let client_id = required(ENV_CLIENT_ID)?;
        let client_secret = required(ENV_CLIENT_SECRET)?;
        let redirect_uri = lookup(ENV_REDIRECT_URI)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_REDIRECT_URI.to_string());
        let scopes = match lookup(ENV_SCOPES) {
            Some(raw) => parse_scopes(&raw),
            None => DEFAULT_SCOPES.iter().map(|s| (*s).to_string()).collect(),
        };

        let credentials = Self {
            client_id,
            client_secret,
            redirect_uri,
            scopes,
        };
        credentials.validate()?;
        Ok(credentials)
    }

    /// Check that every field is usable
    ///
    /// # Errors
    ///
    /// Returns [`HighLevelError::Configuration`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(HighLevelError::configuration("client_id must not be empty"));
        }
        if self.client_secret.trim().is_empty() {
            return Err(HighLevelError::configuration(
                "client_secret must not be empty",
            ));
        }
        if self.redirect_uri.trim().is_empty() {
            return Err(HighLevelError::configuration(
                "redirect_uri must not be empty",
            ));
        }
        reqwest::Url::parse(&self.redirect_uri).map_err(|e| {
            HighLevelError::configuration(format!(
                "redirect_uri {:?} is not a valid URL: {e}",
                self.redirect_uri
            ))
        })?;
        if self.scopes.is_empty() {
            return Err(HighLevelError::configuration(
                "at least one scope must be requested",
            ));
        }
        if let Some(bad) = self
            .scopes
            .iter()
            .find(|s| s.trim().is_empty() || s.contains(char::is_whitespace))
        {
            return Err(HighLevelError::configuration(format!(
                "invalid scope {bad:?}"
            )));
        }
        Ok(())
    }

    /// OAuth client id
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// OAuth client secret
    #[must_use]
    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    /// Redirect URI registered for the app
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Requested scopes, in configured order
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Scopes joined by a single space
    #[must_use]
    pub fn scope_string(&self) -> String {
        self.scopes.join(" ")
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Split a scope list on spaces and commas, dropping empties
fn parse_scopes(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Backoff schedule for retryable failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay to wait after the given failed attempt (1-based)
    ///
    /// Doubles per attempt and is capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }
}

/// Endpoint and transport configuration
#[derive(Debug, Clone, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for OAuthConfig"),
    builder_type(doc = "Builder for OAuthConfig", vis = "pub"),
    build_method(doc = "Build the OAuthConfig")
)]
pub struct OAuthConfig {
    /// Authorization endpoint URL
    #[builder(default = DEFAULT_AUTH_URL.to_string(), setter(into))]
    pub auth_url: String,

    /// Token endpoint URL
    #[builder(default = DEFAULT_TOKEN_URL.to_string(), setter(into))]
    pub token_url: String,

    /// REST API base URL
    #[builder(default = DEFAULT_API_BASE_URL.to_string(), setter(into))]
    pub api_base_url: String,

    /// API version header value
    #[builder(default = DEFAULT_API_VERSION.to_string(), setter(into))]
    pub api_version: String,

    /// Timeout applied to every outbound HTTP call
    #[builder(default = Duration::from_secs(30))]
    pub timeout: Duration,

    /// Refresh tokens this long before they expire
    #[builder(default = Duration::from_secs(300))]
    pub refresh_margin: Duration,

    /// Backoff for retryable refresh failures
    #[builder(default)]
    pub retry: RetryPolicy,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl OAuthConfig {
    /// Build an HTTP client bounded by the configured timeout
    ///
    /// # Errors
    ///
    /// Returns [`HighLevelError::Configuration`] if the timeout is zero or
    /// the TLS backend cannot be initialised.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        if self.timeout.is_zero() {
            return Err(HighLevelError::configuration("timeout must be non-zero"));
        }
        reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| HighLevelError::configuration(format!("HTTP client: {e}")))
    }
}
