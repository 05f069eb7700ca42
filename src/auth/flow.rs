//! Authorization request URL construction

use crate::config::{ClientCredentials, OAuthConfig};
use crate::error::Result;
use crate::utils::url_encode;

/// Query parameters sent to the authorization page
///
/// Built per redirect and never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationRequest {
    /// Always `code`
    pub response_type: &'static str,
    /// OAuth client id
    pub client_id: String,
    /// Where the provider sends the user back to
    pub redirect_uri: String,
    /// Requested scopes joined by a single space
    pub scope: String,
}

impl AuthorizationRequest {
    /// Parameters in the order they are serialized
    #[must_use]
    pub fn query_pairs(&self) -> [(&'static str, &str); 4] {
        [
            ("response_type", self.response_type),
            ("client_id", self.client_id.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", self.scope.as_str()),
        ]
    }

    /// URL-encoded query string
    #[must_use]
    pub fn to_query(&self) -> String {
        self.query_pairs()
            .iter()
            .map(|(k, v)| format!("{k}={}", url_encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Builds the URL the user visits to grant consent
///
/// Pure: no network access and no state beyond configuration, so the same
/// credentials always produce the same URL.
#[derive(Debug, Clone)]
pub struct AuthorizationFlow {
    credentials: ClientCredentials,
    auth_url: String,
}

impl AuthorizationFlow {
    /// Create a flow for the given credentials
    ///
    /// # Errors
    ///
    /// Returns [`crate::HighLevelError::Configuration`] if the credentials are
    /// invalid (e.g. an empty client id).
    pub fn new(credentials: ClientCredentials, config: &OAuthConfig) -> Result<Self> {
        credentials.validate()?;
        Ok(Self {
            credentials,
            auth_url: config.auth_url.clone(),
        })
    }

    /// The transient authorization request
    #[must_use]
    pub fn authorization_request(&self) -> AuthorizationRequest {
        AuthorizationRequest {
            response_type: "code",
            client_id: self.credentials.client_id().to_string(),
            redirect_uri: self.credentials.redirect_uri().to_string(),
            scope: self.credentials.scope_string(),
        }
    }

    /// Full authorization URL
    #[must_use]
    pub fn authorization_url(&self) -> String {
        let query = self.authorization_request().to_query();
        let separator = if self.auth_url.contains('?') { '&' } else { '?' };
        format!("{}{separator}{query}", self.auth_url)
    }

    /// Credentials this flow was built from
    #[must_use]
    pub fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }
}
