//! Error types for the HighLevel SDK

use crate::auth::TokenStoreError;
use thiserror::Error;

/// Error payload returned by the OAuth token endpoint
///
/// Keeps the raw response body so callers can log or display the provider's
/// own diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    /// HTTP status returned by the provider
    pub status: u16,
    /// OAuth error code (e.g. `invalid_grant`)
    pub error: String,
    /// Human readable description, when the provider sent one
    pub error_description: Option<String>,
    /// Raw response body
    pub body: String,
}

impl ProviderError {
    /// Build a provider error from a status code and raw body
    ///
    /// Understands both the RFC 6749 shape (`error` / `error_description`) and
    /// the HighLevel API shape (`error` / `message`). Falls back to the raw
    /// body when neither is present.
    #[must_use]
    pub fn from_body(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        let parsed = serde_json::from_str::<serde_json::Value>(&body).ok();

        let field = |name: &str| {
            parsed
                .as_ref()
                .and_then(|v| v.get(name))
                .and_then(|v| match v {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Array(items) => Some(
                        items
                            .iter()
                            .filter_map(|i| i.as_str())
                            .collect::<Vec<_>>()
                            .join("; "),
                    ),
                    _ => None,
                })
                .filter(|s| !s.is_empty())
        };

        let description = field("error_description").or_else(|| field("message"));
        let error = field("error")
            .or_else(|| description.clone())
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("HTTP {status}")
                } else {
                    body.trim().to_string()
                }
            });

        Self {
            status,
            error,
            error_description: description,
            body,
        }
    }

    /// The provider's error code
    #[must_use]
    pub fn message(&self) -> &str {
        &self.error
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)
    }
}

/// Unsuccessful call to the HighLevel REST API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status code
    pub status: u16,
    /// HTTP method of the failed call
    pub method: String,
    /// Path or URL of the failed call
    pub path: String,
    /// Raw response body
    pub body: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} returned HTTP {}: {}",
            self.method,
            self.path,
            self.status,
            crate::utils::truncate_for_display(&self.body, 200)
        )
    }
}

/// Main error type for the HighLevel SDK
#[derive(Error, Debug)]
pub enum HighLevelError {
    /// Missing or invalid client configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// The provider rejected the authorization code or the user denied consent
    #[error("Authorization failed: {0}")]
    Authorization(ProviderError),

    /// The refresh token is no longer accepted; the user must consent again
    #[error("Reauthorization required: {0}")]
    ReauthorizationRequired(ProviderError),

    /// No token set has been stored yet
    #[error("Not authenticated. Complete the authorization flow first.")]
    NotAuthenticated,

    /// Network failure or timeout talking to the provider
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a body that could not be understood
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Call to the HighLevel API was unsuccessful
    #[error("API error: {0}")]
    Api(ApiError),

    /// A refreshed token set belongs to a different account than the stored one
    #[error("Account mismatch: expected {expected}, got {actual}")]
    AccountMismatch {
        /// Account the stored token set was issued for
        expected: String,
        /// Account the new token set was issued for
        actual: String,
    },

    /// Token persistence failed
    #[error("Token storage error: {0}")]
    Storage(#[from] TokenStoreError),

    /// JSON encode/decode error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for HighLevel SDK operations
pub type Result<T> = std::result::Result<T, HighLevelError>;

impl HighLevelError {
    /// Create a configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create an invalid response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create an API error
    pub fn api(
        status: u16,
        method: impl Into<String>,
        path: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self::Api(ApiError {
            status,
            method: method.into(),
            path: path.into(),
            body: body.into(),
        })
    }

    /// Create an account mismatch error
    pub fn account_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::AccountMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Whether repeating the same call may succeed
    ///
    /// Only transport failures, request timeouts, rate limiting and server
    /// errors qualify.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api(err) => matches!(err.status, 408 | 429) || err.status >= 500,
            _ => false,
        }
    }

    /// Whether the caller has to send the user through the authorization flow again
    #[must_use]
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self,
            Self::ReauthorizationRequired(_) | Self::NotAuthenticated | Self::AccountMismatch { .. }
        )
    }

    /// Raw provider payload attached to this error, if any
    #[must_use]
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Authorization(err) | Self::ReauthorizationRequired(err) => Some(err),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_error_oauth_shape() {
        let err = ProviderError::from_body(
            400,
            r#"{"error":"invalid_grant","error_description":"Invalid refresh token"}"#,
        );
        assert_eq!(err.error, "invalid_grant");
        assert_eq!(err.error_description.as_deref(), Some("Invalid refresh token"));
        assert_eq!(err.to_string(), "invalid_grant");
    }

    #[test]
    fn test_provider_error_api_shape() {
        let err = ProviderError::from_body(
            422,
            r#"{"statusCode":422,"message":["code must be a string"],"error":"Unprocessable Entity"}"#,
        );
        assert_eq!(err.error, "Unprocessable Entity");
        assert_eq!(err.error_description.as_deref(), Some("code must be a string"));
    }

    #[test]
    fn test_provider_error_plain_body() {
        let err = ProviderError::from_body(401, "Unauthorized");
        assert_eq!(err.error, "Unauthorized");
        assert!(err.error_description.is_none());

        let err = ProviderError::from_body(401, "");
        assert_eq!(err.error, "HTTP 401");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(HighLevelError::api(503, "POST", "/oauth/token", "").is_retryable());
        assert!(HighLevelError::api(429, "GET", "/contacts", "").is_retryable());
        assert!(HighLevelError::api(408, "POST", "/oauth/token", "").is_retryable());
        assert!(!HighLevelError::api(404, "GET", "/contacts", "").is_retryable());
        assert!(!HighLevelError::configuration("missing client_id").is_retryable());

        let reauth =
            HighLevelError::ReauthorizationRequired(ProviderError::from_body(401, "{}"));
        assert!(!reauth.is_retryable());
        assert!(reauth.requires_reauthorization());
    }

    #[test]
    fn test_provider_error_accessor() {
        let err = HighLevelError::Authorization(ProviderError::from_body(
            400,
            r#"{"error":"invalid_request"}"#,
        ));
        assert_eq!(err.provider_error().map(ProviderError::message), Some("invalid_request"));
        assert!(HighLevelError::NotAuthenticated.provider_error().is_none());
    }
}
