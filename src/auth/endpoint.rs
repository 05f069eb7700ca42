//! POST to the OAuth token endpoint and classify the outcome

use super::token::{TokenSet, unix_now};
use crate::config::OAuthConfig;
use crate::error::{HighLevelError, ProviderError, Result};

/// Grant sent to the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Grant<'a> {
    AuthorizationCode { code: &'a str, redirect_uri: &'a str },
    RefreshToken { refresh_token: &'a str },
}

impl Grant<'_> {
    fn grant_type(&self) -> &'static str {
        match self {
            Grant::AuthorizationCode { .. } => "authorization_code",
            Grant::RefreshToken { .. } => "refresh_token",
        }
    }
}

/// Thin client for the token endpoint
///
/// A 4xx answer becomes [`HighLevelError::Authorization`]; callers on the
/// refresh path re-map it. 408, 429 and 5xx answers become
/// [`HighLevelError::Api`] so they stay retryable.
#[derive(Debug, Clone)]
pub(crate) struct TokenEndpoint {
    http_client: reqwest::Client,
    token_url: String,
}

impl TokenEndpoint {
    pub(crate) fn new(config: &OAuthConfig, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            token_url: config.token_url.clone(),
        }
    }

    pub(crate) async fn request(
        &self,
        grant: Grant<'_>,
        client_id: &str,
        client_secret: &str,
    ) -> Result<TokenSet> {
        let mut form: Vec<(&str, &str)> = vec![
            ("grant_type", grant.grant_type()),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        match grant {
            Grant::AuthorizationCode { code, redirect_uri } => {
                form.push(("code", code));
                form.push(("redirect_uri", redirect_uri));
            }
            Grant::RefreshToken { refresh_token } => {
                form.push(("refresh_token", refresh_token));
            }
        }

        tracing::debug!(grant_type = grant.grant_type(), url = %self.token_url, "Requesting token");

        let response = self
            .http_client
            .post(&self.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let issued_at = unix_now();
        let response_text = response.text().await?;

        // Rate limiting and request timeouts say nothing about the grant itself
        let transient = matches!(status.as_u16(), 408 | 429);

        if status.is_client_error() && !transient {
            let error = ProviderError::from_body(status.as_u16(), response_text);
            tracing::warn!(
                grant_type = grant.grant_type(),
                status = status.as_u16(),
                error = %error.error,
                "Token endpoint rejected request"
            );
            return Err(HighLevelError::Authorization(error));
        }

        if !status.is_success() {
            tracing::warn!(
                grant_type = grant.grant_type(),
                status = status.as_u16(),
                "Token endpoint failed"
            );
            return Err(HighLevelError::api(
                status.as_u16(),
                "POST",
                &self.token_url,
                response_text,
            ));
        }

        let token = TokenSet::from_response(&response_text, issued_at).map_err(|e| {
            HighLevelError::invalid_response(format!("Failed to parse token response: {e}"))
        })?;

        if token.access_token.is_empty() {
            return Err(HighLevelError::invalid_response(
                "Token response carried an empty access_token",
            ));
        }

        Ok(token)
    }
}
