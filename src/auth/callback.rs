//! Authorization code exchange for the redirect URI
//!
//! [`CallbackHandler`] does not depend on any web framework: the host
//! application registers its own route and hands the raw query string (or the
//! code) to the handler, then renders [`success_page`] or [`error_page`].

use super::endpoint::{Grant, TokenEndpoint};
use super::token::TokenSet;
use crate::config::{ClientCredentials, OAuthConfig};
use crate::error::{HighLevelError, ProviderError, Result};
use crate::utils::html_escape;

/// Parameters the provider appends to the redirect URI
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    /// Authorization code, on success
    pub code: Option<String>,
    /// OAuth error code, on denial
    pub error: Option<String>,
    /// Error description, on denial
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse a redirect query string
    ///
    /// Accepts a bare query (`code=abc`), a query with a leading `?`, or a
    /// full URL.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        let query = match reqwest::Url::parse(input) {
            Ok(url) => url.query().unwrap_or_default().to_string(),
            Err(_) => input.trim_start_matches('?').to_string(),
        };

        let mut params = Self::default();
        let Ok(url) = reqwest::Url::parse(&format!("http://localhost/?{query}")) else {
            return params;
        };
        for (key, value) in url.query_pairs() {
            let value = value.trim().to_string();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "code" => params.code = Some(value),
                "error" => params.error = Some(value),
                "error_description" => params.error_description = Some(value),
                _ => {}
            }
        }
        params
    }
}

/// Exchanges the authorization code received on the redirect URI
///
/// Codes are single-use, so a failed exchange is never retried here.
#[derive(Debug, Clone)]
pub struct CallbackHandler {
    credentials: ClientCredentials,
    endpoint: TokenEndpoint,
}

impl CallbackHandler {
    /// Create a handler
    ///
    /// # Errors
    ///
    /// Returns [`HighLevelError::Configuration`] for invalid credentials or a
    /// zero timeout.
    pub fn new(credentials: ClientCredentials, config: &OAuthConfig) -> Result<Self> {
        let http_client = config.http_client()?;
        Self::with_http_client(credentials, config, http_client)
    }

    /// Create a handler sharing an existing HTTP client
    ///
    /// # Errors
    ///
    /// Returns [`HighLevelError::Configuration`] for invalid credentials.
    pub fn with_http_client(
        credentials: ClientCredentials,
        config: &OAuthConfig,
        http_client: reqwest::Client,
    ) -> Result<Self> {
        credentials.validate()?;
        Ok(Self {
            credentials,
            endpoint: TokenEndpoint::new(config, http_client),
        })
    }

    /// Exchange an authorization code for the initial token set
    ///
    /// Persisting the result is the caller's job.
    ///
    /// # Errors
    ///
    /// - [`HighLevelError::Authorization`] when the provider rejects the code
    /// - [`HighLevelError::Transport`] on network failure or timeout
    /// - [`HighLevelError::InvalidResponse`] when the success body is unusable
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        let code = code.trim();
        if code.is_empty() {
            return Err(HighLevelError::Authorization(ProviderError {
                status: 400,
                error: "invalid_request".to_string(),
                error_description: Some("missing authorization code".to_string()),
                body: String::new(),
            }));
        }

        let token = self
            .endpoint
            .request(
                Grant::AuthorizationCode {
                    code,
                    redirect_uri: self.credentials.redirect_uri(),
                },
                self.credentials.client_id(),
                self.credentials.client_secret(),
            )
            .await?;

        if token.refresh_token.is_empty() {
            return Err(HighLevelError::invalid_response(
                "Token response did not include a refresh_token",
            ));
        }

        tracing::info!(
            user_type = %token.user_type,
            account = %token.account(),
            "Authorization code exchanged"
        );
        Ok(token)
    }

    /// Handle the raw redirect query string
    ///
    /// A provider-reported error (e.g. the user denied consent) fails without
    /// touching the network.
    ///
    /// # Errors
    ///
    /// Same as [`CallbackHandler::exchange_code`].
    pub async fn handle_redirect(&self, query: &str) -> Result<TokenSet> {
        let params = CallbackParams::parse(query);

        if let Some(error) = params.error {
            tracing::warn!(error = %error, "Authorization denied on redirect");
            let body = match &params.error_description {
                Some(description) => format!("error={error}&error_description={description}"),
                None => format!("error={error}"),
            };
            return Err(HighLevelError::Authorization(ProviderError {
                status: 400,
                error,
                error_description: params.error_description,
                body,
            }));
        }

        self.exchange_code(params.code.as_deref().unwrap_or_default())
            .await
    }
}

const PAGE_STYLE: &str = "body{font-family:sans-serif;max-width:40em;margin:4em auto;color:#222}";

/// Page shown after a successful authorization
#[must_use]
pub fn success_page() -> String {
    format!(
        "<!DOCTYPE html><html><head><title>Authorization complete</title>\
         <style>{PAGE_STYLE}</style></head><body>\
         <h1>Authorization complete</h1>\
         <p>The application is connected. You may close this window.</p>\
         </body></html>"
    )
}

/// Human readable page describing why authorization did not complete
#[must_use]
pub fn error_page(error: &HighLevelError) -> String {
    let (title, advice) = match error {
        HighLevelError::Authorization(_) => (
            "Authorization failed",
            "The authorization was not granted or the code was rejected. Please start the connection again.",
        ),
        HighLevelError::ReauthorizationRequired(_)
        | HighLevelError::NotAuthenticated
        | HighLevelError::AccountMismatch { .. } => (
            "Reauthorization required",
            "Access to the account has lapsed. Please connect the application again.",
        ),
        HighLevelError::Transport(_) | HighLevelError::Api(_) => (
            "Service unavailable",
            "The authorization server could not be reached. Please try again in a moment.",
        ),
        _ => (
            "Something went wrong",
            "The authorization could not be completed.",
        ),
    };

    let detail = match error.provider_error() {
        Some(provider) => match &provider.error_description {
            Some(description) => format!("{}: {description}", provider.error),
            None => provider.error.clone(),
        },
        None => error.to_string(),
    };

    format!(
        "<!DOCTYPE html><html><head><title>{title}</title>\
         <style>{PAGE_STYLE}</style></head><body>\
         <h1>{title}</h1><p>{advice}</p><pre>{}</pre>\
         </body></html>",
        html_escape(&detail)
    )
}
