//! Refresh-token exchange, one request in flight at a time

use super::endpoint::{Grant, TokenEndpoint};
use super::token::{TokenSet, unix_now};
use crate::config::{ClientCredentials, OAuthConfig, RetryPolicy};
use crate::error::{HighLevelError, ProviderError, Result};
use std::time::Instant;
use tokio::sync::Mutex;

/// Outcome of the most recent refresh, keyed by the refresh token it consumed
#[derive(Debug)]
struct LastRefresh {
    consumed: String,
    completed_at: Instant,
    outcome: std::result::Result<TokenSet, ProviderError>,
}

impl LastRefresh {
    /// Whether a caller that asked at `requested_at` may take this result
    ///
    /// Rejections are final. A success is shared with callers that were
    /// already waiting when it landed, and with anyone still holding the
    /// token it rotated away. A non-rotating refresh is never replayed to
    /// later callers, who want a fresh access token.
    fn reusable_for(&self, requested_at: Instant) -> Option<Result<TokenSet>> {
        match &self.outcome {
            Err(rejection) => Some(Err(HighLevelError::ReauthorizationRequired(
                rejection.clone(),
            ))),
            Ok(token) if token.is_expired_at(unix_now()) => None,
            Ok(token) => {
                let waited = self.completed_at >= requested_at;
                let rotated = token.refresh_token != self.consumed;
                (waited || rotated).then(|| Ok(token.clone()))
            }
        }
    }
}

/// Exchanges a refresh token for a new token set
///
/// All refreshes through one refresher are serialized. A caller that arrives
/// while a refresh for the same refresh token is in flight waits for it and
/// receives its result instead of sending a second request, which would
/// present an already-rotated token to the provider. Once no one is waiting,
/// a refresh token the provider did not rotate is exchanged again.
#[derive(Debug)]
pub struct TokenRefresher {
    credentials: ClientCredentials,
    endpoint: TokenEndpoint,
    retry: RetryPolicy,
    last: Mutex<Option<LastRefresh>>,
}

impl TokenRefresher {
    /// Create a refresher
    ///
    /// # Errors
    ///
    /// Returns [`HighLevelError::Configuration`] for invalid credentials or a
    /// zero timeout.
    pub fn new(credentials: ClientCredentials, config: &OAuthConfig) -> Result<Self> {
        let http_client = config.http_client()?;
        Self::with_http_client(credentials, config, http_client)
    }

    /// Create a refresher sharing an existing HTTP client
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
            retry: config.retry,
            last: Mutex::new(None),
        })
    }

    /// Exchange `refresh_token` for a new token set
    ///
    /// If the response omits `refresh_token`, the one passed in is kept.
    ///
    /// # Errors
    ///
    /// - [`HighLevelError::ReauthorizationRequired`] when the refresh token is
    ///   revoked or expired
    /// - [`HighLevelError::Transport`] on network failure or timeout
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        if refresh_token.trim().is_empty() {
            return Err(HighLevelError::ReauthorizationRequired(ProviderError {
                status: 400,
                error: "invalid_request".to_string(),
                error_description: Some("missing refresh token".to_string()),
                body: String::new(),
            }));
        }

        let requested_at = Instant::now();
        let mut last = self.last.lock().await;

        if let Some(reused) = last
            .as_ref()
            .filter(|p| p.consumed == refresh_token)
            .and_then(|p| p.reusable_for(requested_at))
        {
            tracing::debug!(ok = reused.is_ok(), "Reusing completed refresh for this token");
            return reused;
        }

        let result = self
            .endpoint
            .request(
                Grant::RefreshToken { refresh_token },
                self.credentials.client_id(),
                self.credentials.client_secret(),
            )
            .await;

        match result {
            Ok(token) => {
                let token = token.inherit_refresh_token(refresh_token);
                tracing::debug!(
                    account = %token.account(),
                    rotated = token.refresh_token != refresh_token,
                    "Token refreshed"
                );
                *last = Some(LastRefresh {
                    consumed: refresh_token.to_string(),
                    completed_at: Instant::now(),
                    outcome: Ok(token.clone()),
                });
                Ok(token)
            }
            Err(HighLevelError::Authorization(rejection)) => {
                tracing::warn!(error = %rejection.error, "Refresh token rejected");
                *last = Some(LastRefresh {
                    consumed: refresh_token.to_string(),
                    completed_at: Instant::now(),
                    outcome: Err(rejection.clone()),
                });
                Err(HighLevelError::ReauthorizationRequired(rejection))
            }
            Err(e) => Err(e),
        }
    }

    /// Refresh, retrying transport and server failures with exponential backoff
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted, or the first
    /// non-retryable error.
    pub async fn refresh_with_retry(&self, refresh_token: &str) -> Result<TokenSet> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.refresh(refresh_token).await {
                Ok(token) => return Ok(token),
                Err(err) if err.is_retryable() && attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt);
                    tracing::warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Token refresh failed; retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Credentials this refresher was built from
    #[must_use]
    pub fn credentials(&self) -> &ClientCredentials {
        &self.credentials
    }
}
