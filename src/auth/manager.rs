//! Keeps a valid access token available on top of a [`TokenStore`]

use super::refresh::TokenRefresher;
use super::store::TokenStore;
use super::token::{TokenSet, unix_now};
use crate::error::{HighLevelError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Hands out access tokens, refreshing them before they expire
///
/// Refreshes are serialized: a caller that finds the token stale takes the
/// refresh lock and re-reads the store, so callers queued behind an
/// in-flight refresh pick up its result instead of refreshing again.
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    refresher: TokenRefresher,
    refresh_margin: Duration,
    refresh_lock: Mutex<()>,
}

impl std::fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenManager")
            .field("store", &"<token store>")
            .field("refresher", &self.refresher)
            .field("refresh_margin", &self.refresh_margin)
            .finish()
    }
}

impl TokenManager {
    /// Create a manager over `store`
    pub fn new(
        store: Arc<dyn TokenStore>,
        refresher: TokenRefresher,
        refresh_margin: Duration,
    ) -> Self {
        Self {
            store,
            refresher,
            refresh_margin,
            refresh_lock: Mutex::new(()),
        }
    }

    /// The underlying store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Persist the token set obtained from the initial code exchange
    ///
    /// # Errors
    ///
    /// Returns [`HighLevelError::Storage`] if the store fails.
    pub async fn store_initial(&self, token: &TokenSet) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        self.store.save(token).await?;
        tracing::info!(account = %token.account(), "Token set stored");
        Ok(())
    }

    /// Whether a token set is stored (it may still need a refresh)
    pub async fn is_authenticated(&self) -> bool {
        matches!(self.store.get_current().await, Ok(Some(_)))
    }

    /// A token set whose access token is valid for at least the refresh margin
    ///
    /// # Errors
    ///
    /// - [`HighLevelError::NotAuthenticated`] when nothing is stored
    /// - [`HighLevelError::ReauthorizationRequired`] when the refresh token is dead
    /// - [`HighLevelError::Transport`] when refreshing failed after retries
    pub async fn valid_token(&self) -> Result<TokenSet> {
        let current = self.current().await?;
        if !current.needs_refresh_at(unix_now(), self.refresh_margin) {
            return Ok(current);
        }

        let _guard = self.refresh_lock.lock().await;
        let current = self.current().await?;
        if !current.needs_refresh_at(unix_now(), self.refresh_margin) {
            tracing::debug!("Token refreshed by another caller");
            return Ok(current);
        }

        self.refresh_locked(&current).await
    }

    /// Refresh regardless of remaining lifetime
    ///
    /// # Errors
    ///
    /// Same as [`TokenManager::valid_token`].
    pub async fn force_refresh(&self) -> Result<TokenSet> {
        let _guard = self.refresh_lock.lock().await;
        let current = self.current().await?;
        self.refresh_locked(&current).await
    }

    /// Forget the stored token set
    ///
    /// # Errors
    ///
    /// Returns [`HighLevelError::Storage`] if the store fails.
    pub async fn logout(&self) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;
        self.store.clear().await?;
        tracing::info!("Token set cleared");
        Ok(())
    }

    async fn current(&self) -> Result<TokenSet> {
        self.store
            .get_current()
            .await?
            .ok_or(HighLevelError::NotAuthenticated)
    }

    async fn refresh_locked(&self, current: &TokenSet) -> Result<TokenSet> {
        tracing::debug!(
            account = %current.account(),
            expires_at = current.expires_at(),
            "Refreshing access token"
        );
        let refreshed = self
            .refresher
            .refresh_with_retry(&current.refresh_token)
            .await?;

        let expected = current.account();
        let actual = refreshed.account();
        if expected != actual {
            return Err(HighLevelError::account_mismatch(
                expected.to_string(),
                actual.to_string(),
            ));
        }

        self.store.save(&refreshed).await?;
        Ok(refreshed)
    }
}
