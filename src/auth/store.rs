//! Token persistence
//!
//! The SDK only needs "read the current token set" and "replace it". Saves
//! replace the whole value at once so a concurrent reader never observes a
//! half-written token set.

use super::token::TokenSet;
use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

/// Errors that can occur during token storage operations
#[derive(Debug, Error)]
pub enum TokenStoreError {
    /// I/O error during storage operations
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Backend-specific failure
    #[error("{0}")]
    Backend(String),
}

/// Durable home for the current token set
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// The current token set, if one has been saved
    async fn get_current(&self) -> Result<Option<TokenSet>, TokenStoreError>;

    /// Atomically replace the current token set
    async fn save(&self, token: &TokenSet) -> Result<(), TokenStoreError>;

    /// Forget the current token set
    async fn clear(&self) -> Result<(), TokenStoreError>;
}

/// In-process token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    current: RwLock<Option<TokenSet>>,
}

impl MemoryTokenStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with a token set
    #[must_use]
    pub fn with_token(token: TokenSet) -> Self {
        Self {
            current: RwLock::new(Some(token)),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get_current(&self) -> Result<Option<TokenSet>, TokenStoreError> {
        Ok(self.current.read().await.clone())
    }

    async fn save(&self, token: &TokenSet) -> Result<(), TokenStoreError> {
        *self.current.write().await = Some(token.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), TokenStoreError> {
        *self.current.write().await = None;
        Ok(())
    }
}

/// Token store backed by a JSON file
///
/// Writes go to a sibling temporary file which is then renamed over the
/// target, so the file is always either the old or the new token set.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    storage_path: PathBuf,
}

impl Default for FileTokenStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FileTokenStore {
    /// Create token storage with default path (platform-specific config directory)
    #[must_use]
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("highlevel-sdk");

        Self {
            storage_path: config_dir.join("token.json"),
        }
    }

    /// Create token storage with custom path
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            storage_path: path.into(),
        }
    }

    /// Get the storage path
    #[must_use]
    pub fn path(&self) -> &PathBuf {
        &self.storage_path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .storage_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "token.json".into());
        name.push(".tmp");
        self.storage_path.with_file_name(name)
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn get_current(&self) -> Result<Option<TokenSet>, TokenStoreError> {
        let content = match tokio::fs::read_to_string(&self.storage_path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let token: TokenSet = serde_json::from_str(&content)?;
        Ok(Some(token))
    }

    async fn save(&self, token: &TokenSet) -> Result<(), TokenStoreError> {
        if let Some(parent) = self.storage_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let content = serde_json::to_string_pretty(token)?;
        let temp_path = self.temp_path();
        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        // Owner-only from creation, so the token is never briefly readable
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&temp_path).await?;

        // A temp file left behind by a crashed save keeps its old mode
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            file.set_permissions(perms).await?;
        }

        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.storage_path).await?;
        tracing::debug!(path = %self.storage_path.display(), "Token set saved");
        Ok(())
    }

    async fn clear(&self) -> Result<(), TokenStoreError> {
        match tokio::fs::remove_file(&self.storage_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
