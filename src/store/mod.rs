//! # Token Store
//!
//! Persistence for the single platform access token, plus the append-only
//! activity logs. Operations return `Result` so callers decide how to log
//! failures; handlers treat an unavailable store the same as "no token".

pub mod activity_log;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

pub use activity_log::ActivityLog;

const TOKEN_FILE: &str = "token.json";

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Single-slot token persistence, last write wins.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Overwrite the stored token.
    async fn save(&self, token: &str) -> Result<(), StoreError>;

    /// The stored token, if any.
    async fn load(&self) -> Result<Option<String>, StoreError>;

    /// Remove the stored token. Clearing an empty store succeeds.
    async fn clear(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenRecord {
    access_token: String,
}

/// Token store backed by `<dir>/token.json`
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            path: data_dir.as_ref().join(TOKEN_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn save(&self, token: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::io(parent, e))?;
        }

        let record = serde_json::to_vec(&TokenRecord {
            access_token: token.to_string(),
        })?;
        tokio::fs::write(&self.path, record)
            .await
            .map_err(|e| StoreError::io(&self.path, e))
    }

    async fn load(&self) -> Result<Option<String>, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&self.path, e)),
        };

        // A corrupt record reads as "no token".
        match serde_json::from_slice::<TokenRecord>(&bytes) {
            Ok(record) if !record.access_token.is_empty() => Ok(Some(record.access_token)),
            Ok(_) => Ok(None),
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unreadable token record");
                Ok(None)
            }
        }
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io(&self.path, e)),
        }
    }
}

/// In-process token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn save(&self, token: &str) -> Result<(), StoreError> {
        *self.token.write().await = Some(token.to_string());
        Ok(())
    }

    async fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.token.read().await.clone())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.token.write().await = None;
        Ok(())
    }
}

/// Load the stored token, logging and swallowing store failures.
pub async fn load_or_none(store: &dyn TokenStore) -> Option<String> {
    match store.load().await {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!(error = %e, "Token store unavailable; treating as no token");
            None
        }
    }
}

/// Clear the stored token, logging failures. Returns whether the clear succeeded.
pub async fn clear_logged(store: &dyn TokenStore) -> bool {
    match store.clear().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to clear stored token");
            false
        }
    }
}

/// Mask a secret for display: first and last three characters only.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 6 {
        return "***".to_string();
    }
    let head: String = chars[..3].iter().collect();
    let tail: String = chars[chars.len() - 3..].iter().collect();
    format!("{head}...{tail}")
}
