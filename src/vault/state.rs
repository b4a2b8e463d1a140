//! Vault State Management
//!
//! Holds the context document served by vault-api.

use super::models::UserContext;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Shared provider state that can be safely passed between threads
pub type SharedVaultState = Arc<VaultState>;

/// Errors raised while loading the served document.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("failed to read context file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("context file {path} is not a valid UserContextV0 document: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Core provider state
#[derive(Debug, Clone)]
pub struct VaultState {
    /// The document returned by `GET /v0/context`
    pub context: UserContext,
}

impl Default for VaultState {
    fn default() -> Self {
        Self::new(UserContext::sample())
    }
}

impl VaultState {
    pub fn new(context: UserContext) -> Self {
        Self { context }
    }

    /// Loads the served document from a JSON file.
    pub async fn from_file(path: &Path) -> Result<Self, VaultError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| VaultError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let context = serde_json::from_str(&raw).map_err(|source| VaultError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        info!(path = %path.display(), "loaded context document");
        Ok(Self::new(context))
    }

    /// Uses `path` when given, the built-in sample otherwise.
    pub async fn load(path: Option<&Path>) -> Result<Self, VaultError> {
        match path {
            Some(path) => Self::from_file(path).await,
            None => Ok(Self::default()),
        }
    }
}
