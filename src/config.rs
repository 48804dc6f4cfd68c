//! Holder configuration, resolved once at startup.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::document::{store::DEFAULT_EVENT_CAPACITY, CredentialFactory, DocumentStore};
use crate::document::MDOC_CREDENTIAL_TYPE;
use crate::secure_area::{SecureAreaRepository, SoftwareSecureArea};
use crate::storage::{FileStorage, Storage};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("storage directory {path} is unusable: {reason}")]
    StorageDirectory { path: PathBuf, reason: String },
    #[error("invalid configuration: {0}")]
    Config(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolderConfig {
    /// Root of the on-disk tables. Defaults to `$HOME/.local/share/mdoc-holder`.
    #[serde(default)]
    pub storage_dir: Option<PathBuf>,
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_event_capacity() -> usize {
    DEFAULT_EVENT_CAPACITY
}

impl Default for HolderConfig {
    fn default() -> Self {
        Self {
            storage_dir: None,
            event_capacity: default_event_capacity(),
        }
    }
}

/// The wired-up components of a holder.
pub struct Holder {
    pub storage: Arc<dyn Storage>,
    pub secure_area_repository: Arc<SecureAreaRepository>,
    pub document_store: DocumentStore,
}

impl HolderConfig {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        let config: Self = serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        if config.event_capacity == 0 {
            return Err(Error::Config("event_capacity must be > 0".into()));
        }
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self, Error> {
        let json = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::Config(format!("could not read {}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    pub fn storage_dir(&self) -> Result<PathBuf, Error> {
        if let Some(dir) = &self.storage_dir {
            return Ok(dir.clone());
        }
        let home = std::env::var_os("HOME").ok_or_else(|| Error::StorageDirectory {
            path: PathBuf::new(),
            reason: "HOME is not set and no storage_dir is configured".into(),
        })?;
        Ok(PathBuf::from(home).join(".local/share/mdoc-holder"))
    }

    /// Creates the storage directory and wires storage, secure areas and the document store.
    pub async fn bootstrap(&self) -> Result<Holder, Error> {
        let path = self.storage_dir()?;
        let storage = FileStorage::open(&path)
            .await
            .map_err(|e| Error::StorageDirectory {
                path: path.clone(),
                reason: e.to_string(),
            })?;
        let storage: Arc<dyn Storage> = Arc::new(storage);
        tracing::debug!("holder storage at {}", path.display());

        let secure_area_repository = Arc::new(
            SecureAreaRepository::new().with(Arc::new(SoftwareSecureArea::new(storage.clone()))),
        );
        let document_store = DocumentStore::with_event_capacity(
            storage.clone(),
            secure_area_repository.clone(),
            Arc::new(CredentialFactory::new().with(MDOC_CREDENTIAL_TYPE)),
            self.event_capacity,
        );

        Ok(Holder {
            storage,
            secure_area_repository,
            document_store,
        })
    }
}
