//! Documents held on the device and the store that owns them.
//!
//! A [Document] is a named set of [Credential]s plus display metadata. It is created
//! transient by [DocumentStore::create_document], committed with
//! [DocumentStore::add_document], and from then on persists every change to the store's
//! table and reports it on the store's event stream.
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::cbor;
use crate::secure_area::{self, KeySettings, SecureAreaRepository};
use crate::storage::{self, StorageTable};

pub use credential::{Credential, CredentialFactory, MDOC_CREDENTIAL_TYPE};
pub use store::{DocumentEvent, DocumentStore, EventType};

use store::StoreInner;

pub mod credential;
pub mod store;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Storage(#[from] storage::Error),
    #[error(transparent)]
    SecureArea(#[from] secure_area::Error),
    #[error("no secure area is registered as {0}")]
    UnknownSecureArea(String),
    #[error("credential type {0} is not registered")]
    UnknownCredentialType(String),
    #[error("credential {0} not found")]
    CredentialNotFound(Uuid),
    #[error("persisted document {name} could not be decoded: {reason}")]
    Corrupted { name: String, reason: String },
}

/// Application-facing information about a document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Whether issuance has completed.
    pub provisioned: bool,
    pub display_name: Option<String>,
    pub type_display_name: Option<String>,
    #[serde(with = "serde_bytes")]
    pub card_art: Option<Vec<u8>>,
    #[serde(with = "serde_bytes")]
    pub issuer_data: Option<Vec<u8>>,
    created_at: i64,
}

impl DocumentMetadata {
    pub fn created_at(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::from_unix_timestamp(self.created_at).ok()
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct PersistedDocument {
    metadata: DocumentMetadata,
    credentials: Vec<Credential>,
}

struct DocumentState {
    /// Whether changes are written through to the table.
    attached: bool,
    data: PersistedDocument,
}

pub struct Document {
    name: String,
    table: Arc<dyn StorageTable>,
    secure_area_repository: Arc<SecureAreaRepository>,
    credential_factory: Arc<CredentialFactory>,
    store: Weak<StoreInner>,
    state: Mutex<DocumentState>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Document {
    /// Creates a transient document. Nothing is written until [Document::add_to_store].
    pub fn create(
        table: Arc<dyn StorageTable>,
        secure_area_repository: Arc<SecureAreaRepository>,
        name: String,
        store: &DocumentStore,
        credential_factory: Arc<CredentialFactory>,
    ) -> Arc<Self> {
        let metadata = DocumentMetadata {
            created_at: OffsetDateTime::now_utc().unix_timestamp(),
            ..Default::default()
        };
        Arc::new(Self {
            name,
            table,
            secure_area_repository,
            credential_factory,
            store: store.downgrade(),
            state: Mutex::new(DocumentState {
                attached: false,
                data: PersistedDocument {
                    metadata,
                    credentials: vec![],
                },
            }),
        })
    }

    /// Reconstructs a committed document from `table`, if one is stored under `name`.
    pub async fn lookup(
        table: Arc<dyn StorageTable>,
        secure_area_repository: Arc<SecureAreaRepository>,
        name: &str,
        store: &DocumentStore,
        credential_factory: Arc<CredentialFactory>,
    ) -> Result<Option<Arc<Self>>, Error> {
        let Some(bytes) = table.get(name).await? else {
            return Ok(None);
        };
        let data: PersistedDocument = cbor::from_slice(&bytes).map_err(|e| Error::Corrupted {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        for credential in &data.credentials {
            credential_factory.check(&credential.credential_type)?;
        }

        Ok(Some(Arc::new(Self {
            name: name.to_string(),
            table,
            secure_area_repository,
            credential_factory,
            store: store.downgrade(),
            state: Mutex::new(DocumentState {
                attached: true,
                data,
            }),
        })))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Writes the document to the table; from now on every change is persisted.
    pub async fn add_to_store(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        self.save(&state.data).await?;
        state.attached = true;
        Ok(())
    }

    /// Removes the persisted document and deletes the keys of all its credentials.
    pub async fn delete_document(&self) -> Result<(), Error> {
        self.remove_persisted().await?;
        self.release_keys(&HashSet::new()).await
    }

    pub async fn metadata(&self) -> DocumentMetadata {
        self.state.lock().await.data.metadata.clone()
    }

    pub async fn credentials(&self) -> Vec<Credential> {
        self.state.lock().await.data.credentials.clone()
    }

    pub async fn set_provisioned(&self, provisioned: bool) -> Result<(), Error> {
        self.edit(|data| {
            data.metadata.provisioned = provisioned;
            Ok(())
        })
        .await
    }

    pub async fn set_display_name(&self, display_name: Option<String>) -> Result<(), Error> {
        self.edit(|data| {
            data.metadata.display_name = display_name;
            Ok(())
        })
        .await
    }

    pub async fn set_type_display_name(
        &self,
        type_display_name: Option<String>,
    ) -> Result<(), Error> {
        self.edit(|data| {
            data.metadata.type_display_name = type_display_name;
            Ok(())
        })
        .await
    }

    pub async fn set_card_art(&self, card_art: Option<Vec<u8>>) -> Result<(), Error> {
        self.edit(|data| {
            data.metadata.card_art = card_art;
            Ok(())
        })
        .await
    }

    pub async fn set_issuer_data(&self, issuer_data: Option<Vec<u8>>) -> Result<(), Error> {
        self.edit(|data| {
            data.metadata.issuer_data = issuer_data;
            Ok(())
        })
        .await
    }

    /// Creates a key in the named secure area and records an uncertified credential for it.
    pub async fn create_credential(
        &self,
        domain: &str,
        credential_type: &str,
        secure_area_identifier: &str,
        settings: &KeySettings,
    ) -> Result<Credential, Error> {
        self.credential_factory.check(credential_type)?;
        let secure_area = self
            .secure_area_repository
            .get(secure_area_identifier)
            .ok_or_else(|| Error::UnknownSecureArea(secure_area_identifier.to_string()))?;

        let identifier = Uuid::new_v4();
        let key_alias = format!("{}_{}", self.name, identifier.simple());
        secure_area.create_key(&key_alias, settings).await?;

        let credential = Credential {
            identifier,
            domain: domain.to_string(),
            credential_type: credential_type.to_string(),
            secure_area_identifier: secure_area_identifier.to_string(),
            key_alias,
            certified: false,
            issuer_data: None,
            usage_count: 0,
        };
        let recorded = credential.clone();
        let result = self
            .edit(move |data| {
                data.credentials.push(recorded);
                Ok(())
            })
            .await;
        if let Err(e) = result {
            secure_area.delete_key(&credential.key_alias).await?;
            return Err(e);
        }
        Ok(credential)
    }

    /// Attaches issuer data to a credential, making it usable for presentations.
    pub async fn certify_credential(
        &self,
        identifier: Uuid,
        issuer_data: Vec<u8>,
    ) -> Result<(), Error> {
        self.edit(|data| {
            let credential = data
                .credentials
                .iter_mut()
                .find(|c| c.identifier == identifier)
                .ok_or(Error::CredentialNotFound(identifier))?;
            credential.certified = true;
            credential.issuer_data = Some(issuer_data);
            Ok(())
        })
        .await
    }

    /// Picks the least used certified credential of `domain`.
    pub async fn find_credential(&self, domain: &str) -> Option<Credential> {
        let state = self.state.lock().await;
        state
            .data
            .credentials
            .iter()
            .filter(|c| c.domain == domain && c.certified)
            .min_by_key(|c| c.usage_count)
            .cloned()
    }

    pub async fn increment_usage_count(&self, identifier: Uuid) -> Result<(), Error> {
        self.edit(|data| {
            let credential = data
                .credentials
                .iter_mut()
                .find(|c| c.identifier == identifier)
                .ok_or(Error::CredentialNotFound(identifier))?;
            credential.usage_count += 1;
            Ok(())
        })
        .await
    }

    /// Removes a credential and deletes its key.
    pub async fn delete_credential(&self, identifier: Uuid) -> Result<(), Error> {
        let credential = self
            .edit(|data| {
                let index = data
                    .credentials
                    .iter()
                    .position(|c| c.identifier == identifier)
                    .ok_or(Error::CredentialNotFound(identifier))?;
                Ok(data.credentials.remove(index))
            })
            .await?;
        self.delete_key(&credential).await
    }

    pub(crate) async fn key_aliases(&self) -> HashSet<String> {
        let state = self.state.lock().await;
        state
            .data
            .credentials
            .iter()
            .map(|c| c.key_alias.clone())
            .collect()
    }

    /// Holds back edits until the returned barrier is dropped.
    pub(crate) async fn block_edits(&self) -> EditBarrier<'_> {
        EditBarrier {
            state: self.state.lock().await,
        }
    }

    pub(crate) async fn remove_persisted(&self) -> Result<(), Error> {
        let mut state = self.state.lock().await;
        state.attached = false;
        self.table.delete(&self.name).await?;
        Ok(())
    }

    /// Deletes the keys of all credentials except those whose alias is in `keep`.
    pub(crate) async fn release_keys(&self, keep: &HashSet<String>) -> Result<(), Error> {
        let credentials = self.credentials().await;
        for credential in credentials
            .iter()
            .filter(|c| !keep.contains(&c.key_alias))
        {
            self.delete_key(credential).await?;
        }
        Ok(())
    }

    async fn delete_key(&self, credential: &Credential) -> Result<(), Error> {
        delete_key(
            &self.secure_area_repository,
            &credential.secure_area_identifier,
            &credential.key_alias,
        )
        .await
    }

    async fn save(&self, data: &PersistedDocument) -> Result<(), Error> {
        let bytes = cbor::to_vec(data).map_err(|e| Error::Corrupted {
            name: self.name.clone(),
            reason: e.to_string(),
        })?;
        self.table.insert(&self.name, bytes).await?;
        Ok(())
    }

    /// Applies `f` to a copy of the document, persists the copy if attached, and only then
    /// makes it current and notifies the owning store, all under the state lock.
    async fn edit<T, F>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut PersistedDocument) -> Result<T, Error> + Send,
        T: Send,
    {
        let mut state = self.state.lock().await;
        let mut data = state.data.clone();
        let result = f(&mut data)?;
        if state.attached {
            self.save(&data).await?;
        }
        state.data = data;
        if let Some(store) = self.store.upgrade() {
            store.emit_on_document_changed(self);
        }
        Ok(result)
    }
}

/// Exclusive hold on a document's state, taken while another instance replaces it.
pub(crate) struct EditBarrier<'a> {
    state: MutexGuard<'a, DocumentState>,
}

impl EditBarrier<'_> {
    /// Stops writing changes through to the table.
    pub(crate) fn detach(mut self) {
        self.state.attached = false;
    }
}

/// A key referenced by a persisted credential: secure area identifier and key alias.
pub(crate) type KeyReference = (String, String);

/// Keys referenced by a persisted document row, read without resolving credential types.
///
/// A row that does not decode references no keys.
pub(crate) fn persisted_keys(bytes: &[u8]) -> Vec<KeyReference> {
    cbor::from_slice::<PersistedDocument>(bytes)
        .map(|data| {
            data.credentials
                .into_iter()
                .map(|c| (c.secure_area_identifier, c.key_alias))
                .collect()
        })
        .unwrap_or_default()
}

pub(crate) async fn delete_key(
    repository: &SecureAreaRepository,
    secure_area_identifier: &str,
    key_alias: &str,
) -> Result<(), Error> {
    let secure_area = repository
        .get(secure_area_identifier)
        .ok_or_else(|| Error::UnknownSecureArea(secure_area_identifier.to_string()))?;
    secure_area.delete_key(key_alias).await?;
    Ok(())
}
