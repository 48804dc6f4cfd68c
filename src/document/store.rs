use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::{broadcast, OnceCell};

use crate::secure_area::SecureAreaRepository;
use crate::storage::{Storage, StorageTable, StorageTableSpec};

use super::{delete_key, persisted_keys, CredentialFactory, Document, Error, KeyReference};

pub const DEFAULT_EVENT_CAPACITY: usize = 64;

const TABLE_NAME: &str = "Documents";

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum_macros::Display)]
pub enum EventType {
    #[strum(serialize = "added")]
    Added,
    #[strum(serialize = "deleted")]
    Deleted,
    #[strum(serialize = "updated")]
    Updated,
}

#[derive(Clone, Debug)]
pub struct DocumentEvent {
    pub event_type: EventType,
    pub document: Arc<Document>,
}

/// Owns every committed [Document] and hands out one shared instance per name.
///
/// Cloning a store is cheap and yields a handle to the same cache, table and event stream.
#[derive(Clone)]
pub struct DocumentStore {
    inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    storage: Arc<dyn Storage>,
    secure_area_repository: Arc<SecureAreaRepository>,
    credential_factory: Arc<CredentialFactory>,
    table: OnceCell<Arc<dyn StorageTable>>,
    cache: Mutex<HashMap<String, Arc<Document>>>,
    /// Serialises create, add, delete and cache-miss lookups.
    mutation: tokio::sync::Mutex<()>,
    events: broadcast::Sender<DocumentEvent>,
}

impl StoreInner {
    fn cache(&self) -> MutexGuard<'_, HashMap<String, Arc<Document>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn cached(&self, name: &str) -> Option<Arc<Document>> {
        self.cache().get(name).cloned()
    }

    fn emit(&self, event_type: EventType, document: Arc<Document>) {
        tracing::debug!("document {}: {event_type}", document.name());
        if self
            .events
            .send(DocumentEvent {
                event_type,
                document,
            })
            .is_err()
        {
            tracing::trace!("no subscribers for document events");
        }
    }

    /// Emits [EventType::Updated] if `document` is the instance cached under its name.
    pub(crate) fn emit_on_document_changed(&self, document: &Document) {
        let cache = self.cache();
        if let Some(cached) = cache.get(document.name()) {
            if std::ptr::eq(Arc::as_ptr(cached), document) {
                self.emit(EventType::Updated, cached.clone());
            }
        }
    }
}

impl DocumentStore {
    pub fn new(
        storage: Arc<dyn Storage>,
        secure_area_repository: Arc<SecureAreaRepository>,
        credential_factory: Arc<CredentialFactory>,
    ) -> Self {
        Self::with_event_capacity(
            storage,
            secure_area_repository,
            credential_factory,
            DEFAULT_EVENT_CAPACITY,
        )
    }

    /// Subscribers lagging more than `capacity` events behind miss the oldest ones.
    pub fn with_event_capacity(
        storage: Arc<dyn Storage>,
        secure_area_repository: Arc<SecureAreaRepository>,
        credential_factory: Arc<CredentialFactory>,
        capacity: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(StoreInner {
                storage,
                secure_area_repository,
                credential_factory,
                table: OnceCell::new(),
                cache: Mutex::new(HashMap::new()),
                mutation: tokio::sync::Mutex::new(()),
                events,
            }),
        }
    }

    pub fn secure_area_repository(&self) -> &Arc<SecureAreaRepository> {
        &self.inner.secure_area_repository
    }

    pub fn credential_factory(&self) -> &Arc<CredentialFactory> {
        &self.inner.credential_factory
    }

    pub(crate) fn downgrade(&self) -> Weak<StoreInner> {
        Arc::downgrade(&self.inner)
    }

    /// Subscribes to [DocumentEvent]s emitted from now on.
    pub fn event_flow(&self) -> broadcast::Receiver<DocumentEvent> {
        self.inner.events.subscribe()
    }

    async fn table(&self) -> Result<Arc<dyn StorageTable>, Error> {
        let table = self
            .inner
            .table
            .get_or_try_init(|| async {
                self.inner
                    .storage
                    .get_table(&StorageTableSpec::new(TABLE_NAME))
                    .await
            })
            .await?;
        Ok(table.clone())
    }

    async fn load(&self, name: &str) -> Result<Option<Arc<Document>>, Error> {
        Document::lookup(
            self.table().await?,
            self.inner.secure_area_repository.clone(),
            name,
            self,
            self.inner.credential_factory.clone(),
        )
        .await
    }

    /// Keys referenced by the row stored under `name`, for rows that cannot be loaded.
    async fn unreadable_keys(&self, name: &str) -> Result<Vec<KeyReference>, Error> {
        let row = self.table().await?.get(name).await?;
        Ok(row.map(|bytes| persisted_keys(&bytes)).unwrap_or_default())
    }

    async fn release_orphaned(&self, keys: Vec<KeyReference>) -> Result<(), Error> {
        for (secure_area_identifier, key_alias) in keys {
            delete_key(
                &self.inner.secure_area_repository,
                &secure_area_identifier,
                &key_alias,
            )
            .await?;
        }
        Ok(())
    }

    /// Deletes any document called `name`, then returns a new transient one.
    ///
    /// The returned document is neither cached nor persisted until passed to
    /// [DocumentStore::add_document].
    pub async fn create_document(&self, name: impl Into<String>) -> Result<Arc<Document>, Error> {
        let name = name.into();
        self.delete_document(&name).await?;
        Ok(Document::create(
            self.table().await?,
            self.inner.secure_area_repository.clone(),
            name,
            self,
            self.inner.credential_factory.clone(),
        ))
    }

    /// Persists `document`, caches it and emits [EventType::Added].
    ///
    /// A different committed document of the same name is displaced: it gets a
    /// [EventType::Deleted] and its keys are released. Once the document is committed this
    /// returns `Ok`; a key that cannot be released at that point is only logged.
    pub async fn add_document(&self, document: Arc<Document>) -> Result<(), Error> {
        let name = document.name().to_string();
        let (displaced, orphaned) = {
            let _guard = self.inner.mutation.lock().await;

            let (displaced, orphaned) = match self.inner.cached(&name) {
                Some(cached) if Arc::ptr_eq(&cached, &document) => return Ok(()),
                Some(cached) => (Some(cached), vec![]),
                None => match self.load(&name).await {
                    Ok(loaded) => (loaded, vec![]),
                    Err(e @ (Error::Corrupted { .. } | Error::UnknownCredentialType(_))) => {
                        tracing::warn!("overwriting unreadable document {name}: {e}");
                        (None, self.unreadable_keys(&name).await?)
                    }
                    Err(e) => return Err(e),
                },
            };

            // The displaced instance keeps writing through unless the swap below happens.
            let displaced_handle = displaced.clone();
            let barrier = match &displaced_handle {
                Some(old) => Some(old.block_edits().await),
                None => None,
            };
            document.add_to_store().await?;

            let mut cache = self.inner.cache();
            if let Some(barrier) = barrier {
                barrier.detach();
            }
            cache.insert(name.clone(), document.clone());
            if let Some(old) = &displaced {
                self.inner.emit(EventType::Deleted, old.clone());
            }
            self.inner.emit(EventType::Added, document.clone());
            (displaced, orphaned)
        };

        if let Some(old) = displaced {
            let keep = document.key_aliases().await;
            if let Err(e) = old.release_keys(&keep).await {
                tracing::warn!("could not release keys of displaced document {name}: {e}");
            }
        }
        if let Err(e) = self.release_orphaned(orphaned).await {
            tracing::warn!("could not release keys of overwritten document {name}: {e}");
        }
        Ok(())
    }

    /// Returns the committed document called `name`.
    ///
    /// Repeated lookups return the same instance until the document is deleted.
    pub async fn lookup_document(&self, name: &str) -> Result<Option<Arc<Document>>, Error> {
        if let Some(document) = self.inner.cached(name) {
            return Ok(Some(document));
        }

        let _guard = self.inner.mutation.lock().await;
        if let Some(document) = self.inner.cached(name) {
            return Ok(Some(document));
        }
        let document = self.load(name).await?;
        if let Some(document) = &document {
            self.inner.cache().insert(name.to_string(), document.clone());
        }
        Ok(document)
    }

    /// Names of all committed documents, in no particular order.
    pub async fn list_documents(&self) -> Result<Vec<String>, Error> {
        Ok(self.table().await?.enumerate().await?)
    }

    /// Deletes the document called `name` and the keys of its credentials.
    ///
    /// Key deletion runs last; if it fails the document is already gone.
    pub async fn delete_document(&self, name: &str) -> Result<(), Error> {
        let document = {
            let guard = self.inner.mutation.lock().await;

            let document = match self.inner.cached(name) {
                Some(cached) => cached,
                None => match self.load(name).await {
                    Ok(Some(loaded)) => loaded,
                    Ok(None) => return Ok(()),
                    Err(e @ (Error::Corrupted { .. } | Error::UnknownCredentialType(_))) => {
                        tracing::warn!("deleting unreadable document {name}: {e}");
                        let orphaned = self.unreadable_keys(name).await?;
                        self.table().await?.delete(name).await?;
                        drop(guard);
                        return self.release_orphaned(orphaned).await;
                    }
                    Err(e) => return Err(e),
                },
            };

            {
                let mut cache = self.inner.cache();
                cache.remove(name);
                self.inner.emit(EventType::Deleted, document.clone());
            }
            document.remove_persisted().await?;
            document
        };

        document.release_keys(&HashSet::new()).await
    }
}
