use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;

use mdoc_holder::document::{CredentialFactory, Document, DocumentStore, MDOC_CREDENTIAL_TYPE};
use mdoc_holder::secure_area::{KeySettings, SecureAreaRepository, SoftwareSecureArea};
use mdoc_holder::storage::{self, EphemeralStorage, Storage, StorageTable, StorageTableSpec};

#[allow(dead_code)]
pub const MDOC_DOMAIN: &str = "mdoc";

/// A store wired to a software secure area, both persisting into `storage`.
#[allow(dead_code)]
pub fn store_on(storage: Arc<dyn Storage>) -> DocumentStore {
    let repository =
        SecureAreaRepository::new().with(Arc::new(SoftwareSecureArea::new(storage.clone())));
    DocumentStore::new(
        storage,
        Arc::new(repository),
        Arc::new(CredentialFactory::new().with(MDOC_CREDENTIAL_TYPE)),
    )
}

#[allow(dead_code)]
pub fn ephemeral_store() -> (DocumentStore, Arc<dyn Storage>) {
    let storage: Arc<dyn Storage> = Arc::new(EphemeralStorage::new());
    (store_on(storage.clone()), storage)
}

/// Keys currently held by the software secure area of `storage`.
#[allow(dead_code)]
pub async fn key_count(storage: &Arc<dyn Storage>) -> Result<usize> {
    let table = storage
        .get_table(&StorageTableSpec::new(SoftwareSecureArea::IDENTIFIER))
        .await
        .context("could not open key table")?;
    Ok(table.enumerate().await?.len())
}

/// Adds a certified mdoc credential to `document`.
#[allow(dead_code)]
pub async fn provision(document: &Document) -> Result<uuid::Uuid> {
    let credential = document
        .create_credential(
            MDOC_DOMAIN,
            MDOC_CREDENTIAL_TYPE,
            SoftwareSecureArea::IDENTIFIER,
            &KeySettings::default(),
        )
        .await
        .context("could not create credential")?;
    document
        .certify_credential(credential.identifier, b"issuer signed".to_vec())
        .await
        .context("could not certify credential")?;
    Ok(credential.identifier)
}

/// Storage whose tables fail every operation.
#[allow(dead_code)]
pub struct UnavailableStorage;

struct UnavailableTable(StorageTableSpec);

fn unavailable() -> storage::Error {
    storage::Error::Io("device storage unavailable".into())
}

#[async_trait]
impl Storage for UnavailableStorage {
    async fn get_table(
        &self,
        spec: &StorageTableSpec,
    ) -> Result<Arc<dyn StorageTable>, storage::Error> {
        Ok(Arc::new(UnavailableTable(spec.clone())))
    }
}

#[async_trait]
impl StorageTable for UnavailableTable {
    fn spec(&self) -> &StorageTableSpec {
        &self.0
    }

    async fn enumerate(&self) -> Result<Vec<String>, storage::Error> {
        Err(unavailable())
    }

    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, storage::Error> {
        Err(unavailable())
    }

    async fn insert(&self, _key: &str, _data: Vec<u8>) -> Result<(), storage::Error> {
        Err(unavailable())
    }

    async fn delete(&self, _key: &str) -> Result<bool, storage::Error> {
        Err(unavailable())
    }
}

/// Wraps a storage so that table writes can be made to hang until the caller gives up.
#[allow(dead_code)]
#[derive(Clone)]
pub struct StallingStorage {
    inner: Arc<dyn Storage>,
    stall_inserts: Arc<AtomicBool>,
    stall_deletes: Arc<AtomicBool>,
}

#[allow(dead_code)]
impl StallingStorage {
    pub fn new(inner: Arc<dyn Storage>) -> Self {
        Self {
            inner,
            stall_inserts: Arc::new(AtomicBool::new(false)),
            stall_deletes: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn stall_inserts(&self, stall: bool) {
        self.stall_inserts.store(stall, Ordering::SeqCst);
    }

    pub fn stall_deletes(&self, stall: bool) {
        self.stall_deletes.store(stall, Ordering::SeqCst);
    }
}

struct StallingTable {
    inner: Arc<dyn StorageTable>,
    stall_inserts: Arc<AtomicBool>,
    stall_deletes: Arc<AtomicBool>,
}

#[async_trait]
impl Storage for StallingStorage {
    async fn get_table(
        &self,
        spec: &StorageTableSpec,
    ) -> Result<Arc<dyn StorageTable>, storage::Error> {
        Ok(Arc::new(StallingTable {
            inner: self.inner.get_table(spec).await?,
            stall_inserts: self.stall_inserts.clone(),
            stall_deletes: self.stall_deletes.clone(),
        }))
    }
}

#[async_trait]
impl StorageTable for StallingTable {
    fn spec(&self) -> &StorageTableSpec {
        self.inner.spec()
    }

    async fn enumerate(&self) -> Result<Vec<String>, storage::Error> {
        self.inner.enumerate().await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, storage::Error> {
        self.inner.get(key).await
    }

    async fn insert(&self, key: &str, data: Vec<u8>) -> Result<(), storage::Error> {
        if self.stall_inserts.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.insert(key, data).await
    }

    async fn delete(&self, key: &str) -> Result<bool, storage::Error> {
        if self.stall_deletes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.inner.delete(key).await
    }
}
