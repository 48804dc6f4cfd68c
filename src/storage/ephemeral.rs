use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;

use super::{Error, Storage, StorageTable, StorageTableSpec};

/// Storage that lives as long as the process. Used in tests and for throwaway holders.
#[derive(Default)]
pub struct EphemeralStorage {
    tables: Mutex<HashMap<String, Arc<EphemeralTable>>>,
}

pub struct EphemeralTable {
    spec: StorageTableSpec,
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl EphemeralStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> Error {
    Error::Io("ephemeral storage lock poisoned".into())
}

#[async_trait]
impl Storage for EphemeralStorage {
    async fn get_table(&self, spec: &StorageTableSpec) -> Result<Arc<dyn StorageTable>, Error> {
        spec.check_supported()?;
        let mut tables = self.tables.lock().map_err(poisoned)?;
        let table: Arc<dyn StorageTable> = tables
            .entry(spec.name.clone())
            .or_insert_with(|| {
                Arc::new(EphemeralTable {
                    spec: spec.clone(),
                    entries: RwLock::new(BTreeMap::new()),
                })
            })
            .clone();
        Ok(table)
    }
}

#[async_trait]
impl StorageTable for EphemeralTable {
    fn spec(&self) -> &StorageTableSpec {
        &self.spec
    }

    async fn enumerate(&self) -> Result<Vec<String>, Error> {
        Ok(self.entries.read().map_err(poisoned)?.keys().cloned().collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    async fn insert(&self, key: &str, data: Vec<u8>) -> Result<(), Error> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), data);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, Error> {
        Ok(self.entries.write().map_err(poisoned)?.remove(key).is_some())
    }
}
