//! Named key-value tables that hold the durable state of documents and keys.
//!
//! [Storage] hands out tables by [StorageTableSpec]. Two backends are provided:
//! [EphemeralStorage], which keeps everything in memory, and [FileStorage], which keeps one
//! directory per table and one file per key.
use std::sync::Arc;

use async_trait::async_trait;

pub use ephemeral::EphemeralStorage;
pub use file::FileStorage;

pub mod ephemeral;
pub mod file;

/// Errors raised by a storage backend.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("storage I/O failure: {0}")]
    Io(String),
    #[error("table {table} requests a feature this storage does not support: {feature}")]
    Unsupported {
        table: String,
        feature: &'static str,
    },
    #[error("invalid key or table name: {0}")]
    InvalidName(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

/// Describes a table: its name, and which optional features it needs.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct StorageTableSpec {
    pub name: String,
    pub supports_partitions: bool,
    pub supports_expiration: bool,
}

impl StorageTableSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supports_partitions: false,
            supports_expiration: false,
        }
    }

    pub(crate) fn check_supported(&self) -> Result<(), Error> {
        if self.supports_partitions {
            return Err(Error::Unsupported {
                table: self.name.clone(),
                feature: "partitions",
            });
        }
        if self.supports_expiration {
            return Err(Error::Unsupported {
                table: self.name.clone(),
                feature: "expiration",
            });
        }
        Ok(())
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Opens the table described by `spec`, creating it if needed.
    ///
    /// Calling this twice with the same name returns handles to the same table.
    async fn get_table(&self, spec: &StorageTableSpec) -> Result<Arc<dyn StorageTable>, Error>;
}

#[async_trait]
pub trait StorageTable: Send + Sync {
    fn spec(&self) -> &StorageTableSpec;

    /// Returns all keys, in ascending order.
    async fn enumerate(&self) -> Result<Vec<String>, Error>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, Error>;

    /// Inserts or replaces the value stored under `key`.
    async fn insert(&self, key: &str, data: Vec<u8>) -> Result<(), Error>;

    /// Removes `key`, returning whether it was present.
    async fn delete(&self, key: &str) -> Result<bool, Error>;
}
