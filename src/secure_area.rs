//! Abstraction over where private key material lives and how it signs.
//!
//! Documents never touch private keys directly: a credential records the identifier of
//! the [SecureArea] holding its key and the alias of that key. The
//! [SecureAreaRepository] resolves identifiers back to implementations.
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::storage;

pub use software::SoftwareSecureArea;

pub mod software;

/// Errors raised by a secure area.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("key {0} is not available")]
    KeyUnavailable(String),
    #[error("key {0} already exists")]
    KeyAlreadyExists(String),
    #[error("stored key material is invalid")]
    InvalidKeyMaterial,
    #[error(transparent)]
    Storage(#[from] storage::Error),
    #[error("could not encode or decode key: {0}")]
    Encoding(String),
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
pub enum Algorithm {
    #[strum(serialize = "ES256")]
    Es256,
    #[strum(serialize = "ES384")]
    Es384,
}

/// Parameters for [SecureArea::create_key].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeySettings {
    pub algorithm: Algorithm,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Es256,
        }
    }
}

/// Public information about a key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyInfo {
    pub alias: String,
    pub algorithm: Algorithm,
    /// SEC1 uncompressed encoding of the public key.
    pub public_key: Vec<u8>,
}

#[async_trait]
pub trait SecureArea: Send + Sync {
    /// Stable identifier, recorded alongside every key alias handed out.
    fn identifier(&self) -> &str;

    async fn create_key(&self, alias: &str, settings: &KeySettings) -> Result<KeyInfo, Error>;

    async fn key_info(&self, alias: &str) -> Result<KeyInfo, Error>;

    /// Signs `data`, returning the signature as the fixed-size `r || s` concatenation.
    async fn sign(&self, alias: &str, data: &[u8]) -> Result<Vec<u8>, Error>;

    /// Deletes the key. Deleting a key that does not exist is not an error.
    async fn delete_key(&self, alias: &str) -> Result<(), Error>;
}

/// Resolves secure areas by identifier.
#[derive(Clone, Default)]
pub struct SecureAreaRepository {
    areas: BTreeMap<String, Arc<dyn SecureArea>>,
}

impl SecureAreaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, area: Arc<dyn SecureArea>) -> Self {
        self.register(area);
        self
    }

    pub fn register(&mut self, area: Arc<dyn SecureArea>) {
        self.areas.insert(area.identifier().to_string(), area);
    }

    pub fn get(&self, identifier: &str) -> Option<Arc<dyn SecureArea>> {
        self.areas.get(identifier).cloned()
    }

    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.areas.keys().map(String::as_str)
    }
}
