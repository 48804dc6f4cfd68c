use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Error;

/// Credential type of an ISO 18013-5 mdoc, bound to a device key.
pub const MDOC_CREDENTIAL_TYPE: &str = "MdocCredential";

/// A credential held by a document: issuer data bound to one key in a secure area.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    pub identifier: Uuid,
    /// Groups credentials used for the same purpose, e.g. presentations to one kind of reader.
    pub domain: String,
    pub credential_type: String,
    pub secure_area_identifier: String,
    pub key_alias: String,
    /// Set once the issuer has returned data for the key.
    pub certified: bool,
    #[serde(with = "serde_bytes")]
    pub issuer_data: Option<Vec<u8>>,
    pub usage_count: u64,
}

/// The credential types an application knows how to handle.
///
/// Documents are only reconstructed from storage if every credential they hold has a
/// registered type.
#[derive(Clone, Debug, Default)]
pub struct CredentialFactory {
    types: BTreeSet<String>,
}

impl CredentialFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, credential_type: impl Into<String>) -> Self {
        self.register(credential_type);
        self
    }

    pub fn register(&mut self, credential_type: impl Into<String>) {
        self.types.insert(credential_type.into());
    }

    pub fn is_registered(&self, credential_type: &str) -> bool {
        self.types.contains(credential_type)
    }

    pub(crate) fn check(&self, credential_type: &str) -> Result<(), Error> {
        if self.is_registered(credential_type) {
            Ok(())
        } else {
            Err(Error::UnknownCredentialType(credential_type.to_string()))
        }
    }
}
