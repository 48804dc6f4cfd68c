use std::sync::Arc;

use async_trait::async_trait;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use signature::Signer;
use tokio::sync::OnceCell;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cbor;
use crate::storage::{Storage, StorageTable, StorageTableSpec};

use super::{Algorithm, Error, KeyInfo, KeySettings, SecureArea};

/// A secure area backed by a storage table, with keys generated and used in software.
///
/// Private keys are only as protected as the storage they are written to.
pub struct SoftwareSecureArea {
    storage: Arc<dyn Storage>,
    table: OnceCell<Arc<dyn StorageTable>>,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredKey {
    #[zeroize(skip)]
    algorithm: Algorithm,
    #[serde(with = "serde_bytes")]
    secret: Vec<u8>,
}

impl SoftwareSecureArea {
    pub const IDENTIFIER: &'static str = "SoftwareSecureArea";
    const TABLE_NAME: &'static str = "SoftwareSecureArea";

    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            table: OnceCell::new(),
        }
    }

    async fn table(&self) -> Result<&Arc<dyn StorageTable>, Error> {
        Ok(self
            .table
            .get_or_try_init(|| async {
                self.storage
                    .get_table(&StorageTableSpec::new(Self::TABLE_NAME))
                    .await
            })
            .await?)
    }

    async fn load(&self, alias: &str) -> Result<StoredKey, Error> {
        let data = self
            .table()
            .await?
            .get(alias)
            .await?
            .ok_or_else(|| Error::KeyUnavailable(alias.to_string()))?;
        cbor::from_slice(&data).map_err(|e| Error::Encoding(e.to_string()))
    }
}

fn public_key(key: &StoredKey) -> Result<Vec<u8>, Error> {
    match key.algorithm {
        Algorithm::Es256 => {
            let secret =
                p256::SecretKey::from_slice(&key.secret).map_err(|_| Error::InvalidKeyMaterial)?;
            Ok(secret.public_key().to_encoded_point(false).as_bytes().to_vec())
        }
        Algorithm::Es384 => {
            let secret =
                p384::SecretKey::from_slice(&key.secret).map_err(|_| Error::InvalidKeyMaterial)?;
            Ok(secret.public_key().to_encoded_point(false).as_bytes().to_vec())
        }
    }
}

#[async_trait]
impl SecureArea for SoftwareSecureArea {
    fn identifier(&self) -> &str {
        Self::IDENTIFIER
    }

    async fn create_key(&self, alias: &str, settings: &KeySettings) -> Result<KeyInfo, Error> {
        let table = self.table().await?;
        if table.get(alias).await?.is_some() {
            return Err(Error::KeyAlreadyExists(alias.to_string()));
        }

        let key = StoredKey {
            algorithm: settings.algorithm,
            secret: match settings.algorithm {
                Algorithm::Es256 => p256::SecretKey::random(&mut OsRng).to_bytes().to_vec(),
                Algorithm::Es384 => p384::SecretKey::random(&mut OsRng).to_bytes().to_vec(),
            },
        };
        let public_key = public_key(&key)?;
        let data = cbor::to_vec(&key).map_err(|e| Error::Encoding(e.to_string()))?;
        table.insert(alias, data).await?;
        tracing::debug!(alias, algorithm = %settings.algorithm, "created software key");

        Ok(KeyInfo {
            alias: alias.to_string(),
            algorithm: settings.algorithm,
            public_key,
        })
    }

    async fn key_info(&self, alias: &str) -> Result<KeyInfo, Error> {
        let key = self.load(alias).await?;
        Ok(KeyInfo {
            alias: alias.to_string(),
            algorithm: key.algorithm,
            public_key: public_key(&key)?,
        })
    }

    async fn sign(&self, alias: &str, data: &[u8]) -> Result<Vec<u8>, Error> {
        let key = self.load(alias).await?;
        match key.algorithm {
            Algorithm::Es256 => {
                let signing_key = p256::ecdsa::SigningKey::from_slice(&key.secret)
                    .map_err(|_| Error::InvalidKeyMaterial)?;
                let signature: p256::ecdsa::Signature = signing_key.sign(data);
                Ok(signature.to_bytes().to_vec())
            }
            Algorithm::Es384 => {
                let signing_key = p384::ecdsa::SigningKey::from_slice(&key.secret)
                    .map_err(|_| Error::InvalidKeyMaterial)?;
                let signature: p384::ecdsa::Signature = signing_key.sign(data);
                Ok(signature.to_bytes().to_vec())
            }
        }
    }

    async fn delete_key(&self, alias: &str) -> Result<(), Error> {
        if self.table().await?.delete(alias).await? {
            tracing::debug!(alias, "deleted software key");
        }
        Ok(())
    }
}
