use std::fmt;

use serde::{Deserialize, Serialize};

/// A CBOR byte string (major type 2), as opposed to an array of integers.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(try_from = "ciborium::Value", into = "ciborium::Value")]
pub struct ByteStr(Vec<u8>);

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Expected to parse a CBOR byte string, received: '{0:?}'")]
    NotAByteString(ciborium::Value),
}

impl ByteStr {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for ByteStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ByteStr({})", hex::encode(&self.0))
    }
}

impl From<Vec<u8>> for ByteStr {
    fn from(bytes: Vec<u8>) -> ByteStr {
        ByteStr(bytes)
    }
}

impl From<&[u8]> for ByteStr {
    fn from(bytes: &[u8]) -> ByteStr {
        ByteStr(bytes.to_vec())
    }
}

impl From<ByteStr> for Vec<u8> {
    fn from(ByteStr(bytes): ByteStr) -> Vec<u8> {
        bytes
    }
}

impl AsRef<[u8]> for ByteStr {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<ByteStr> for ciborium::Value {
    fn from(ByteStr(bytes): ByteStr) -> ciborium::Value {
        ciborium::Value::Bytes(bytes)
    }
}

impl TryFrom<ciborium::Value> for ByteStr {
    type Error = Error;

    fn try_from(v: ciborium::Value) -> Result<ByteStr> {
        match v {
            ciborium::Value::Bytes(bytes) => Ok(ByteStr(bytes)),
            other => Err(Error::NotAByteString(other)),
        }
    }
}
