use std::fmt;

use serde::{Deserialize, Serialize};

use super::{parameter_map, Error};

/// Data retrieval over HTTP, addressed by a single URI.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "ciborium::Value", into = "ciborium::Value")]
pub struct HttpOptions {
    pub uri: String,
}

impl HttpOptions {
    pub const METHOD_TYPE: u64 = 4;
    pub const METHOD_MAX_VERSION: u64 = 1;

    const KEY_URI: i128 = 0;

    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }
}

impl TryFrom<ciborium::Value> for HttpOptions {
    type Error = Error;

    fn try_from(v: ciborium::Value) -> Result<Self, Error> {
        let mut map = parameter_map(v, Error::InvalidHttpOptions)?;
        match map.remove(&Self::KEY_URI) {
            Some(ciborium::Value::Text(uri)) => Ok(HttpOptions { uri }),
            Some(_) => Err(Error::InvalidHttpOptions),
            None => Err(Error::MissingParameter(Self::KEY_URI)),
        }
    }
}

impl From<HttpOptions> for ciborium::Value {
    fn from(o: HttpOptions) -> ciborium::Value {
        ciborium::Value::Map(vec![(
            ciborium::Value::Integer(0.into()),
            ciborium::Value::Text(o.uri),
        )])
    }
}

impl fmt::Display for HttpOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http:uri={}", self.uri)
    }
}
