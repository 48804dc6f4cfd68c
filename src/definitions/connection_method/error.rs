use crate::cbor::CborError;

/// Errors that can occur when encoding or decoding a connection method.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    #[error("Connection method payload is not a CBOR array")]
    NotAnArray,
    #[error("Malformed connection method record")]
    Malformed,
    #[error("Connection method record is missing parameter {0}")]
    MissingParameter(i128),
    #[error("Unsupported connection method type {0}")]
    UnsupportedMethodType(u64),
    #[error("Connection method type {method_type} has version {version}, at most {max_version} is supported")]
    UnsupportedVersion {
        method_type: u64,
        version: u64,
        max_version: u64,
    },
    #[error("Invalid NfcOptions found")]
    InvalidNfcOptions,
    #[error("NFC Command Data Length must be between 255 and 65535")]
    InvalidNfcCommandDataLength,
    #[error("NFC Response Data Length must be between 256 and 65536")]
    InvalidNfcResponseDataLength,
    #[error("Invalid BleOptions found")]
    InvalidBleOptions,
    #[error("BLE options disagree on the UUID to use")]
    IncompatibleBleOptions,
    #[error("Invalid WifiAwareOptions found")]
    InvalidWifiAwareOptions,
    #[error("Invalid HttpOptions found")]
    InvalidHttpOptions,
    #[error("Not yet implemented for this connection method")]
    Unimplemented,
    #[error("Could not encode or decode cbor: {0}")]
    Cbor(String),
}

impl Error {
    /// Whether the record was intentionally skipped rather than rejected.
    pub fn is_skip(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedMethodType(_) | Error::UnsupportedVersion { .. }
        )
    }
}

impl From<CborError> for Error {
    fn from(e: CborError) -> Self {
        Error::Cbor(e.to_string())
    }
}
