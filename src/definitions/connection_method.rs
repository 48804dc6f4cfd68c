//! This module contains the definitions for the [ConnectionMethod] enum and related types.
//!
//! A connection method is one transport a holder offers during device engagement. On the
//! wire every method is a CBOR array `[method_type, method_max_version, method_parameters]`
//! and an engagement carries an array of them.
//!
//! Decoding is forward compatible: records with an unknown method type, or with a version
//! above what this crate understands for a known type, are skipped. A record that is
//! malformed fails on its own, the rest of the payload still decodes.
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use ble_options::{BleOptions, CentralClientMode, PeripheralServerMode};
pub use error::Error;
pub use http_options::HttpOptions;
pub use ndef::CarrierConfigurationRecord;
pub use nfc_options::{CommandDataLength, NfcOptions, ResponseDataLength};
pub use wifi_aware_options::WifiAwareOptions;

use crate::cbor;

pub mod ble_options;
pub mod error;
pub mod http_options;
pub mod ndef;
pub mod nfc_options;
pub mod wifi_aware_options;

/// A transport over which an mdoc can be retrieved.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "ciborium::Value", into = "ciborium::Value")]
pub enum ConnectionMethod {
    /// Represents the options for NFC data retrieval.
    Nfc(NfcOptions),

    /// Represents the BLE options for data retrieval.
    ///
    /// The holder may offer central client mode, peripheral server mode or both.
    Ble(BleOptions),

    /// Represents the options for a Wi-Fi Aware connection.
    WifiAware(WifiAwareOptions),

    /// Represents data retrieval over HTTP.
    Http(HttpOptions),
}

type DecodeFn = fn(ciborium::Value) -> Result<ConnectionMethod, Error>;

struct Registration {
    method_type: u64,
    max_version: u64,
    decode: DecodeFn,
}

const REGISTRY: [Registration; 4] = [
    Registration {
        method_type: NfcOptions::METHOD_TYPE,
        max_version: NfcOptions::METHOD_MAX_VERSION,
        decode: |params| NfcOptions::try_from(params).map(ConnectionMethod::Nfc),
    },
    Registration {
        method_type: BleOptions::METHOD_TYPE,
        max_version: BleOptions::METHOD_MAX_VERSION,
        decode: |params| BleOptions::try_from(params).map(ConnectionMethod::Ble),
    },
    Registration {
        method_type: WifiAwareOptions::METHOD_TYPE,
        max_version: WifiAwareOptions::METHOD_MAX_VERSION,
        decode: |params| WifiAwareOptions::try_from(params).map(ConnectionMethod::WifiAware),
    },
    Registration {
        method_type: HttpOptions::METHOD_TYPE,
        max_version: HttpOptions::METHOD_MAX_VERSION,
        decode: |params| HttpOptions::try_from(params).map(ConnectionMethod::Http),
    },
];

/// The outcome of decoding a list of connection methods.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodedConnectionMethods {
    /// Successfully decoded methods, in payload order.
    pub methods: Vec<ConnectionMethod>,
    /// Indices of records skipped because of an unknown type or a too recent version.
    pub skipped: Vec<usize>,
    /// Records that were understood but malformed, with their index in the payload.
    pub rejected: Vec<(usize, Error)>,
}

/// Collects the integer keyed parameter map of a connection method record.
pub(crate) fn parameter_map(
    v: ciborium::Value,
    not_a_map: Error,
) -> Result<BTreeMap<i128, ciborium::Value>, Error> {
    match v {
        ciborium::Value::Map(map) => map
            .into_iter()
            .map(|(k, v)| {
                let k = k.into_integer().map_err(|_| Error::Malformed)?.into();
                Ok((k, v))
            })
            .collect::<Result<BTreeMap<_, _>, Error>>(),
        _ => Err(not_a_map),
    }
}

fn as_u64(value: &ciborium::Value) -> Result<u64, Error> {
    match value {
        ciborium::Value::Integer(i) => u64::try_from(*i).map_err(|_| Error::Malformed),
        _ => Err(Error::Malformed),
    }
}

impl ConnectionMethod {
    pub fn method_type(&self) -> u64 {
        match self {
            Self::Nfc(_) => NfcOptions::METHOD_TYPE,
            Self::Ble(_) => BleOptions::METHOD_TYPE,
            Self::WifiAware(_) => WifiAwareOptions::METHOD_TYPE,
            Self::Http(_) => HttpOptions::METHOD_TYPE,
        }
    }

    pub fn max_version(&self) -> u64 {
        match self {
            Self::Nfc(_) => NfcOptions::METHOD_MAX_VERSION,
            Self::Ble(_) => BleOptions::METHOD_MAX_VERSION,
            Self::WifiAware(_) => WifiAwareOptions::METHOD_MAX_VERSION,
            Self::Http(_) => HttpOptions::METHOD_MAX_VERSION,
        }
    }

    /// Decodes one `[type, version, parameters]` record.
    ///
    /// Returns `Ok(None)` when the record is for a method type this crate does not know, or
    /// carries a version newer than the one supported for that type.
    pub fn decode_entry(value: ciborium::Value) -> Result<Option<Self>, Error> {
        match Self::try_from(value) {
            Ok(method) => Ok(Some(method)),
            Err(e) if e.is_skip() => {
                tracing::warn!("skipping connection method: {e}");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        Ok(cbor::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Option<Self>, Error> {
        let value: ciborium::Value = cbor::from_slice(bytes)?;
        Self::decode_entry(value)
    }

    /// Encodes methods as a CBOR array, in the order given.
    pub fn encode_list(methods: &[ConnectionMethod]) -> Result<Vec<u8>, Error> {
        let array = ciborium::Value::Array(methods.iter().cloned().map(Into::into).collect());
        Ok(cbor::to_vec(&array)?)
    }

    /// Decodes a CBOR array of connection method records.
    ///
    /// Only a payload that is not a CBOR array fails as a whole; each record is decoded on
    /// its own.
    pub fn decode_list(bytes: &[u8]) -> Result<DecodedConnectionMethods, Error> {
        let value: ciborium::Value = cbor::from_slice(bytes)?;
        let entries = match value {
            ciborium::Value::Array(entries) => entries,
            _ => return Err(Error::NotAnArray),
        };

        let mut decoded = DecodedConnectionMethods::default();
        for (index, entry) in entries.into_iter().enumerate() {
            match Self::decode_entry(entry) {
                Ok(Some(method)) => decoded.methods.push(method),
                Ok(None) => decoded.skipped.push(index),
                Err(e) => decoded.rejected.push((index, e)),
            }
        }
        Ok(decoded)
    }

    /// Splits BLE methods offering both central client and peripheral server mode into one
    /// method per mode. Other methods are returned unchanged.
    pub fn disambiguate(methods: Vec<ConnectionMethod>) -> Vec<ConnectionMethod> {
        let mut result = Vec::with_capacity(methods.len());
        for method in methods {
            match method {
                ConnectionMethod::Ble(BleOptions {
                    peripheral_server_mode: Some(peripheral),
                    central_client_mode: Some(central),
                }) => {
                    result.push(ConnectionMethod::Ble(BleOptions {
                        peripheral_server_mode: None,
                        central_client_mode: Some(central),
                    }));
                    result.push(ConnectionMethod::Ble(BleOptions {
                        peripheral_server_mode: Some(peripheral),
                        central_client_mode: None,
                    }));
                }
                other => result.push(other),
            }
        }
        result
    }

    /// Merges all BLE methods into a single one, placed where the first BLE method was.
    ///
    /// Fails with [Error::IncompatibleBleOptions] if two methods offer the same mode with
    /// different parameters.
    pub fn combine(methods: Vec<ConnectionMethod>) -> Result<Vec<ConnectionMethod>, Error> {
        let mut result = Vec::with_capacity(methods.len());
        let mut ble_index = None;
        let mut combined = BleOptions::default();

        for method in methods {
            match method {
                ConnectionMethod::Ble(options) => {
                    if let Some(central) = options.central_client_mode {
                        if combined
                            .central_client_mode
                            .as_ref()
                            .is_some_and(|existing| *existing != central)
                        {
                            return Err(Error::IncompatibleBleOptions);
                        }
                        combined.central_client_mode = Some(central);
                    }
                    if let Some(peripheral) = options.peripheral_server_mode {
                        if combined
                            .peripheral_server_mode
                            .as_ref()
                            .is_some_and(|existing| *existing != peripheral)
                        {
                            return Err(Error::IncompatibleBleOptions);
                        }
                        combined.peripheral_server_mode = Some(peripheral);
                    }
                    if ble_index.is_none() {
                        ble_index = Some(result.len());
                        result.push(ConnectionMethod::Ble(BleOptions::default()));
                    }
                }
                other => result.push(other),
            }
        }

        if let Some(index) = ble_index {
            result[index] = ConnectionMethod::Ble(combined);
        }
        Ok(result)
    }

    /// Converts the method into an NFC handover carrier configuration record.
    pub fn to_ndef_record(&self) -> Result<CarrierConfigurationRecord, Error> {
        match self {
            ConnectionMethod::Ble(options) => ndef::ble_to_record(options),
            ConnectionMethod::Nfc(_) | ConnectionMethod::WifiAware(_) | ConnectionMethod::Http(_) => {
                Err(Error::Unimplemented)
            }
        }
    }

    pub fn from_ndef_record(record: &CarrierConfigurationRecord) -> Result<Self, Error> {
        if record.tnf == ndef::TNF_MIME_MEDIA && record.record_type == ndef::BLE_OOB_RECORD_TYPE {
            ndef::ble_from_record(record).map(ConnectionMethod::Ble)
        } else {
            Err(Error::Unimplemented)
        }
    }
}

impl TryFrom<ciborium::Value> for ConnectionMethod {
    type Error = Error;

    fn try_from(value: ciborium::Value) -> Result<Self, Self::Error> {
        let list = match value {
            ciborium::Value::Array(list) => list,
            _ => return Err(Error::Malformed),
        };
        let [method_type, version, params]: [ciborium::Value; 3] =
            list.try_into().map_err(|_| Error::Malformed)?;
        let method_type = as_u64(&method_type)?;
        let version = as_u64(&version)?;

        let registration = REGISTRY
            .iter()
            .find(|r| r.method_type == method_type)
            .ok_or(Error::UnsupportedMethodType(method_type))?;
        if version > registration.max_version {
            return Err(Error::UnsupportedVersion {
                method_type,
                version,
                max_version: registration.max_version,
            });
        }
        (registration.decode)(params)
    }
}

impl From<ConnectionMethod> for ciborium::Value {
    fn from(method: ConnectionMethod) -> Self {
        let method_type = method.method_type().into();
        let version = method.max_version().into();
        let params = match method {
            ConnectionMethod::Nfc(opts) => opts.into(),
            ConnectionMethod::Ble(opts) => opts.into(),
            ConnectionMethod::WifiAware(opts) => opts.into(),
            ConnectionMethod::Http(opts) => opts.into(),
        };
        ciborium::Value::Array(vec![
            ciborium::Value::Integer(method_type),
            ciborium::Value::Integer(version),
            params,
        ])
    }
}

impl fmt::Display for ConnectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionMethod::Nfc(opts) => opts.fmt(f),
            ConnectionMethod::Ble(opts) => opts.fmt(f),
            ConnectionMethod::WifiAware(opts) => opts.fmt(f),
            ConnectionMethod::Http(opts) => opts.fmt(f),
        }
    }
}

#[cfg(test)]
mod test {
    use hex_literal::hex;
    use uuid::Uuid;

    use super::*;
    use crate::definitions::helpers::ByteStr;

    fn nfc() -> ConnectionMethod {
        ConnectionMethod::Nfc(NfcOptions::new(
            CommandDataLength::new(0xffff).unwrap(),
            ResponseDataLength::new(0x10000).unwrap(),
        ))
    }

    fn entry(method_type: u64, version: u64, params: ciborium::Value) -> ciborium::Value {
        ciborium::Value::Array(vec![
            ciborium::Value::Integer(method_type.into()),
            ciborium::Value::Integer(version.into()),
            params,
        ])
    }

    #[test]
    fn nfc_wire_format() {
        // [1, 1, {0: 255, 1: 256}]
        let method = ConnectionMethod::Nfc(NfcOptions::default());
        assert_eq!(method.to_bytes().unwrap(), hex!("830101a20018ff01190100"));
    }

    #[test]
    fn every_variant_roundtrips() {
        let methods = vec![
            nfc(),
            ConnectionMethod::Ble(BleOptions {
                peripheral_server_mode: Some(PeripheralServerMode {
                    uuid: Uuid::new_v4(),
                    ble_device_address: Some(ByteStr::from(vec![0xc0, 0, 0, 0, 0, 1])),
                    psm: Some(0x80),
                }),
                central_client_mode: Some(CentralClientMode {
                    uuid: Uuid::new_v4(),
                }),
            }),
            ConnectionMethod::WifiAware(WifiAwareOptions {
                pass_phrase: Some("hunter2".into()),
                channel_info_operating_class: Some(81),
                channel_info_channel_number: Some(6),
                band_info: Some(ByteStr::from(vec![0x14])),
            }),
            ConnectionMethod::Http(HttpOptions::new("https://example.com/mdoc/1234")),
        ];
        for method in methods {
            let bytes = method.to_bytes().unwrap();
            assert_eq!(ConnectionMethod::from_bytes(&bytes).unwrap(), Some(method));
        }
    }

    #[test]
    fn list_preserves_order_and_duplicates() {
        let ble = ConnectionMethod::Ble(BleOptions::central_client(Uuid::new_v4()));
        let methods = vec![ble.clone(), nfc(), ble];
        let bytes = ConnectionMethod::encode_list(&methods).unwrap();
        let decoded = ConnectionMethod::decode_list(&bytes).unwrap();
        assert_eq!(decoded.methods, methods);
        assert!(decoded.skipped.is_empty());
        assert!(decoded.rejected.is_empty());
    }

    #[test]
    fn newer_version_is_skipped() {
        let mut newer = ciborium::Value::from(nfc());
        if let ciborium::Value::Array(items) = &mut newer {
            items[1] = ciborium::Value::Integer((NfcOptions::METHOD_MAX_VERSION + 1).into());
        }
        let payload = ciborium::Value::Array(vec![newer, nfc().into()]);
        let bytes = cbor::to_vec(&payload).unwrap();

        let decoded = ConnectionMethod::decode_list(&bytes).unwrap();
        assert_eq!(decoded.methods, vec![nfc()]);
        assert_eq!(decoded.skipped, vec![0]);
        assert!(decoded.rejected.is_empty());
    }

    #[test]
    fn unknown_method_type_is_skipped() {
        let payload = ciborium::Value::Array(vec![
            entry(999, 1, ciborium::Value::Map(vec![])),
            nfc().into(),
        ]);
        let bytes = cbor::to_vec(&payload).unwrap();

        let decoded = ConnectionMethod::decode_list(&bytes).unwrap();
        assert_eq!(decoded.methods, vec![nfc()]);
        assert_eq!(decoded.skipped, vec![0]);
    }

    #[test]
    fn malformed_entry_fails_alone() {
        let payload = ciborium::Value::Array(vec![
            entry(NfcOptions::METHOD_TYPE, 1, ciborium::Value::Map(vec![])),
            ciborium::Value::Text("not a record".into()),
            nfc().into(),
        ]);
        let bytes = cbor::to_vec(&payload).unwrap();

        let decoded = ConnectionMethod::decode_list(&bytes).unwrap();
        assert_eq!(decoded.methods, vec![nfc()]);
        assert_eq!(
            decoded.rejected,
            vec![(0, Error::MissingParameter(0)), (1, Error::Malformed)]
        );
    }

    #[test]
    fn payload_must_be_an_array() {
        let bytes = cbor::to_vec(&ciborium::Value::Map(vec![])).unwrap();
        assert_eq!(
            ConnectionMethod::decode_list(&bytes),
            Err(Error::NotAnArray)
        );
    }

    #[test]
    fn disambiguate_then_combine() {
        let uuid = Uuid::new_v4();
        let both = ConnectionMethod::Ble(BleOptions {
            peripheral_server_mode: Some(PeripheralServerMode {
                uuid,
                ble_device_address: None,
                psm: None,
            }),
            central_client_mode: Some(CentralClientMode { uuid }),
        });
        let split = ConnectionMethod::disambiguate(vec![nfc(), both.clone()]);
        assert_eq!(
            split,
            vec![
                nfc(),
                ConnectionMethod::Ble(BleOptions::central_client(uuid)),
                ConnectionMethod::Ble(BleOptions::peripheral_server(uuid)),
            ]
        );
        assert_eq!(ConnectionMethod::combine(split).unwrap(), vec![nfc(), both]);
    }

    #[test]
    fn combine_rejects_conflicting_uuids() {
        let methods = vec![
            ConnectionMethod::Ble(BleOptions::central_client(Uuid::new_v4())),
            ConnectionMethod::Ble(BleOptions::central_client(Uuid::new_v4())),
        ];
        assert_eq!(
            ConnectionMethod::combine(methods),
            Err(Error::IncompatibleBleOptions)
        );
    }

    #[test]
    fn ndef_record_only_for_ble() {
        let ble = ConnectionMethod::Ble(BleOptions {
            peripheral_server_mode: Some(PeripheralServerMode {
                uuid: Uuid::new_v4(),
                ble_device_address: Some(ByteStr::from(vec![1, 2, 3, 4, 5, 6])),
                psm: Some(0x1001),
            }),
            central_client_mode: None,
        });
        let record = ble.to_ndef_record().unwrap();
        assert_eq!(ConnectionMethod::from_ndef_record(&record).unwrap(), ble);
        assert_eq!(nfc().to_ndef_record(), Err(Error::Unimplemented));
    }
}
