use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::definitions::helpers::ByteStr;

use super::{parameter_map, Error};

/// Represents the options for `Bluetooth Low Energy` (BLE) data retrieval.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(try_from = "ciborium::Value", into = "ciborium::Value")]
pub struct BleOptions {
    /// The peripheral server mode for `BLE` data retrieval.
    pub peripheral_server_mode: Option<PeripheralServerMode>,

    /// The central client mode for `BLE` data retrieval.
    pub central_client_mode: Option<CentralClientMode>,
}

/// Represents a peripheral server mode.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PeripheralServerMode {
    /// The 'UUID' of the peripheral server.
    pub uuid: Uuid,

    /// The 'BLE' device address of the peripheral server, if available.
    pub ble_device_address: Option<ByteStr>,

    /// The L2CAP protocol/service multiplexer the peripheral listens on, if any.
    pub psm: Option<u32>,
}

/// Represents the central client mode.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CentralClientMode {
    pub uuid: Uuid,
}

impl BleOptions {
    pub const METHOD_TYPE: u64 = 2;
    pub const METHOD_MAX_VERSION: u64 = 1;

    const KEY_PERIPHERAL_SERVER_MODE: i128 = 0;
    const KEY_CENTRAL_CLIENT_MODE: i128 = 1;
    const KEY_PERIPHERAL_SERVER_MODE_UUID: i128 = 10;
    const KEY_CENTRAL_CLIENT_MODE_UUID: i128 = 11;
    const KEY_PERIPHERAL_SERVER_MODE_DEVICE_ADDRESS: i128 = 20;
    const KEY_PERIPHERAL_SERVER_MODE_PSM: i128 = 2048;

    pub fn central_client(uuid: Uuid) -> Self {
        Self {
            peripheral_server_mode: None,
            central_client_mode: Some(CentralClientMode { uuid }),
        }
    }

    pub fn peripheral_server(uuid: Uuid) -> Self {
        Self {
            peripheral_server_mode: Some(PeripheralServerMode {
                uuid,
                ble_device_address: None,
                psm: None,
            }),
            central_client_mode: None,
        }
    }

    pub fn supports_both_modes(&self) -> bool {
        self.peripheral_server_mode.is_some() && self.central_client_mode.is_some()
    }
}

fn uuid_from_value(value: ciborium::Value) -> Result<Uuid, Error> {
    match value {
        ciborium::Value::Bytes(bytes) => {
            let uuid_bytes: [u8; 16] = bytes.try_into().map_err(|_| Error::InvalidBleOptions)?;
            Ok(Uuid::from_bytes(uuid_bytes))
        }
        _ => Err(Error::InvalidBleOptions),
    }
}

impl TryFrom<ciborium::Value> for BleOptions {
    type Error = Error;

    fn try_from(v: ciborium::Value) -> Result<Self, Error> {
        let mut map: BTreeMap<i128, ciborium::Value> = parameter_map(v, Error::InvalidBleOptions)?;

        let central_client_mode = match map.remove(&Self::KEY_CENTRAL_CLIENT_MODE) {
            Some(ciborium::Value::Bool(true)) => {
                let uuid = map
                    .remove(&Self::KEY_CENTRAL_CLIENT_MODE_UUID)
                    .ok_or(Error::MissingParameter(Self::KEY_CENTRAL_CLIENT_MODE_UUID))
                    .and_then(uuid_from_value)?;
                Some(CentralClientMode { uuid })
            }
            Some(ciborium::Value::Bool(false)) => None,
            Some(_) => return Err(Error::InvalidBleOptions),
            None => return Err(Error::MissingParameter(Self::KEY_CENTRAL_CLIENT_MODE)),
        };

        let peripheral_server_mode = match map.remove(&Self::KEY_PERIPHERAL_SERVER_MODE) {
            Some(ciborium::Value::Bool(true)) => {
                let uuid = map
                    .remove(&Self::KEY_PERIPHERAL_SERVER_MODE_UUID)
                    .ok_or(Error::MissingParameter(Self::KEY_PERIPHERAL_SERVER_MODE_UUID))
                    .and_then(uuid_from_value)?;
                let ble_device_address = match map.remove(&Self::KEY_PERIPHERAL_SERVER_MODE_DEVICE_ADDRESS) {
                    Some(value) => Some(ByteStr::try_from(value).map_err(|_| Error::InvalidBleOptions)?),
                    None => None,
                };
                let psm = match map.remove(&Self::KEY_PERIPHERAL_SERVER_MODE_PSM) {
                    Some(ciborium::Value::Integer(psm)) => {
                        Some(u32::try_from(psm).map_err(|_| Error::InvalidBleOptions)?)
                    }
                    Some(_) => return Err(Error::InvalidBleOptions),
                    None => None,
                };
                Some(PeripheralServerMode {
                    uuid,
                    ble_device_address,
                    psm,
                })
            }
            Some(ciborium::Value::Bool(false)) => None,
            Some(_) => return Err(Error::InvalidBleOptions),
            None => return Err(Error::MissingParameter(Self::KEY_PERIPHERAL_SERVER_MODE)),
        };

        Ok(BleOptions {
            central_client_mode,
            peripheral_server_mode,
        })
    }
}

impl From<BleOptions> for ciborium::Value {
    fn from(o: BleOptions) -> ciborium::Value {
        let mut map = vec![];

        match o.peripheral_server_mode {
            Some(PeripheralServerMode {
                uuid,
                ble_device_address,
                psm,
            }) => {
                map.push((
                    ciborium::Value::Integer(0.into()),
                    ciborium::Value::Bool(true),
                ));
                map.push((
                    ciborium::Value::Integer(10.into()),
                    ciborium::Value::Bytes(uuid.as_bytes().to_vec()),
                ));
                if let Some(address) = ble_device_address {
                    map.push((ciborium::Value::Integer(20.into()), address.into()));
                }
                if let Some(psm) = psm {
                    map.push((
                        ciborium::Value::Integer(2048.into()),
                        ciborium::Value::Integer(psm.into()),
                    ));
                }
            }
            None => {
                map.push((
                    ciborium::Value::Integer(0.into()),
                    ciborium::Value::Bool(false),
                ));
            }
        }

        match o.central_client_mode {
            Some(CentralClientMode { uuid }) => {
                map.push((
                    ciborium::Value::Integer(1.into()),
                    ciborium::Value::Bool(true),
                ));
                map.push((
                    ciborium::Value::Integer(11.into()),
                    ciborium::Value::Bytes(uuid.as_bytes().to_vec()),
                ));
            }
            None => {
                map.push((
                    ciborium::Value::Integer(1.into()),
                    ciborium::Value::Bool(false),
                ));
            }
        }

        ciborium::Value::Map(map)
    }
}

impl fmt::Display for BleOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ble:central_client_mode={}:peripheral_server_mode={}",
            self.central_client_mode.is_some(),
            self.peripheral_server_mode.is_some()
        )?;
        if let Some(central) = &self.central_client_mode {
            write!(f, ":central_client_mode_uuid={}", central.uuid)?;
        }
        if let Some(peripheral) = &self.peripheral_server_mode {
            write!(f, ":peripheral_server_mode_uuid={}", peripheral.uuid)?;
            if let Some(address) = &peripheral.ble_device_address {
                write!(f, ":mac={}", hex::encode(address))?;
            }
            if let Some(psm) = peripheral.psm {
                write!(f, ":psm={psm}")?;
            }
        }
        Ok(())
    }
}
