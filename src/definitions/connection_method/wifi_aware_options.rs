use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::definitions::helpers::ByteStr;

use super::{parameter_map, Error};

/// Represents the options for a `Wi-Fi Aware` data retrieval.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(try_from = "ciborium::Value", into = "ciborium::Value")]
pub struct WifiAwareOptions {
    /// The passphrase for the `Wi-Fi` connection. If [None], no passphrase is required.
    pub pass_phrase: Option<String>,

    /// The operating class of the `Wi-Fi` channel. If [None], the operating class is not specified.
    pub channel_info_operating_class: Option<u64>,

    /// The channel number of the `Wi-Fi` channel. If [None], the channel number is not specified.
    pub channel_info_channel_number: Option<u64>,

    /// The band information of the `Wi-Fi` channel. If [None], the band information is not specified.
    pub band_info: Option<ByteStr>,
}

impl WifiAwareOptions {
    pub const METHOD_TYPE: u64 = 3;
    pub const METHOD_MAX_VERSION: u64 = 1;
}

fn lookup_opt_string(
    map: &BTreeMap<i128, ciborium::Value>,
    idx: i128,
) -> Result<Option<String>, Error> {
    match map.get(&idx) {
        None => Ok(None),
        Some(ciborium::Value::Text(text)) => Ok(Some(text.to_string())),
        _ => Err(Error::InvalidWifiAwareOptions),
    }
}

fn lookup_opt_u64(map: &BTreeMap<i128, ciborium::Value>, idx: i128) -> Result<Option<u64>, Error> {
    match map.get(&idx) {
        None => Ok(None),
        Some(ciborium::Value::Integer(int_val)) => {
            let uint_val = u64::try_from(*int_val).map_err(|_| Error::InvalidWifiAwareOptions)?;
            Ok(Some(uint_val))
        }
        _ => Err(Error::InvalidWifiAwareOptions),
    }
}

fn lookup_opt_bytestr(
    map: &BTreeMap<i128, ciborium::Value>,
    idx: i128,
) -> Result<Option<ByteStr>, Error> {
    match map.get(&idx) {
        None => Ok(None),
        Some(cbor_val) => {
            let byte_str =
                ByteStr::try_from(cbor_val.clone()).map_err(|_| Error::InvalidWifiAwareOptions)?;
            Ok(Some(byte_str))
        }
    }
}

impl TryFrom<ciborium::Value> for WifiAwareOptions {
    type Error = Error;

    fn try_from(v: ciborium::Value) -> Result<Self, Error> {
        let map = parameter_map(v, Error::InvalidWifiAwareOptions)?;

        Ok(WifiAwareOptions {
            pass_phrase: lookup_opt_string(&map, 0)?,
            channel_info_operating_class: lookup_opt_u64(&map, 1)?,
            channel_info_channel_number: lookup_opt_u64(&map, 2)?,
            band_info: lookup_opt_bytestr(&map, 3)?,
        })
    }
}

impl From<WifiAwareOptions> for ciborium::Value {
    fn from(o: WifiAwareOptions) -> ciborium::Value {
        let mut map = vec![];
        if let Some(v) = o.pass_phrase {
            map.push((ciborium::Value::Integer(0.into()), ciborium::Value::Text(v)));
        }
        if let Some(v) = o.channel_info_operating_class {
            map.push((
                ciborium::Value::Integer(1.into()),
                ciborium::Value::Integer(v.into()),
            ));
        }
        if let Some(v) = o.channel_info_channel_number {
            map.push((
                ciborium::Value::Integer(2.into()),
                ciborium::Value::Integer(v.into()),
            ));
        }
        if let Some(v) = o.band_info {
            map.push((ciborium::Value::Integer(3.into()), v.into()));
        }

        ciborium::Value::Map(map)
    }
}

impl fmt::Display for WifiAwareOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "wifi_aware")?;
        if let Some(pass_phrase) = &self.pass_phrase {
            write!(f, ":passphrase={pass_phrase}")?;
        }
        if let Some(class) = self.channel_info_operating_class {
            write!(f, ":channel_info_operating_class={class}")?;
        }
        if let Some(number) = self.channel_info_channel_number {
            write!(f, ":channel_info_channel_number={number}")?;
        }
        if let Some(bands) = &self.band_info {
            write!(f, ":base_info_supported_bands={}", hex::encode(bands))?;
        }
        Ok(())
    }
}
