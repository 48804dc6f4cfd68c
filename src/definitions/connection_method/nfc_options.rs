use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{parameter_map, Error};

/// The maximum length of the NFC command, as specified in ISO_18013-5 2021 Section 8.3.3.1.2
/// Values of this type must lie between 255 and 65,535 inclusive, as specified in Note 2.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct CommandDataLength(u16);

/// The maximum length of the NFC response data, as specified in ISO_18013-5 2021 Section 8.3.3.1.2
/// Values of this type must lie between 256 and 65,536 inclusive, as specified in Note 2.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ResponseDataLength(u32);

/// NFC data transfer options advertised in device engagement.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(try_from = "ciborium::Value", into = "ciborium::Value")]
pub struct NfcOptions {
    max_len_command_data_field: CommandDataLength,
    max_len_response_data_field: ResponseDataLength,
}

impl NfcOptions {
    pub const METHOD_TYPE: u64 = 1;
    pub const METHOD_MAX_VERSION: u64 = 1;

    const KEY_COMMAND_DATA_FIELD_MAX_LENGTH: i128 = 0;
    const KEY_RESPONSE_DATA_FIELD_MAX_LENGTH: i128 = 1;

    pub fn new(
        max_len_command_data_field: CommandDataLength,
        max_len_response_data_field: ResponseDataLength,
    ) -> Self {
        Self {
            max_len_command_data_field,
            max_len_response_data_field,
        }
    }

    pub fn max_len_command_data_field(&self) -> CommandDataLength {
        self.max_len_command_data_field
    }

    pub fn max_len_response_data_field(&self) -> ResponseDataLength {
        self.max_len_response_data_field
    }
}

impl fmt::Display for NfcOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "nfc:cmd_max_length={}:resp_max_length={}",
            self.max_len_command_data_field.get(),
            self.max_len_response_data_field.get()
        )
    }
}

impl TryFrom<ciborium::Value> for NfcOptions {
    type Error = Error;

    fn try_from(v: ciborium::Value) -> Result<Self, Error> {
        let map: BTreeMap<i128, ciborium::Value> = parameter_map(v, Error::InvalidNfcOptions)?;

        let max_len_command_data_field = map
            .get(&Self::KEY_COMMAND_DATA_FIELD_MAX_LENGTH)
            .ok_or(Error::MissingParameter(Self::KEY_COMMAND_DATA_FIELD_MAX_LENGTH))
            .and_then(CommandDataLength::try_from)?;
        let max_len_response_data_field = map
            .get(&Self::KEY_RESPONSE_DATA_FIELD_MAX_LENGTH)
            .ok_or(Error::MissingParameter(Self::KEY_RESPONSE_DATA_FIELD_MAX_LENGTH))
            .and_then(ResponseDataLength::try_from)?;

        Ok(NfcOptions {
            max_len_command_data_field,
            max_len_response_data_field,
        })
    }
}

impl From<NfcOptions> for ciborium::Value {
    fn from(o: NfcOptions) -> ciborium::Value {
        ciborium::Value::Map(vec![
            (
                ciborium::Value::Integer(0.into()),
                ciborium::Value::from(o.max_len_command_data_field),
            ),
            (
                ciborium::Value::Integer(1.into()),
                ciborium::Value::from(o.max_len_response_data_field),
            ),
        ])
    }
}

impl CommandDataLength {
    pub const MIN: CommandDataLength = CommandDataLength(255);
    pub const MAX: CommandDataLength = CommandDataLength(65535);

    pub const fn new(v: u16) -> Option<CommandDataLength> {
        match v >= Self::MIN.get() && v <= Self::MAX.get() {
            true => Some(CommandDataLength(v)),
            false => None,
        }
    }

    pub const fn get(&self) -> u16 {
        self.0
    }
}

/// ISO_18013-5 2021 does not specify a default value for the Command Data Length, so we make
/// a safe assumption here and specify the minimum value, which is 255.
impl Default for CommandDataLength {
    fn default() -> Self {
        Self::MIN
    }
}

macro_rules! command_data_length_try_from {
    ( $( $Ty: ident($Int: ty); )+ ) => {
        $(
            impl TryFrom<$Int> for $Ty {
                type Error = Error;

                fn try_from(v: $Int) -> Result<Self, Self::Error> {
                    u16::try_from(v)
                        .ok()
                        .and_then(CommandDataLength::new)
                        .ok_or(Error::InvalidNfcCommandDataLength)
                }
            }
        )+
    }
}

// u8 has a maximum value of 255, which is the minimum value a CommandDataLength may contain, so
// it is included.
command_data_length_try_from! {
    CommandDataLength(i32);
    CommandDataLength(i64);
    CommandDataLength(i128);
    CommandDataLength(u8);
    CommandDataLength(u16);
    CommandDataLength(u32);
    CommandDataLength(u64);
}

impl TryFrom<&ciborium::Value> for CommandDataLength {
    type Error = Error;

    fn try_from(v: &ciborium::Value) -> Result<Self, Error> {
        match v {
            ciborium::Value::Integer(int_val) => Self::try_from(i128::from(*int_val)),
            _ => Err(Error::InvalidNfcOptions),
        }
    }
}

impl From<CommandDataLength> for ciborium::Value {
    fn from(cdl: CommandDataLength) -> ciborium::Value {
        ciborium::Value::Integer(cdl.get().into())
    }
}

impl ResponseDataLength {
    pub const MIN: ResponseDataLength = ResponseDataLength(256);
    pub const MAX: ResponseDataLength = ResponseDataLength(65536);

    pub const fn new(v: u32) -> Option<ResponseDataLength> {
        match v >= Self::MIN.get() && v <= Self::MAX.get() {
            true => Some(ResponseDataLength(v)),
            false => None,
        }
    }

    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// ISO_18013-5 2021 does not specify a default value for the Response Data Length, so we make
/// a safe assumption here and specify the minimum value, which is 256.
impl Default for ResponseDataLength {
    fn default() -> Self {
        Self::MIN
    }
}

macro_rules! response_data_length_try_from {
    ( $( $Ty: ident($Int: ty); )+ ) => {
        $(
            impl TryFrom<$Int> for $Ty {
                type Error = Error;

                fn try_from(v: $Int) -> Result<Self, Self::Error> {
                    u32::try_from(v)
                        .ok()
                        .and_then(ResponseDataLength::new)
                        .ok_or(Error::InvalidNfcResponseDataLength)
                }
            }
        )+
    }
}

// i8 and u8 are omitted because they cannot represent the minimum value of 256
response_data_length_try_from! {
    ResponseDataLength(i32);
    ResponseDataLength(i64);
    ResponseDataLength(i128);
    ResponseDataLength(u16);
    ResponseDataLength(u32);
    ResponseDataLength(u64);
}

impl TryFrom<&ciborium::Value> for ResponseDataLength {
    type Error = Error;

    fn try_from(v: &ciborium::Value) -> Result<Self, Error> {
        match v {
            ciborium::Value::Integer(int_val) => Self::try_from(i128::from(*int_val)),
            _ => Err(Error::InvalidNfcOptions),
        }
    }
}

impl From<ResponseDataLength> for ciborium::Value {
    fn from(rdl: ResponseDataLength) -> ciborium::Value {
        ciborium::Value::Integer(rdl.get().into())
    }
}
