//! Conversion of connection methods to and from the carrier configuration records used
//! during NFC static and negotiated handover.
use strum::IntoEnumIterator;
use uuid::Uuid;

use crate::definitions::helpers::ByteStr;

use super::ble_options::{BleOptions, CentralClientMode, PeripheralServerMode};
use super::Error;

/// MIME record type of a Bluetooth LE out-of-band carrier configuration.
pub const BLE_OOB_RECORD_TYPE: &[u8] = b"application/vnd.bluetooth.le.oob";

/// Type name format of a record whose type is a MIME media type.
pub const TNF_MIME_MEDIA: u8 = 0x02;

/// A single NDEF record describing an alternative carrier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CarrierConfigurationRecord {
    pub tnf: u8,
    pub record_type: Vec<u8>,
    pub id: Vec<u8>,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::EnumIter)]
#[repr(u8)]
pub enum AdType {
    CompleteList128BitServiceUuids = 0x07,
    MacAddress = 0x1b,
    LeRole = 0x1c,
    PeripheralServerModePsm = 0x77,
}

impl TryFrom<u8> for AdType {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        Self::iter().find(|&v| v as u8 == raw).ok_or(raw)
    }
}

/// Length of a Bluetooth device address.
const DEVICE_ADDRESS_LEN: usize = 6;

/// LE role values from the Bluetooth Core Specification Supplement, Part A, 1.17.
mod le_role {
    pub const PERIPHERAL_ONLY: u8 = 0x00;
    pub const CENTRAL_ONLY: u8 = 0x01;
    pub const BOTH_PERIPHERAL_PREFERRED: u8 = 0x02;
    pub const BOTH_CENTRAL_PREFERRED: u8 = 0x03;
}

pub struct AdPacket<'a> {
    pub kind: Result<AdType, u8>,
    pub data: &'a [u8],
}

impl<'a> AdPacket<'a> {
    pub fn parse_buffer(buffer: &'a [u8]) -> impl Iterator<Item = Self> {
        let mut cursor = 0;
        std::iter::from_fn(move || {
            if cursor >= buffer.len() {
                return None;
            }
            let len = buffer[cursor] as usize;
            cursor += 1;
            if len == 0 || cursor + len > buffer.len() {
                return None;
            }
            let ad_type = buffer[cursor];
            let ad_data = &buffer[cursor + 1..cursor + len];
            cursor += len;

            Some(Self {
                kind: AdType::try_from(ad_type),
                data: ad_data,
            })
        })
    }

    fn write(out: &mut Vec<u8>, kind: AdType, data: &[u8]) -> Result<(), Error> {
        let len = u8::try_from(data.len() + 1).map_err(|_| Error::InvalidBleOptions)?;
        out.push(len);
        out.push(kind as u8);
        out.extend_from_slice(data);
        Ok(())
    }
}

pub(super) fn ble_to_record(options: &BleOptions) -> Result<CarrierConfigurationRecord, Error> {
    let (role, uuid) = match (&options.peripheral_server_mode, &options.central_client_mode) {
        (Some(peripheral), Some(central)) => {
            if peripheral.uuid != central.uuid {
                return Err(Error::IncompatibleBleOptions);
            }
            (le_role::BOTH_PERIPHERAL_PREFERRED, peripheral.uuid)
        }
        (Some(peripheral), None) => (le_role::PERIPHERAL_ONLY, peripheral.uuid),
        (None, Some(central)) => (le_role::CENTRAL_ONLY, central.uuid),
        (None, None) => return Err(Error::InvalidBleOptions),
    };

    let mut payload = vec![];
    AdPacket::write(&mut payload, AdType::LeRole, &[role])?;
    // 128-bit UUIDs are carried little-endian in AD structures.
    let mut uuid_le = *uuid.as_bytes();
    uuid_le.reverse();
    AdPacket::write(&mut payload, AdType::CompleteList128BitServiceUuids, &uuid_le)?;

    if let Some(peripheral) = &options.peripheral_server_mode {
        if let Some(address) = &peripheral.ble_device_address {
            if address.len() != DEVICE_ADDRESS_LEN {
                return Err(Error::InvalidBleOptions);
            }
            let mut data = address.as_ref().to_vec();
            // Public device address.
            data.push(0x00);
            AdPacket::write(&mut payload, AdType::MacAddress, &data)?;
        }
        if let Some(psm) = peripheral.psm {
            AdPacket::write(
                &mut payload,
                AdType::PeripheralServerModePsm,
                &psm.to_le_bytes(),
            )?;
        }
    }

    Ok(CarrierConfigurationRecord {
        tnf: TNF_MIME_MEDIA,
        record_type: BLE_OOB_RECORD_TYPE.to_vec(),
        id: b"0".to_vec(),
        payload,
    })
}

pub(super) fn ble_from_record(record: &CarrierConfigurationRecord) -> Result<BleOptions, Error> {
    let mut role = None;
    let mut uuid = None;
    let mut ble_device_address = None;
    let mut psm = None;

    for packet in AdPacket::parse_buffer(&record.payload) {
        match packet.kind {
            Ok(AdType::LeRole) => {
                role = Some(*packet.data.first().ok_or(Error::InvalidBleOptions)?);
            }
            Ok(AdType::CompleteList128BitServiceUuids) => {
                let first: [u8; 16] = packet
                    .data
                    .get(..16)
                    .and_then(|b| b.try_into().ok())
                    .ok_or(Error::InvalidBleOptions)?;
                let mut be = first;
                be.reverse();
                uuid = Some(Uuid::from_bytes(be));
            }
            Ok(AdType::MacAddress) => {
                let address = packet
                    .data
                    .get(..DEVICE_ADDRESS_LEN)
                    .ok_or(Error::InvalidBleOptions)?;
                ble_device_address = Some(ByteStr::from(address));
            }
            Ok(AdType::PeripheralServerModePsm) => {
                let bytes: [u8; 4] = packet
                    .data
                    .try_into()
                    .map_err(|_| Error::InvalidBleOptions)?;
                psm = Some(u32::from_le_bytes(bytes));
            }
            Err(unknown) => {
                tracing::debug!("ignoring AD structure of type {unknown:#04x}");
            }
        }
    }

    let uuid = uuid.ok_or(Error::InvalidBleOptions)?;
    let peripheral = PeripheralServerMode {
        uuid,
        ble_device_address,
        psm,
    };
    let central = CentralClientMode { uuid };
    match role.ok_or(Error::InvalidBleOptions)? {
        le_role::PERIPHERAL_ONLY => Ok(BleOptions {
            peripheral_server_mode: Some(peripheral),
            central_client_mode: None,
        }),
        le_role::CENTRAL_ONLY => Ok(BleOptions {
            peripheral_server_mode: None,
            central_client_mode: Some(central),
        }),
        le_role::BOTH_PERIPHERAL_PREFERRED | le_role::BOTH_CENTRAL_PREFERRED => Ok(BleOptions {
            peripheral_server_mode: Some(peripheral),
            central_client_mode: Some(central),
        }),
        _ => Err(Error::InvalidBleOptions),
    }
}
