//! Holder-side building blocks for ISO/IEC 18013-5 mobile documents.
//!
//! - [document::DocumentStore] keeps the documents held on the device, one shared instance
//!   per name, and broadcasts their lifecycle as [document::DocumentEvent]s.
//! - [definitions::ConnectionMethod] encodes and decodes the device engagement connection
//!   methods (NFC, BLE, Wi-Fi Aware, HTTP).
//! - [storage] and [secure_area] are the seams for persistence and key material.
pub mod cbor;
pub mod config;
pub mod definitions;
pub mod document;
pub mod secure_area;
pub mod storage;
