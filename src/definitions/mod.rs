pub mod connection_method;
pub mod helpers;

pub use connection_method::{
    BleOptions, ConnectionMethod, DecodedConnectionMethods, HttpOptions, NfcOptions,
    WifiAwareOptions,
};
