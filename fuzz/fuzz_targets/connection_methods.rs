#![no_main]

use libfuzzer_sys::fuzz_target;
use mdoc_holder::definitions::ConnectionMethod;

fuzz_target!(|data: &[u8]| {
    if let Ok(decoded) = ConnectionMethod::decode_list(data) {
        // Whatever decodes must encode again.
        let _ = ConnectionMethod::encode_list(&decoded.methods).unwrap();
    }
});
