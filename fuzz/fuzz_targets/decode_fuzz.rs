#![no_main]
use libfuzzer_sys::fuzz_target;
use rser::wire::{DecodeOptions, KeyCache, decode_message, decode_value_with};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must only ever produce errors, never panics.
    let _ = decode_message(data);

    let opts = DecodeOptions {
        max_depth: 64,
        ..DecodeOptions::default()
    };
    let mut cache = KeyCache::new();
    if let Ok(value) = decode_value_with(data, &opts, Some(&mut cache)) {
        // Whatever decodes must encode again.
        let _ = rser::encode_value(&value).unwrap();
    }
});
