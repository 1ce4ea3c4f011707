//! Fuzz target: short-float packing.
//!
//! Invariants checked:
//! - No panics for any 16-bit pattern or any `f64` (NaN and infinities
//!   included)
//! - Re-encoding a decoded value reproduces it within half a step
//!
//! cargo fuzz run fuzz_short_float

#![no_main]

use libfuzzer_sys::fuzz_target;
use sensortag::codec::{
    decode_short_float, encode_int_short_float, encode_short_float, quantization_step,
};

fuzz_target!(|data: &[u8]| {
    if data.len() >= 2 {
        let raw = u16::from_le_bytes([data[0], data[1]]);
        let value = decode_short_float(raw);
        let again = decode_short_float(encode_short_float(value));
        assert!(
            (again - value).abs() <= quantization_step(raw) / 2.0 + 1e-9,
            "raw=0x{raw:04X} value={value} again={again}"
        );
    }

    if data.len() >= 8 {
        let bits = u64::from_le_bytes(data[..8].try_into().unwrap());
        let _ = encode_short_float(f64::from_bits(bits));
        let _ = encode_int_short_float(bits as i32);
    }
});
