//! Value codec: short-float packing, byte-order helpers and raw register
//! to physical unit conversions.
//!
//! Short-float layout (16 bits):
//!
//! ```text
//!  15      12 11                     0
//! ┌──────────┬────────────────────────┐
//! │ exponent │        mantissa        │
//! └──────────┴────────────────────────┘
//!   value = mantissa × 2^exponent / 100
//! ```
//!
//! The mantissa is read back unsigned, so the round-trip domain is
//! `0 ≤ x ≤ 4095 × 2^15 / 100`.  Larger inputs wrap the exponent and
//! negative inputs pack a two's-complement mantissa; neither is signalled.

/// Fixed-point scale applied before packing.
pub const PRECISION: f64 = 100.0;
/// Integer variant of [`PRECISION`].
pub const IPRECISION: i64 = 100;
/// Marker byte written into a sample buffer when the read failed.
pub const ERROR_DATA: u8 = 0xCC;

const MANTISSA_MAX: u16 = 0x0FFF;

// ═══════════════════════════════════════════════════════════════════════════
//  Short-float
// ═══════════════════════════════════════════════════════════════════════════

pub fn encode_short_float(x: f64) -> u16 {
    let sign = if x > 0.0 { 1.0 } else { -1.0 };
    let mut mantissa = x.abs() * PRECISION;
    let mut exponent: u16 = 0;

    while mantissa > f64::from(MANTISSA_MAX) && mantissa.is_finite() {
        exponent = exponent.wrapping_add(1);
        mantissa /= 2.0;
    }

    let signed = (sign * mantissa).round() as i32;
    pack(exponent, signed as u16)
}

pub fn decode_short_float(raw: u16) -> f64 {
    let exponent = i32::from((raw >> 12) & 0x0F);
    let mantissa = f64::from(raw & MANTISSA_MAX);
    mantissa * 2f64.powi(exponent) / PRECISION
}

/// Integer flavour: identical packing with truncating halving.
pub fn encode_int_short_float(value: i32) -> u16 {
    let sign: i64 = if value > 0 { 1 } else { -1 };
    let mut mantissa = i64::from(value).abs() * IPRECISION;
    let mut exponent: u16 = 0;

    while mantissa > i64::from(MANTISSA_MAX) {
        exponent = exponent.wrapping_add(1);
        mantissa /= 2;
    }

    pack(exponent, (sign * mantissa) as u16)
}

/// Largest absolute error `decode(encode(x))` may show for `x` in range.
pub fn quantization_step(raw: u16) -> f64 {
    let exponent = i32::from((raw >> 12) & 0x0F);
    2f64.powi(exponent) / PRECISION
}

#[inline]
fn pack(exponent: u16, mantissa: u16) -> u16 {
    ((exponent & 0x0F) << 12) | (mantissa & MANTISSA_MAX)
}

// ═══════════════════════════════════════════════════════════════════════════
//  Byte order
// ═══════════════════════════════════════════════════════════════════════════

/// Swap every byte pair in place (big-endian registers to little-endian
/// characteristic layout).  A trailing odd byte is left untouched.
pub fn swap_bytes_16(buf: &mut [u8]) {
    debug_assert!(buf.len() % 2 == 0, "odd buffer length {}", buf.len());
    for pair in buf.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

#[inline]
pub fn u8_pair_to_i16(lo: u8, hi: u8) -> i16 {
    i16::from_le_bytes([lo, hi])
}

pub fn fill_error_data(buf: &mut [u8]) {
    buf.fill(ERROR_DATA);
}

// ═══════════════════════════════════════════════════════════════════════════
//  Unit conversions
// ═══════════════════════════════════════════════════════════════════════════

/// Accelerometer full-scale range (ACCEL_CONFIG bits 4:3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum AccRange {
    #[default]
    G2 = 0,
    G4 = 1,
    G8 = 2,
    G16 = 3,
}

impl AccRange {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            0 => Self::G2,
            1 => Self::G4,
            2 => Self::G8,
            _ => Self::G16,
        }
    }

    pub const fn full_scale_g(self) -> i32 {
        match self {
            Self::G2 => 2,
            Self::G4 => 4,
            Self::G8 => 8,
            Self::G16 => 16,
        }
    }
}

/// Accelerometer counts to g.
pub fn acc_to_g(raw: i16, range: AccRange) -> f32 {
    let counts_per_g = 32_768 / range.full_scale_g();
    f32::from(raw) / counts_per_g as f32
}

/// Gyro counts to degrees per second (±250 °/s range).
pub fn gyro_to_dps(raw: i16) -> f32 {
    const COUNTS_PER_DPS: i32 = 65_536 / 500;
    f32::from(raw) / COUNTS_PER_DPS as f32
}

/// HDC1000 temperature register to °C.
pub fn hdc_temperature_c(raw: u16) -> f32 {
    (f64::from(raw) / 65_536.0 * 165.0 - 40.0) as f32
}

/// HDC1000 humidity register to %RH.
pub fn hdc_humidity_rh(raw: u16) -> f32 {
    (f64::from(raw) / 65_536.0 * 100.0) as f32
}

/// OPT3001 result register (4-bit exponent, 12-bit mantissa) to lux.
pub fn opt_lux(raw: u16) -> f32 {
    let mantissa = f32::from(raw & 0x0FFF);
    let exponent = i32::from((raw >> 12) & 0x0F);
    mantissa * 0.01 * 2f32.powi(exponent)
}
