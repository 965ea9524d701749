//! Utility module
//!
//! Fixed-point conversions shared by the control law and the wire codecs.

use crate::core::{INV_SCALE_FACTOR, SCALE_FACTOR};

/// Converts a fixed-point wire value to its real value
pub fn dequantize(value: i32) -> f64 {
    value as f64 * INV_SCALE_FACTOR
}

/// Converts a real value to fixed point, truncating toward zero
///
/// Out-of-range values saturate at the i32 bounds, matching the firmware cast.
pub fn quantize(value: f64) -> i32 {
    (value * SCALE_FACTOR).trunc() as i32
}

/// Sign of `x` with `sign(0) == 0`
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
