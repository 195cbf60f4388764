// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-point synaptic weight conversion
//!
//! Weights are stored in 16 bits. With a ring-buffer left shift `s`, a weight
//! `w` is stored as `round(w * 2^(15 - s) * global_scale)`.

/// Weight multiplier for a ring-buffer left shift
///
/// # Example
/// ```
/// use synmatrix_neural::synapse::weight_scale_for_shift;
///
/// assert_eq!(weight_scale_for_shift(1, 1.0), 16384.0);
/// assert_eq!(weight_scale_for_shift(15, 1.0), 1.0);
/// ```
#[inline]
pub fn weight_scale_for_shift(shift: u8, global_weight_scale: f64) -> f64 {
    2f64.powi(15 - shift as i32) * global_weight_scale
}

/// A weight in its 16-bit field, with a flag set when the value did not fit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedWeight {
    pub raw: u16,
    pub saturated: bool,
}

/// Convert a weight to its fixed-point field
///
/// Unsigned weights store the magnitude (the sign is carried by the synapse
/// type); signed weights use 16-bit two's complement. Out-of-range values
/// saturate instead of wrapping.
///
/// # Example
/// ```
/// use synmatrix_neural::synapse::encode_weight;
///
/// assert_eq!(encode_weight(1.0, 16384.0, false).raw, 16384);
/// assert!(encode_weight(5.0, 16384.0, false).saturated);
/// ```
pub fn encode_weight(weight: f64, scale: f64, signed: bool) -> EncodedWeight {
    if signed {
        let value = (weight * scale).round();
        let clamped = value.clamp(i16::MIN as f64, i16::MAX as f64);
        EncodedWeight {
            raw: (clamped as i16) as u16,
            saturated: clamped != value,
        }
    } else {
        let value = (weight.abs() * scale).round();
        let clamped = value.min(u16::MAX as f64);
        EncodedWeight {
            raw: clamped as u16,
            saturated: clamped != value,
        }
    }
}

/// Convert a fixed-point field back to a weight
#[inline]
pub fn decode_weight(raw: u16, scale: f64, signed: bool) -> f64 {
    if signed {
        (raw as i16) as f64 / scale
    } else {
        raw as f64 / scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_saturation_unsigned() {
        let encoded = encode_weight(10.0, 16384.0, false);
        assert_eq!(encoded.raw, u16::MAX);
        assert!(encoded.saturated);
    }

    #[test]
    fn test_negative_unsigned_uses_magnitude() {
        assert_eq!(encode_weight(-0.5, 1024.0, false).raw, 512);
    }

    #[test]
    fn test_signed_roundtrip() {
        let encoded = encode_weight(-0.25, 8192.0, true);
        assert!(!encoded.saturated);
        assert_eq!(decode_weight(encoded.raw, 8192.0, true), -0.25);
    }

    #[test]
    fn test_signed_saturation() {
        let encoded = encode_weight(-10.0, 8192.0, true);
        assert!(encoded.saturated);
        assert_eq!(encoded.raw as i16, i16::MIN);
    }

    proptest! {
        #[test]
        fn prop_roundtrip_within_one_lsb(shift in 0u8..=15, fraction in 0.0f64..1.0) {
            let scale = weight_scale_for_shift(shift, 1.0);
            let max_weight = u16::MAX as f64 / scale;
            let weight = fraction * max_weight;
            let encoded = encode_weight(weight, scale, false);
            prop_assert!(!encoded.saturated);
            let decoded = decode_weight(encoded.raw, scale, false);
            prop_assert!((decoded - weight).abs() <= 1.0 / scale);
        }
    }
}
