//! Numeric helpers shared by the reconstruction stages.

/// The number of lanes processed at once by the vectorised transforms.
pub(crate) const SIMD_WIDTH: usize = 8;

/// `2^exp` for positive and negative exponents.
#[inline(always)]
pub(crate) fn pow2(exp: i32) -> f32 {
    2.0_f32.powi(exp)
}

/// The offset that reverts the DC level shift (G.1.2) of samples with the
/// given precision, including the rounding term.
#[inline(always)]
pub(crate) fn level_shift_offset(precision: u8) -> f32 {
    pow2(precision as i32 - 1) + 0.5
}

/// Convert a level-shifted sample with the given precision to 8 bits.
///
/// Samples with a higher precision are shifted down, samples with a lower
/// precision are scaled up.
#[inline(always)]
pub(crate) fn to_u8(value: f32, precision: u8) -> u8 {
    let value = value as i64;
    let shift = precision as i32 - 8;

    let scaled = if shift >= 0 {
        value >> shift.min(63)
    } else {
        value << -shift
    };

    scaled.clamp(0, 255) as u8
}

/// Pad a plane with zeros to a multiple of [`SIMD_WIDTH`], returning the
/// original length.
pub(crate) fn pad_to_simd_width(plane: &mut Vec<f32>) -> usize {
    let len = plane.len();
    plane.resize(len.next_multiple_of(SIMD_WIDTH), 0.0);

    len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn powers() {
        assert_eq!(pow2(0), 1.0);
        assert_eq!(pow2(10), 1024.0);
        assert_eq!(pow2(-2), 0.25);
    }

    #[test]
    fn sample_conversion() {
        assert_eq!(level_shift_offset(8), 128.5);
        assert_eq!(to_u8(-3.0 + level_shift_offset(8), 8), 125);
        assert_eq!(to_u8(300.0, 8), 255);
        assert_eq!(to_u8(-20.0, 8), 0);

        // 12 bit samples are shifted down.
        assert_eq!(to_u8(4095.0, 12), 255);
        assert_eq!(to_u8(2048.0 + 0.5, 12), 128);

        // 1 bit samples are scaled up.
        assert_eq!(level_shift_offset(1), 1.5);
        assert_eq!(to_u8(1.0, 1), 128);
    }

    #[test]
    fn padding() {
        let mut plane = vec![1.0; 13];

        assert_eq!(pad_to_simd_width(&mut plane), 13);
        assert_eq!(plane.len(), 16);
        assert_eq!(plane[13..], [0.0; 3]);
    }
}
