//! The inverse multiple component transformations, as specified in Annex G.
//!
//! The transforms operate in place on the first three component planes and
//! also revert the DC level shift of the first component.

use crate::codestream::WaveletTransform;
use crate::math::pad_to_simd_width;

/// Apply the inverse component transform to three planes of equal length.
///
/// `offset` is added to the luminance plane before the transform.
pub(crate) fn apply_inverse(
    transform: WaveletTransform,
    offset: f32,
    s0: &mut Vec<f32>,
    s1: &mut Vec<f32>,
    s2: &mut Vec<f32>,
) {
    let len = pad_to_simd_width(s0);
    pad_to_simd_width(s1);
    pad_to_simd_width(s2);

    simd::apply_inner(transform, offset, s0, s1, s2);

    s0.truncate(len);
    s1.truncate(len);
    s2.truncate(len);
}

#[cfg(not(feature = "simd"))]
mod simd {
    use crate::codestream::WaveletTransform;
    use crate::math::SIMD_WIDTH;

    pub(super) fn apply_inner(
        transform: WaveletTransform,
        offset: f32,
        s0: &mut [f32],
        s1: &mut [f32],
        s2: &mut [f32],
    ) {
        let planes = s0
            .chunks_exact_mut(SIMD_WIDTH)
            .zip(s1.chunks_exact_mut(SIMD_WIDTH))
            .zip(s2.chunks_exact_mut(SIMD_WIDTH));

        match transform {
            // G.3 Inverse irreversible component transformation.
            WaveletTransform::Irreversible97 => {
                for ((y0, y1), y2) in planes {
                    for lane in 0..SIMD_WIDTH {
                        let y_0 = y0[lane] + offset;
                        let y_1 = y1[lane];
                        let y_2 = y2[lane];

                        y0[lane] = y_0 + 1.402 * y_2;
                        y1[lane] = y_0 - 0.34413 * y_1 - 0.71414 * y_2;
                        y2[lane] = y_0 + 1.772 * y_1;
                    }
                }
            }
            // G.2 Inverse reversible component transformation.
            WaveletTransform::Reversible53 => {
                for ((y0, y1), y2) in planes {
                    for lane in 0..SIMD_WIDTH {
                        let y_0 = y0[lane] + offset;
                        let y_1 = y1[lane];
                        let y_2 = y2[lane];

                        let g = y_0 - ((y_2 + y_1) * 0.25).floor();

                        y0[lane] = g + y_2;
                        y1[lane] = g;
                        y2[lane] = g + y_1;
                    }
                }
            }
        }
    }
}

#[cfg(feature = "simd")]
mod simd {
    use crate::codestream::WaveletTransform;
    use crate::math::SIMD_WIDTH;
    use fearless_simd::*;

    pub(super) fn apply_inner(
        transform: WaveletTransform,
        offset: f32,
        s0: &mut [f32],
        s1: &mut [f32],
        s2: &mut [f32],
    ) {
        dispatch!(Level::new(), simd => apply_inner_simd(simd, transform, offset, s0, s1, s2));
    }

    #[inline(always)]
    fn apply_inner_simd<S: Simd>(
        simd: S,
        transform: WaveletTransform,
        offset: f32,
        s0: &mut [f32],
        s1: &mut [f32],
        s2: &mut [f32],
    ) {
        let planes = s0
            .chunks_exact_mut(SIMD_WIDTH)
            .zip(s1.chunks_exact_mut(SIMD_WIDTH))
            .zip(s2.chunks_exact_mut(SIMD_WIDTH));

        let offset = f32x8::splat(simd, offset);

        match transform {
            // G.3 Inverse irreversible component transformation.
            WaveletTransform::Irreversible97 => {
                for ((y0, y1), y2) in planes {
                    let y_0 = f32x8::from_slice(simd, y0) + offset;
                    let y_1 = f32x8::from_slice(simd, y1);
                    let y_2 = f32x8::from_slice(simd, y2);

                    let r = y_2.mul_add(f32x8::splat(simd, 1.402), y_0);
                    let g = y_2.mul_add(
                        f32x8::splat(simd, -0.71414),
                        y_1.mul_add(f32x8::splat(simd, -0.34413), y_0),
                    );
                    let b = y_1.mul_add(f32x8::splat(simd, 1.772), y_0);

                    r.store_slice(y0);
                    g.store_slice(y1);
                    b.store_slice(y2);
                }
            }
            // G.2 Inverse reversible component transformation.
            WaveletTransform::Reversible53 => {
                for ((y0, y1), y2) in planes {
                    let y_0 = f32x8::from_slice(simd, y0) + offset;
                    let y_1 = f32x8::from_slice(simd, y1);
                    let y_2 = f32x8::from_slice(simd, y2);

                    let g = y_0 - ((y_2 + y_1) * 0.25).floor();
                    let r = y_2 + g;
                    let b = y_1 + g;

                    r.store_slice(y0);
                    g.store_slice(y1);
                    b.store_slice(y2);
                }
            }
        }
    }
}
