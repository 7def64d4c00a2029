//! The inverse discrete wavelet transform, as specified in Annex F.

use crate::codestream::WaveletTransform;

/// The number of samples the 1D signals are extended by on each side (F.3.7).
const PADDING: usize = 4;

/// The number of columns that are processed together in the vertical pass.
const NUM_COLUMN_BUFFERS: usize = 16;

// Lifting parameters of the 9-7 filter (Table F.4).
const ALPHA: f32 = -1.586_134_3;
const BETA: f32 = -0.052_980_118;
const GAMMA: f32 = 0.882_911_1;
const DELTA: f32 = 0.443_506_87;
const K: f32 = 1.230_174_1;
const K_INV: f32 = 1.0 / K;

/// The coefficients of one resolution level.
///
/// For all levels except the first one, the coefficients of the HL, LH and
/// HH sub-bands are already stored at their interleaved positions (F.3.3),
/// and the even positions are filled with the reconstructed LL band.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Coefficients {
    pub(crate) width: usize,
    pub(crate) height: usize,
    pub(crate) items: Vec<f32>,
}

/// Reconstruct the samples of a tile-component from the coefficients of all
/// its resolution levels, starting with the lowest one (F.3.1).
pub(crate) fn inverse_transform(
    levels: Vec<Coefficients>,
    transform: WaveletTransform,
    u0: u32,
    v0: u32,
) -> Coefficients {
    let mut levels = levels.into_iter();
    let Some(mut ll) = levels.next() else {
        return Coefficients {
            width: 0,
            height: 0,
            items: vec![],
        };
    };

    for level in levels {
        ll = iterate(ll, level, transform, u0, v0);
    }

    ll
}

/// The 2D_SR procedure (F.3.2) for a single level.
fn iterate(
    ll: Coefficients,
    mut level: Coefficients,
    transform: WaveletTransform,
    u0: u32,
    v0: u32,
) -> Coefficients {
    let (width, height) = (level.width, level.height);
    let items = &mut level.items;

    // Interleave the LL band (F.3.3).
    for (i, row) in ll.items.chunks_exact(ll.width.max(1)).take(ll.height).enumerate() {
        for (j, value) in row.iter().enumerate() {
            if let Some(item) = items.get_mut(2 * i * width + 2 * j) {
                *item = *value;
            }
        }
    }

    // F.3.4 HOR_SR
    if width == 1 {
        // A single column is either only low-pass or only high-pass.
        if u0 & 1 != 0 {
            for item in items.iter_mut() {
                *item *= 0.5;
            }
        }
    } else if width > 1 {
        let mut buffer = vec![0.0; width + 2 * PADDING];

        for row in items.chunks_exact_mut(width) {
            buffer[PADDING..PADDING + width].copy_from_slice(row);
            filter_1d(&mut buffer, width, transform);
            row.copy_from_slice(&buffer[PADDING..PADDING + width]);
        }
    }

    // F.3.5 VER_SR
    if height == 1 {
        if v0 & 1 != 0 {
            for item in items.iter_mut() {
                *item *= 0.5;
            }
        }
    } else if height > 1 {
        let mut buffers = vec![vec![0.0; height + 2 * PADDING]; NUM_COLUMN_BUFFERS];

        // Columns are copied in groups to avoid strided access for each
        // of them.
        for first in (0..width).step_by(NUM_COLUMN_BUFFERS) {
            let num_columns = (width - first).min(NUM_COLUMN_BUFFERS);

            for (l, row) in items.chunks_exact(width).enumerate() {
                for (b, buffer) in buffers[..num_columns].iter_mut().enumerate() {
                    buffer[PADDING + l] = row[first + b];
                }
            }

            for buffer in &mut buffers[..num_columns] {
                filter_1d(buffer, height, transform);
            }

            for (l, row) in items.chunks_exact_mut(width).enumerate() {
                for (b, buffer) in buffers[..num_columns].iter().enumerate() {
                    row[first + b] = buffer[PADDING + l];
                }
            }
        }
    }

    level
}

/// The 1D_SR procedure (F.3.6) on a signal with `length > 1` samples
/// stored at `buffer[PADDING..]`.
fn filter_1d(buffer: &mut [f32], length: usize, transform: WaveletTransform) {
    extend(buffer, length);

    match transform {
        WaveletTransform::Reversible53 => reversible_filter(buffer, length),
        WaveletTransform::Irreversible97 => irreversible_filter(buffer, length),
    }
}

/// Periodic symmetric extension of the signal (F.3.7).
fn extend(buffer: &mut [f32], length: usize) {
    let mut i1 = PADDING - 1;
    let mut j1 = PADDING + 1;
    let mut i2 = PADDING + length - 2;
    let mut j2 = PADDING + length;

    for _ in 0..PADDING {
        buffer[i1] = buffer[j1];
        buffer[j2] = buffer[i2];

        i1 = i1.wrapping_sub(1);
        j1 += 1;
        i2 = i2.wrapping_sub(1);
        j2 += 1;
    }
}

/// The 5-3 reversible filter (F.3.8.1).
fn reversible_filter(x: &mut [f32], length: usize) {
    let len = length / 2;

    for j in (PADDING..).step_by(2).take(len + 1) {
        x[j] -= ((x[j - 1] + x[j + 1] + 2.0) as i32 >> 2) as f32;
    }

    for j in (PADDING + 1..).step_by(2).take(len) {
        x[j] += ((x[j - 1] + x[j + 1]) as i32 >> 1) as f32;
    }
}

/// The 9-7 irreversible filter (F.3.8.2).
fn irreversible_filter(x: &mut [f32], length: usize) {
    let len = length / 2;

    // Step 2.
    for j in (PADDING - 3..).step_by(2).take(len + 4) {
        x[j] *= K_INV;
    }

    // Steps 1 and 3.
    for j in (PADDING - 2..).step_by(2).take(len + 3) {
        x[j] = K * x[j] - DELTA * (x[j - 1] + x[j + 1]);
    }

    // Step 4.
    for j in (PADDING - 1..).step_by(2).take(len + 2) {
        x[j] -= GAMMA * (x[j - 1] + x[j + 1]);
    }

    // Step 5.
    for j in (PADDING..).step_by(2).take(len + 1) {
        x[j] -= BETA * (x[j - 1] + x[j + 1]);
    }

    // Step 6.
    for j in (PADDING + 1..).step_by(2).take(len) {
        x[j] -= ALPHA * (x[j - 1] + x[j + 1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reflect(i: isize, n: usize) -> usize {
        let n = n as isize;

        if i < 0 {
            (-i) as usize
        } else if i >= n {
            (2 * (n - 1) - i) as usize
        } else {
            i as usize
        }
    }

    /// The forward 5-3 transform of a signal starting at an even position,
    /// leaving the coefficients interleaved.
    fn forward_53(x: &mut [f32]) {
        let n = x.len();

        if n < 2 {
            return;
        }

        for i in (1..n).step_by(2) {
            let i = i as isize;
            x[i as usize] -= ((x[reflect(i - 1, n)] + x[reflect(i + 1, n)]) / 2.0).floor();
        }

        for i in (0..n).step_by(2) {
            let i = i as isize;
            x[i as usize] += ((x[reflect(i - 1, n)] + x[reflect(i + 1, n)] + 2.0) / 4.0).floor();
        }
    }

    fn forward_2d(c: &mut Coefficients) {
        let (w, h) = (c.width, c.height);

        for u in 0..w {
            let mut column = (0..h).map(|v| c.items[v * w + u]).collect::<Vec<_>>();
            forward_53(&mut column);

            for (v, value) in column.into_iter().enumerate() {
                c.items[v * w + u] = value;
            }
        }

        for row in c.items.chunks_exact_mut(w) {
            forward_53(row);
        }
    }

    fn even_samples(c: &Coefficients) -> Coefficients {
        let width = c.width.div_ceil(2);
        let height = c.height.div_ceil(2);
        let items = (0..height)
            .flat_map(|v| (0..width).map(move |u| (u, v)))
            .map(|(u, v)| c.items[2 * v * c.width + 2 * u])
            .collect();

        Coefficients {
            width,
            height,
            items,
        }
    }

    fn image(width: usize, height: usize) -> Coefficients {
        let items = (0..width * height)
            .map(|i| ((i * 37 + (i / width) * 11) % 251) as f32 - 128.0)
            .collect();

        Coefficients {
            width,
            height,
            items,
        }
    }

    #[test]
    fn reversible_round_trip() {
        let original = image(6, 5);
        let mut level = original.clone();
        forward_2d(&mut level);
        let ll = even_samples(&level);

        let result = inverse_transform(vec![ll, level], WaveletTransform::Reversible53, 0, 0);

        assert_eq!(result, original);
    }

    #[test]
    fn reversible_round_trip_two_levels() {
        let original = image(9, 8);

        let mut top = original.clone();
        forward_2d(&mut top);
        let mut middle = even_samples(&top);
        forward_2d(&mut middle);
        let ll = even_samples(&middle);

        let result = inverse_transform(
            vec![ll, middle, top],
            WaveletTransform::Reversible53,
            0,
            0,
        );

        assert_eq!(result, original);
    }

    #[test]
    fn constant_low_pass() {
        for transform in [
            WaveletTransform::Reversible53,
            WaveletTransform::Irreversible97,
        ] {
            let ll = Coefficients {
                width: 3,
                height: 2,
                items: vec![10.0; 6],
            };
            let level = Coefficients {
                width: 6,
                height: 4,
                items: vec![0.0; 24],
            };

            let result = inverse_transform(vec![ll, level], transform, 0, 0);

            assert_eq!((result.width, result.height), (6, 4));
            assert!(result.items.iter().all(|v| (v - 10.0).abs() < 1e-3));
        }
    }

    #[test]
    fn single_column() {
        let ll = Coefficients {
            width: 1,
            height: 1,
            items: vec![8.0],
        };
        let level = Coefficients {
            width: 1,
            height: 1,
            items: vec![0.0],
        };

        let even = inverse_transform(
            vec![ll.clone(), level.clone()],
            WaveletTransform::Irreversible97,
            2,
            2,
        );
        assert_eq!(even.items, [8.0]);

        // Odd positions halve the value in each direction.
        let odd = inverse_transform(vec![ll, level], WaveletTransform::Irreversible97, 1, 3);
        assert_eq!(odd.items, [2.0]);
    }

    #[test]
    fn symmetric_extension() {
        let mut buffer = vec![0.0; 3 + 2 * PADDING];
        buffer[PADDING..PADDING + 3].copy_from_slice(&[1.0, 2.0, 3.0]);
        extend(&mut buffer, 3);

        assert_eq!(buffer, [1.0, 2.0, 3.0, 2.0, 1.0, 2.0, 3.0, 2.0, 1.0, 2.0, 3.0]);
    }
}
