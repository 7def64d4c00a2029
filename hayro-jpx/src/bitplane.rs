//! Bit-plane decoding of code-blocks, described in Annex D.
//!
//! The coefficients of a code-block are coded bit-plane by bit-plane, most
//! significant first. Each bit-plane is split into three coding passes, and
//! the context of every decoded bit depends on the significance of the
//! neighbouring coefficients. This module reverts the context modeling and
//! recovers the magnitude and sign of each coefficient.

use crate::arithmetic_decoder::{ArithmeticDecoder, Context};
use crate::error::{FormatError, Result, bail};
use crate::tile::SubBandType;

/// Magnitudes are stored in 32 bits, so a code-block can't have more
/// bit-planes, including the missing most significant ones.
pub(crate) const MAX_BIT_PLANES: u32 = 32;

/// The number of bit-planes touched by the given number of coding passes.
/// The first bit-plane only has a cleanup pass.
pub(crate) fn num_bit_planes(coding_passes: u32) -> u32 {
    if coding_passes == 0 {
        0
    } else {
        1 + (coding_passes + 1) / 3
    }
}

const UNIFORM_CONTEXT: usize = 17;
const RUN_LENGTH_CONTEXT: usize = 18;

// Flags stored in `processing_flags`.
const PROCESSED: u8 = 1;
const FIRST_MAGNITUDE_BIT: u8 = 2;

// Contributions to the neighbour significance of a coefficient. The index
// into the context label tables has the form `0dddvvhh`, with `ddd` being
// the number of significant diagonal neighbours, `vv` the vertical and `hh`
// the horizontal ones.
const DIAGONAL: u8 = 0x10;
const VERTICAL: u8 = 0x04;
const HORIZONTAL: u8 = 0x01;
const SIGNIFICANT: u8 = 0x80;

// Table D.1.
#[rustfmt::skip]
static LL_AND_LH_CONTEXT_LABELS: [u8; 75] = [
    0, 5, 8, 0, 3, 7, 8, 0, 4, 7, 8, 0, 0, 0, 0, 0, 1, 6, 8, 0, 3, 7, 8, 0, 4,
    7, 8, 0, 0, 0, 0, 0, 2, 6, 8, 0, 3, 7, 8, 0, 4, 7, 8, 0, 0, 0, 0, 0, 2, 6,
    8, 0, 3, 7, 8, 0, 4, 7, 8, 0, 0, 0, 0, 0, 2, 6, 8, 0, 3, 7, 8, 0, 4, 7, 8,
];

#[rustfmt::skip]
static HL_CONTEXT_LABELS: [u8; 75] = [
    0, 3, 4, 0, 5, 7, 7, 0, 8, 8, 8, 0, 0, 0, 0, 0, 1, 3, 4, 0, 6, 7, 7, 0, 8,
    8, 8, 0, 0, 0, 0, 0, 2, 3, 4, 0, 6, 7, 7, 0, 8, 8, 8, 0, 0, 0, 0, 0, 2, 3,
    4, 0, 6, 7, 7, 0, 8, 8, 8, 0, 0, 0, 0, 0, 2, 3, 4, 0, 6, 7, 7, 0, 8, 8, 8,
];

#[rustfmt::skip]
static HH_CONTEXT_LABELS: [u8; 75] = [
    0, 1, 2, 0, 1, 2, 2, 0, 2, 2, 2, 0, 0, 0, 0, 0, 3, 4, 5, 0, 4, 5, 5, 0, 5,
    5, 5, 0, 0, 0, 0, 0, 6, 7, 7, 0, 7, 7, 7, 0, 7, 7, 7, 0, 0, 0, 0, 0, 8, 8,
    8, 0, 8, 8, 8, 0, 8, 8, 8, 0, 0, 0, 0, 0, 8, 8, 8, 0, 8, 8, 8, 0, 8, 8, 8,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassType {
    SignificancePropagation,
    MagnitudeRefinement,
    Cleanup,
}

impl PassType {
    fn next(self) -> Self {
        match self {
            Self::SignificancePropagation => Self::MagnitudeRefinement,
            Self::MagnitudeRefinement => Self::Cleanup,
            Self::Cleanup => Self::SignificancePropagation,
        }
    }
}

/// The decoding state of a single code-block.
pub(crate) struct BitModel {
    width: usize,
    height: usize,
    labels: &'static [u8; 75],
    neighbors_significance: Vec<u8>,
    /// 1 for negative coefficients.
    pub(crate) signs: Vec<u8>,
    pub(crate) magnitudes: Vec<u32>,
    processing_flags: Vec<u8>,
    /// The number of bit-planes that have been decoded for each coefficient,
    /// including the missing most significant ones.
    pub(crate) bits_decoded: Vec<u32>,
    contexts: [Context; 19],
}

impl BitModel {
    pub(crate) fn new(
        width: u32,
        height: u32,
        sub_band_type: SubBandType,
        zero_bit_planes: u32,
    ) -> Self {
        let labels = match sub_band_type {
            SubBandType::HighHigh => &HH_CONTEXT_LABELS,
            SubBandType::HighLow => &HL_CONTEXT_LABELS,
            SubBandType::LowLow | SubBandType::LowHigh => &LL_AND_LH_CONTEXT_LABELS,
        };

        let count = width as usize * height as usize;

        Self {
            width: width as usize,
            height: height as usize,
            labels,
            neighbors_significance: vec![0; count],
            signs: vec![0; count],
            magnitudes: vec![0; count],
            processing_flags: vec![0; count],
            bits_decoded: vec![zero_bit_planes; count],
            contexts: initial_contexts(),
        }
    }

    /// Run the given number of coding passes over the arithmetic-coded data.
    /// The first pass is always a cleanup pass.
    pub(crate) fn decode(
        &mut self,
        data: &[u8],
        coding_passes: u32,
        segmentation_symbols: bool,
    ) -> Result<()> {
        let mut decoder = ArithmeticDecoder::new(data);
        let mut pass = PassType::Cleanup;

        for _ in 0..coding_passes {
            match pass {
                PassType::SignificancePropagation => self.significance_propagation(&mut decoder),
                PassType::MagnitudeRefinement => self.magnitude_refinement(&mut decoder),
                PassType::Cleanup => {
                    self.cleanup(&mut decoder);

                    if segmentation_symbols {
                        self.check_segmentation_symbol(&mut decoder)?;
                    }
                }
            }

            pass = pass.next();
        }

        Ok(())
    }

    fn set_neighbors_significance(&mut self, row: usize, column: usize, index: usize) {
        let width = self.width;
        let left = column > 0;
        let right = column + 1 < width;
        let ns = &mut self.neighbors_significance;

        if row > 0 {
            let i = index - width;

            if left {
                ns[i - 1] += DIAGONAL;
            }

            if right {
                ns[i + 1] += DIAGONAL;
            }

            ns[i] += VERTICAL;
        }

        if row + 1 < self.height {
            let i = index + width;

            if left {
                ns[i - 1] += DIAGONAL;
            }

            if right {
                ns[i + 1] += DIAGONAL;
            }

            ns[i] += VERTICAL;
        }

        if left {
            ns[index - 1] += HORIZONTAL;
        }

        if right {
            ns[index + 1] += HORIZONTAL;
        }

        ns[index] |= SIGNIFICANT;
    }

    /// Mark a coefficient as significant after its significance bit was 1.
    fn make_significant(
        &mut self,
        decoder: &mut ArithmeticDecoder<'_>,
        row: usize,
        column: usize,
        index: usize,
    ) {
        self.signs[index] = self.decode_sign(decoder, row, column, index);
        self.magnitudes[index] = 1;
        self.set_neighbors_significance(row, column, index);
        self.processing_flags[index] |= FIRST_MAGNITUDE_BIT;
    }

    /// D.3.1 Significance propagation decoding pass.
    fn significance_propagation(&mut self, decoder: &mut ArithmeticDecoder<'_>) {
        let (width, height) = (self.width, self.height);

        for i0 in (0..height).step_by(4) {
            for j in 0..width {
                for i in i0..(i0 + 4).min(height) {
                    let index = i * width + j;
                    self.processing_flags[index] &= !PROCESSED;

                    let significance = self.neighbors_significance[index];

                    if self.magnitudes[index] != 0 || significance == 0 {
                        continue;
                    }

                    let label = self.labels[significance as usize] as usize;

                    if decoder.read_bit(&mut self.contexts[label]) != 0 {
                        self.make_significant(decoder, i, j, index);
                    }

                    self.bits_decoded[index] += 1;
                    self.processing_flags[index] |= PROCESSED;
                }
            }
        }
    }

    /// D.3.2 Sign bit decoding.
    fn decode_sign(
        &mut self,
        decoder: &mut ArithmeticDecoder<'_>,
        row: usize,
        column: usize,
        index: usize,
    ) -> u8 {
        let width = self.width;

        // Each significant neighbour contributes 1 if positive and -1 if
        // negative, and the sum of the two neighbours is clamped to -1..=1.
        let contribution = |before: Option<usize>, after: Option<usize>| -> i32 {
            let sign_of = |idx: Option<usize>| {
                idx.filter(|&idx| self.magnitudes[idx] != 0)
                    .map(|idx| self.signs[idx] as i32)
            };

            match (sign_of(before), sign_of(after)) {
                (Some(s0), Some(s1)) => 1 - s0 - s1,
                (Some(s), None) | (None, Some(s)) => 1 - 2 * s,
                (None, None) => 0,
            }
        };

        let horizontal = contribution(
            (column > 0).then(|| index - 1),
            (column + 1 < width).then(|| index + 1),
        );
        let vertical = contribution(
            (row > 0).then(|| index - width),
            (row + 1 < self.height).then(|| index + width),
        );

        let combined = 3 * horizontal + vertical;

        if combined >= 0 {
            decoder.read_bit(&mut self.contexts[9 + combined as usize]) as u8
        } else {
            (decoder.read_bit(&mut self.contexts[(9 - combined) as usize]) ^ 1) as u8
        }
    }

    /// D.3.3 Magnitude refinement pass.
    fn magnitude_refinement(&mut self, decoder: &mut ArithmeticDecoder<'_>) {
        let (width, height) = (self.width, self.height);

        for i0 in (0..height).step_by(4) {
            for j in 0..width {
                for i in i0..(i0 + 4).min(height) {
                    let index = i * width + j;

                    // Significant, but not in the current bit-plane.
                    if self.magnitudes[index] == 0
                        || self.processing_flags[index] & PROCESSED != 0
                    {
                        continue;
                    }

                    let label = if self.processing_flags[index] & FIRST_MAGNITUDE_BIT != 0 {
                        self.processing_flags[index] ^= FIRST_MAGNITUDE_BIT;

                        if self.neighbors_significance[index] & !SIGNIFICANT == 0 {
                            15
                        } else {
                            14
                        }
                    } else {
                        16
                    };

                    let bit = decoder.read_bit(&mut self.contexts[label]);
                    self.magnitudes[index] = (self.magnitudes[index] << 1) | bit;
                    self.bits_decoded[index] += 1;
                    self.processing_flags[index] |= PROCESSED;
                }
            }
        }
    }

    /// D.3.4 Cleanup pass.
    fn cleanup(&mut self, decoder: &mut ArithmeticDecoder<'_>) {
        let (width, height) = (self.width, self.height);

        for i0 in (0..height).step_by(4) {
            let i_end = (i0 + 4).min(height);
            let full_stripe = i0 + 3 < height;

            for j in 0..width {
                let index0 = i0 * width + j;
                let mut start = i0;

                // The run-length mode applies if all four coefficients of the
                // column are insignificant, unprocessed and have insignificant
                // neighbours.
                let all_empty = full_stripe
                    && (0..4).all(|k| {
                        let idx = index0 + k * width;
                        self.processing_flags[idx] == 0 && self.neighbors_significance[idx] == 0
                    });

                if all_empty {
                    if decoder.read_bit(&mut self.contexts[RUN_LENGTH_CONTEXT]) == 0 {
                        for k in 0..4 {
                            self.bits_decoded[index0 + k * width] += 1;
                        }

                        continue;
                    }

                    let offset = ((decoder.read_bit(&mut self.contexts[UNIFORM_CONTEXT]) << 1)
                        | decoder.read_bit(&mut self.contexts[UNIFORM_CONTEXT]))
                        as usize;
                    let i = i0 + offset;

                    self.make_significant(decoder, i, j, i * width + j);

                    for k in 0..=offset {
                        self.bits_decoded[index0 + k * width] += 1;
                    }

                    start = i + 1;
                }

                for i in start..i_end {
                    let index = i * width + j;

                    if self.magnitudes[index] != 0
                        || self.processing_flags[index] & PROCESSED != 0
                    {
                        continue;
                    }

                    let label = self.labels[self.neighbors_significance[index] as usize] as usize;

                    if decoder.read_bit(&mut self.contexts[label]) == 1 {
                        self.make_significant(decoder, i, j, index);
                    }

                    self.bits_decoded[index] += 1;
                }
            }
        }
    }

    fn check_segmentation_symbol(&mut self, decoder: &mut ArithmeticDecoder<'_>) -> Result<()> {
        let context = &mut self.contexts[UNIFORM_CONTEXT];
        let symbol = (0..4).fold(0, |acc, _| (acc << 1) | decoder.read_bit(context));

        if symbol != 0xA {
            bail!(FormatError::InvalidSegmentationSymbol);
        }

        Ok(())
    }
}

/// The initial states of the contexts (Table D.7).
fn initial_contexts() -> [Context; 19] {
    let mut contexts = [Context::default(); 19];
    contexts[0] = Context::new(4);
    contexts[UNIFORM_CONTEXT] = Context::new(46);
    contexts[RUN_LENGTH_CONTEXT] = Context::new(3);

    contexts
}
