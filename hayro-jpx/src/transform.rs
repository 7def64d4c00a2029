//! Reconstruction of tile samples from the decoded code-blocks: dequantization
//! (E.1), the inverse wavelet transform (Annex F) and the inverse component
//! transform (Annex G).

use crate::DecodedTile;
use crate::bitplane::BitModel;
use crate::codestream::{CodingStyle, Quantization, StepSize};
use crate::error::{DecodingError, Result, bail};
use crate::idwt::{self, Coefficients};
use crate::math::{level_shift_offset, pow2, to_u8};
use crate::mct;
use crate::tile::{SubBand, SubBandType, Tile, TileComponent};

/// Reconstruct the interleaved 8-bit samples of a tile.
pub(crate) fn transform_tile(tile: &Tile, data: &[u8], strict: bool) -> Result<DecodedTile> {
    let Some(first) = tile.components.first() else {
        bail!(DecodingError::InvalidComponentTransform);
    };

    let mut planes = tile
        .components
        .iter()
        .map(|component| transform_component(component, data))
        .collect::<Result<Vec<_>>>()?;

    let num_components = planes.len();
    let (width, height) = (first.rect.width(), first.rect.height());
    let num_samples = width as usize * height as usize;
    let mut pixels = vec![0; num_samples * num_components];

    let mct = tile.coding_style.as_ref().is_some_and(|c| c.mct);
    let transform = first
        .coding_style
        .as_ref()
        .ok_or(DecodingError::MissingCodingStyle)?
        .transformation;
    let precision = first.precision;

    if mct
        && can_apply_mct(&planes, num_samples)
        && let [s0, s1, s2, ..] = planes.as_mut_slice()
    {
        let offset = level_shift_offset(precision);
        mct::apply_inverse(transform, offset, s0, s1, s2);

        for (c, plane) in planes.iter().enumerate() {
            // Any components after the first three are alpha or extra
            // channels, and only need the level shift.
            let offset = if c < 3 { 0.0 } else { offset };

            for (pixel, &sample) in pixels.chunks_exact_mut(num_components).zip(plane) {
                pixel[c] = to_u8(sample + offset, precision);
            }
        }
    } else {
        if mct {
            if strict {
                bail!(DecodingError::InvalidComponentTransform);
            }

            lwarn!(
                "tile {}: can't apply component transform to {} components, ignoring it",
                tile.index,
                num_components
            );
        }

        for (c, (plane, component)) in planes.iter().zip(&tile.components).enumerate() {
            let offset = level_shift_offset(component.precision);

            for (pixel, &sample) in pixels.chunks_exact_mut(num_components).zip(plane) {
                pixel[c] = to_u8(sample + offset, component.precision);
            }
        }
    }

    Ok(DecodedTile {
        left: first.rect.x0,
        top: first.rect.y0,
        width,
        height,
        pixels,
    })
}

/// The component transform needs at least three components that share the
/// same sample grid.
fn can_apply_mct(planes: &[Vec<f32>], num_samples: usize) -> bool {
    planes.len() >= 3 && planes.iter().all(|p| p.len() == num_samples)
}

/// Dequantize and inverse transform one tile-component, returning the
/// level-shifted samples in raster order.
fn transform_component(component: &TileComponent, data: &[u8]) -> Result<Vec<f32>> {
    let coding_style = component
        .coding_style
        .as_ref()
        .ok_or(DecodingError::MissingCodingStyle)?;
    let quantization = component
        .quantization
        .as_ref()
        .ok_or(DecodingError::MissingQuantization)?;

    let mut levels = Vec::with_capacity(component.resolutions.len());

    for (r, resolution) in component.resolutions.iter().enumerate() {
        let width = resolution.rect.width() as usize;
        let height = resolution.rect.height() as usize;
        let mut coefficients = Coefficients {
            width,
            height,
            items: vec![0.0; width * height],
        };

        for (b, sub_band) in resolution.sub_bands.iter().enumerate() {
            let step_size = step_size(quantization, r, b)?;
            let gain = sub_band.sub_band_type.gain_log2() as i32;
            let epsilon = step_size.epsilon as i32;

            // E-3
            let delta = if coding_style.is_reversible() {
                1.0
            } else {
                pow2(component.precision as i32 + gain - epsilon)
                    * (1.0 + step_size.mu as f32 / 2048.0)
            };
            // E-2
            let mb = quantization.guard_bits as i32 + epsilon - 1;

            copy_coefficients(
                &mut coefficients,
                sub_band,
                coding_style,
                data,
                delta,
                mb,
            )?;
        }

        levels.push(coefficients);
    }

    let samples = idwt::inverse_transform(
        levels,
        coding_style.transformation,
        component.rect.x0,
        component.rect.y0,
    );

    Ok(samples.items)
}

/// The step size of the sub-band `b` in resolution `r`.
fn step_size(quantization: &Quantization, r: usize, b: usize) -> Result<StepSize> {
    if quantization.is_expounded() {
        let idx = if r == 0 { 0 } else { 3 * (r - 1) + b + 1 };

        return quantization
            .step_sizes
            .get(idx)
            .copied()
            .ok_or(DecodingError::MissingStepSize.into());
    }

    // E-5: derived from the values of the LL band.
    let base = quantization
        .step_sizes
        .first()
        .ok_or(DecodingError::MissingStepSize)?;
    let epsilon = if r > 0 {
        (base.epsilon as i32 + 1 - r as i32).max(0) as u8
    } else {
        base.epsilon
    };

    Ok(StepSize {
        epsilon,
        mu: base.mu,
    })
}

/// Decode the code-blocks of a sub-band and store the dequantized
/// coefficients at their position in the resolution level.
fn copy_coefficients(
    coefficients: &mut Coefficients,
    sub_band: &SubBand,
    coding_style: &CodingStyle,
    data: &[u8],
    delta: f32,
    mb: i32,
) -> Result<()> {
    let reversible = coding_style.is_reversible();
    let segmentation_symbols = coding_style.code_block_style.segmentation_symbols;
    let level_width = coefficients.width;

    // High-pass coefficients are interleaved into odd columns or rows.
    let (right, bottom) = match sub_band.sub_band_type {
        SubBandType::LowLow => (0, 0),
        SubBandType::HighLow => (1, 0),
        SubBandType::LowHigh => (0, level_width),
        SubBandType::HighHigh => (1, level_width),
    };
    let interleave = sub_band.sub_band_type != SubBandType::LowLow;
    let magnitude_correction = if reversible { 0.0 } else { 0.5 };

    let mut encoded = vec![];

    for code_block in &sub_band.code_blocks {
        if code_block.data.is_empty() {
            continue;
        }

        let block_width = code_block.rect.width();
        let block_height = code_block.rect.height();

        encoded.clear();
        let mut coding_passes = 0;

        for item in &code_block.data {
            let start = item.range.start.min(data.len());
            let end = item.range.end.min(data.len());
            encoded.extend_from_slice(&data[start..end]);
            coding_passes += item.coding_passes;
        }

        let mut model = BitModel::new(
            block_width,
            block_height,
            sub_band.sub_band_type,
            code_block.zero_bit_planes,
        );
        model.decode(&encoded, coding_passes, segmentation_symbols)?;

        let x = (code_block.rect.x0 - sub_band.rect.x0) as usize;
        let y = (code_block.rect.y0 - sub_band.rect.y0) as usize;
        let sub_band_width = sub_band.rect.width() as usize;

        for j in 0..block_height as usize {
            for i in 0..block_width as usize {
                let idx = j * block_width as usize + i;
                let magnitude = model.magnitudes[idx];

                if magnitude == 0 {
                    continue;
                }

                let mut value = (magnitude as f32 + magnitude_correction) * delta;

                if model.signs[idx] != 0 {
                    value = -value;
                }

                let nb = model.bits_decoded[idx] as i32;

                if !reversible || nb < mb {
                    value *= pow2(mb - nb);
                }

                let (row, column) = (y + j, x + i);
                let pos = if interleave {
                    2 * row * level_width + 2 * column + right + bottom
                } else {
                    row * sub_band_width + column
                };

                if let Some(item) = coefficients.items.get_mut(pos) {
                    *item = value;
                }
            }
        }
    }

    Ok(())
}
