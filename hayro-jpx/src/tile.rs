//! Tiles and the geometry of their components, resolutions, sub-bands,
//! precincts and code-blocks, as specified in Annex B.

use crate::codestream::{CodingStyle, Quantization, SizeData};
use crate::progression::PacketIterator;
use crate::rect::{IntRect, shr_ceil, shr_ceil_half};
use crate::tag_tree::{InclusionTree, TagTree};
use core::ops::Range;
use std::collections::BTreeMap;

#[derive(Debug)]
pub(crate) struct Tile {
    pub(crate) index: u16,
    /// The tile bounds on the reference grid (B-7).
    pub(crate) rect: IntRect,
    pub(crate) components: Vec<TileComponent>,
    /// The coding style of the tile, available once the first tile-part
    /// has been read.
    pub(crate) coding_style: Option<CodingStyle>,
    pub(crate) packets: Option<PacketIterator>,
}

impl Tile {
    pub(crate) fn is_initialized(&self) -> bool {
        self.packets.is_some()
    }
}

#[derive(Debug)]
pub(crate) struct TileComponent {
    /// The tile-component bounds in the sample grid of the component (B-12).
    pub(crate) rect: IntRect,
    pub(crate) precision: u8,
    pub(crate) coding_style: Option<CodingStyle>,
    pub(crate) quantization: Option<Quantization>,
    /// One entry for each resolution level, starting with the lowest one.
    pub(crate) resolutions: Vec<Resolution>,
}

impl TileComponent {
    pub(crate) fn num_decomposition_levels(&self) -> u8 {
        self.resolutions.len().saturating_sub(1) as u8
    }
}

#[derive(Debug)]
pub(crate) struct Resolution {
    /// The resolution bounds (B-14).
    pub(crate) rect: IntRect,
    pub(crate) precinct_width_exp: u8,
    pub(crate) precinct_height_exp: u8,
    pub(crate) num_precincts_wide: u32,
    pub(crate) num_precincts_high: u32,
    /// Sub-bands in the order LL or HL, LH, HH.
    pub(crate) sub_bands: Vec<SubBand>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubBandType {
    LowLow,
    HighLow,
    LowHigh,
    HighHigh,
}

impl SubBandType {
    /// The log2 of the nominal gain of the sub-band (Table E.1).
    pub(crate) fn gain_log2(self) -> u8 {
        match self {
            Self::LowLow => 0,
            Self::HighLow | Self::LowHigh => 1,
            Self::HighHigh => 2,
        }
    }
}

#[derive(Debug)]
pub(crate) struct SubBand {
    pub(crate) sub_band_type: SubBandType,
    /// The sub-band bounds (B-15).
    pub(crate) rect: IntRect,
    pub(crate) code_blocks: Vec<CodeBlock>,
    pub(crate) precincts: Vec<Precinct>,
    /// Maps a precinct number to its index in `precincts`.
    precinct_indices: BTreeMap<u32, usize>,
}

impl SubBand {
    /// The index in `precincts` of the precinct with the given number, if
    /// any code-block of the sub-band lies in it.
    pub(crate) fn precinct_index(&self, number: u32) -> Option<usize> {
        self.precinct_indices.get(&number).copied()
    }
}

/// The code-blocks of a sub-band that share a precinct, together with the
/// tag trees used to signal their inclusion and zero bit-planes.
#[derive(Debug)]
pub(crate) struct Precinct {
    pub(crate) cbx_min: u32,
    pub(crate) cby_min: u32,
    pub(crate) cbx_max: u32,
    pub(crate) cby_max: u32,
    /// Indices into the code-blocks of the sub-band, in coding order.
    pub(crate) code_blocks: Vec<usize>,
    pub(crate) trees: Option<PrecinctTrees>,
}

impl Precinct {
    fn new(cbx: u32, cby: u32) -> Self {
        Self {
            cbx_min: cbx,
            cby_min: cby,
            cbx_max: cbx,
            cby_max: cby,
            code_blocks: vec![],
            trees: None,
        }
    }

    fn add(&mut self, cbx: u32, cby: u32) {
        if cbx < self.cbx_min {
            self.cbx_min = cbx;
        } else if cbx > self.cbx_max {
            self.cbx_max = cbx;
        }

        if cby < self.cby_min {
            self.cby_min = cby;
        } else if cby > self.cby_max {
            self.cby_max = cby;
        }
    }

    pub(crate) fn width_in_code_blocks(&self) -> u32 {
        self.cbx_max - self.cbx_min + 1
    }

    pub(crate) fn height_in_code_blocks(&self) -> u32 {
        self.cby_max - self.cby_min + 1
    }
}

#[derive(Debug)]
pub(crate) struct PrecinctTrees {
    pub(crate) inclusion: InclusionTree,
    pub(crate) zero_bit_planes: TagTree,
}

#[derive(Debug)]
pub(crate) struct CodeBlock {
    /// The position in the code-block grid of the sub-band.
    pub(crate) cbx: u32,
    pub(crate) cby: u32,
    /// The code-block bounds, clipped to the sub-band.
    pub(crate) rect: IntRect,
    pub(crate) l_block: u32,
    pub(crate) included: bool,
    pub(crate) zero_bit_planes: u32,
    /// Ranges of coded data in the codestream, one per contributing layer.
    pub(crate) data: Vec<CodeBlockData>,
}

#[derive(Debug, Clone)]
pub(crate) struct CodeBlockData {
    pub(crate) range: Range<usize>,
    pub(crate) coding_passes: u32,
}

/// Compute the tile grid and the bounds of all tile-components (B.3).
pub(crate) fn build_tiles(siz: &SizeData) -> Vec<Tile> {
    let num_x_tiles = siz.num_x_tiles();
    let num_y_tiles = siz.num_y_tiles();
    let mut tiles = Vec::with_capacity((num_x_tiles * num_y_tiles) as usize);

    for q in 0..num_y_tiles {
        for p in 0..num_x_tiles {
            let x0 = siz.tile_x_offset as u64 + p as u64 * siz.tile_width as u64;
            let y0 = siz.tile_y_offset as u64 + q as u64 * siz.tile_height as u64;

            let rect = IntRect::from_ltrb(
                (x0 as u32).max(siz.image_area_x_offset),
                (y0 as u32).max(siz.image_area_y_offset),
                (x0 + siz.tile_width as u64).min(siz.reference_grid_width as u64) as u32,
                (y0 + siz.tile_height as u64).min(siz.reference_grid_height as u64) as u32,
            );

            let components = siz
                .components
                .iter()
                .map(|c| TileComponent {
                    rect: rect.div_ceil(
                        c.horizontal_resolution as u32,
                        c.vertical_resolution as u32,
                    ),
                    precision: c.precision,
                    coding_style: None,
                    quantization: None,
                    resolutions: vec![],
                })
                .collect();

            tiles.push(Tile {
                index: tiles.len() as u16,
                rect,
                components,
                coding_style: None,
                packets: None,
            });
        }
    }

    tiles
}

/// Build the resolutions, sub-bands, precincts and code-blocks of a
/// tile-component (B.5 - B.7).
pub(crate) fn build_resolutions(component: &mut TileComponent, coding_style: &CodingStyle) {
    let levels = coding_style.num_decomposition_levels;
    let mut resolutions = Vec::with_capacity(levels as usize + 1);

    for r in 0..=levels {
        let (ppx, ppy) = coding_style.precinct_exponents(r);
        // Code-blocks must not cross precinct boundaries, and precincts of
        // higher resolutions are halved in the sub-band domain.
        let (xcb, ycb) = if r > 0 {
            (
                coding_style.code_block_width.min(ppx.saturating_sub(1)),
                coding_style.code_block_height.min(ppy.saturating_sub(1)),
            )
        } else {
            (
                coding_style.code_block_width.min(ppx),
                coding_style.code_block_height.min(ppy),
            )
        };

        let rect = component.rect.shr_ceil((levels - r) as u32);

        let count = |start: u32, end: u32, exp: u8| {
            if end > start {
                shr_ceil(end, exp as u32) - (start >> exp)
            } else {
                0
            }
        };

        let num_precincts_wide = count(rect.x0, rect.x1, ppx);
        let num_precincts_high = count(rect.y0, rect.y1, ppy);

        let precinct_in_sub_band = if r == 0 {
            (ppx, ppy)
        } else {
            (ppx.saturating_sub(1), ppy.saturating_sub(1))
        };

        let sub_band_types: &[SubBandType] = if r == 0 {
            &[SubBandType::LowLow]
        } else {
            &[
                SubBandType::HighLow,
                SubBandType::LowHigh,
                SubBandType::HighHigh,
            ]
        };

        let sub_bands = sub_band_types
            .iter()
            .map(|&sub_band_type| {
                let sub_band_rect = if r == 0 {
                    rect
                } else {
                    sub_band_rect(component.rect, sub_band_type, (levels - r + 1) as u32)
                };

                ltrace!(
                    "r {} sub-band {:?} rect [{},{} {}x{}]",
                    r,
                    sub_band_type,
                    sub_band_rect.x0,
                    sub_band_rect.y0,
                    sub_band_rect.width(),
                    sub_band_rect.height()
                );

                build_code_blocks(
                    sub_band_type,
                    sub_band_rect,
                    (xcb, ycb),
                    precinct_in_sub_band,
                    num_precincts_wide,
                )
            })
            .collect();

        resolutions.push(Resolution {
            rect,
            precinct_width_exp: ppx,
            precinct_height_exp: ppy,
            num_precincts_wide,
            num_precincts_high,
            sub_bands,
        });
    }

    component.resolutions = resolutions;
}

/// The bounds of a high-pass sub-band, with `shift` being the number of
/// decomposition levels below the tile-component (B-15).
fn sub_band_rect(tile_component: IntRect, sub_band_type: SubBandType, shift: u32) -> IntRect {
    let (x_offset, y_offset) = match sub_band_type {
        SubBandType::LowLow => (false, false),
        SubBandType::HighLow => (true, false),
        SubBandType::LowHigh => (false, true),
        SubBandType::HighHigh => (true, true),
    };

    let coord = |v: u32, offset: bool| {
        if offset {
            shr_ceil_half(v, shift)
        } else {
            shr_ceil(v, shift)
        }
    };

    IntRect::from_ltrb(
        coord(tile_component.x0, x_offset),
        coord(tile_component.y0, y_offset),
        coord(tile_component.x1, x_offset),
        coord(tile_component.y1, y_offset),
    )
}

fn build_code_blocks(
    sub_band_type: SubBandType,
    rect: IntRect,
    (xcb, ycb): (u8, u8),
    (precinct_width_exp, precinct_height_exp): (u8, u8),
    num_precincts_wide: u32,
) -> SubBand {
    let mut sub_band = SubBand {
        sub_band_type,
        rect,
        code_blocks: vec![],
        precincts: vec![],
        precinct_indices: BTreeMap::new(),
    };

    let cb_width = 1_u64 << xcb;
    let cb_height = 1_u64 << ycb;

    let cbx0 = rect.x0 >> xcb;
    let cby0 = rect.y0 >> ycb;
    let cbx1 = ((rect.x1 as u64 + cb_width - 1) >> xcb) as u32;
    let cby1 = ((rect.y1 as u64 + cb_height - 1) >> ycb) as u32;

    for j in cby0..cby1 {
        for i in cbx0..cbx1 {
            let nominal = IntRect::from_ltrb(
                (cb_width * i as u64) as u32,
                (cb_height * j as u64) as u32,
                (cb_width * (i as u64 + 1)).min(u32::MAX as u64) as u32,
                (cb_height * (j as u64 + 1)).min(u32::MAX as u64) as u32,
            );
            let clipped = nominal.intersect(rect);

            if clipped.is_empty() {
                continue;
            }

            let pi = (clipped.x0 - rect.x0) >> precinct_width_exp;
            let pj = (clipped.y0 - rect.y0) >> precinct_height_exp;
            let precinct_number = pi + pj * num_precincts_wide;

            let code_block_idx = sub_band.code_blocks.len();
            let precinct_idx = match sub_band.precinct_indices.get(&precinct_number) {
                Some(&idx) => {
                    sub_band.precincts[idx].add(i, j);
                    idx
                }
                None => {
                    let idx = sub_band.precincts.len();
                    sub_band.precincts.push(Precinct::new(i, j));
                    sub_band.precinct_indices.insert(precinct_number, idx);
                    idx
                }
            };

            sub_band.precincts[precinct_idx]
                .code_blocks
                .push(code_block_idx);

            sub_band.code_blocks.push(CodeBlock {
                cbx: i,
                cby: j,
                rect: clipped,
                l_block: 3,
                included: false,
                zero_bit_planes: 0,
                data: vec![],
            });
        }
    }

    sub_band
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codestream::{
        CodeBlockStyle, CodingStyleFlags, ComponentSizeInfo, ProgressionOrder, WaveletTransform,
    };

    fn coding_style(levels: u8, xcb: u8, ycb: u8, precincts: &[(u8, u8)]) -> CodingStyle {
        CodingStyle {
            flags: CodingStyleFlags {
                raw: if precincts.is_empty() { 0 } else { 1 },
            },
            progression_order: ProgressionOrder::LayerResolutionComponentPosition,
            num_layers: 1,
            mct: false,
            num_decomposition_levels: levels,
            code_block_width: xcb,
            code_block_height: ycb,
            code_block_style: CodeBlockStyle::default(),
            transformation: WaveletTransform::Reversible53,
            precinct_exponents: precincts.to_vec(),
        }
    }

    fn siz(width: u32, height: u32, tile: (u32, u32), offsets: (u32, u32)) -> SizeData {
        SizeData {
            reference_grid_width: width,
            reference_grid_height: height,
            image_area_x_offset: offsets.0,
            image_area_y_offset: offsets.1,
            tile_width: tile.0,
            tile_height: tile.1,
            tile_x_offset: offsets.0,
            tile_y_offset: offsets.1,
            components: vec![
                ComponentSizeInfo {
                    precision: 8,
                    is_signed: false,
                    horizontal_resolution: 1,
                    vertical_resolution: 1,
                    rect: IntRect::from_ltrb(offsets.0, offsets.1, width, height),
                },
                ComponentSizeInfo {
                    precision: 8,
                    is_signed: false,
                    horizontal_resolution: 2,
                    vertical_resolution: 2,
                    rect: IntRect::from_ltrb(0, 0, width.div_ceil(2), height.div_ceil(2)),
                },
            ],
        }
    }

    #[test]
    fn tile_grid() {
        let siz = siz(100, 50, (32, 32), (3, 1));
        let tiles = build_tiles(&siz);

        assert_eq!(tiles.len(), 4 * 2);
        assert_eq!(tiles.len() as u32, siz.num_tiles());
        assert_eq!(tiles[0].rect, IntRect::from_ltrb(3, 1, 35, 33));
        assert_eq!(tiles[3].rect, IntRect::from_ltrb(99, 1, 100, 33));
        assert_eq!(tiles[7].rect, IntRect::from_ltrb(99, 33, 100, 50));
        assert_eq!(tiles[7].index, 7);
        assert_eq!(tiles[0].components[1].rect, IntRect::from_ltrb(2, 1, 18, 17));
    }

    #[test]
    fn sub_band_bounds() {
        let tc = IntRect::from_ltrb(3, 5, 20, 17);

        assert_eq!(
            sub_band_rect(tc, SubBandType::HighLow, 1),
            IntRect::from_ltrb(1, 3, 10, 9)
        );
        assert_eq!(
            sub_band_rect(tc, SubBandType::LowHigh, 1),
            IntRect::from_ltrb(2, 2, 10, 8)
        );
        assert_eq!(
            sub_band_rect(tc, SubBandType::HighHigh, 1),
            IntRect::from_ltrb(1, 2, 10, 8)
        );
    }

    #[test]
    fn code_blocks_are_clipped_to_sub_band() {
        let siz = siz(37, 23, (37, 23), (0, 0));
        let mut tiles = build_tiles(&siz);
        let component = &mut tiles[0].components[0];
        build_resolutions(component, &coding_style(2, 2, 3, &[]));

        assert_eq!(component.resolutions.len(), 3);
        assert_eq!(component.resolutions[0].rect, IntRect::from_ltrb(0, 0, 10, 6));
        assert_eq!(component.resolutions[2].rect, IntRect::from_ltrb(0, 0, 37, 23));

        for resolution in &component.resolutions {
            for sub_band in &resolution.sub_bands {
                let expected = sub_band.rect.width().div_ceil(4) * sub_band.rect.height().div_ceil(8);
                assert_eq!(sub_band.code_blocks.len() as u32, expected);

                for code_block in &sub_band.code_blocks {
                    assert!(!code_block.rect.is_empty());
                    assert_eq!(code_block.rect.intersect(sub_band.rect), code_block.rect);
                }
            }
        }
    }

    #[test]
    fn empty_code_blocks_are_dropped() {
        // A one column wide tile-component has empty high-pass sub-bands in
        // the horizontal direction.
        let siz = siz(1, 8, (1, 8), (0, 0));
        let mut tiles = build_tiles(&siz);
        let component = &mut tiles[0].components[0];
        build_resolutions(component, &coding_style(1, 2, 2, &[]));

        let resolution = &component.resolutions[1];
        assert!(resolution.sub_bands[0].rect.is_empty());
        assert!(resolution.sub_bands[0].code_blocks.is_empty());
        assert!(resolution.sub_bands[2].code_blocks.is_empty());
        assert_eq!(resolution.sub_bands[1].code_blocks.len(), 1);
    }

    #[test]
    fn precinct_partition() {
        let siz = siz(64, 64, (64, 64), (0, 0));
        let mut tiles = build_tiles(&siz);
        let component = &mut tiles[0].components[0];
        build_resolutions(component, &coding_style(1, 2, 2, &[(4, 4), (4, 4)]));

        let ll = &component.resolutions[0];
        assert_eq!((ll.num_precincts_wide, ll.num_precincts_high), (2, 2));

        let sub_band = &ll.sub_bands[0];
        assert_eq!(sub_band.precincts.len(), 4);

        // Each 16x16 precinct holds a 4x4 grid of 4x4 code-blocks.
        for precinct in &sub_band.precincts {
            assert_eq!(precinct.code_blocks.len(), 16);
            assert_eq!(precinct.width_in_code_blocks(), 4);
            assert_eq!(precinct.height_in_code_blocks(), 4);
        }

        let precinct = &sub_band.precincts[sub_band.precinct_index(3).unwrap()];
        assert_eq!((precinct.cbx_min, precinct.cby_min), (4, 4));
        assert_eq!((precinct.cbx_max, precinct.cby_max), (7, 7));

        // Higher resolutions use half-sized precincts in the sub-band domain
        // and clamp the code-block size to them.
        let r1 = &component.resolutions[1];
        assert_eq!((r1.num_precincts_wide, r1.num_precincts_high), (4, 4));
        assert_eq!(r1.sub_bands[0].precincts.len(), 16);
        assert!(
            r1.sub_bands[0]
                .precincts
                .iter()
                .all(|p| p.code_blocks.len() == 4)
        );
    }

    #[test]
    fn precinct_bounds() {
        let mut precinct = Precinct::new(5, 5);
        precinct.add(3, 2);
        precinct.add(6, 9);

        assert_eq!((precinct.cbx_min, precinct.cbx_max), (3, 6));
        assert_eq!((precinct.cby_min, precinct.cby_max), (2, 9));
        assert_eq!(precinct.width_in_code_blocks(), 4);
        assert_eq!(precinct.height_in_code_blocks(), 8);
    }

    #[test]
    fn precinct_spanning_rows() {
        let sub_band = build_code_blocks(
            SubBandType::LowLow,
            IntRect::from_ltrb(8, 0, 12, 16),
            (2, 2),
            (15, 15),
            1,
        );

        let precinct = &sub_band.precincts[0];
        assert_eq!((precinct.cbx_min, precinct.cbx_max), (2, 2));
        assert_eq!((precinct.cby_min, precinct.cby_max), (0, 3));
        assert_eq!(precinct.code_blocks, [0, 1, 2, 3]);
    }
}
