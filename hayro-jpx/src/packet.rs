//! Reading packet headers and assigning packet bodies to code-blocks
//! (B.9 and B.10).

use crate::bitplane::{MAX_BIT_PLANES, num_bit_planes};
use crate::codestream::markers;
use crate::error::{DecodingError, Result};
use crate::tag_tree::{InclusionTree, TagTree};
use crate::tile::{CodeBlockData, PrecinctTrees, SubBand, Tile};

/// The maximum number of bits of a code-block length field.
const MAX_LENGTH_BITS: u32 = 32;

/// A bit reader over packet headers which removes the stuffing bits
/// following 0xFF bytes (B.10.1).
pub(crate) struct PacketReader<'a> {
    data: &'a [u8],
    pos: usize,
    buffer: u64,
    buffer_size: u32,
    /// Whether the next byte only has 7 usable bits.
    skip_next_bit: bool,
}

impl<'a> PacketReader<'a> {
    pub(crate) fn new(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos,
            buffer: 0,
            buffer_size: 0,
            skip_next_bit: false,
        }
    }

    pub(crate) fn offset(&self) -> usize {
        self.pos
    }

    pub(crate) fn read_bits(&mut self, count: u32) -> Result<u32> {
        debug_assert!(count <= MAX_LENGTH_BITS);

        while self.buffer_size < count {
            let byte = *self
                .data
                .get(self.pos)
                .ok_or(DecodingError::UnexpectedEof)?;
            self.pos += 1;

            if self.skip_next_bit {
                self.buffer = (self.buffer << 7) | byte as u64;
                self.buffer_size += 7;
                self.skip_next_bit = false;
            } else {
                self.buffer = (self.buffer << 8) | byte as u64;
                self.buffer_size += 8;
            }

            if byte == 0xFF {
                self.skip_next_bit = true;
            }
        }

        self.buffer_size -= count;

        Ok(((self.buffer >> self.buffer_size) & ((1_u64 << count) - 1)) as u32)
    }

    fn read_bit(&mut self) -> Result<bool> {
        Ok(self.read_bits(1)? != 0)
    }

    /// Discard the remaining bits of the current byte, and the following
    /// byte if the current one was 0xFF.
    pub(crate) fn align(&mut self) {
        self.buffer_size = 0;

        if self.skip_next_bit {
            self.pos += 1;
            self.skip_next_bit = false;
        }
    }

    pub(crate) fn skip_bytes(&mut self, count: usize) {
        self.pos += count;
    }

    /// Skip the given marker if it follows, either right after the 0xFF byte
    /// that was just consumed or at the current position.
    pub(crate) fn skip_marker_if_equal(&mut self, marker: u16) -> bool {
        let [high, low] = marker.to_be_bytes();
        let byte = |pos: Option<usize>| pos.and_then(|pos| self.data.get(pos).copied());

        if byte(self.pos.checked_sub(1)) == Some(high) && byte(Some(self.pos)) == Some(low) {
            self.skip_bytes(1);

            true
        } else if byte(Some(self.pos)) == Some(high) && byte(Some(self.pos + 1)) == Some(low) {
            self.skip_bytes(2);

            true
        } else {
            false
        }
    }

    /// The number of coding passes (Table B.4).
    fn read_coding_passes(&mut self) -> Result<u32> {
        if !self.read_bit()? {
            return Ok(1);
        }

        if !self.read_bit()? {
            return Ok(2);
        }

        let value = self.read_bits(2)?;

        if value < 3 {
            return Ok(value + 3);
        }

        let value = self.read_bits(5)?;

        if value < 31 {
            return Ok(value + 6);
        }

        Ok(self.read_bits(7)? + 37)
    }
}

/// Markers enabled by the coding style of the codestream.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PacketMarkers {
    pub(crate) sop: bool,
    pub(crate) eph: bool,
}

/// A code-block contribution of a packet whose body hasn't been read yet.
struct PendingData {
    sub_band: usize,
    code_block: usize,
    coding_passes: u32,
    length: usize,
}

/// Read the packets of a tile-part in `data[start..end]`, continuing the
/// progression of the tile.
///
/// Returns the position after the last packet.
pub(crate) fn parse_tile_packets(
    tile: &mut Tile,
    data: &[u8],
    start: usize,
    end: usize,
    packet_markers: PacketMarkers,
) -> Result<usize> {
    let Tile {
        index,
        components,
        packets,
        ..
    } = tile;
    let packets = packets
        .as_mut()
        .ok_or(DecodingError::UninitializedTile(*index))?;

    let mut reader = PacketReader::new(data, start);
    let mut pending = vec![];

    while reader.offset() < end {
        reader.align();

        if packet_markers.sop && reader.skip_marker_if_equal(markers::SOP) {
            // Lsop and Nsop.
            reader.skip_bytes(4);
        }

        let position = packets
            .next_position()
            .ok_or(DecodingError::OutOfPackets)?;

        // Zero length packet.
        if !reader.read_bit()? {
            if packet_markers.eph {
                reader.align();
                reader.skip_marker_if_equal(markers::EPH);
            }

            continue;
        }

        ltrace!(
            "packet l {} r {} c {} p {} at offset {}",
            position.layer,
            position.resolution,
            position.component,
            position.precinct,
            reader.offset()
        );

        let resolution = components
            .get_mut(position.component)
            .and_then(|c| c.resolutions.get_mut(position.resolution as usize))
            .ok_or(DecodingError::InvalidPacketHeader)?;

        pending.clear();

        for (sub_band_idx, sub_band) in resolution.sub_bands.iter_mut().enumerate() {
            let Some(precinct_idx) = sub_band.precinct_index(position.precinct) else {
                continue;
            };

            read_precinct_header(
                &mut reader,
                sub_band,
                sub_band_idx,
                precinct_idx,
                position.layer,
                &mut pending,
            )?;
        }

        reader.align();

        if packet_markers.eph {
            reader.skip_marker_if_equal(markers::EPH);
        }

        for item in &pending {
            let start = reader.offset();
            let code_block =
                &mut resolution.sub_bands[item.sub_band].code_blocks[item.code_block];

            code_block.data.push(CodeBlockData {
                range: start..start + item.length,
                coding_passes: item.coding_passes,
            });

            reader.skip_bytes(item.length);
        }
    }

    Ok(reader.offset())
}

/// Read the part of a packet header that belongs to the code-blocks of one
/// precinct in one sub-band.
fn read_precinct_header(
    reader: &mut PacketReader<'_>,
    sub_band: &mut SubBand,
    sub_band_idx: usize,
    precinct_idx: usize,
    layer: u32,
    pending: &mut Vec<PendingData>,
) -> Result<()> {
    let SubBand {
        code_blocks,
        precincts,
        ..
    } = sub_band;
    let precinct = &mut precincts[precinct_idx];
    let width = precinct.width_in_code_blocks();
    let height = precinct.height_in_code_blocks();

    for &code_block_idx in &precinct.code_blocks {
        let code_block = &mut code_blocks[code_block_idx];
        let column = code_block.cbx - precinct.cbx_min;
        let row = code_block.cby - precinct.cby_min;

        let trees = precinct.trees.get_or_insert_with(|| PrecinctTrees {
            inclusion: InclusionTree::new(width, height, layer),
            zero_bit_planes: TagTree::new(width, height),
        });

        let mut first_inclusion = false;

        let included = if code_block.included {
            reader.read_bit()?
        } else {
            if trees.inclusion.reset(column, row, layer)? {
                loop {
                    if !reader.read_bit()? {
                        trees.inclusion.increment_value(layer);
                        break;
                    }

                    if !trees.inclusion.next_level() {
                        code_block.included = true;
                        first_inclusion = true;
                        break;
                    }
                }
            }

            first_inclusion
        };

        if !included {
            continue;
        }

        if first_inclusion {
            let tree = &mut trees.zero_bit_planes;
            tree.reset(column, row)?;

            loop {
                if !reader.read_bit()? {
                    tree.increment_value()?;
                } else if !tree.next_level()? {
                    break;
                }
            }

            code_block.zero_bit_planes = tree.value().ok_or(DecodingError::InvalidTagTree)?;
        }

        let coding_passes = reader.read_coding_passes()?;
        let previous_passes: u32 = code_block.data.iter().map(|d| d.coding_passes).sum();
        let bit_planes = code_block
            .zero_bit_planes
            .saturating_add(num_bit_planes(previous_passes + coding_passes));

        if bit_planes > MAX_BIT_PLANES {
            lwarn!(
                "code-block has {} bit-planes, at most {} are supported",
                bit_planes,
                MAX_BIT_PLANES
            );

            return Err(DecodingError::TooManyBitPlanes.into());
        }

        while reader.read_bit()? {
            code_block.l_block += 1;
        }

        // B.10.7.1: Lblock + floor(log2(passes)) bits.
        let bits = code_block.l_block + coding_passes.ilog2();

        if bits > MAX_LENGTH_BITS {
            return Err(DecodingError::InvalidPacketHeader.into());
        }

        let length = reader.read_bits(bits)? as usize;

        pending.push(PendingData {
            sub_band: sub_band_idx,
            code_block: code_block_idx,
            coding_passes,
            length,
        });
    }

    Ok(())
}
