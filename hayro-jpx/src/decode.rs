//! Walking the marker segments of a codestream (Annex A) and reconstructing
//! the tiles that were read.

use crate::codestream::{self, CodingStyle, Quantization, SizeData, TilePartHeader, markers};
use crate::error::{DecodingError, FormatError, Result, UnsupportedError, bail};
use crate::packet::{PacketMarkers, parse_tile_packets};
use crate::progression::PacketIterator;
use crate::reader::Reader;
use crate::tile::{Tile, build_resolutions, build_tiles};
use crate::transform::transform_tile;
use crate::{DecodeSettings, DecodedTile};

/// The result of decoding a codestream.
pub(crate) struct DecodedCodestream {
    pub(crate) size: SizeData,
    pub(crate) tiles: Vec<DecodedTile>,
}

/// Decode all tiles of a codestream.
pub(crate) fn decode(data: &[u8], settings: &DecodeSettings) -> Result<DecodedCodestream> {
    let strict = settings.fail_on_corrupted_image;
    let mut context = Context::new(data);

    if let Err(e) = context.read_markers() {
        if strict || !e.is_recoverable() {
            return Err(e);
        }

        lwarn!(
            "JPX: Trying to recover from: {} (offset {})",
            e,
            context.position
        );
    }

    let Some(size) = context.size else {
        bail!(FormatError::MissingSizeMarker);
    };

    let mut tiles = Vec::with_capacity(context.tiles.len());

    for tile in &context.tiles {
        if !tile.is_initialized() {
            lwarn!("tile {} has no data, skipping it", tile.index);

            continue;
        }

        ldebug!(
            "reconstructing tile {} ({}x{})",
            tile.index,
            tile.rect.width(),
            tile.rect.height()
        );

        tiles.push(transform_tile(tile, data, strict)?);
    }

    Ok(DecodedCodestream { size, tiles })
}

/// Coding parameters that can be overridden in tile-part headers.
#[derive(Debug, Clone, Default)]
struct CodingParameters {
    cod: Option<CodingStyle>,
    qcd: Option<Quantization>,
    /// Per-component overrides of `qcd`.
    qcc: Vec<Option<Quantization>>,
}

#[derive(Debug)]
struct TilePart {
    header: TilePartHeader,
    /// The end of the tile-part data.
    data_end: usize,
    parameters: CodingParameters,
}

/// The state while walking the codestream markers.
struct Context<'a> {
    data: &'a [u8],
    position: usize,
    in_main_header: bool,
    size: Option<SizeData>,
    main: CodingParameters,
    tile_part: Option<TilePart>,
    tiles: Vec<Tile>,
}

impl<'a> Context<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            position: 0,
            in_main_header: true,
            size: None,
            main: CodingParameters::default(),
            tile_part: None,
            tiles: vec![],
        }
    }

    fn read_markers(&mut self) -> Result<()> {
        let data = self.data;

        while self.position + 1 < data.len() {
            let marker = u16::from_be_bytes([data[self.position], data[self.position + 1]]);
            self.position += 2;

            ltrace!(
                "marker {} (0x{:04X}) at offset {}",
                markers::to_string(marker),
                marker,
                self.position - 2
            );

            match marker {
                markers::SOC => self.in_main_header = true,
                markers::EOC => {}
                markers::SIZ => {
                    let size = codestream::siz_marker(&mut self.segment()?)?;

                    ldebug!(
                        "image {}x{} with {} components in {} tiles",
                        size.image_width(),
                        size.image_height(),
                        size.num_components(),
                        size.num_tiles()
                    );

                    for (idx, c) in size.components.iter().enumerate() {
                        ltrace!(
                            "component {}: precision {}, signed {}, subsampling {}x{}",
                            idx,
                            c.precision,
                            c.is_signed,
                            c.horizontal_resolution,
                            c.vertical_resolution
                        );
                    }

                    self.tiles = build_tiles(&size);
                    self.main = CodingParameters {
                        qcc: vec![None; size.components.len()],
                        ..CodingParameters::default()
                    };
                    self.size = Some(size);
                }
                markers::COD => {
                    let cod = codestream::cod_marker(&mut self.segment()?)?;
                    self.parameters_mut()?.cod = Some(cod);
                }
                markers::QCD => {
                    let qcd = codestream::qcd_marker(&mut self.segment()?)?;
                    let in_main_header = self.in_main_header;
                    let parameters = self.parameters_mut()?;
                    parameters.qcd = Some(qcd);

                    if !in_main_header {
                        parameters.qcc.fill(None);
                    }
                }
                markers::QCC => {
                    let csiz = self.size()?.num_components();
                    let (component, qcc) = codestream::qcc_marker(&mut self.segment()?, csiz)?;

                    match self.parameters_mut()?.qcc.get_mut(component as usize) {
                        Some(slot) => *slot = Some(qcc),
                        None => {
                            lwarn!("ignoring QCC marker for component {}", component);
                        }
                    }
                }
                markers::SOT => self.start_tile_part()?,
                markers::SOD => self.read_tile_part_data()?,
                markers::COC => bail!(UnsupportedError::CocMarker),
                markers::TLM | markers::PLM | markers::PLT | markers::COM => {
                    self.segment()?;
                }
                _ => bail!(DecodingError::UnknownMarker(marker)),
            }
        }

        Ok(())
    }

    fn size(&self) -> Result<&SizeData> {
        Ok(self.size.as_ref().ok_or(FormatError::MissingSizeMarker)?)
    }

    /// The parameters that marker segments at the current position apply to.
    fn parameters_mut(&mut self) -> Result<&mut CodingParameters> {
        self.size()?;

        if self.in_main_header {
            return Ok(&mut self.main);
        }

        Ok(&mut self
            .tile_part
            .as_mut()
            .ok_or(DecodingError::UnexpectedEof)?
            .parameters)
    }

    /// Return a reader over the parameters of the marker segment at the
    /// current position and move past the segment.
    fn segment(&mut self) -> Result<Reader<'a>> {
        let data = self.data;
        let length = Reader::new(data.get(self.position..).unwrap_or_default())
            .read_u16()
            .ok_or(DecodingError::UnexpectedEof)? as usize;

        if length < 2 {
            bail!(DecodingError::UnexpectedEof);
        }

        let end = (self.position + length).min(data.len());
        let segment = &data[self.position + 2..end];
        self.position += length;

        Ok(Reader::new(segment))
    }

    fn start_tile_part(&mut self) -> Result<()> {
        let sot_start = self.position - 2;
        let header =
            codestream::sot_marker(&mut self.segment()?).ok_or(DecodingError::UnexpectedEof)?;
        let num_tiles = self.size()?.num_tiles();

        if header.tile_index as u32 >= num_tiles {
            bail!(DecodingError::InvalidTileIndex(header.tile_index));
        }

        let data_end = if header.length == 0 {
            // The tile-part extends to the end of the codestream.
            if self.data.ends_with(&markers::EOC.to_be_bytes()) {
                self.data.len() - 2
            } else {
                self.data.len()
            }
        } else {
            (sot_start + header.length as usize).min(self.data.len())
        };

        ldebug!(
            "tile {} part {}/{} ends at {}",
            header.tile_index,
            header.part_index,
            header.num_parts,
            data_end
        );

        let parameters = if header.part_index == 0 {
            self.main.clone()
        } else {
            CodingParameters::default()
        };

        self.in_main_header = false;
        self.tile_part = Some(TilePart {
            header,
            data_end,
            parameters,
        });

        Ok(())
    }

    fn read_tile_part_data(&mut self) -> Result<()> {
        let tile_part = self
            .tile_part
            .as_ref()
            .ok_or(DecodingError::UnexpectedEof)?;
        let tile_index = tile_part.header.tile_index;
        let data_end = tile_part.data_end;

        let tile = self
            .tiles
            .get_mut(tile_index as usize)
            .ok_or(DecodingError::InvalidTileIndex(tile_index))?;

        if tile_part.header.part_index == 0 {
            initialize_tile(tile, &tile_part.parameters)?;
        }

        let packet_markers = tile
            .coding_style
            .as_ref()
            .map(|c| PacketMarkers {
                sop: c.flags.may_use_sop_markers(),
                eph: c.flags.uses_eph_marker(),
            })
            .unwrap_or_default();

        let start = self.position.min(data_end);
        parse_tile_packets(tile, self.data, start, data_end, packet_markers)?;

        self.position = self.position.max(data_end);

        Ok(())
    }
}

/// Assign the coding parameters of the first tile-part to the tile and build
/// the geometry and the packet progression of all its components.
fn initialize_tile(tile: &mut Tile, parameters: &CodingParameters) -> Result<()> {
    let cod = parameters
        .cod
        .as_ref()
        .ok_or(DecodingError::MissingCodingStyle)?;

    for (idx, component) in tile.components.iter_mut().enumerate() {
        let quantization = parameters
            .qcc
            .get(idx)
            .cloned()
            .flatten()
            .or_else(|| parameters.qcd.clone())
            .ok_or(DecodingError::MissingQuantization)?;

        build_resolutions(component, cod);
        component.coding_style = Some(cod.clone());
        component.quantization = Some(quantization);
    }

    tile.packets = Some(PacketIterator::new(
        cod.progression_order,
        &tile.components,
        cod.num_layers,
    ));
    tile.coding_style = Some(cod.clone());

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecodeError;

    fn segment(out: &mut Vec<u8>, marker: u16, body: &[u8]) {
        out.extend_from_slice(&marker.to_be_bytes());
        out.extend_from_slice(&(body.len() as u16 + 2).to_be_bytes());
        out.extend_from_slice(body);
    }

    fn main_header(out: &mut Vec<u8>) {
        out.extend_from_slice(&markers::SOC.to_be_bytes());

        let mut siz = vec![0, 0];
        for v in [2_u32, 2, 0, 0, 2, 2, 0, 0] {
            siz.extend_from_slice(&v.to_be_bytes());
        }
        siz.extend_from_slice(&[0, 1, 7, 1, 1]);
        segment(out, markers::SIZ, &siz);

        // LRCP, one layer, no decomposition levels, 4x4 code-blocks, 5-3.
        segment(out, markers::COD, &[0, 0, 0, 1, 0, 0, 2, 2, 0, 1]);
        segment(out, markers::QCD, &[0x40, 0x48]);
    }

    fn tile_part(out: &mut Vec<u8>, tile_index: u16, psot: Option<u32>, packets: &[u8]) {
        let length = psot.unwrap_or(14 + packets.len() as u32);
        let mut sot = tile_index.to_be_bytes().to_vec();
        sot.extend_from_slice(&length.to_be_bytes());
        sot.extend_from_slice(&[0, 1]);

        segment(out, markers::SOT, &sot);
        out.extend_from_slice(&markers::SOD.to_be_bytes());
        out.extend_from_slice(packets);
    }

    fn decode_with(data: &[u8], strict: bool) -> Result<DecodedCodestream> {
        decode(
            data,
            &DecodeSettings {
                fail_on_corrupted_image: strict,
            },
        )
    }

    #[test]
    fn empty_packet_decodes_to_mid_grey() {
        let mut data = vec![];
        main_header(&mut data);
        tile_part(&mut data, 0, None, &[0x00]);
        data.extend_from_slice(&markers::EOC.to_be_bytes());

        let decoded = decode_with(&data, true).unwrap();

        assert_eq!(decoded.size.num_tiles(), 1);
        assert_eq!(decoded.tiles.len(), 1);

        let tile = &decoded.tiles[0];
        assert_eq!((tile.left, tile.top, tile.width, tile.height), (0, 0, 2, 2));
        assert_eq!(tile.pixels, [128; 4]);
    }

    #[test]
    fn tile_part_until_end() {
        let mut data = vec![];
        main_header(&mut data);
        tile_part(&mut data, 0, Some(0), &[0x00]);
        data.extend_from_slice(&markers::EOC.to_be_bytes());

        let decoded = decode_with(&data, true).unwrap();
        assert_eq!(decoded.tiles[0].pixels, [128; 4]);
    }

    #[test]
    fn missing_size_marker() {
        let mut data = markers::SOC.to_be_bytes().to_vec();
        segment(&mut data, markers::COD, &[0, 0, 0, 1, 0, 0, 2, 2, 0, 1]);

        for strict in [false, true] {
            let err = decode_with(&data, strict).err().unwrap();

            assert_eq!(err, FormatError::MissingSizeMarker.into());
            assert_eq!(err.to_string(), "No size marker found in JPX stream");
        }
    }

    #[test]
    fn invalid_size_marker() {
        let mut data = markers::SOC.to_be_bytes().to_vec();

        let mut siz = vec![0, 0];
        for v in [70000_u32, 2, 0, 0, 70000, 2, 0, 0] {
            siz.extend_from_slice(&v.to_be_bytes());
        }
        siz.extend_from_slice(&[0, 1, 7, 1, 1]);
        segment(&mut data, markers::SIZ, &siz);
        segment(&mut data, markers::COD, &[0, 0, 0, 1, 0, 0, 2, 2, 0, 1]);

        for strict in [false, true] {
            assert_eq!(
                decode_with(&data, strict).err(),
                Some(FormatError::InvalidDimensions.into())
            );
        }
    }

    #[test]
    fn unknown_marker() {
        let mut data = vec![];
        main_header(&mut data);
        segment(&mut data, 0xFF60, &[1, 2, 3]);
        tile_part(&mut data, 0, None, &[0x00]);

        assert_eq!(
            decode_with(&data, true).err(),
            Some(DecodingError::UnknownMarker(0xFF60).into())
        );

        // Without strict mode, decoding stops at the marker and no tile was
        // read.
        let decoded = decode_with(&data, false).unwrap();
        assert!(decoded.tiles.is_empty());
    }

    #[test]
    fn coc_is_fatal() {
        let mut data = vec![];
        main_header(&mut data);
        segment(&mut data, markers::COC, &[0, 0, 0, 2, 2, 0, 1]);

        assert!(matches!(
            decode_with(&data, false),
            Err(DecodeError::Unsupported(UnsupportedError::CocMarker))
        ));
    }

    #[test]
    fn invalid_tile_index() {
        let mut data = vec![];
        main_header(&mut data);
        tile_part(&mut data, 0, None, &[0x00]);
        tile_part(&mut data, 7, None, &[0x00]);

        assert_eq!(
            decode_with(&data, true).err(),
            Some(DecodingError::InvalidTileIndex(7).into())
        );

        // The first tile is still decoded.
        assert_eq!(decode_with(&data, false).unwrap().tiles.len(), 1);
    }

    #[test]
    fn tile_header_quantization_overrides_main_header() {
        let mut data = vec![];
        main_header(&mut data);

        let mut sot = vec![0, 0];
        sot.extend_from_slice(&(12_u32 + 6 + 2 + 1).to_be_bytes());
        sot.extend_from_slice(&[0, 1]);
        segment(&mut data, markers::SOT, &sot);
        segment(&mut data, markers::QCD, &[0x20, 0x50]);
        data.extend_from_slice(&markers::SOD.to_be_bytes());
        data.push(0x00);

        let mut context = Context::new(&data);
        context.read_markers().unwrap();

        let quantization = context.tiles[0].components[0].quantization.as_ref().unwrap();
        assert_eq!(quantization.guard_bits, 1);
        assert_eq!(quantization.step_sizes[0].epsilon, 10);

        // The main header is unaffected.
        assert_eq!(context.main.qcd.as_ref().unwrap().guard_bits, 2);
    }
}
