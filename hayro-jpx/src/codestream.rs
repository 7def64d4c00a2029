//! Parsing of codestream marker segments, as specified in Annex A.

use crate::error::{DecodingError, FormatError, Result, UnsupportedError, bail};
use crate::reader::Reader;
use crate::rect::IntRect;

/// Tile indices are 16-bit, so larger grids can't be addressed.
const MAX_TILE_COUNT: u64 = 65535;
/// The largest supported width and height of the image area.
const MAX_DIMENSIONS: u32 = 60000;
/// More decomposition levels would overflow the geometry computations.
pub(crate) const MAX_DECOMPOSITION_LEVELS: u8 = 32;

/// Image and tile size, from the SIZ marker (A.5.1).
#[derive(Debug, Clone)]
pub(crate) struct SizeData {
    /// Width of the reference grid (`Xsiz`).
    pub(crate) reference_grid_width: u32,
    /// Height of the reference grid (`Ysiz`).
    pub(crate) reference_grid_height: u32,
    /// Horizontal offset of the image area (`XOsiz`).
    pub(crate) image_area_x_offset: u32,
    /// Vertical offset of the image area (`YOsiz`).
    pub(crate) image_area_y_offset: u32,
    /// Width of one reference tile (`XTsiz`).
    pub(crate) tile_width: u32,
    /// Height of one reference tile (`YTsiz`).
    pub(crate) tile_height: u32,
    /// Horizontal offset of the first tile (`XTOsiz`).
    pub(crate) tile_x_offset: u32,
    /// Vertical offset of the first tile (`YTOsiz`).
    pub(crate) tile_y_offset: u32,
    pub(crate) components: Vec<ComponentSizeInfo>,
}

impl SizeData {
    /// The number of tiles in the x direction (B-5).
    pub(crate) fn num_x_tiles(&self) -> u32 {
        (self.reference_grid_width - self.tile_x_offset).div_ceil(self.tile_width)
    }

    /// The number of tiles in the y direction (B-5).
    pub(crate) fn num_y_tiles(&self) -> u32 {
        (self.reference_grid_height - self.tile_y_offset).div_ceil(self.tile_height)
    }

    pub(crate) fn num_tiles(&self) -> u32 {
        self.num_x_tiles() * self.num_y_tiles()
    }

    pub(crate) fn image_width(&self) -> u32 {
        self.reference_grid_width - self.image_area_x_offset
    }

    pub(crate) fn image_height(&self) -> u32 {
        self.reference_grid_height - self.image_area_y_offset
    }

    pub(crate) fn num_components(&self) -> u16 {
        self.components.len() as u16
    }
}

/// Component information (A.5.1 and Table A.11).
#[derive(Debug, Clone, Copy)]
pub(crate) struct ComponentSizeInfo {
    pub(crate) precision: u8,
    pub(crate) is_signed: bool,
    pub(crate) horizontal_resolution: u8,
    pub(crate) vertical_resolution: u8,
    /// The bounds of the component in its own sample grid (B-12).
    pub(crate) rect: IntRect,
}

/// Progression order (Table A.16).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProgressionOrder {
    LayerResolutionComponentPosition,
    ResolutionLayerComponentPosition,
    ResolutionPositionComponentLayer,
    PositionComponentResolutionLayer,
    ComponentPositionResolutionLayer,
}

impl ProgressionOrder {
    fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::LayerResolutionComponentPosition),
            1 => Ok(Self::ResolutionLayerComponentPosition),
            2 => Ok(Self::ResolutionPositionComponentLayer),
            3 => Ok(Self::PositionComponentResolutionLayer),
            4 => Ok(Self::ComponentPositionResolutionLayer),
            _ => Err(UnsupportedError::ProgressionOrder(value).into()),
        }
    }
}

/// Wavelet transformation type (Table A.20).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaveletTransform {
    Irreversible97,
    Reversible53,
}

impl WaveletTransform {
    fn from_u8(value: u8) -> Self {
        if value == 0 {
            Self::Irreversible97
        } else {
            Self::Reversible53
        }
    }
}

/// Coding style flags (Table A.13).
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct CodingStyleFlags {
    pub(crate) raw: u8,
}

impl CodingStyleFlags {
    fn from_u8(value: u8) -> Self {
        Self { raw: value }
    }

    pub(crate) fn has_precincts(&self) -> bool {
        (self.raw & 0x01) != 0
    }

    pub(crate) fn may_use_sop_markers(&self) -> bool {
        (self.raw & 0x02) != 0
    }

    pub(crate) fn uses_eph_marker(&self) -> bool {
        (self.raw & 0x04) != 0
    }
}

/// Code-block style flags (Table A.19).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodeBlockStyle {
    pub(crate) selective_arithmetic_coding_bypass: bool,
    pub(crate) reset_context_probabilities: bool,
    pub(crate) termination_on_each_pass: bool,
    pub(crate) vertically_causal_context: bool,
    pub(crate) predictable_termination: bool,
    pub(crate) segmentation_symbols: bool,
}

impl CodeBlockStyle {
    pub(crate) fn from_u8(value: u8) -> Self {
        Self {
            selective_arithmetic_coding_bypass: (value & 0x01) != 0,
            reset_context_probabilities: (value & 0x02) != 0,
            termination_on_each_pass: (value & 0x04) != 0,
            vertically_causal_context: (value & 0x08) != 0,
            predictable_termination: (value & 0x10) != 0,
            segmentation_symbols: (value & 0x20) != 0,
        }
    }

    /// The names of all enabled options that the bit-plane decoder doesn't
    /// implement.
    pub(crate) fn unsupported_option_names(&self) -> impl Iterator<Item = &'static str> {
        [
            (
                self.selective_arithmetic_coding_bypass,
                "selectiveArithmeticCodingBypass",
            ),
            (
                self.reset_context_probabilities,
                "resetContextProbabilities",
            ),
            (self.termination_on_each_pass, "terminationOnEachCodingPass"),
            (self.vertically_causal_context, "verticallyStripe"),
            (self.predictable_termination, "predictableTermination"),
        ]
        .into_iter()
        .filter_map(|(enabled, name)| enabled.then_some(name))
    }

    fn is_supported(&self) -> bool {
        self.unsupported_option_names().next().is_none()
    }
}

/// Coding style, from the COD marker (A.6.1).
#[derive(Debug, Clone)]
pub(crate) struct CodingStyle {
    pub(crate) flags: CodingStyleFlags,
    pub(crate) progression_order: ProgressionOrder,
    pub(crate) num_layers: u16,
    pub(crate) mct: bool,
    pub(crate) num_decomposition_levels: u8,
    /// Code-block width exponent (`xcb`).
    pub(crate) code_block_width: u8,
    /// Code-block height exponent (`ycb`).
    pub(crate) code_block_height: u8,
    pub(crate) code_block_style: CodeBlockStyle,
    pub(crate) transformation: WaveletTransform,
    /// Precinct size exponents (`PPx`, `PPy`) for each resolution level.
    pub(crate) precinct_exponents: Vec<(u8, u8)>,
}

impl CodingStyle {
    pub(crate) fn is_reversible(&self) -> bool {
        self.transformation == WaveletTransform::Reversible53
    }

    /// The precinct size exponents of a resolution level.
    pub(crate) fn precinct_exponents(&self, resolution: u8) -> (u8, u8) {
        if !self.flags.has_precincts() {
            return (15, 15);
        }

        self.precinct_exponents
            .get(resolution as usize)
            .copied()
            .unwrap_or_else(|| {
                lwarn!("missing precinct size for resolution {}", resolution);

                (15, 15)
            })
    }
}

/// Quantization style (Table A.28).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum QuantizationStyle {
    NoQuantization,
    ScalarDerived,
    ScalarExpounded,
}

impl QuantizationStyle {
    fn from_u8(value: u8) -> Result<Self> {
        match value & 0x1F {
            0 => Ok(Self::NoQuantization),
            1 => Ok(Self::ScalarDerived),
            2 => Ok(Self::ScalarExpounded),
            _ => Err(FormatError::InvalidQuantizationStyle(value).into()),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct StepSize {
    pub(crate) epsilon: u8,
    pub(crate) mu: u16,
}

/// Quantization properties, from the QCD and QCC markers (A.6.4 and A.6.5).
#[derive(Clone, Debug)]
pub(crate) struct Quantization {
    pub(crate) style: QuantizationStyle,
    pub(crate) guard_bits: u8,
    pub(crate) step_sizes: Vec<StepSize>,
}

impl Quantization {
    /// Whether each sub-band has its own step size.
    pub(crate) fn is_expounded(&self) -> bool {
        self.style != QuantizationStyle::ScalarDerived
    }
}

/// The tile-part header, from the SOT marker (A.4.2).
#[derive(Debug, Clone, Copy)]
pub(crate) struct TilePartHeader {
    pub(crate) tile_index: u16,
    /// The length of the tile-part in bytes, measured from the start of the
    /// SOT marker. Zero if the tile-part extends to the end of the codestream.
    pub(crate) length: u32,
    pub(crate) part_index: u8,
    pub(crate) num_parts: u8,
}

/// SIZ marker (A.5.1).
pub(crate) fn siz_marker(reader: &mut Reader<'_>) -> Result<SizeData> {
    let eof = || DecodingError::UnexpectedEof;

    // Capabilities (Rsiz), irrelevant for decoding.
    let _ = reader.read_u16().ok_or_else(eof)?;

    let reference_grid_width = reader.read_u32().ok_or_else(eof)?;
    let reference_grid_height = reader.read_u32().ok_or_else(eof)?;
    let image_area_x_offset = reader.read_u32().ok_or_else(eof)?;
    let image_area_y_offset = reader.read_u32().ok_or_else(eof)?;
    let tile_width = reader.read_u32().ok_or_else(eof)?;
    let tile_height = reader.read_u32().ok_or_else(eof)?;
    let tile_x_offset = reader.read_u32().ok_or_else(eof)?;
    let tile_y_offset = reader.read_u32().ok_or_else(eof)?;
    let num_components = reader.read_u16().ok_or_else(eof)?;

    let valid = tile_width != 0
        && tile_height != 0
        && num_components != 0
        && image_area_x_offset < reference_grid_width
        && image_area_y_offset < reference_grid_height
        && tile_x_offset <= image_area_x_offset
        && tile_y_offset <= image_area_y_offset;

    if !valid {
        bail!(FormatError::InvalidDimensions);
    }

    if reference_grid_width - image_area_x_offset > MAX_DIMENSIONS
        || reference_grid_height - image_area_y_offset > MAX_DIMENSIONS
    {
        lwarn!(
            "image is too large ({}x{})",
            reference_grid_width - image_area_x_offset,
            reference_grid_height - image_area_y_offset
        );

        bail!(FormatError::InvalidDimensions);
    }

    let mut components = Vec::with_capacity(num_components as usize);

    for _ in 0..num_components {
        let ssiz = reader.read_byte().ok_or_else(eof)?;
        let horizontal_resolution = reader.read_byte().ok_or_else(eof)?;
        let vertical_resolution = reader.read_byte().ok_or_else(eof)?;

        if horizontal_resolution == 0 || vertical_resolution == 0 {
            bail!(FormatError::InvalidDimensions);
        }

        let (xr, yr) = (horizontal_resolution as u32, vertical_resolution as u32);

        components.push(ComponentSizeInfo {
            precision: (ssiz & 0x7F) + 1,
            is_signed: (ssiz & 0x80) != 0,
            horizontal_resolution,
            vertical_resolution,
            rect: IntRect::from_ltrb(
                image_area_x_offset.div_ceil(xr),
                image_area_y_offset.div_ceil(yr),
                reference_grid_width.div_ceil(xr),
                reference_grid_height.div_ceil(yr),
            ),
        });
    }

    let size_data = SizeData {
        reference_grid_width,
        reference_grid_height,
        image_area_x_offset,
        image_area_y_offset,
        tile_width,
        tile_height,
        tile_x_offset,
        tile_y_offset,
        components,
    };

    let tiles_x = size_data.num_x_tiles() as u64;
    let tiles_y = size_data.num_y_tiles() as u64;

    if tiles_x * tiles_y > MAX_TILE_COUNT {
        bail!(FormatError::InvalidDimensions);
    }

    Ok(size_data)
}

/// COD marker (A.6.1).
pub(crate) fn cod_marker(reader: &mut Reader<'_>) -> Result<CodingStyle> {
    let eof = || DecodingError::UnexpectedEof;

    let flags = CodingStyleFlags::from_u8(reader.read_byte().ok_or_else(eof)?);
    let progression_order = ProgressionOrder::from_u8(reader.read_byte().ok_or_else(eof)?)?;
    let num_layers = reader.read_u16().ok_or_else(eof)?;
    let mct = reader.read_byte().ok_or_else(eof)? != 0;
    let num_decomposition_levels = reader.read_byte().ok_or_else(eof)?;
    let code_block_width = (reader.read_byte().ok_or_else(eof)? & 0xF) + 2;
    let code_block_height = (reader.read_byte().ok_or_else(eof)? & 0xF) + 2;
    let code_block_style = CodeBlockStyle::from_u8(reader.read_byte().ok_or_else(eof)?);
    let transformation = WaveletTransform::from_u8(reader.read_byte().ok_or_else(eof)?);

    let mut precinct_exponents = vec![];

    if flags.has_precincts() {
        while let Some(b) = reader.read_byte() {
            precinct_exponents.push((b & 0xF, b >> 4));
        }
    }

    if !code_block_style.is_supported() {
        bail!(UnsupportedError::CodeBlockStyle(code_block_style));
    }

    if num_decomposition_levels > MAX_DECOMPOSITION_LEVELS {
        bail!(FormatError::InvalidCodingStyle);
    }

    Ok(CodingStyle {
        flags,
        progression_order,
        num_layers,
        mct,
        num_decomposition_levels,
        code_block_width,
        code_block_height,
        code_block_style,
        transformation,
        precinct_exponents,
    })
}

/// QCD marker (A.6.4).
pub(crate) fn qcd_marker(reader: &mut Reader<'_>) -> Result<Quantization> {
    quantization_parameters(reader)
}

/// QCC marker (A.6.5). Returns the component index the parameters apply to.
pub(crate) fn qcc_marker(reader: &mut Reader<'_>, csiz: u16) -> Result<(u16, Quantization)> {
    let component = if csiz < 257 {
        reader.read_byte().map(u16::from)
    } else {
        reader.read_u16()
    }
    .ok_or(DecodingError::UnexpectedEof)?;

    Ok((component, quantization_parameters(reader)?))
}

fn quantization_parameters(reader: &mut Reader<'_>) -> Result<Quantization> {
    let sqcd = reader.read_byte().ok_or(DecodingError::UnexpectedEof)?;
    let style = QuantizationStyle::from_u8(sqcd)?;
    let guard_bits = sqcd >> 5;

    let mut step_sizes = vec![];

    if style == QuantizationStyle::NoQuantization {
        while let Some(b) = reader.read_byte() {
            step_sizes.push(StepSize {
                epsilon: b >> 3,
                mu: 0,
            });
        }
    } else {
        while let Some(value) = reader.read_u16() {
            step_sizes.push(StepSize {
                epsilon: (value >> 11) as u8,
                mu: value & 0x7FF,
            });
        }
    }

    Ok(Quantization {
        style,
        guard_bits,
        step_sizes,
    })
}

/// SOT marker (A.4.2).
pub(crate) fn sot_marker(reader: &mut Reader<'_>) -> Option<TilePartHeader> {
    let tile_index = reader.read_u16()?;
    let length = reader.read_u32()?;
    let part_index = reader.read_byte()?;
    let num_parts = reader.read_byte()?;

    Some(TilePartHeader {
        tile_index,
        length,
        part_index,
        num_parts,
    })
}

/// The fields of the SIZ marker needed to describe an image, without
/// parsing the rest of the codestream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SizeProperties {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) num_components: u16,
}

/// Scan for the first SIZ marker in the data, which may be a JP2 file or a
/// raw codestream.
pub(crate) fn scan_size_properties(data: &[u8]) -> Result<SizeProperties> {
    let start = data
        .windows(2)
        .position(|w| w == [0xFF, 0x51])
        .ok_or(FormatError::MissingSizeMarker)?;

    let mut reader = Reader::new(data);
    // Marker, Lsiz and Rsiz.
    reader.jump(start + 6);

    let eof = || DecodingError::UnexpectedEof;
    let xsiz = reader.read_u32().ok_or_else(eof)?;
    let ysiz = reader.read_u32().ok_or_else(eof)?;
    let x_offset = reader.read_u32().ok_or_else(eof)?;
    let y_offset = reader.read_u32().ok_or_else(eof)?;
    reader.skip_bytes(16).ok_or_else(eof)?;
    let num_components = reader.read_u16().ok_or_else(eof)?;

    if x_offset >= xsiz || y_offset >= ysiz {
        bail!(FormatError::InvalidDimensions);
    }

    Ok(SizeProperties {
        width: xsiz - x_offset,
        height: ysiz - y_offset,
        num_components,
    })
}

pub(crate) mod markers {
    /// Start of codestream - 'SOC'.
    pub(crate) const SOC: u16 = 0xFF4F;
    /// Start of tile-part - 'SOT'.
    pub(crate) const SOT: u16 = 0xFF90;
    /// Start of data - 'SOD'.
    pub(crate) const SOD: u16 = 0xFF93;
    /// End of codestream - 'EOC'.
    pub(crate) const EOC: u16 = 0xFFD9;

    /// Image and tile size - 'SIZ'.
    pub(crate) const SIZ: u16 = 0xFF51;

    /// Coding style default - 'COD'.
    pub(crate) const COD: u16 = 0xFF52;
    /// Coding style component - 'COC'.
    pub(crate) const COC: u16 = 0xFF53;
    /// Quantization default - 'QCD'.
    pub(crate) const QCD: u16 = 0xFF5C;
    /// Quantization component - 'QCC'.
    pub(crate) const QCC: u16 = 0xFF5D;

    /// Tile-part lengths - 'TLM'.
    pub(crate) const TLM: u16 = 0xFF55;
    /// Packet length, main header - 'PLM'.
    pub(crate) const PLM: u16 = 0xFF57;
    /// Packet length, tile-part header - 'PLT'.
    pub(crate) const PLT: u16 = 0xFF58;

    /// Start of packet - 'SOP'.
    pub(crate) const SOP: u16 = 0xFF91;
    /// End of packet header - 'EPH'.
    pub(crate) const EPH: u16 = 0xFF92;

    /// Comment - 'COM'.
    pub(crate) const COM: u16 = 0xFF64;

    pub(crate) fn to_string(marker: u16) -> &'static str {
        match marker {
            SOC => "SOC",
            SOT => "SOT",
            SOD => "SOD",
            EOC => "EOC",
            SIZ => "SIZ",
            COD => "COD",
            COC => "COC",
            QCD => "QCD",
            QCC => "QCC",
            TLM => "TLM",
            PLM => "PLM",
            PLT => "PLT",
            SOP => "SOP",
            EPH => "EPH",
            COM => "COM",
            _ => "UNKNOWN",
        }
    }
}
