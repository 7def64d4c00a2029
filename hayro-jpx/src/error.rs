//! Error types for JPX decoding.

use crate::codestream::CodeBlockStyle;
use core::fmt;

/// The main error type for JPX decoding operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The file or codestream structure is malformed. Always fatal.
    Format(FormatError),
    /// The codestream uses a feature that isn't implemented. Always fatal.
    Unsupported(UnsupportedError),
    /// The codestream data is corrupted. Decoding may recover from these
    /// unless [`DecodeSettings::fail_on_corrupted_image`] is set.
    ///
    /// [`DecodeSettings::fail_on_corrupted_image`]: crate::DecodeSettings::fail_on_corrupted_image
    Decoding(DecodingError),
}

impl DecodeError {
    /// Whether decoding can continue with the tiles read so far after this
    /// error occurred while walking the codestream markers.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Decoding(_))
    }
}

/// Errors related to the structure of JP2 boxes and codestream segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
    /// A box declared a length smaller than its header.
    InvalidBoxLength,
    /// The file doesn't contain a contiguous codestream box.
    MissingCodestream,
    /// The codestream doesn't contain a SIZ marker.
    MissingSizeMarker,
    /// The SQcd/SQcc value selects an unknown quantization style.
    InvalidQuantizationStyle(u8),
    /// The segmentation symbol at the end of a cleanup pass was wrong.
    InvalidSegmentationSymbol,
    /// The image, tile or component dimensions are invalid.
    InvalidDimensions,
    /// The coding style parameters are invalid.
    InvalidCodingStyle,
}

/// Errors caused by codestream features that are not implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsupportedError {
    /// The COD marker enables code-block styles that can't be decoded.
    CodeBlockStyle(CodeBlockStyle),
    /// The codestream contains a COC marker.
    CocMarker,
    /// The progression order is unknown.
    ProgressionOrder(u8),
}

/// Errors caused by corrupted codestream data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodingError {
    /// An unknown marker was encountered.
    UnknownMarker(u16),
    /// Unexpected end of data.
    UnexpectedEof,
    /// A tile-part header referred to a tile that doesn't exist.
    InvalidTileIndex(u16),
    /// No coding style was defined for a tile.
    MissingCodingStyle,
    /// No quantization parameters were defined for a tile.
    MissingQuantization,
    /// Tile data was found before the first part of the tile.
    UninitializedTile(u16),
    /// The tile data contains more packets than the progression yields.
    OutOfPackets,
    /// A packet header is malformed.
    InvalidPacketHeader,
    /// A tag tree was traversed past its root.
    InvalidTagTree,
    /// A code-block has more bit-planes than coefficients can hold.
    TooManyBitPlanes,
    /// The quantization parameters don't cover all sub-bands.
    MissingStepSize,
    /// A component transform was requested for incompatible components.
    InvalidComponentTransform,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Format(e) => write!(f, "{e}"),
            Self::Unsupported(e) => write!(f, "{e}"),
            Self::Decoding(e) => write!(f, "{e}"),
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBoxLength => write!(f, "invalid box field size"),
            Self::MissingCodestream => write!(f, "missing codestream data"),
            Self::MissingSizeMarker => write!(f, "No size marker found in JPX stream"),
            Self::InvalidQuantizationStyle(v) => write!(f, "invalid SQcd value {v}"),
            Self::InvalidSegmentationSymbol => write!(f, "invalid segmentation symbol"),
            Self::InvalidDimensions => write!(f, "invalid image dimensions"),
            Self::InvalidCodingStyle => write!(f, "invalid coding style parameters"),
        }
    }
}

impl fmt::Display for UnsupportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CodeBlockStyle(style) => {
                write!(f, "unsupported COD options (")?;

                for (i, name) in style.unsupported_option_names().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }

                    write!(f, "{name}")?;
                }

                write!(f, ")")
            }
            Self::CocMarker => write!(f, "codestream code 0xFF53 (COC) is not implemented"),
            Self::ProgressionOrder(v) => write!(f, "unsupported progression order {v}"),
        }
    }
}

impl fmt::Display for DecodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMarker(code) => write!(f, "unknown codestream code: 0x{code:04X}"),
            Self::UnexpectedEof => write!(f, "unexpected end of data"),
            Self::InvalidTileIndex(idx) => write!(f, "invalid tile index {idx}"),
            Self::MissingCodingStyle => write!(f, "missing coding style (COD) parameters"),
            Self::MissingQuantization => write!(f, "missing quantization (QCD) parameters"),
            Self::UninitializedTile(idx) => {
                write!(f, "tile {idx} has data before its first tile-part")
            }
            Self::OutOfPackets => write!(f, "out of packets"),
            Self::InvalidPacketHeader => write!(f, "invalid packet header"),
            Self::InvalidTagTree => write!(f, "invalid tag tree"),
            Self::TooManyBitPlanes => write!(f, "number of bit-planes is too large"),
            Self::MissingStepSize => write!(f, "missing quantization step size"),
            Self::InvalidComponentTransform => {
                write!(f, "multi-component transform requires 3 matching components")
            }
        }
    }
}

impl std::error::Error for DecodeError {}
impl std::error::Error for FormatError {}
impl std::error::Error for UnsupportedError {}
impl std::error::Error for DecodingError {}

impl From<FormatError> for DecodeError {
    fn from(e: FormatError) -> Self {
        Self::Format(e)
    }
}

impl From<UnsupportedError> for DecodeError {
    fn from(e: UnsupportedError) -> Self {
        Self::Unsupported(e)
    }
}

impl From<DecodingError> for DecodeError {
    fn from(e: DecodingError) -> Self {
        Self::Decoding(e)
    }
}

/// Result type for JPX decoding operations.
pub type Result<T> = core::result::Result<T, DecodeError>;

macro_rules! bail {
    ($err:expr) => {
        return Err($err.into())
    };
}

pub(crate) use bail;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_options_are_listed() {
        let style = CodeBlockStyle::from_u8(0b0000_0101);
        let msg = DecodeError::from(UnsupportedError::CodeBlockStyle(style)).to_string();

        assert_eq!(
            msg,
            "unsupported COD options (selectiveArithmeticCodingBypass, terminationOnEachCodingPass)"
        );
    }

    #[test]
    fn only_decoding_errors_recover() {
        assert!(DecodeError::from(DecodingError::OutOfPackets).is_recoverable());
        assert!(!DecodeError::from(FormatError::MissingSizeMarker).is_recoverable());
        assert!(!DecodeError::from(UnsupportedError::CocMarker).is_recoverable());
    }
}
