//! The colour specification box (colr), defined in I.5.3.3.

use crate::reader::Reader;

/// The colour space declared by a JP2 file.
///
/// The decoder only reports the colour space, it never converts between
/// colour spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorSpace {
    /// An enumerated colour space.
    Enumerated(EnumeratedColorSpace),
    /// A restricted ICC profile, stored as-is.
    Icc(Vec<u8>),
    /// A colour space that couldn't be interpreted.
    Unknown,
}

/// The enumerated colour spaces of ISO/IEC 15444-2, Table M.25.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum EnumeratedColorSpace {
    BiLevel1,
    YCbCr1,
    YCbCr2,
    YCbCr3,
    PhotoYcc,
    Cmy,
    Cmyk,
    Ycck,
    CieLab,
    BiLevel2,
    Srgb,
    Greyscale,
    Sycc,
    CieJab,
    EsRgb,
    RommRgb,
    YPbPr112560,
    YPbPr125050,
    EsYcc,
    ScRgb,
    ScRgbGray,
}

impl EnumeratedColorSpace {
    fn from_raw(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::BiLevel1),
            1 => Some(Self::YCbCr1),
            3 => Some(Self::YCbCr2),
            4 => Some(Self::YCbCr3),
            9 => Some(Self::PhotoYcc),
            11 => Some(Self::Cmy),
            12 => Some(Self::Cmyk),
            13 => Some(Self::Ycck),
            14 => Some(Self::CieLab),
            15 => Some(Self::BiLevel2),
            16 => Some(Self::Srgb),
            17 => Some(Self::Greyscale),
            18 => Some(Self::Sycc),
            19 => Some(Self::CieJab),
            20 => Some(Self::EsRgb),
            21 => Some(Self::RommRgb),
            22 => Some(Self::YPbPr112560),
            23 => Some(Self::YPbPr125050),
            24 => Some(Self::EsYcc),
            25 => Some(Self::ScRgb),
            26 => Some(Self::ScRgbGray),
            _ => None,
        }
    }
}

pub(crate) fn parse(data: &[u8]) -> ColorSpace {
    let mut reader = Reader::new(data);

    let Some(method) = reader.read_byte() else {
        lwarn!("truncated colour specification box");

        return ColorSpace::Unknown;
    };

    // Precedence and approximation, irrelevant for decoding.
    let _ = reader.skip_bytes(2);

    match method {
        1 => {
            let Some(raw) = reader.read_u32() else {
                lwarn!("truncated colour specification box");

                return ColorSpace::Unknown;
            };

            if !matches!(raw, 16..=18) {
                lwarn!("Unknown colorspace {}", raw);
            }

            EnumeratedColorSpace::from_raw(raw)
                .map(ColorSpace::Enumerated)
                .unwrap_or(ColorSpace::Unknown)
        }
        2 => {
            linfo!("ICC profile not supported");

            ColorSpace::Icc(reader.tail().unwrap_or_default().to_vec())
        }
        _ => ColorSpace::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enumerated() {
        assert_eq!(
            parse(&[1, 0, 0, 0, 0, 0, 16]),
            ColorSpace::Enumerated(EnumeratedColorSpace::Srgb)
        );
        assert_eq!(
            parse(&[1, 0, 0, 0, 0, 0, 12]),
            ColorSpace::Enumerated(EnumeratedColorSpace::Cmyk)
        );
        assert_eq!(parse(&[1, 0, 0, 0, 0, 0, 2]), ColorSpace::Unknown);
    }

    #[test]
    fn icc_profile_is_kept() {
        assert_eq!(parse(&[2, 0, 0, 7, 8]), ColorSpace::Icc(vec![7, 8]));
    }

    #[test]
    fn truncated() {
        assert_eq!(parse(&[1, 0]), ColorSpace::Unknown);
        assert_eq!(parse(&[]), ColorSpace::Unknown);
    }
}
