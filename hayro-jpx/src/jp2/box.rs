//! Reading JP2 box headers, as specified in I.4.

use crate::error::{FormatError, Result, bail};
use crate::reader::Reader;
use core::ops::Range;

/// JP2 signature box - 'jP\040\040'.
pub(crate) const JP2_SIGNATURE: u32 = 0x6A502020;
/// Alternative signature box - 'jP\032\032'.
pub(crate) const JP2_SIGNATURE_ALT: u32 = 0x6A501A1A;
/// File Type box - 'ftyp'.
pub(crate) const FILE_TYPE: u32 = 0x66747970;
/// Reader Requirements box - 'rreq'.
pub(crate) const READER_REQUIREMENTS: u32 = 0x72726571;
/// JP2 Header box - 'jp2h'.
pub(crate) const JP2_HEADER: u32 = 0x6A703268;
/// Image Header box - 'ihdr'.
pub(crate) const IMAGE_HEADER: u32 = 0x69686472;
/// Colour Specification box - 'colr'.
pub(crate) const COLOUR_SPECIFICATION: u32 = 0x636F6C72;
/// Resolution box - 'res\x20'.
pub(crate) const RESOLUTION: u32 = 0x72657320;
/// Contiguous Codestream box - 'jp2c'.
pub(crate) const CONTIGUOUS_CODESTREAM: u32 = 0x6A703263;

/// The payload of the signature box.
pub(crate) const SIGNATURE_MAGIC: u32 = 0x0D0A870A;

#[derive(Debug, Clone)]
pub(crate) struct BoxHeader {
    pub(crate) box_type: u32,
    /// The byte range of the box contents in the file.
    pub(crate) payload: Range<usize>,
}

/// Converts a box tag to its string representation.
///
/// Box tags are stored as 4-byte ASCII codes in big-endian format.
pub(crate) fn tag_to_string(tag: u32) -> String {
    String::from_utf8_lossy(&tag.to_be_bytes()).into_owned()
}

/// Read the header of the box at the current reader position.
///
/// Returns `None` if not enough bytes for a box header are left. The reader is
/// left at the start of the payload, so that super boxes can be descended
/// into by simply continuing to read boxes.
pub(crate) fn read_header(reader: &mut Reader<'_>) -> Result<Option<BoxHeader>> {
    let start = reader.offset();

    let (Some(l_box), Some(t_box)) = (reader.read_u32(), reader.read_u32()) else {
        return Ok(None);
    };

    let (length, header_size) = match l_box {
        // The box extends to the end of the file.
        0 => ((reader.len() - start) as u64, 8),
        // The actual length is stored in the XLBox field.
        1 => {
            let Some(xl_box) = reader.read_u64() else {
                return Ok(None);
            };

            (xl_box, 16)
        }
        _ => (l_box as u64, 8),
    };

    if length < header_size {
        bail!(FormatError::InvalidBoxLength);
    }

    let payload_start = start + header_size as usize;
    let end = usize::try_from(length)
        .ok()
        .and_then(|l| start.checked_add(l))
        .unwrap_or(usize::MAX);

    if end > reader.len() {
        lwarn!(
            "box {} exceeds the file by {} bytes",
            tag_to_string(t_box),
            end - reader.len()
        );
    }

    Ok(Some(BoxHeader {
        box_type: t_box,
        payload: payload_start..end.min(reader.len()),
    }))
}
