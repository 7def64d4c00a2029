//! Walking the boxes of a JP2 file, defined in Annex I.

use crate::error::{FormatError, Result, bail};
use crate::jp2::r#box::{
    COLOUR_SPECIFICATION, CONTIGUOUS_CODESTREAM, FILE_TYPE, IMAGE_HEADER, JP2_HEADER,
    JP2_SIGNATURE, JP2_SIGNATURE_ALT, READER_REQUIREMENTS, RESOLUTION, SIGNATURE_MAGIC,
    tag_to_string,
};
use crate::jp2::colr::ColorSpace;
use crate::reader::Reader;

pub(crate) mod r#box;
pub(crate) mod colr;

/// The parts of a JP2 file that are relevant for decoding.
#[derive(Debug, Clone)]
pub(crate) struct Jp2File<'a> {
    pub(crate) codestream: &'a [u8],
    pub(crate) color_space: Option<ColorSpace>,
}

pub(crate) fn parse(data: &[u8]) -> Result<Jp2File<'_>> {
    let mut reader = Reader::new(data);
    let mut codestream = None;
    let mut color_space = None;

    while !reader.at_end() {
        let Some(header) = r#box::read_header(&mut reader)? else {
            lwarn!("ignoring {} trailing bytes", data.len() - reader.offset());

            break;
        };

        let payload = &data[header.payload.clone()];
        let mut skip_payload = true;

        ltrace!(
            "box {} at offset {} with length {}",
            tag_to_string(header.box_type),
            header.payload.start,
            payload.len()
        );

        match header.box_type {
            // A super box, its children are read as part of the normal loop.
            JP2_HEADER => skip_payload = false,
            COLOUR_SPECIFICATION => {
                // Only the first colour specification box is relevant.
                if color_space.is_none() {
                    color_space = Some(colr::parse(payload));
                }
            }
            CONTIGUOUS_CODESTREAM => {
                if codestream.is_none() {
                    codestream = Some(payload);
                } else {
                    lwarn!("ignoring additional codestream box");
                }
            }
            JP2_SIGNATURE => {
                let magic = Reader::new(payload).read_u32();

                if magic != Some(SIGNATURE_MAGIC) {
                    lwarn!("Invalid JP2 signature");
                }
            }
            JP2_SIGNATURE_ALT | FILE_TYPE | READER_REQUIREMENTS | RESOLUTION | IMAGE_HEADER => {}
            other => {
                lwarn!(
                    "Unsupported header type {} ({})",
                    other,
                    tag_to_string(other)
                );
            }
        }

        if skip_payload {
            reader.jump(header.payload.end);
        }
    }

    let Some(codestream) = codestream else {
        bail!(FormatError::MissingCodestream);
    };

    Ok(Jp2File {
        codestream,
        color_space,
    })
}
