/*!
A memory-safe, pure-Rust JPX (JPEG 2000) decoder.

`hayro-jpx` decodes JPEG 2000 images as they appear in PDF files, either as
a JP2 file or as a bare codestream (ISO/IEC 15444-1). The decoder produces
one buffer of interleaved 8-bit samples for each tile of the image.

The decoder tries to recover from corrupted data by default: if an error
occurs while reading the codestream, all tiles that were read up to that
point are still reconstructed. This can be disabled with
[`DecodeSettings::fail_on_corrupted_image`].

# Example
```rust,no_run
use hayro_jpx::{DecodeSettings, decode};

let data = std::fs::read("image.jp2").unwrap();
let image = decode(&data, &DecodeSettings::default()).unwrap();

println!(
    "{}x{} image with {} components",
    image.width(),
    image.height(),
    image.num_components()
);

let pixels = image.to_interleaved();
```

# Limitations
- Colour spaces are only reported, not converted. ICC profiles are ignored.
- The selective arithmetic coding bypass, context reset, termination on
  each coding pass, vertically causal context and predictable termination
  code-block styles are not supported.
- COC markers are not supported.

# Cargo features
- `simd` (default): vectorised component transforms via `fearless_simd`.
- `image` (default): an implementation of `image::ImageDecoder`.
- `logging`: emit diagnostics via the `log` crate.

# Safety
This crate forbids unsafe code via a crate-level attribute.
*/

#![forbid(unsafe_code)]

#[macro_use]
mod log;

mod arithmetic_decoder;
mod bitplane;
mod codestream;
mod decode;
mod error;
mod idwt;
#[cfg(feature = "image")]
mod integration;
mod jp2;
mod math;
mod mct;
mod packet;
mod progression;
mod reader;
mod rect;
mod tag_tree;
mod tile;
mod transform;

use crate::codestream::markers;

pub use codestream::CodeBlockStyle;
pub use error::{DecodeError, DecodingError, FormatError, Result, UnsupportedError};
pub use jp2::colr::{ColorSpace, EnumeratedColorSpace};

/// The bit depth of all decoded samples.
const BITS_PER_COMPONENT: u8 = 8;

/// Settings that control decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodeSettings {
    /// Fail on any error in the codestream instead of reconstructing the
    /// tiles that could be read before the error.
    ///
    /// Errors caused by the structure of the file or by unsupported features
    /// are never recovered from.
    pub fail_on_corrupted_image: bool,
}

/// A decoded tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTile {
    /// The horizontal offset of the tile, in the sample grid of the first
    /// component.
    pub left: u32,
    /// The vertical offset of the tile, in the sample grid of the first
    /// component.
    pub top: u32,
    /// The width of the tile in samples.
    pub width: u32,
    /// The height of the tile in samples.
    pub height: u32,
    /// The samples of the tile in row-major order, with the components of
    /// each pixel interleaved.
    pub pixels: Vec<u8>,
}

/// A decoded JPX image.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    width: u32,
    height: u32,
    num_components: u16,
    /// The origin of the image area in the sample grid of the first
    /// component.
    origin: (u32, u32),
    color_space: Option<ColorSpace>,
    tiles: Vec<DecodedTile>,
}

impl DecodedImage {
    /// The width of the image area.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// The height of the image area.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// The number of components of each pixel.
    pub fn num_components(&self) -> u16 {
        self.num_components
    }

    /// The bit depth of each component. Samples are always scaled to
    /// 8 bits.
    pub fn bits_per_component(&self) -> u8 {
        BITS_PER_COMPONENT
    }

    /// The colour space declared by the JP2 file, if any.
    pub fn color_space(&self) -> Option<&ColorSpace> {
        self.color_space.as_ref()
    }

    /// The decoded tiles, in raster order. Tiles without any data are
    /// omitted.
    pub fn tiles(&self) -> &[DecodedTile] {
        &self.tiles
    }

    /// Consume the image and return its tiles.
    pub fn into_tiles(self) -> Vec<DecodedTile> {
        self.tiles
    }

    /// Combine all tiles into a single buffer of `width * height` pixels with
    /// interleaved components.
    ///
    /// Areas not covered by any decoded tile are zero.
    pub fn to_interleaved(&self) -> Vec<u8> {
        let nc = self.num_components as usize;
        let width = self.width as usize;
        let height = self.height as usize;

        if let [tile] = self.tiles.as_slice()
            && tile.width as usize == width
            && tile.height as usize == height
            && (tile.left, tile.top) == self.origin
        {
            return tile.pixels.clone();
        }

        let mut out = vec![0; width * height * nc];

        for tile in &self.tiles {
            let tile_width = tile.width as usize;
            let x0 = tile.left.saturating_sub(self.origin.0) as usize;
            let y0 = tile.top.saturating_sub(self.origin.1) as usize;

            if x0 >= width || tile_width == 0 {
                continue;
            }

            let copy_width = tile_width.min(width - x0);

            for (row, src) in tile
                .pixels
                .chunks_exact(tile_width * nc)
                .enumerate()
                .take(height.saturating_sub(y0))
            {
                let start = ((y0 + row) * width + x0) * nc;
                out[start..start + copy_width * nc].copy_from_slice(&src[..copy_width * nc]);
            }
        }

        out
    }
}

/// Basic properties of a JPX image, available without decoding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageProperties {
    /// The width of the image area.
    pub width: u32,
    /// The height of the image area.
    pub height: u32,
    /// The number of components.
    pub num_components: u16,
    /// The bit depth of the decoded components.
    pub bits_per_component: u8,
}

/// Decode a JP2 file or a JPEG 2000 codestream.
pub fn decode(data: &[u8], settings: &DecodeSettings) -> Result<DecodedImage> {
    let (codestream, color_space) = if data.starts_with(&markers::SOC.to_be_bytes()) {
        (data, None)
    } else {
        let file = jp2::parse(data)?;

        (file.codestream, file.color_space)
    };

    let decoded = decode::decode(codestream, settings)?;
    let size = &decoded.size;
    let origin = size
        .components
        .first()
        .map(|c| (c.rect.x0, c.rect.y0))
        .unwrap_or_default();

    Ok(DecodedImage {
        width: size.image_width(),
        height: size.image_height(),
        num_components: size.num_components(),
        origin,
        color_space,
        tiles: decoded.tiles,
    })
}

/// Read the image dimensions and the number of components from the SIZ
/// marker, without decoding the image.
///
/// The data is scanned for the first SIZ marker, so this works for both JP2
/// files and bare codestreams.
pub fn parse_image_properties(data: &[u8]) -> Result<ImageProperties> {
    let properties = codestream::scan_size_properties(data)?;

    Ok(ImageProperties {
        width: properties.width,
        height: properties.height,
        num_components: properties.num_components,
        bits_per_component: BITS_PER_COMPONENT,
    })
}
