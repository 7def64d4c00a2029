//! Integration with the [image] crate

use crate::{DecodeError, DecodedImage};
use ::image::error::{DecodingError, ImageFormatHint};
use ::image::{ColorType, ImageDecoder, ImageError, ImageResult};

impl ImageDecoder for DecodedImage {
    fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    fn color_type(&self) -> ColorType {
        match self.num_components() {
            1 => ColorType::L8,
            2 => ColorType::La8,
            3 => ColorType::Rgb8,
            // Additional components beyond the fourth are dropped.
            _ => ColorType::Rgba8,
        }
    }

    fn read_image(self, buf: &mut [u8]) -> ImageResult<()>
    where
        Self: Sized,
    {
        convert_inner(&self, buf)
    }

    fn read_image_boxed(self: Box<Self>, buf: &mut [u8]) -> ImageResult<()> {
        convert_inner(&self, buf)
    }
}

impl From<DecodeError> for ImageError {
    fn from(e: DecodeError) -> Self {
        decoding_error(e.to_string())
    }
}

fn decoding_error(message: String) -> ImageError {
    ImageError::Decoding(DecodingError::new(
        ImageFormatHint::Name("JPEG2000".to_string()),
        message,
    ))
}

fn convert_inner(image: &DecodedImage, buf: &mut [u8]) -> ImageResult<()> {
    let pixels = image.to_interleaved();
    let num_components = image.num_components() as usize;
    let out_channels = image.color_type().channel_count() as usize;

    if buf.len() != pixels.len() / num_components * out_channels {
        return Err(decoding_error("invalid buffer size".to_string()));
    }

    if num_components == out_channels {
        buf.copy_from_slice(&pixels);
    } else {
        for (out, pixel) in buf
            .chunks_exact_mut(out_channels)
            .zip(pixels.chunks_exact(num_components))
        {
            out.copy_from_slice(&pixel[..out_channels]);
        }
    }

    Ok(())
}
