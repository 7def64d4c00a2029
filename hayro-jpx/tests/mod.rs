//! Test suite for hayro-jpx.
//!
//! The assets are generated by `gen_assets.py`. Each of them encodes one of
//! the sample patterns below.

use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use hayro_jpx::{
    ColorSpace, DecodeError, DecodeSettings, DecodedImage, EnumeratedColorSpace, FormatError,
    UnsupportedError, decode, parse_image_properties,
};

static ASSETS_PATH: LazyLock<PathBuf> =
    LazyLock::new(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/assets"));

const STRICT: DecodeSettings = DecodeSettings {
    fail_on_corrupted_image: true,
};

fn load(name: &str) -> Vec<u8> {
    fs::read(ASSETS_PATH.join(name)).unwrap()
}

fn decode_asset(name: &str, settings: &DecodeSettings) -> DecodedImage {
    decode(&load(name), settings).unwrap()
}

fn gray_pattern(x: u32, y: u32) -> [u8; 1] {
    [((x * 13 + y * 29 + (x * y) % 7 * 5) % 256) as u8]
}

fn rgb_pattern(x: u32, y: u32) -> [u8; 3] {
    [
        ((x * 10 + y * 3) % 256) as u8,
        ((255 + 256 * 4 - x * 7 - y * 11) % 256) as u8,
        ((x * y * 3) % 256) as u8,
    ]
}

fn smooth_pattern(x: u32, y: u32) -> [u8; 3] {
    [
        (40 + 10 * x + 3 * y) as u8,
        (200 - 6 * y - 2 * x) as u8,
        (90 + 4 * x + 4 * y) as u8,
    ]
}

fn expected<const N: usize>(width: u32, height: u32, f: impl Fn(u32, u32) -> [u8; N]) -> Vec<u8> {
    (0..height)
        .flat_map(|y| (0..width).map(move |x| (x, y)))
        .flat_map(|(x, y)| f(x, y))
        .collect()
}

fn max_difference(a: &[u8], b: &[u8]) -> u8 {
    assert_eq!(a.len(), b.len());

    a.iter().zip(b).map(|(a, b)| a.abs_diff(*b)).max().unwrap_or(0)
}

#[test]
fn ll_only_codestream() {
    let image = decode_asset("ll_only.j2k", &STRICT);

    assert_eq!((image.width(), image.height()), (2, 2));
    assert_eq!(image.num_components(), 1);
    assert_eq!(image.bits_per_component(), 8);
    assert_eq!(image.color_space(), None);

    // The LL coefficient 50 plus the level shift.
    let [tile] = image.tiles() else {
        panic!("expected a single tile");
    };
    assert_eq!((tile.left, tile.top, tile.width, tile.height), (0, 0, 2, 2));
    assert_eq!(tile.pixels, [178; 4]);
}

#[test]
fn lossless_gray() {
    let image = decode_asset("gray_53.j2k", &STRICT);

    assert_eq!((image.width(), image.height()), (17, 13));
    assert_eq!(image.to_interleaved(), expected(17, 13, gray_pattern));
}

#[test]
fn reversible_component_transform_with_tiles() {
    let image = decode_asset("rgb_rct_tiles.j2k", &STRICT);

    assert_eq!((image.width(), image.height()), (24, 10));
    assert_eq!(image.num_components(), 3);

    let tiles = image.tiles();
    assert_eq!(tiles.len(), 2);
    assert_eq!((tiles[0].left, tiles[0].width, tiles[0].height), (0, 16, 10));
    assert_eq!((tiles[1].left, tiles[1].width, tiles[1].height), (16, 8, 10));
    assert_eq!(tiles[1].pixels.len(), 8 * 10 * 3);
    assert_eq!(&tiles[1].pixels[..3], rgb_pattern(16, 0));

    assert_eq!(image.to_interleaved(), expected(24, 10, rgb_pattern));
}

#[test]
fn irreversible_component_transform() {
    let image = decode_asset("rgb_ict_97.j2k", &STRICT);
    let pixels = image.to_interleaved();
    let reference = expected(16, 16, smooth_pattern);

    let first = |data: &[u8]| data.iter().step_by(3).copied().collect::<Vec<_>>();
    assert!(max_difference(&first(&pixels), &first(&reference)) <= 1);
    assert!(max_difference(&pixels, &reference) <= 1);
}

#[test]
fn layers_tile_parts_and_packet_markers() {
    let image = decode_asset("gray_layers.j2k", &STRICT);

    assert_eq!(image.tiles().len(), 1);
    assert_eq!(image.to_interleaved(), expected(12, 9, gray_pattern));
}

#[test]
fn jp2_file() {
    let image = decode_asset("rgb_rct_tiles.jp2", &DecodeSettings::default());

    assert_eq!(
        image.color_space(),
        Some(&ColorSpace::Enumerated(EnumeratedColorSpace::Srgb))
    );
    assert_eq!(image.to_interleaved(), expected(24, 10, rgb_pattern));
}

#[test]
fn decoding_is_deterministic() {
    let data = load("rgb_ict_97.j2k");
    let first = decode(&data, &DecodeSettings::default()).unwrap();
    let second = decode(&data, &DecodeSettings::default()).unwrap();

    assert_eq!(first.tiles(), second.tiles());
}

#[test]
fn image_properties() {
    for name in ["rgb_rct_tiles.j2k", "rgb_rct_tiles.jp2"] {
        let properties = parse_image_properties(&load(name)).unwrap();

        assert_eq!((properties.width, properties.height), (24, 10));
        assert_eq!(properties.num_components, 3);
        assert_eq!(properties.bits_per_component, 8);
    }

    assert!(parse_image_properties(&[0xFF, 0x4F, 0xFF, 0xD9]).is_err());
}

#[test]
fn arithmetic_coding_bypass_is_unsupported() {
    let mut data = load("gray_53.j2k");
    let cod = data.windows(2).position(|w| w == [0xFF, 0x52]).unwrap();
    // Marker, Lcod, Scod, SGcod and the decomposition levels and code-block
    // size come before the code-block style.
    data[cod + 12] |= 0x01;

    for settings in [STRICT, DecodeSettings::default()] {
        let error = decode(&data, &settings).unwrap_err();

        assert!(matches!(
            error,
            DecodeError::Unsupported(UnsupportedError::CodeBlockStyle(_))
        ));
        assert!(!error.is_recoverable());
    }
}

#[test]
fn missing_size_marker() {
    let mut data = load("ll_only.j2k");
    let length = u16::from_be_bytes([data[4], data[5]]) as usize;
    data.drain(2..4 + length);

    for settings in [STRICT, DecodeSettings::default()] {
        let error = decode(&data, &settings).unwrap_err();

        assert_eq!(error, DecodeError::Format(FormatError::MissingSizeMarker));
        assert!(error.to_string().contains("No size marker found"));
    }
}

#[test]
fn oversized_image() {
    let mut data = load("rgb_ict_97.j2k");
    // Xsiz and XTsiz.
    data[8..12].copy_from_slice(&0xAF00_0010_u32.to_be_bytes());
    data[24..28].copy_from_slice(&0x1B00_0010_u32.to_be_bytes());

    for settings in [STRICT, DecodeSettings::default()] {
        assert_eq!(
            decode(&data, &settings).unwrap_err(),
            DecodeError::Format(FormatError::InvalidDimensions)
        );
    }
}

#[test]
fn corrupted_pass_count() {
    let mut data = load("rgb_rct_tiles.j2k");
    data[247] = 0x45;

    assert!(decode(&data, &STRICT).is_err());

    let image = decode(&data, &DecodeSettings::default()).unwrap();
    assert_eq!(image.width(), 24);
}

#[test]
fn truncated_codestream_recovers() {
    let data = load("gray_53.j2k");
    let truncated = &data[..data.len() * 3 / 4];

    let image = decode(truncated, &DecodeSettings::default()).unwrap();
    let [tile] = image.tiles() else {
        panic!("expected a single tile");
    };

    assert_eq!((tile.width, tile.height), (17, 13));
    assert_eq!(tile.pixels.len(), 17 * 13);
}

#[cfg(feature = "image")]
#[test]
fn image_decoder() {
    use image::{DynamicImage, ImageDecoder};

    let decoded = decode_asset("rgb_rct_tiles.j2k", &DecodeSettings::default());
    assert_eq!(decoded.color_type(), image::ColorType::Rgb8);

    let image = DynamicImage::from_decoder(decoded).unwrap();

    assert_eq!((image.width(), image.height()), (24, 10));
    assert_eq!(image.to_rgb8().into_raw(), expected(24, 10, rgb_pattern));
}

#[cfg(feature = "image")]
#[test]
fn image_gray() {
    use image::DynamicImage;

    let decoded = decode_asset("gray_53.j2k", &DecodeSettings::default());
    let image = DynamicImage::from_decoder(decoded).unwrap();

    assert_eq!(image.to_luma8().into_raw(), expected(17, 13, gray_pattern));
}
