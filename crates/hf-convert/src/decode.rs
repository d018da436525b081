//! Input sniffing and decoding.

use image::{DynamicImage, ImageFormat};

use crate::ConvertError;
use hf_core::SourceFormat;

/// Major/compatible brands that identify a HEIF still image container.
const HEIF_BRANDS: &[&[u8; 4]] = &[
    b"heic", b"heix", b"hevc", b"hevx", b"heim", b"heis", b"hevm", b"hevs", b"mif1", b"msf1",
];

/// AVIF shares the HEIF container but is decoded by `image` when at all.
const AVIF_BRANDS: &[&[u8; 4]] = &[b"avif", b"avis"];

/// What the input bytes turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedSource {
    Heif,
    Raster(ImageFormat),
}

/// Whether `data` starts with an ISO-BMFF `ftyp` box naming a HEIF brand.
pub fn is_heif(data: &[u8]) -> bool {
    if data.len() < 12 || &data[4..8] != b"ftyp" {
        return false;
    }

    let major = &data[8..12];
    if AVIF_BRANDS.iter().any(|b| b.as_slice() == major) {
        return false;
    }
    if HEIF_BRANDS.iter().any(|b| b.as_slice() == major) {
        return true;
    }

    // Compatible brands follow the 4-byte minor version.
    let box_len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    let end = box_len.min(data.len());
    if end <= 16 {
        return false;
    }
    data[16..end]
        .chunks_exact(4)
        .any(|brand| HEIF_BRANDS.iter().any(|b| b.as_slice() == brand))
}

/// Identify the container, preferring the bytes over the filename hint.
pub fn detect_source(
    data: &[u8],
    hint: Option<SourceFormat>,
) -> Result<DetectedSource, ConvertError> {
    if is_heif(data) {
        return Ok(DetectedSource::Heif);
    }
    if let Ok(format) = image::guess_format(data) {
        return Ok(DetectedSource::Raster(format));
    }
    if hint.is_some() {
        // Let the HEIF decoder produce the diagnostic.
        return Ok(DetectedSource::Heif);
    }
    Err(ConvertError::Decode("unrecognised image data".into()))
}

pub(crate) fn decode(data: &[u8], source: DetectedSource) -> Result<DynamicImage, ConvertError> {
    match source {
        DetectedSource::Heif => decode_heif(data),
        DetectedSource::Raster(format) => image::load_from_memory_with_format(data, format)
            .map_err(|e| ConvertError::Decode(e.to_string())),
    }
}

#[cfg(feature = "heif")]
fn decode_heif(data: &[u8]) -> Result<DynamicImage, ConvertError> {
    use image::{RgbImage, RgbaImage};
    use libheif_rs::{ColorSpace, HeifContext, LibHeif, RgbChroma};

    let decode_err = |e: libheif_rs::HeifError| ConvertError::Decode(e.to_string());

    let lib = LibHeif::new();
    let ctx = HeifContext::read_from_bytes(data).map_err(decode_err)?;
    let handle = ctx.primary_image_handle().map_err(decode_err)?;
    let has_alpha = handle.has_alpha_channel();
    let chroma = if has_alpha {
        RgbChroma::Rgba
    } else {
        RgbChroma::Rgb
    };

    let decoded = lib
        .decode(&handle, ColorSpace::Rgb(chroma), None)
        .map_err(decode_err)?;
    let planes = decoded.planes();
    let plane = planes
        .interleaved
        .ok_or_else(|| ConvertError::Decode("HEIF image has no interleaved plane".into()))?;

    let (width, height) = (plane.width, plane.height);
    let channels = if has_alpha { 4 } else { 3 };
    let row_len = width as usize * channels;

    // Rows are padded to `stride`; copy out the tight pixel data.
    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in plane.data.chunks(plane.stride).take(height as usize) {
        let row = row
            .get(..row_len)
            .ok_or_else(|| ConvertError::Decode("HEIF plane row is truncated".into()))?;
        pixels.extend_from_slice(row);
    }

    let image = if has_alpha {
        RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8)
    } else {
        RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8)
    };
    image.ok_or_else(|| ConvertError::Decode("HEIF plane size mismatch".into()))
}

#[cfg(not(feature = "heif"))]
fn decode_heif(_data: &[u8]) -> Result<DynamicImage, ConvertError> {
    Err(ConvertError::Decode(
        "HEIF decoding support is not enabled".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::opaque_png;

    fn ftyp(major: &[u8; 4], compatible: &[&[u8; 4]]) -> Vec<u8> {
        let len = 16 + compatible.len() * 4;
        let mut data = Vec::with_capacity(len + 8);
        data.extend_from_slice(&(len as u32).to_be_bytes());
        data.extend_from_slice(b"ftyp");
        data.extend_from_slice(major);
        data.extend_from_slice(&[0, 0, 0, 0]);
        for brand in compatible {
            data.extend_from_slice(*brand);
        }
        data.extend_from_slice(b"\0\0\0\x08meta");
        data
    }

    #[test]
    fn sniffs_heic_major_brand() {
        assert!(is_heif(&ftyp(b"heic", &[b"mif1"])));
        assert!(is_heif(&ftyp(b"heix", &[])));
    }

    #[test]
    fn sniffs_heif_compatible_brand() {
        assert!(is_heif(&ftyp(b"isom", &[b"iso8", b"mif1"])));
        assert!(!is_heif(&ftyp(b"isom", &[b"iso8", b"mp41"])));
    }

    #[test]
    fn avif_is_not_heif() {
        assert!(!is_heif(&ftyp(b"avif", &[b"mif1", b"miaf"])));
    }

    #[test]
    fn short_or_foreign_input_is_not_heif() {
        assert!(!is_heif(b""));
        assert!(!is_heif(b"\0\0\0\x18ftyp"));
        assert!(!is_heif(&opaque_png()));
    }

    #[test]
    fn detect_prefers_bytes_over_hint() {
        let detected = detect_source(&opaque_png(), Some(SourceFormat::Heic)).unwrap();
        assert_eq!(detected, DetectedSource::Raster(ImageFormat::Png));

        let detected = detect_source(&ftyp(b"heic", &[]), None).unwrap();
        assert_eq!(detected, DetectedSource::Heif);
    }

    #[test]
    fn detect_unknown_bytes() {
        assert_eq!(
            detect_source(b"garbage", Some(SourceFormat::Heif)).unwrap(),
            DetectedSource::Heif
        );
        assert!(matches!(
            detect_source(b"garbage", None),
            Err(ConvertError::Decode(_))
        ));
    }

    /// Encode a solid-colour image to HEIC with libheif's own encoder.
    /// Returns `None` when libheif was built without an HEVC encoder.
    #[cfg(feature = "heif")]
    fn encode_heic(width: u32, height: u32, rgb: [u8; 3]) -> Option<Vec<u8>> {
        use libheif_rs::{
            Channel, ColorSpace, CompressionFormat, EncoderQuality, HeifContext, Image, LibHeif,
            RgbChroma,
        };

        let lib = LibHeif::new();
        let mut encoder = lib.encoder_for_format(CompressionFormat::Hevc).ok()?;
        encoder.set_quality(EncoderQuality::LossLess).ok()?;

        let mut image = Image::new(width, height, ColorSpace::Rgb(RgbChroma::Rgb)).unwrap();
        image
            .create_plane(Channel::Interleaved, width, height, 8)
            .unwrap();
        {
            let planes = image.planes_mut();
            let plane = planes.interleaved.unwrap();
            let stride = plane.stride;
            for y in 0..height as usize {
                for x in 0..width as usize {
                    let at = y * stride + x * 3;
                    plane.data[at..at + 3].copy_from_slice(&rgb);
                }
            }
        }

        let mut ctx = HeifContext::new().unwrap();
        ctx.encode_image(&image, &mut encoder, None).unwrap();
        Some(ctx.write_to_bytes().unwrap())
    }

    #[cfg(feature = "heif")]
    #[test]
    fn decodes_generated_heic() {
        let Some(heic) = encode_heic(64, 48, [200, 40, 40]) else {
            eprintln!("libheif has no HEVC encoder; skipping");
            return;
        };
        assert!(is_heif(&heic));
        assert_eq!(detect_source(&heic, None).unwrap(), DetectedSource::Heif);

        let image = decode(&heic, DetectedSource::Heif).unwrap();
        assert_eq!((image.width(), image.height()), (64, 48));
        let pixel = image.to_rgb8().get_pixel(10, 10).0;
        for (got, want) in pixel.iter().zip([200u8, 40, 40]) {
            assert!(got.abs_diff(want) <= 12, "pixel {pixel:?}");
        }

        use crate::{Converter, ImageConverter};
        let png = ImageConverter::new()
            .convert(&heic, Some(SourceFormat::Heic), hf_core::TargetFormat::Png, 90)
            .unwrap();
        assert_eq!(image::guess_format(&png).unwrap(), ImageFormat::Png);
    }

    #[test]
    fn truncated_heif_fails_to_decode() {
        let err = decode(&ftyp(b"heic", &[b"mif1"]), DetectedSource::Heif).unwrap_err();
        assert!(matches!(err, ConvertError::Decode(_)));
    }
}
