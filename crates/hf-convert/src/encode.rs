//! Alpha policy and per-format encoders.

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::codecs::webp::WebPEncoder;
use image::{DynamicImage, Rgb, RgbImage, RgbaImage};

use crate::ConvertError;
use hf_core::TargetFormat;

/// Flatten an RGBA image onto an opaque white background.
pub fn composite_on_white(rgba: &RgbaImage) -> RgbImage {
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Normalise to 8-bit RGB(A) and apply the alpha policy for `target`.
pub(crate) fn prepare_for(image: DynamicImage, target: TargetFormat) -> DynamicImage {
    let has_alpha = image.color().has_alpha();
    match (has_alpha, target.supports_alpha()) {
        (true, false) => DynamicImage::ImageRgb8(composite_on_white(&image.to_rgba8())),
        (true, true) => DynamicImage::ImageRgba8(image.into_rgba8()),
        (false, _) => DynamicImage::ImageRgb8(image.into_rgb8()),
    }
}

pub(crate) fn encode(
    image: &DynamicImage,
    target: TargetFormat,
    quality: u8,
) -> Result<Vec<u8>, ConvertError> {
    let mut buf = Vec::new();
    let result = match target {
        TargetFormat::Jpeg => {
            image.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))
        }
        TargetFormat::Png => image.write_with_encoder(PngEncoder::new_with_quality(
            &mut buf,
            CompressionType::Best,
            PngFilter::Adaptive,
        )),
        TargetFormat::Bmp => image.write_with_encoder(BmpEncoder::new(&mut buf)),
        TargetFormat::Webp => image.write_with_encoder(WebPEncoder::new_lossless(&mut buf)),
    };

    result.map_err(|e| ConvertError::Encode {
        format: target,
        message: e.to_string(),
    })?;
    Ok(buf)
}
