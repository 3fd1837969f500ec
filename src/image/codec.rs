use super::mime::detect_content_type;
use crate::{Error, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};

/// How the original bytes relate to the JPEG output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Normalization {
    pub content_type: &'static str,
    pub format: ImageFormat,
    /// The original is not a JPEG; the output name gets a `.jpeg` extension.
    pub converted: bool,
}

/// Detects the content type and decides whether a format conversion is needed.
pub fn normalize(bytes: &[u8]) -> Result<Normalization> {
    let content_type = detect_content_type(bytes);
    let (format, converted) = match content_type {
        "image/jpeg" => (ImageFormat::Jpeg, false),
        "image/png" => (ImageFormat::Png, true),
        "image/gif" => (ImageFormat::Gif, true),
        "image/webp" => (ImageFormat::WebP, true),
        "image/bmp" => (ImageFormat::Bmp, true),
        other => return Err(Error::UnsupportedFormat(other.to_string())),
    };

    Ok(Normalization {
        content_type,
        format,
        converted,
    })
}

pub fn decode(bytes: &[u8], normalization: &Normalization) -> Result<DynamicImage> {
    image::load_from_memory_with_format(bytes, normalization.format).map_err(|e| {
        Error::ImageDecode(format!("{} ({})", e, normalization.content_type))
    })
}

/// Encodes as 8-bit RGB JPEG. Alpha is dropped since JPEG cannot carry it.
pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    rgb.write_with_encoder(encoder)
        .map_err(|e| Error::Encode(e.to_string()))?;
    Ok(bytes)
}
