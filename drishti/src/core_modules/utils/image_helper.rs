use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{ImageEncoder, RgbImage};

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, image::error::ImageError> {
    let mut buffer = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));

    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ExtendedColorType::Rgb8,
    )?;

    Ok(buffer)
}

/// Encodes a frame as the base64 JPEG data URI the detection endpoint expects.
pub fn jpeg_data_uri(image: &RgbImage, quality: u8) -> Result<String, image::error::ImageError> {
    let jpeg = encode_jpeg(image, quality)?;
    Ok(format!("{JPEG_DATA_URI_PREFIX}{}", STANDARD.encode(jpeg)))
}
