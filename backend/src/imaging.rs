use std::io::Cursor;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, RgbImage};

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Image data is empty")]
    EmptyData,
    #[error("Image data is too large: {0} bytes (max: {1} bytes)")]
    TooLarge(usize, usize),
    #[error("Invalid base64 encoding: {0}")]
    InvalidBase64(#[from] base64::DecodeError),
    #[error("Unsupported image format")]
    UnsupportedFormat,
    #[error("Failed to decode image: {0}")]
    DecodeFailed(String),
    #[error("Failed to encode image: {0}")]
    EncodeFailed(String),
}

/// Decodes uploaded bytes into an RGB buffer, whatever the source colour type.
pub fn decode_image_bytes(bytes: &[u8], max_bytes: usize) -> Result<RgbImage, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::EmptyData);
    }
    if bytes.len() > max_bytes {
        return Err(ImageError::TooLarge(bytes.len(), max_bytes));
    }

    let format = detect_format(bytes)?;
    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| ImageError::DecodeFailed(e.to_string()))?;
    Ok(image.to_rgb8())
}

/// Strips an optional `data:image/...;base64,` prefix and decodes the payload.
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>, ImageError> {
    let payload = strip_data_url(payload.trim());
    if payload.is_empty() {
        return Err(ImageError::EmptyData);
    }
    Ok(STANDARD.decode(payload)?)
}

fn strip_data_url(payload: &str) -> &str {
    if payload.starts_with("data:image") {
        match payload.split_once(',') {
            Some((_, data)) => data,
            None => "",
        }
    } else {
        payload
    }
}

pub fn detect_format(bytes: &[u8]) -> Result<ImageFormat, ImageError> {
    if bytes.len() < 4 {
        return Err(ImageError::UnsupportedFormat);
    }

    match bytes {
        [0x89, 0x50, 0x4E, 0x47, ..] => Ok(ImageFormat::Png),
        [0xFF, 0xD8, 0xFF, ..] => Ok(ImageFormat::Jpeg),
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Ok(ImageFormat::WebP),
        [0x47, 0x49, 0x46, 0x38, x, ..] if *x == 0x37 || *x == 0x39 => Ok(ImageFormat::Gif),
        [0x42, 0x4D, ..] => Ok(ImageFormat::Bmp),
        [0x49, 0x49, 0x2A, 0x00, ..] | [0x4D, 0x4D, 0x00, 0x2A, ..] => Ok(ImageFormat::Tiff),
        _ => Err(ImageError::UnsupportedFormat),
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let mut buffer = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut buffer, quality)
        .encode_image(image)
        .map_err(|e| ImageError::EncodeFailed(e.to_string()))?;
    Ok(buffer.into_inner())
}

/// JPEG-encodes the image and returns it as a standard base64 string.
pub fn encode_jpeg_base64(image: &RgbImage, quality: u8) -> Result<String, ImageError> {
    let jpeg = encode_jpeg(image, quality)?;
    Ok(STANDARD.encode(jpeg))
}
