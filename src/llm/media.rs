use std::io::Cursor;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};

use crate::llm::CapabilityError;

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    infer::get(data).map(|kind| kind.mime_type().to_string())
}

/// Scales the rendered image to cover `width`×`height`, crops the overflow
/// around the center and re-encodes it as PNG.
pub fn fit_to_geometry(bytes: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CapabilityError> {
    if bytes.is_empty() {
        return Err(CapabilityError::Empty);
    }
    if let Some(mime_type) = detect_mime_type(bytes) {
        if !mime_type.starts_with("image/") {
            return Err(CapabilityError::Malformed(format!(
                "expected an image, got {mime_type}"
            )));
        }
    }

    let decoded = image::load_from_memory(bytes)
        .map_err(|err| CapabilityError::Malformed(format!("undecodable image: {err}")))?;
    let fitted = if decoded.width() == width && decoded.height() == height {
        decoded
    } else {
        decoded.resize_to_fill(width, height, FilterType::Lanczos3)
    };
    encode_png(&fitted)
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, CapabilityError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|err| CapabilityError::Malformed(format!("failed to encode PNG: {err}")))?;
    Ok(buffer.into_inner())
}
