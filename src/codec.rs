use std::io::Cursor;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::{DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};

use crate::error::{CardError, Result};

/// Decode raw encoded bytes (any format the `image` crate recognises)
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    let img = image::load_from_memory(bytes).map_err(|err| CardError::Decode(err.to_string()))?;
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return Err(CardError::Decode(format!(
            "image has zero dimension ({}x{})",
            width, height
        )));
    }
    Ok(img)
}

/// Composite onto a white background, dropping the alpha channel
pub fn flatten_alpha(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }

    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    let mut out = RgbImage::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = pixel[3] as f64 / 255.0;
        let blend = |c: u8| (c as f64 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        out.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    out
}

/// Encode as PNG or JPEG. JPEG has no alpha channel, so transparent pixels
/// are flattened onto white first.
pub fn encode(img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let result = match format {
        ImageFormat::Jpeg => DynamicImage::ImageRgb8(flatten_alpha(img))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg),
        ImageFormat::Png => img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png),
        other => {
            return Err(CardError::Encode(format!(
                "unsupported output format {:?}",
                other
            )))
        }
    };
    result.map_err(|err| CardError::Encode(err.to_string()))?;
    Ok(buf)
}

/// Wrap PNG bytes in a `data:` URI
pub fn png_data_uri(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}

/// Decode base64 content, with or without a `data:...;base64,` prefix
pub fn decode_base64_payload(payload: &str) -> Result<Vec<u8>> {
    let body = payload.rsplit(',').next().unwrap_or(payload).trim();
    STANDARD
        .decode(body)
        .map_err(|err| CardError::InvalidPayload(format!("bad base64 image: {}", err)))
}
