//! Frame capture: re-encode a still (typically a frame grabbed from a
//! video) as a base64 JPEG, the form frame analysis expects.

use crate::{Error, Result};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;

fn encode_jpeg_sync(bytes: Vec<u8>) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(&bytes)?;
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(decoded.to_rgb8());

    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}

/// Decode any supported still and return its JPEG encoding as base64.
pub async fn capture_frame_jpeg(bytes: Vec<u8>) -> Result<String> {
    let input_len = bytes.len();
    let jpeg = tokio::task::spawn_blocking(move || encode_jpeg_sync(bytes))
        .await
        .map_err(|e| Error::Invariant(format!("Frame capture task join error: {}", e)))??;

    tracing::debug!(
        "Captured frame: {} input bytes -> {} JPEG bytes",
        input_len,
        jpeg.len()
    );
    Ok(super::encode_base64(&jpeg))
}
