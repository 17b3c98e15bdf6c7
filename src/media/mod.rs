//! Media transport encoding
//!
//! Base64 payloads, `data:` URLs, MIME sniffing and frame capture. Images
//! and seed frames cross the API boundary as standard padded base64.

pub mod frame;
pub mod mime;

pub use frame::capture_frame_jpeg;
pub use mime::{detect_image_mime, extension_for_mime, mime_from_extension};

use crate::{Error, Result};
use base64::Engine as _;

pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode_base64(data: &str) -> Result<Vec<u8>> {
    Ok(base64::engine::general_purpose::STANDARD.decode(data.trim())?)
}

pub fn to_data_url(mime_type: &str, bytes: &[u8]) -> String {
    data_url_from_base64(mime_type, &encode_base64(bytes))
}

/// Wrap an already-encoded payload without re-encoding it.
pub fn data_url_from_base64(mime_type: &str, data: &str) -> String {
    format!("data:{};base64,{}", mime_type, data)
}

/// A decoded `data:<mime>;base64,<payload>` URL.
#[derive(Debug, Clone, PartialEq)]
pub struct DataUrl {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    pub fn parse(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| Error::Decode("not a data URL".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::Decode("data URL has no payload separator".to_string()))?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or_else(|| Error::Decode("data URL payload is not base64".to_string()))?;

        Ok(Self {
            mime_type: mime_type.to_string(),
            bytes: decode_base64(payload)?,
        })
    }

    /// The base64 part of a data URL, as a captured frame is sent for analysis.
    pub fn payload(url: &str) -> Option<&str> {
        url.split_once(',').map(|(_, payload)| payload)
    }
}
