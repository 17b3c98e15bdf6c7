//! Error handling and custom error types
//!
//! Provides unified error handling across the gateway using thiserror.

use std::time::Duration;
use thiserror::Error;

/// Message fragment the remote API uses when a previously selected key
/// no longer resolves. Matched as a best-effort fallback because the API
/// reports it as a generic `NOT_FOUND`.
pub const INVALID_CREDENTIAL_MARKER: &str = "Requested entity was not found";

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The request itself is unusable, e.g. a missing or unreadable source image.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("API key error. Please re-select your key.")]
    InvalidCredential,

    #[error("Remote API error (status {status}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Operation did not complete within {0:?}")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

impl Error {
    /// True when the remote API rejected the selected credential.
    pub fn is_invalid_credential(&self) -> bool {
        match self {
            Error::InvalidCredential => true,
            Error::Api { message, .. } => message.contains(INVALID_CREDENTIAL_MARKER),
            _ => false,
        }
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::Decode(format!("invalid base64 payload: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_with_marker_is_invalid_credential() {
        let err = Error::Api {
            status: 404,
            code: Some("NOT_FOUND".to_string()),
            message: "Requested entity was not found.".to_string(),
        };
        assert!(err.is_invalid_credential());
    }

    #[test]
    fn test_plain_not_found_is_not_invalid_credential() {
        let err = Error::Api {
            status: 404,
            code: Some("NOT_FOUND".to_string()),
            message: "models/unknown is not found for API version v1beta".to_string(),
        };
        assert!(!err.is_invalid_credential());
    }

    #[test]
    fn test_invalid_credential_message() {
        assert_eq!(
            Error::InvalidCredential.to_string(),
            "API key error. Please re-select your key."
        );
    }
}
