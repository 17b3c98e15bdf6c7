//! Data models and structures
//!
//! Request-scoped values passed through the gateway, plus the environment
//! driven configuration.

use crate::blob::ObjectUrl;
use crate::media;
use crate::poller::PollConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_IMAGE_MODEL: &str = "imagen-4.0-generate-001";
pub const DEFAULT_EDIT_MODEL: &str = "gemini-2.5-flash-image";
pub const DEFAULT_ANALYSIS_MODEL: &str = "gemini-2.5-pro";
pub const DEFAULT_VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";
pub const DEFAULT_VIDEO_RESOLUTION: &str = "720p";

/// Video frame shape accepted by the video model.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Landscape => "16:9",
            AspectRatio::Portrait => "9:16",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "16:9" => Ok(AspectRatio::Landscape),
            "9:16" => Ok(AspectRatio::Portrait),
            other => Err(format!(
                "Invalid aspect ratio '{}'. Expected 16:9 or 9:16",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    ImageGenerate,
    VideoGenerate,
    VideoAnimate,
    ImageEdit,
    FrameAnalyze,
}

/// Raw image bytes paired with their MIME type.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

impl SourceImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Build from bytes alone, sniffing the MIME type from the magic number.
    /// Fails on formats the models don't accept.
    pub fn sniffed(bytes: Vec<u8>) -> Result<Self> {
        let mime_type = media::detect_image_mime(&bytes).ok_or_else(|| {
            tracing::warn!(
                "Unrecognized image format (first 4 bytes: {:02X?})",
                &bytes[..bytes.len().min(4)]
            );
            Error::InvalidRequest(
                "Unrecognized image format; expected JPEG, PNG, WebP or GIF".to_string(),
            )
        })?;
        Ok(Self::new(bytes, mime_type))
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let image = match media::mime_from_extension(path) {
            Some(mime) => Self::new(bytes, mime),
            None => Self::sniffed(bytes)?,
        };
        tracing::debug!(
            "Loaded {} ({} bytes, {})",
            path.display(),
            image.bytes.len(),
            image.mime_type
        );
        Ok(image)
    }

    /// Base64 form used on the wire.
    pub fn to_base64(&self) -> String {
        media::encode_base64(&self.bytes)
    }
}

/// One user action routed through [`crate::gateway::GenerationGateway::run`].
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub kind: OperationKind,
    pub prompt: String,
    pub image: Option<SourceImage>,
    pub aspect_ratio: Option<AspectRatio>,
}

impl GenerationRequest {
    pub fn image(prompt: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::ImageGenerate,
            prompt: prompt.into(),
            image: None,
            aspect_ratio: None,
        }
    }

    pub fn video(prompt: impl Into<String>, aspect_ratio: AspectRatio) -> Self {
        Self {
            kind: OperationKind::VideoGenerate,
            prompt: prompt.into(),
            image: None,
            aspect_ratio: Some(aspect_ratio),
        }
    }

    pub fn animate(
        prompt: impl Into<String>,
        image: SourceImage,
        aspect_ratio: AspectRatio,
    ) -> Self {
        Self {
            kind: OperationKind::VideoAnimate,
            prompt: prompt.into(),
            image: Some(image),
            aspect_ratio: Some(aspect_ratio),
        }
    }

    pub fn edit(instruction: impl Into<String>, image: SourceImage) -> Self {
        Self {
            kind: OperationKind::ImageEdit,
            prompt: instruction.into(),
            image: Some(image),
            aspect_ratio: None,
        }
    }

    pub fn analyze(prompt: impl Into<String>, frame: SourceImage) -> Self {
        Self {
            kind: OperationKind::FrameAnalyze,
            prompt: prompt.into(),
            image: Some(frame),
            aspect_ratio: None,
        }
    }
}

/// A single progress update emitted while a video operation runs.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressReport {
    pub percentage: f64,
    pub message: String,
}

/// What a finished gateway call hands back to its caller.
#[derive(Debug)]
pub enum MediaResult {
    /// `data:` URL embedding an image.
    DataUrl(String),
    /// Registry-backed `blob:` URL; release it when done.
    Blob(ObjectUrl),
    Text(String),
}

impl MediaResult {
    pub fn url(&self) -> Option<&str> {
        match self {
            MediaResult::DataUrl(url) => Some(url),
            MediaResult::Blob(object_url) => Some(object_url.as_str()),
            MediaResult::Text(_) => None,
        }
    }
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub image_model: String,
    pub edit_model: String,
    pub analysis_model: String,
    pub video_model: String,
    pub video_resolution: String,
    pub request_timeout: Duration,
    pub poll: PollConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            edit_model: DEFAULT_EDIT_MODEL.to_string(),
            analysis_model: DEFAULT_ANALYSIS_MODEL.to_string(),
            video_model: DEFAULT_VIDEO_MODEL.to_string(),
            video_resolution: DEFAULT_VIDEO_RESOLUTION.to_string(),
            request_timeout: Duration::from_secs(120),
            poll: PollConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the environment (and `.env`, if present).
    ///
    /// The API key is not part of the config; it is supplied per call by a
    /// [`crate::credentials::CredentialProvider`].
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let poll = PollConfig {
            interval: env_secs("NOVA_POLL_INTERVAL_SECS")?.unwrap_or(defaults.poll.interval),
            estimated_duration: env_secs("NOVA_POLL_ESTIMATE_SECS")?
                .unwrap_or(defaults.poll.estimated_duration),
            max_wait: env_secs("NOVA_POLL_TIMEOUT_SECS")?,
        };

        Ok(Self {
            base_url: env_or("NOVA_BASE_URL", defaults.base_url),
            image_model: env_or("NOVA_IMAGE_MODEL", defaults.image_model),
            edit_model: env_or("NOVA_EDIT_MODEL", defaults.edit_model),
            analysis_model: env_or("NOVA_ANALYSIS_MODEL", defaults.analysis_model),
            video_model: env_or("NOVA_VIDEO_MODEL", defaults.video_model),
            video_resolution: env_or("NOVA_VIDEO_RESOLUTION", defaults.video_resolution),
            request_timeout: env_secs("NOVA_REQUEST_TIMEOUT_SECS")?
                .unwrap_or(defaults.request_timeout),
            poll,
        })
    }
}

fn env_or(name: &str, default: String) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn env_secs(name: &str) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| {
                Error::Configuration(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    name, value
                ))
            }),
        _ => Ok(None),
    }
}
