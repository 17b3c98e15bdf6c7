//! Remote generative media API
//!
//! [`GenerativeApi`] is the seam between the gateway and the hosted models:
//! single-shot image prediction, mixed text/image content generation, and a
//! submit/poll pair for long-running video jobs. The API key is passed per
//! call because the gateway re-reads it from its credential provider every
//! time.

pub mod gemini;
pub mod mock;

pub use gemini::types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    ImagePredictRequest, ImagePredictResponse, OperationHandle, Part, VideoPredictRequest,
};
pub use gemini::GeminiClient;
pub use mock::MockGenerativeApi;

use crate::Result;
use async_trait::async_trait;

/// Raw result of fetching a finished media file. Non-success statuses are
/// returned, not raised, so the caller decides how to report them.
#[derive(Debug, Clone)]
pub struct MediaDownload {
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl MediaDownload {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait GenerativeApi: Send + Sync {
    async fn generate_images(
        &self,
        api_key: &str,
        model: &str,
        request: &ImagePredictRequest,
    ) -> Result<ImagePredictResponse>;

    async fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;

    /// Submit a video job and return its initial operation snapshot.
    async fn generate_videos(
        &self,
        api_key: &str,
        model: &str,
        request: &VideoPredictRequest,
    ) -> Result<OperationHandle>;

    async fn get_video_operation(
        &self,
        api_key: &str,
        operation: &OperationHandle,
    ) -> Result<OperationHandle>;

    async fn download(&self, api_key: &str, uri: &str) -> Result<MediaDownload>;
}
