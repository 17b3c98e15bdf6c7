use super::{
    GenerateContentRequest, GenerateContentResponse, GenerativeApi, ImagePredictRequest,
    ImagePredictResponse, MediaDownload, OperationHandle, VideoPredictRequest,
};
use crate::ai::gemini::types::{Candidate, Content, ImagePrediction, Part};
use crate::{media, Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Tiny JPEG header returned when no image response is scripted.
pub const DEFAULT_IMAGE_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46];

/// Scripted stand-in for the remote API. Every trait call is counted.
pub struct MockGenerativeApi {
    image_responses: Arc<Mutex<Vec<ImagePredictResponse>>>,
    content_responses: Arc<Mutex<Vec<GenerateContentResponse>>>,
    operations: Arc<Mutex<VecDeque<OperationHandle>>>,
    download: Arc<Mutex<Option<MediaDownload>>>,
    remote_error: Arc<Mutex<Option<(u16, String)>>>,
    video_requests: Arc<Mutex<Vec<VideoPredictRequest>>>,
    content_requests: Arc<Mutex<Vec<GenerateContentRequest>>>,
    call_count: Arc<Mutex<usize>>,
}

impl MockGenerativeApi {
    pub fn new() -> Self {
        Self {
            image_responses: Arc::new(Mutex::new(Vec::new())),
            content_responses: Arc::new(Mutex::new(Vec::new())),
            operations: Arc::new(Mutex::new(VecDeque::new())),
            download: Arc::new(Mutex::new(None)),
            remote_error: Arc::new(Mutex::new(None)),
            video_requests: Arc::new(Mutex::new(Vec::new())),
            content_requests: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(Mutex::new(0)),
        }
    }

    pub fn with_image_response(self, response: ImagePredictResponse) -> Self {
        self.image_responses.lock().unwrap().push(response);
        self
    }

    pub fn with_content_response(self, response: GenerateContentResponse) -> Self {
        self.content_responses.lock().unwrap().push(response);
        self
    }

    /// Convenience for a candidate whose parts are given in order.
    pub fn with_content_parts(self, parts: Vec<Part>) -> Self {
        self.with_content_response(GenerateContentResponse {
            candidates: vec![Candidate {
                content: Content {
                    role: Some("model".to_string()),
                    parts,
                },
            }],
        })
    }

    /// Operation snapshots handed out in order: the first by the submit call,
    /// the rest by successive polls. The last one repeats.
    pub fn with_operations(self, operations: Vec<OperationHandle>) -> Self {
        self.operations.lock().unwrap().extend(operations);
        self
    }

    pub fn with_download(self, status: u16, bytes: Vec<u8>) -> Self {
        *self.download.lock().unwrap() = Some(MediaDownload {
            status,
            content_type: Some("video/mp4".to_string()),
            bytes,
        });
        self
    }

    /// Fail every call with a remote API error.
    pub fn with_remote_error(self, status: u16, message: impl Into<String>) -> Self {
        *self.remote_error.lock().unwrap() = Some((status, message.into()));
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    pub fn video_requests(&self) -> Vec<VideoPredictRequest> {
        self.video_requests.lock().unwrap().clone()
    }

    pub fn content_requests(&self) -> Vec<GenerateContentRequest> {
        self.content_requests.lock().unwrap().clone()
    }

    fn record_call(&self) -> Result<usize> {
        let mut count = self.call_count.lock().unwrap();
        *count += 1;

        if let Some((status, message)) = self.remote_error.lock().unwrap().clone() {
            return Err(Error::Api {
                status,
                code: None,
                message,
            });
        }
        Ok(*count)
    }

    fn next_operation(&self) -> OperationHandle {
        let mut operations = self.operations.lock().unwrap();
        if operations.len() > 1 {
            operations.pop_front().unwrap_or_default()
        } else {
            operations
                .front()
                .cloned()
                .unwrap_or_else(|| OperationHandle::completed("operations/mock", None))
        }
    }
}

impl Default for MockGenerativeApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeApi for MockGenerativeApi {
    async fn generate_images(
        &self,
        _api_key: &str,
        _model: &str,
        _request: &ImagePredictRequest,
    ) -> Result<ImagePredictResponse> {
        let count = self.record_call()?;

        let responses = self.image_responses.lock().unwrap();
        if responses.is_empty() {
            Ok(ImagePredictResponse {
                predictions: vec![ImagePrediction {
                    bytes_base64_encoded: Some(media::encode_base64(DEFAULT_IMAGE_BYTES)),
                    mime_type: Some("image/jpeg".to_string()),
                    rai_filtered_reason: None,
                }],
            })
        } else {
            let index = (count - 1) % responses.len();
            Ok(responses[index].clone())
        }
    }

    async fn generate_content(
        &self,
        _api_key: &str,
        _model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let count = self.record_call()?;
        self.content_requests.lock().unwrap().push(request.clone());

        let responses = self.content_responses.lock().unwrap();
        if responses.is_empty() {
            Ok(GenerateContentResponse::default())
        } else {
            let index = (count - 1) % responses.len();
            Ok(responses[index].clone())
        }
    }

    async fn generate_videos(
        &self,
        _api_key: &str,
        _model: &str,
        request: &VideoPredictRequest,
    ) -> Result<OperationHandle> {
        self.record_call()?;
        self.video_requests.lock().unwrap().push(request.clone());
        Ok(self.next_operation())
    }

    async fn get_video_operation(
        &self,
        _api_key: &str,
        _operation: &OperationHandle,
    ) -> Result<OperationHandle> {
        self.record_call()?;
        Ok(self.next_operation())
    }

    async fn download(&self, _api_key: &str, _uri: &str) -> Result<MediaDownload> {
        self.record_call()?;
        Ok(self
            .download
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| MediaDownload {
                status: 200,
                content_type: Some("video/mp4".to_string()),
                bytes: vec![0x00, 0x00, 0x00, 0x18, 0x66, 0x74, 0x79, 0x70],
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_operations_advance_then_repeat() {
        let api = MockGenerativeApi::new().with_operations(vec![
            OperationHandle::pending("op"),
            OperationHandle::completed("op", Some("https://media/v.mp4")),
        ]);
        let handle = OperationHandle::pending("op");

        assert!(!api.get_video_operation("k", &handle).await.unwrap().done);
        assert!(api.get_video_operation("k", &handle).await.unwrap().done);
        assert!(api.get_video_operation("k", &handle).await.unwrap().done);
        assert_eq!(api.get_call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_remote_error_still_counts() {
        let api = MockGenerativeApi::new().with_remote_error(500, "boom");

        let err = api.download("k", "https://media/v.mp4").await.unwrap_err();
        assert!(matches!(err, Error::Api { status: 500, .. }));
        assert_eq!(api.get_call_count(), 1);
    }
}
