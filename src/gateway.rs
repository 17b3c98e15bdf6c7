//! Generation gateway: the five user-facing operations.

use crate::ai::gemini::types::{
    Content, GenerationConfig, ImageInstance, ImageParameters, OutputOptions, Part, SeedImage,
    VideoInstance, VideoParameters,
};
use crate::ai::{
    GeminiClient, GenerateContentRequest, GenerativeApi, ImagePredictRequest,
    VideoPredictRequest,
};
use crate::blob::{BlobRegistry, ObjectUrl};
use crate::credentials::CredentialProvider;
use crate::media;
use crate::models::{
    AspectRatio, Config, GenerationRequest, MediaResult, OperationKind, SourceImage,
};
use crate::poller::{CancelToken, OperationPoller, ProgressSink};
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, info, warn};

const STILL_IMAGE_MIME: &str = "image/jpeg";
const STILL_IMAGE_ASPECT_RATIO: &str = "1:1";
const FRAME_MIME: &str = "image/jpeg";

/// Wraps the remote API. Cheap to share; every call is independent.
pub struct GenerationGateway {
    api: Arc<dyn GenerativeApi>,
    credentials: Arc<dyn CredentialProvider>,
    blobs: BlobRegistry,
    config: Config,
}

impl GenerationGateway {
    pub fn new(
        api: Arc<dyn GenerativeApi>,
        credentials: Arc<dyn CredentialProvider>,
        config: Config,
    ) -> Self {
        Self {
            api,
            credentials,
            blobs: BlobRegistry::new(),
            config,
        }
    }

    /// Gateway talking to the Gemini REST API at `config.base_url`.
    pub fn gemini(config: Config, credentials: Arc<dyn CredentialProvider>) -> Self {
        let api = GeminiClient::new(config.base_url.clone(), config.request_timeout);
        Self::new(Arc::new(api), credentials, config)
    }

    pub fn blobs(&self) -> &BlobRegistry {
        &self.blobs
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    async fn api_key(&self) -> Result<String> {
        self.credentials.api_key().await.ok_or_else(|| {
            warn!("No API key configured; refusing to call the remote API");
            Error::Configuration("API key not found".to_string())
        })
    }

    /// Turn a rejected-key response into [`Error::InvalidCredential`] and
    /// tell the provider which key was rejected, so the front-end can ask for
    /// a new one.
    async fn check_credential<T>(&self, api_key: &str, result: Result<T>) -> Result<T> {
        match result {
            Err(e) if e.is_invalid_credential() => {
                warn!("Remote API rejected the selected key: {}", e);
                self.credentials.invalidate(api_key).await;
                Err(Error::InvalidCredential)
            }
            other => other,
        }
    }

    /// Generate one square JPEG and return it as a `data:` URL.
    pub async fn generate_still_image(&self, prompt: &str) -> Result<String> {
        let api_key = self.api_key().await?;
        let result = self.generate_still_image_inner(&api_key, prompt).await;
        self.check_credential(&api_key, result).await
    }

    async fn generate_still_image_inner(&self, api_key: &str, prompt: &str) -> Result<String> {
        let request = ImagePredictRequest {
            instances: vec![ImageInstance {
                prompt: prompt.to_string(),
            }],
            parameters: ImageParameters {
                sample_count: 1,
                aspect_ratio: STILL_IMAGE_ASPECT_RATIO.to_string(),
                output_options: OutputOptions {
                    mime_type: STILL_IMAGE_MIME.to_string(),
                },
            },
        };

        debug!("Requesting still image from {}", self.config.image_model);
        let response = self
            .api
            .generate_images(api_key, &self.config.image_model, &request)
            .await?;

        let prediction = response.predictions.first();
        let bytes = match prediction.and_then(|p| p.bytes_base64_encoded.as_deref()) {
            Some(data) => media::decode_base64(data)?,
            None => {
                let reason = prediction
                    .and_then(|p| p.rai_filtered_reason.as_deref())
                    .map(|r| format!(" ({})", r))
                    .unwrap_or_default();
                return Err(Error::GenerationFailed(format!(
                    "Image generation failed.{}",
                    reason
                )));
            }
        };
        if bytes.is_empty() {
            return Err(Error::GenerationFailed(
                "Image generation failed.".to_string(),
            ));
        }

        info!("Generated still image ({} bytes)", bytes.len());
        Ok(media::to_data_url(STILL_IMAGE_MIME, &bytes))
    }

    pub async fn generate_video(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        progress: &dyn ProgressSink,
    ) -> Result<ObjectUrl> {
        self.generate_video_with_cancel(prompt, aspect_ratio, progress, &CancelToken::new())
            .await
    }

    /// [`Self::generate_video`], stoppable through `cancel`.
    pub async fn generate_video_with_cancel(
        &self,
        prompt: &str,
        aspect_ratio: AspectRatio,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ObjectUrl> {
        let api_key = self.api_key().await?;
        progress.report(1.0, "Initializing video generation...");

        let request = self.video_request(Some(prompt), None, aspect_ratio);
        let result = self
            .submit_and_poll(&api_key, &request, progress, cancel)
            .await;
        self.check_credential(&api_key, result).await
    }

    pub async fn animate_image(
        &self,
        prompt: &str,
        image: &SourceImage,
        aspect_ratio: AspectRatio,
        progress: &dyn ProgressSink,
    ) -> Result<ObjectUrl> {
        self.animate_image_with_cancel(prompt, image, aspect_ratio, progress, &CancelToken::new())
            .await
    }

    /// Animate from `image` as the first frame. An empty prompt is allowed;
    /// the model then infers motion from the image alone.
    pub async fn animate_image_with_cancel(
        &self,
        prompt: &str,
        image: &SourceImage,
        aspect_ratio: AspectRatio,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ObjectUrl> {
        let api_key = self.api_key().await?;

        progress.report(1.0, "Preparing image for animation...");
        let seed = SeedImage {
            bytes_base64_encoded: image.to_base64(),
            mime_type: image.mime_type.clone(),
        };

        progress.report(3.0, "Initializing animation...");
        let request = self.video_request(Some(prompt), Some(seed), aspect_ratio);
        let result = self
            .submit_and_poll(&api_key, &request, progress, cancel)
            .await;
        self.check_credential(&api_key, result).await
    }

    fn video_request(
        &self,
        prompt: Option<&str>,
        image: Option<SeedImage>,
        aspect_ratio: AspectRatio,
    ) -> VideoPredictRequest {
        VideoPredictRequest {
            instances: vec![VideoInstance {
                prompt: prompt.filter(|p| !p.is_empty()).map(str::to_string),
                image,
            }],
            parameters: VideoParameters {
                sample_count: 1,
                resolution: self.config.video_resolution.clone(),
                aspect_ratio: aspect_ratio.to_string(),
            },
        }
    }

    async fn submit_and_poll(
        &self,
        api_key: &str,
        request: &VideoPredictRequest,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<ObjectUrl> {
        info!(
            "Submitting video job to {} ({}, {})",
            self.config.video_model,
            request.parameters.resolution,
            request.parameters.aspect_ratio
        );
        let operation = cancel
            .guard(
                self.api
                    .generate_videos(api_key, &self.config.video_model, request),
            )
            .await?;

        OperationPoller::new(
            self.api.as_ref(),
            &self.blobs,
            api_key,
            &self.config.poll,
            cancel,
        )
        .run(operation, progress)
        .await
    }

    /// Apply a free-text edit to `image` and return the result as a `data:` URL.
    pub async fn edit_image(&self, instruction: &str, image: &SourceImage) -> Result<String> {
        let api_key = self.api_key().await?;

        let request = GenerateContentRequest {
            contents: vec![Content {
                role: None,
                parts: vec![
                    Part::inline(image.mime_type.clone(), image.to_base64()),
                    Part::text(instruction),
                ],
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["IMAGE".to_string()]),
            }),
        };

        let result = self
            .api
            .generate_content(&api_key, &self.config.edit_model, &request)
            .await;
        let response = self.check_credential(&api_key, result).await?;

        let inline = response
            .first_inline_data()
            .ok_or_else(|| Error::GenerationFailed("Image editing failed.".to_string()))?;
        info!("Edited image returned as {}", inline.mime_type);
        Ok(media::data_url_from_base64(&inline.mime_type, &inline.data))
    }

    /// Ask the analysis model about a JPEG frame given as base64. The reply
    /// text is returned as-is and may be empty.
    pub async fn analyze_frame(&self, prompt: &str, frame_base64: &str) -> Result<String> {
        let api_key = self.api_key().await?;
        self.analyze_frame_with_key(&api_key, prompt, frame_base64)
            .await
    }

    async fn analyze_frame_with_key(
        &self,
        api_key: &str,
        prompt: &str,
        frame_base64: &str,
    ) -> Result<String> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: None,
                parts: vec![Part::text(prompt), Part::inline(FRAME_MIME, frame_base64)],
            }],
            generation_config: None,
        };

        let result = self
            .api
            .generate_content(api_key, &self.config.analysis_model, &request)
            .await;
        let response = self.check_credential(api_key, result).await?;
        Ok(response.text())
    }

    /// Capture `frame` as JPEG, then [`Self::analyze_frame`].
    pub async fn analyze_image(&self, prompt: &str, frame: &SourceImage) -> Result<String> {
        let api_key = self.api_key().await?;
        let frame_base64 = media::capture_frame_jpeg(frame.bytes.clone()).await?;
        self.analyze_frame_with_key(&api_key, prompt, &frame_base64)
            .await
    }

    /// Dispatch a [`GenerationRequest`] to the matching operation.
    pub async fn run(
        &self,
        request: GenerationRequest,
        progress: &dyn ProgressSink,
        cancel: &CancelToken,
    ) -> Result<MediaResult> {
        let aspect_ratio = request.aspect_ratio.unwrap_or_default();
        match (request.kind, request.image.as_ref()) {
            (OperationKind::ImageGenerate, _) => self
                .generate_still_image(&request.prompt)
                .await
                .map(MediaResult::DataUrl),
            (OperationKind::VideoGenerate, _) => self
                .generate_video_with_cancel(&request.prompt, aspect_ratio, progress, cancel)
                .await
                .map(MediaResult::Blob),
            (OperationKind::VideoAnimate, Some(image)) => self
                .animate_image_with_cancel(&request.prompt, image, aspect_ratio, progress, cancel)
                .await
                .map(MediaResult::Blob),
            (OperationKind::ImageEdit, Some(image)) => self
                .edit_image(&request.prompt, image)
                .await
                .map(MediaResult::DataUrl),
            (OperationKind::FrameAnalyze, Some(frame)) => self
                .analyze_image(&request.prompt, frame)
                .await
                .map(MediaResult::Text),
            (kind, None) => Err(Error::InvalidRequest(format!(
                "{:?} requires a source image",
                kind
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockGenerativeApi;
    use crate::credentials::StaticCredentialProvider;

    fn gateway(api: MockGenerativeApi) -> (GenerationGateway, Arc<MockGenerativeApi>) {
        let api = Arc::new(api);
        let gateway = GenerationGateway::new(
            api.clone(),
            Arc::new(StaticCredentialProvider::new("key")),
            Config::default(),
        );
        (gateway, api)
    }

    #[test]
    fn test_video_request_omits_empty_prompt() {
        let (gateway, _) = gateway(MockGenerativeApi::new());
        let request = gateway.video_request(Some(""), None, AspectRatio::Portrait);

        assert!(request.instances[0].prompt.is_none());
        assert_eq!(request.parameters.aspect_ratio, "9:16");
        assert_eq!(request.parameters.resolution, "720p");
        assert_eq!(request.parameters.sample_count, 1);
    }

    #[tokio::test]
    async fn test_edit_image_request_parts_order() {
        let (gateway, api) = gateway(
            MockGenerativeApi::new().with_content_parts(vec![Part::inline("image/png", "iVBORw==")]),
        );
        let image = SourceImage::new(vec![0x89, 0x50, 0x4E, 0x47], "image/png");

        let url = gateway.edit_image("make it blue", &image).await.unwrap();
        assert_eq!(url, "data:image/png;base64,iVBORw==");

        let sent = &api.content_requests()[0];
        let json = serde_json::to_value(sent).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["inlineData"]["data"], "iVBORw==");
        assert_eq!(json["contents"][0]["parts"][1]["text"], "make it blue");
        assert_eq!(json["generationConfig"]["responseModalities"][0], "IMAGE");
    }

    #[tokio::test]
    async fn test_edit_image_without_inline_data_fails() {
        let (gateway, _) =
            gateway(MockGenerativeApi::new().with_content_parts(vec![Part::text("sorry")]));
        let image = SourceImage::new(vec![1], "image/png");

        let err = gateway.edit_image("make it blue", &image).await.unwrap_err();
        assert!(matches!(err, Error::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn test_analyze_frame_returns_text_verbatim() {
        let (gateway, api) = gateway(
            MockGenerativeApi::new().with_content_parts(vec![Part::text("  A cat on a mat.\n")]),
        );

        let text = gateway.analyze_frame("describe", "/9j/").await.unwrap();
        assert_eq!(text, "  A cat on a mat.\n");

        let json = serde_json::to_value(&api.content_requests()[0]).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "describe");
        assert_eq!(json["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/jpeg");
        assert!(json.get("generationConfig").is_none());
    }

    #[tokio::test]
    async fn test_analyze_frame_empty_response_is_empty_string() {
        let (gateway, _) = gateway(MockGenerativeApi::new());
        assert_eq!(gateway.analyze_frame("describe", "/9j/").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_still_image_filtered_reports_reason() {
        let (gateway, _) = gateway(MockGenerativeApi::new().with_image_response(
            crate::ai::ImagePredictResponse {
                predictions: vec![crate::ai::gemini::types::ImagePrediction {
                    bytes_base64_encoded: None,
                    mime_type: None,
                    rai_filtered_reason: Some("blocked".to_string()),
                }],
            },
        ));

        let err = gateway.generate_still_image("x").await.unwrap_err();
        match err {
            Error::GenerationFailed(message) => assert!(message.contains("blocked")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_run_requires_image_for_edit() {
        let (gateway, api) = gateway(MockGenerativeApi::new());
        let request = GenerationRequest {
            kind: OperationKind::ImageEdit,
            prompt: "x".to_string(),
            image: None,
            aspect_ratio: None,
        };

        let err = gateway
            .run(request, &|_: f64, _: &str| {}, &CancelToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
        assert!(!matches!(err, Error::Configuration(_)));
        assert_eq!(api.get_call_count(), 0);
    }
}
