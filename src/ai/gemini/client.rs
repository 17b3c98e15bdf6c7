use super::types::{
    ApiErrorEnvelope, GenerateContentRequest, GenerateContentResponse, ImagePredictRequest,
    ImagePredictResponse, OperationHandle, VideoPredictRequest,
};
use crate::ai::{GenerativeApi, MediaDownload};
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

const API_VERSION: &str = "v1beta";

/// Gemini REST client covering the Imagen, Gemini and Veo endpoints.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self::new_with_client(base_url, timeout, Client::new())
    }

    pub fn new_with_client(base_url: impl Into<String>, timeout: Duration, client: Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            timeout,
        }
    }

    /// `model` may be given bare (`gemini-2.5-pro`) or `models/`-prefixed.
    fn model_url(&self, model: &str, method: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!(
            "{}/{}/models/{}:{}",
            self.base_url, API_VERSION, model, method
        )
    }

    async fn post_json<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        api_key: &str,
        url: String,
        request: &Req,
    ) -> Result<Resp> {
        tracing::debug!("POST {}", url);
        let builder = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(request);
        self.send_json(api_key, builder).await
    }

    async fn get_json<Resp: DeserializeOwned>(&self, api_key: &str, url: String) -> Result<Resp> {
        tracing::debug!("GET {}", url);
        self.send_json(api_key, self.client.get(&url)).await
    }

    async fn send_json<Resp: DeserializeOwned>(
        &self,
        api_key: &str,
        builder: RequestBuilder,
    ) -> Result<Resp> {
        let response = builder
            .timeout(self.timeout)
            .header("x-goog-api-key", api_key)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to send request to Gemini: {}", e);
                e
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            tracing::error!("Gemini API error (status {}): {}", status, error_text);
            return Err(api_error(status, &error_text));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!("Failed to parse Gemini response: {}\nBody: {}", e, body);
            Error::Serialization(e)
        })
    }
}

/// Map a non-success response onto [`Error::Api`], pulling the structured
/// status out of the Google error envelope when the body has one.
fn api_error(status: StatusCode, body: &str) -> Error {
    match serde_json::from_str::<ApiErrorEnvelope>(body) {
        Ok(envelope) => Error::Api {
            status: status.as_u16(),
            code: envelope.error.status,
            message: envelope.error.message,
        },
        Err(_) => Error::Api {
            status: status.as_u16(),
            code: None,
            message: body.to_string(),
        },
    }
}

#[async_trait]
impl GenerativeApi for GeminiClient {
    async fn generate_images(
        &self,
        api_key: &str,
        model: &str,
        request: &ImagePredictRequest,
    ) -> Result<ImagePredictResponse> {
        self.post_json(api_key, self.model_url(model, "predict"), request)
            .await
    }

    async fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        self.post_json(api_key, self.model_url(model, "generateContent"), request)
            .await
    }

    async fn generate_videos(
        &self,
        api_key: &str,
        model: &str,
        request: &VideoPredictRequest,
    ) -> Result<OperationHandle> {
        let operation: OperationHandle = self
            .post_json(api_key, self.model_url(model, "predictLongRunning"), request)
            .await?;
        tracing::info!("Submitted video operation {}", operation.name);
        Ok(operation)
    }

    async fn get_video_operation(
        &self,
        api_key: &str,
        operation: &OperationHandle,
    ) -> Result<OperationHandle> {
        let url = format!("{}/{}/{}", self.base_url, API_VERSION, operation.name);
        self.get_json(api_key, url).await
    }

    async fn download(&self, api_key: &str, uri: &str) -> Result<MediaDownload> {
        tracing::debug!("Downloading media from {}", uri);
        // The media host only accepts the key as a query parameter.
        let response = self
            .client
            .get(uri)
            .query(&[("key", api_key)])
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());
        let bytes = response.bytes().await?.to_vec();

        Ok(MediaDownload {
            status,
            content_type,
            bytes,
        })
    }
}
