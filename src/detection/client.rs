//! HTTP client for the face/eye detection service

use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use super::{
    DetectionError, DetectionService, FrameSignal, ProcessFrameRequest, ProcessFrameResponse,
};
use crate::config::DetectionConfig;

/// Detection service reached over HTTP
#[derive(Clone)]
pub struct DetectionClient {
    client: Client,
    base_url: String,
}

impl DetectionClient {
    /// Create a new client
    pub fn new(config: &DetectionConfig) -> Result<Self, DetectionError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

impl DetectionService for DetectionClient {
    async fn process_frame(&self, image_data_url: String) -> Result<FrameSignal, DetectionError> {
        let response = self
            .client
            .post(self.endpoint("process_frame"))
            .json(&ProcessFrameRequest {
                image: image_data_url,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectionError::Status(status));
        }

        let body: ProcessFrameResponse = response.json().await?;
        let signal = FrameSignal::from_response(body)?;
        debug!(
            "Frame processed: {} face(s), eyes {:?}",
            signal.face_count, signal.tracking_status
        );
        Ok(signal)
    }

    async fn reset_tracking(&self) -> Result<(), DetectionError> {
        let response = self
            .client
            .post(self.endpoint("reset_eye_tracking"))
            .json(&serde_json::json!({}))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(DetectionError::Status(status));
        }

        Ok(())
    }
}
