//! HTTP client for the object-detection service.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;

use crate::error::RemoteError;
use crate::http::{client_with_timeout, success_text};
use crate::messages::parse_detection;
use crate::DetectionService;

pub struct DetectionApi {
    client: reqwest::Client,
    api_url: String,
}

impl DetectionApi {
    pub fn new(api_url: String, timeout: Duration) -> Self {
        Self::with_client(client_with_timeout(timeout), api_url)
    }

    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

/// File name sent with the upload, derived from the MIME subtype
fn upload_name(mime: &str) -> String {
    let ext = mime
        .split('/')
        .nth(1)
        .map(|s| s.split(';').next().unwrap_or(s).trim())
        .filter(|s| !s.is_empty())
        .unwrap_or("bin");
    format!("sample.{ext}")
}

#[async_trait]
impl DetectionService for DetectionApi {
    /// Multipart `POST /analyze_image/` with the image in field `file`
    async fn detect(&self, image: &[u8], mime: &str) -> Result<Option<Vec<u8>>, RemoteError> {
        let part = Part::bytes(image.to_vec())
            .file_name(upload_name(mime))
            .mime_str(mime)?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(format!("{}/analyze_image/", self.api_url))
            .multipart(form)
            .send()
            .await?;

        let text = success_text(response).await?;
        let annotated = parse_detection(&text)?;
        tracing::debug!(
            annotated = annotated.is_some(),
            "Detection response received"
        );
        Ok(annotated)
    }
}
