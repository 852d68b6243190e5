//! HTTP client for the reasoning (image chat) service.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::RemoteError;
use crate::http::{client_with_timeout, success_text};
use crate::messages::{encode_analysis_request, parse_analysis};
use crate::ReasoningService;

pub struct ReasoningApi {
    client: reqwest::Client,
    api_url: String,
}

impl ReasoningApi {
    /// * `api_url` - Base HTTP URL, e.g. `http://localhost:8000`.
    pub fn new(api_url: String, timeout: Duration) -> Self {
        Self::with_client(client_with_timeout(timeout), api_url)
    }

    /// Reuse an existing [`reqwest::Client`] (and its connection pool)
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ReasoningService for ReasoningApi {
    /// `POST /analyze_with_ai/` with `{image, prompt}`; returns `response`.
    async fn analyze(&self, image: &[u8], prompt: &str) -> Result<String, RemoteError> {
        let body = encode_analysis_request(image, prompt);
        tracing::debug!(bytes = image.len(), "Sending analysis request");

        let response = self
            .client
            .post(format!("{}/analyze_with_ai/", self.api_url))
            .json(&body)
            .send()
            .await?;

        let text = success_text(response).await?;
        parse_analysis(&text)
    }
}
