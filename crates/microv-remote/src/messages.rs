//! Wire shapes of the three remote services.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::RemoteError;

/// Body of `POST /analyze_with_ai/`
#[derive(Debug, Serialize)]
pub struct AnalysisRequest<'a> {
    /// Base64 of the encoded image
    pub image: String,
    pub prompt: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisResponse {
    pub response: String,
}

/// Body returned by `POST /analyze_image/`
#[derive(Debug, Deserialize)]
pub struct DetectionResponse {
    #[serde(default)]
    pub annotated_image_base64: Option<String>,
}

/// Both directions of the annotation channel use this shape
#[derive(Debug, Serialize, Deserialize)]
pub struct FrameMessage {
    pub image: String,
}

/// An annotated frame received from the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedFrame {
    /// Decoded image bytes
    pub bytes: Vec<u8>,
    /// The payload exactly as received
    pub base64: String,
}

/// One inbound channel message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Frame(AnnotatedFrame),
    /// Arrived but could not be read; still counts as a reply
    Malformed(String),
}

pub fn encode_analysis_request<'a>(image: &[u8], prompt: &'a str) -> AnalysisRequest<'a> {
    AnalysisRequest {
        image: BASE64.encode(image),
        prompt,
    }
}

pub fn parse_analysis(body: &str) -> Result<String, RemoteError> {
    serde_json::from_str::<AnalysisResponse>(body)
        .map(|r| r.response)
        .map_err(|e| RemoteError::Malformed(e.to_string()))
}

/// Decode the annotated image, if the detector produced one
pub fn parse_detection(body: &str) -> Result<Option<Vec<u8>>, RemoteError> {
    let parsed: DetectionResponse =
        serde_json::from_str(body).map_err(|e| RemoteError::Malformed(e.to_string()))?;
    match parsed.annotated_image_base64 {
        Some(b64) if !b64.is_empty() => BASE64
            .decode(b64.as_bytes())
            .map(Some)
            .map_err(|e| RemoteError::Malformed(format!("annotated_image_base64: {e}"))),
        _ => Ok(None),
    }
}

pub fn encode_frame(jpeg: &[u8]) -> Result<String, RemoteError> {
    serde_json::to_string(&FrameMessage {
        image: BASE64.encode(jpeg),
    })
    .map_err(|e| RemoteError::Malformed(e.to_string()))
}

/// Parse an inbound text message. Never fails: unreadable payloads come
/// back as [`Inbound::Malformed`].
pub fn parse_frame(text: &str) -> Inbound {
    let message: FrameMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => return Inbound::Malformed(e.to_string()),
    };
    match BASE64.decode(message.image.as_bytes()) {
        Ok(bytes) if !bytes.is_empty() => Inbound::Frame(AnnotatedFrame {
            bytes,
            base64: message.image,
        }),
        Ok(_) => Inbound::Malformed("empty image".to_string()),
        Err(e) => Inbound::Malformed(format!("image: {e}")),
    }
}
