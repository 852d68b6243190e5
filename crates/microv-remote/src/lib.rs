//! Clients for the remote services behind the inspection client.
//!
//! Wraps the reasoning and detection HTTP endpoints with [`reqwest`] and
//! the live annotation WebSocket with [`tokio_tungstenite`]. Each service
//! is reached through a trait so callers can swap in other transports.

use async_trait::async_trait;

pub mod annotation;
pub mod detection;
pub mod error;
mod http;
pub mod messages;
pub mod reasoning;

pub use annotation::AnnotationClient;
pub use detection::DetectionApi;
pub use error::RemoteError;
pub use http::client_with_timeout;
pub use messages::{AnnotatedFrame, Inbound};
pub use reasoning::ReasoningApi;

/// Describes an image according to a textual instruction
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn analyze(&self, image: &[u8], prompt: &str) -> Result<String, RemoteError>;
}

/// Runs object detection on a still image.
/// `Ok(None)` means the service produced no annotation, which is not an error.
#[async_trait]
pub trait DetectionService: Send + Sync {
    async fn detect(&self, image: &[u8], mime: &str) -> Result<Option<Vec<u8>>, RemoteError>;
}

/// Opens live annotation channels
#[async_trait]
pub trait AnnotationConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn FrameChannel>, RemoteError>;
}

/// An open bidirectional frame channel.
///
/// `next_frame` must be cancel-safe: it is raced against a timer.
#[async_trait]
pub trait FrameChannel: Send {
    async fn send_frame(&mut self, jpeg: &[u8]) -> Result<(), RemoteError>;

    /// Next inbound message; `None` once the channel is closed
    async fn next_frame(&mut self) -> Option<Result<Inbound, RemoteError>>;

    async fn close(&mut self);
}
