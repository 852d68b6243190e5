//! WebSocket channel to the live frame annotator.
//!
//! [`AnnotationClient`] holds the endpoint; each call to
//! [`AnnotationConnector::connect`] opens a fresh channel. Outbound and
//! inbound messages are both `{"image": "<base64>"}` text frames.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::RemoteError;
use crate::messages::{encode_frame, parse_frame, Inbound};
use crate::{AnnotationConnector, FrameChannel};

pub struct AnnotationClient {
    ws_url: String,
}

impl AnnotationClient {
    /// * `ws_url` - full channel URL, e.g. `ws://localhost:8000/ws`.
    pub fn new(ws_url: String) -> Self {
        Self { ws_url }
    }
}

#[async_trait]
impl AnnotationConnector for AnnotationClient {
    async fn connect(&self) -> Result<Box<dyn FrameChannel>, RemoteError> {
        let (ws_stream, _response) = connect_async(self.ws_url.as_str()).await.map_err(|e| {
            RemoteError::Connection(format!(
                "Failed to connect to annotator at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::info!("Connected to annotator at {}", self.ws_url);
        Ok(Box::new(WsFrameChannel { ws_stream }))
    }
}

struct WsFrameChannel {
    ws_stream: WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>,
}

#[async_trait]
impl FrameChannel for WsFrameChannel {
    async fn send_frame(&mut self, jpeg: &[u8]) -> Result<(), RemoteError> {
        let text = encode_frame(jpeg)?;
        self.ws_stream
            .send(Message::Text(text))
            .await
            .map_err(|e| RemoteError::Channel(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<Inbound, RemoteError>> {
        while let Some(msg_result) = self.ws_stream.next().await {
            match msg_result {
                Ok(Message::Text(text)) => return Some(Ok(parse_frame(&text))),
                Ok(Message::Binary(bytes)) => {
                    let inbound = match std::str::from_utf8(&bytes) {
                        Ok(text) => parse_frame(text),
                        Err(_) => Inbound::Malformed("binary frame".to_string()),
                    };
                    return Some(Ok(inbound));
                }
                Ok(Message::Ping(_) | Message::Pong(_)) => {
                    // Handled automatically by tungstenite.
                }
                Ok(Message::Close(frame)) => {
                    tracing::info!(?frame, "Annotator closed the channel");
                    return None;
                }
                Ok(Message::Frame(_)) => {}
                Err(e) => return Some(Err(RemoteError::Channel(e.to_string()))),
            }
        }
        None
    }

    async fn close(&mut self) {
        if let Err(e) = self.ws_stream.close(None).await {
            tracing::debug!(error = %e, "Annotation channel close was not clean");
        }
    }
}
