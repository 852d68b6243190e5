use image::RgbaImage;
use std::sync::Arc;
use tracing::debug;

use crate::{CaptureError, FrameSize};

/// True for any MIME type in the `image/*` family
pub fn is_image_mime(mime: &str) -> bool {
    mime.trim().to_ascii_lowercase().starts_with("image/")
}

/// A user-supplied still image, validated and decoded.
///
/// The original bytes are kept untouched so the first analysis and the
/// detector both see exactly what the user picked.
#[derive(Debug, Clone)]
pub struct StaticImage {
    bytes: Arc<Vec<u8>>,
    mime: String,
    size: FrameSize,
    decoded: Arc<RgbaImage>,
}

impl StaticImage {
    /// Validate the declared MIME type, then decode to learn native dimensions.
    /// Blocking; large files should go through `spawn_blocking`.
    pub fn decode(bytes: Vec<u8>, mime: &str) -> Result<Self, CaptureError> {
        if !is_image_mime(mime) {
            return Err(CaptureError::NotAnImage(mime.to_string()));
        }

        let decoded = image::load_from_memory(&bytes)
            .map_err(CaptureError::Decode)?
            .to_rgba8();
        let size = FrameSize::of(&decoded);
        if size.is_empty() {
            return Err(CaptureError::NotAnImage(format!("{mime} with zero area")));
        }

        debug!("Decoded {} image: {}x{}", mime, size.width, size.height);

        Ok(Self {
            bytes: Arc::new(bytes),
            mime: mime.to_string(),
            size,
            decoded: Arc::new(decoded),
        })
    }

    pub fn bytes(&self) -> &Arc<Vec<u8>> {
        &self.bytes
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    /// Native resolution, fixed for the lifetime of this image
    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn decoded(&self) -> &Arc<RgbaImage> {
        &self.decoded
    }
}
