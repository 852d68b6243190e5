use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbaImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

pub mod camera;
#[cfg(feature = "camera")]
pub mod native;
pub mod still;

pub use camera::{CameraDevice, CameraHandle, CameraStream, CaptureStatus, Facing};
pub use still::{is_image_mime, StaticImage};

/// Pixel dimensions of a decoded image or camera frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(frame: &RgbaImage) -> Self {
        Self::new(frame.width(), frame.height())
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Rectangle in the native pixel space of a source.
/// Kept fractional until the moment pixels are cut.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NativeRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("not an image: {0}")]
    NotAnImage(String),

    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("failed to encode frame: {0}")]
    Encode(#[source] image::ImageError),

    #[error("region {0:?} does not overlap a {1}x{2} frame")]
    EmptyRegion(NativeRegion, u32, u32),
}

/// Crop a native-space region out of a frame.
///
/// Coordinates are rounded to whole pixels and clamped to the frame; the
/// result is at least 1x1 whenever the region starts inside the frame.
pub fn crop_region(frame: &RgbaImage, region: &NativeRegion) -> Result<RgbaImage, CaptureError> {
    let (w, h) = (frame.width(), frame.height());
    if w == 0 || h == 0 || region.x >= w as f64 || region.y >= h as f64 {
        return Err(CaptureError::EmptyRegion(*region, w, h));
    }

    let x = (region.x.round().max(0.0) as u32).min(w.saturating_sub(1));
    let y = (region.y.round().max(0.0) as u32).min(h.saturating_sub(1));
    let rw = (region.width.round().max(1.0) as u32).min(w - x);
    let rh = (region.height.round().max(1.0) as u32).min(h - y);

    Ok(image::imageops::crop_imm(frame, x, y, rw, rh).to_image())
}

/// Lossy-encode a frame as JPEG. Alpha is dropped.
pub fn encode_jpeg(frame: &RgbaImage, quality: u8) -> Result<Vec<u8>, CaptureError> {
    let rgb = DynamicImage::ImageRgba8(frame.clone()).to_rgb8();
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(&rgb)
        .map_err(CaptureError::Encode)?;
    Ok(buf)
}

/// Read only the header of an encoded image to get its dimensions
pub fn encoded_dimensions(bytes: &[u8]) -> Result<FrameSize, CaptureError> {
    let (width, height) = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| CaptureError::Decode(image::ImageError::IoError(e)))?
        .into_dimensions()
        .map_err(CaptureError::Decode)?;
    Ok(FrameSize::new(width, height))
}
