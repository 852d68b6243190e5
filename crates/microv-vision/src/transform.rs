use microv_capture::{FrameSize, NativeRegion};

use crate::geometry::{DisplayRect, SurfaceSize};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum TransformError {
    #[error("displayed surface {0:?} has no area")]
    EmptySurface(SurfaceSize),

    #[error("source {}x{} has no area", .0.width, .0.height)]
    EmptySource(FrameSize),
}

/// Per-axis factors from display space to native space
fn scale(displayed: SurfaceSize, native: FrameSize) -> Result<(f64, f64), TransformError> {
    if !displayed.is_usable() {
        return Err(TransformError::EmptySurface(displayed));
    }
    if native.is_empty() {
        return Err(TransformError::EmptySource(native));
    }
    Ok((
        native.width as f64 / displayed.width,
        native.height as f64 / displayed.height,
    ))
}

/// Map a display-space rectangle onto the source's native pixels.
///
/// The axes scale independently, so a source stretched to a different
/// aspect ratio still yields the crop the user saw on screen.
pub fn to_native(
    rect: &DisplayRect,
    displayed: SurfaceSize,
    native: FrameSize,
) -> Result<NativeRegion, TransformError> {
    let (sx, sy) = scale(displayed, native)?;
    Ok(NativeRegion {
        x: rect.x * sx,
        y: rect.y * sy,
        width: rect.width * sx,
        height: rect.height * sy,
    })
}

/// Inverse of [`to_native`]
pub fn to_display(
    region: &NativeRegion,
    displayed: SurfaceSize,
    native: FrameSize,
) -> Result<DisplayRect, TransformError> {
    let (sx, sy) = scale(displayed, native)?;
    Ok(DisplayRect {
        x: region.x / sx,
        y: region.y / sy,
        width: region.width / sx,
        height: region.height / sy,
    })
}

/// Largest placement of `content` inside `surface` that keeps its aspect
/// ratio, centered on the free axis.
pub fn letterbox(content: FrameSize, surface: SurfaceSize) -> Option<DisplayRect> {
    if content.is_empty() || !surface.is_usable() {
        return None;
    }

    let fit = (surface.width / content.width as f64).min(surface.height / content.height as f64);
    let width = content.width as f64 * fit;
    let height = content.height as f64 * fit;

    Some(DisplayRect {
        x: (surface.width - width) / 2.0,
        y: (surface.height - height) / 2.0,
        width,
        height,
    })
}
