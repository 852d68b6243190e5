//! Display-space geometry for the inspection client: mapping selections
//! on the rendered surface back to native pixels, placing overlays, and
//! turning pointer/touch gestures into selection rectangles.

pub mod geometry;
pub mod selector;
pub mod transform;

pub use geometry::{DisplayRect, Point, SurfaceSize};
pub use selector::{
    GestureEvent, GestureOutcome, InputKind, ListenerId, ListenerRegistry, Phase, SelectorHandle,
};
pub use transform::{letterbox, to_display, to_native, TransformError};
