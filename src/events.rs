use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use microv_capture::CaptureStatus;
use microv_state::{Mode, TranscriptEntry};
use microv_vision::{DisplayRect, SurfaceSize};

/// Name under which the desktop shell forwards every [`UiEvent`]
pub const EVENT_NAME: &str = "microv-event";

const CHANNEL_CAPACITY: usize = 256;

/// Identity of one active source instance. A new image or camera start
/// always gets a fresh id, even when the mode stays the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SourceId(pub u64);

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Everything the presentation layer needs to render
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum UiEvent {
    ModeChanged {
        mode: Mode,
    },
    /// A user-facing message. Transient notices are followed by
    /// [`UiEvent::NoticeCleared`].
    Notice {
        message: String,
        transient: bool,
    },
    NoticeCleared,
    /// The still image to display, original or annotated by the detector
    SourceImage {
        source: SourceId,
        image_base64: String,
        annotated: bool,
    },
    /// Latest annotated frame from the live channel
    Overlay {
        image_base64: String,
        placement: Option<DisplayRect>,
    },
    OverlayCleared,
    StreamingChanged {
        active: bool,
    },
    SelectorChanged {
        enabled: bool,
        surface: Option<SurfaceSize>,
    },
    SelectionPreview {
        rect: Option<DisplayRect>,
    },
    TranscriptAppended {
        entry: TranscriptEntry,
    },
    TranscriptUpdated {
        entry: TranscriptEntry,
    },
    ChatPanel {
        visible: bool,
    },
    CameraStatus(CaptureStatus),
}

/// Cloneable sending half of the UI event stream
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: broadcast::Sender<UiEvent>,
}

impl EventSink {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.tx.subscribe()
    }

    /// Publish an event. Having no subscriber is not an error.
    pub fn emit(&self, event: UiEvent) {
        if self.tx.send(event).is_err() {
            trace!("UI event dropped, no subscribers");
        }
    }

    pub fn notice(&self, message: &str) {
        self.emit(UiEvent::Notice {
            message: message.to_string(),
            transient: false,
        });
    }

    pub fn transient_notice(&self, message: &str) {
        self.emit(UiEvent::Notice {
            message: message.to_string(),
            transient: true,
        });
    }
}

impl Default for EventSink {
    fn default() -> Self {
        Self::new()
    }
}
