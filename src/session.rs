use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::RgbaImage;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use microv_capture::{
    crop_region, encode_jpeg, is_image_mime, CameraDevice, CameraHandle, CaptureError,
    CaptureStatus, Facing, FrameSize, StaticImage,
};
use microv_remote::{
    client_with_timeout, AnnotationClient, AnnotationConnector, DetectionApi, DetectionService,
    ReasoningApi, ReasoningService, RemoteError,
};
use microv_state::prompts::{self, notices, QuickPrompt};
use microv_state::{Mode, Transcript, TranscriptEntry, ViewFlags};
use microv_vision::{
    to_native, DisplayRect, GestureEvent, GestureOutcome, ListenerRegistry, SelectorHandle,
    SurfaceSize, TransformError,
};

use crate::analysis::{lock, AnalysisPipeline, PendingAnalysis, SharedTranscript};
use crate::config::ClientConfig;
use crate::events::{EventSink, SourceId, UiEvent};
use crate::streaming::{StreamSettings, StreamingSession};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not an image: {0}")]
    NotAnImage(String),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("camera unavailable: {0}")]
    Camera(String),

    #[error("no image or camera is active")]
    NoSource,

    #[error("real-time annotation needs a running camera")]
    NoCamera,

    #[error("the displayed surface size is unknown")]
    NoSurface,

    #[error("no camera frame available yet")]
    FrameNotReady,

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// External collaborators of a session
#[derive(Clone)]
pub struct Services {
    pub reasoning: Arc<dyn ReasoningService>,
    pub detection: Arc<dyn DetectionService>,
    pub annotation: Arc<dyn AnnotationConnector>,
    pub camera: Arc<dyn CameraDevice>,
}

impl Services {
    /// HTTP/WebSocket clients for the configured backend, plus the local camera
    pub fn from_config(config: &ClientConfig) -> Self {
        let http = client_with_timeout(config.request_timeout);
        Self {
            reasoning: Arc::new(ReasoningApi::with_client(http.clone(), config.api_url.clone())),
            detection: Arc::new(DetectionApi::with_client(http, config.api_url.clone())),
            annotation: Arc::new(AnnotationClient::new(config.ws_url.clone())),
            camera: default_camera(config),
        }
    }
}

#[cfg(feature = "camera")]
fn default_camera(config: &ClientConfig) -> Arc<dyn CameraDevice> {
    Arc::new(microv_capture::native::NativeCamera::new(config.camera_index))
}

#[cfg(not(feature = "camera"))]
fn default_camera(_config: &ClientConfig) -> Arc<dyn CameraDevice> {
    Arc::new(NoCamera)
}

#[cfg(not(feature = "camera"))]
struct NoCamera;

#[cfg(not(feature = "camera"))]
impl CameraDevice for NoCamera {
    fn open(&self, _facing: Facing) -> anyhow::Result<Box<dyn microv_capture::CameraStream>> {
        anyhow::bail!("built without camera support (enable the `camera` feature)")
    }
}

enum ActiveSource {
    Still { id: SourceId, image: StaticImage },
    Live { id: SourceId, camera: CameraHandle },
}

impl ActiveSource {
    fn id(&self) -> SourceId {
        match self {
            ActiveSource::Still { id, .. } | ActiveSource::Live { id, .. } => *id,
        }
    }

    fn mode(&self) -> Mode {
        match self {
            ActiveSource::Still { .. } => Mode::StaticImage,
            ActiveSource::Live { .. } => Mode::RealtimeVideo,
        }
    }
}

/// What the detector has put on screen, shared with in-flight detections
#[derive(Debug, Default)]
struct DetectionView {
    current: Option<SourceId>,
    annotated: Option<SourceId>,
}

fn lock_view(view: &Mutex<DetectionView>) -> MutexGuard<'_, DetectionView> {
    view.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Controller for one client window.
///
/// The mode is never stored: it is derived from the active source, which
/// only this type creates and destroys. Starting a new source always tears
/// the previous one down first (streaming, selector, camera, in that order).
pub struct Session {
    config: ClientConfig,
    services: Services,
    events: EventSink,
    analysis: AnalysisPipeline,
    source: Option<ActiveSource>,
    next_source: u64,
    streaming: Option<StreamingSession>,
    listeners: ListenerRegistry,
    selector: Option<SelectorHandle>,
    flags: ViewFlags,
    surface: watch::Sender<Option<SurfaceSize>>,
    detection_view: Arc<Mutex<DetectionView>>,
    status_forwarder: Option<JoinHandle<()>>,
}

impl Session {
    pub fn new(config: ClientConfig, services: Services) -> Self {
        let events = EventSink::new();
        let transcript: SharedTranscript = Arc::new(Mutex::new(Transcript::new()));
        let analysis =
            AnalysisPipeline::new(services.reasoning.clone(), transcript, events.clone());
        let (surface, _) = watch::channel(None);

        Self {
            config,
            services,
            events,
            analysis,
            source: None,
            next_source: 0,
            streaming: None,
            listeners: ListenerRegistry::new(),
            selector: None,
            flags: ViewFlags::default(),
            surface,
            detection_view: Arc::new(Mutex::new(DetectionView::default())),
            status_forwarder: None,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UiEvent> {
        self.events.subscribe()
    }

    pub fn mode(&self) -> Mode {
        self.source.as_ref().map_or(Mode::Welcome, ActiveSource::mode)
    }

    /// The overlay is visible exactly while a streaming session is live;
    /// one the annotator has closed counts as off.
    pub fn flags(&self) -> ViewFlags {
        ViewFlags {
            overlay_visible: self.streaming_active(),
            ..self.flags
        }
    }

    pub fn transcript(&self) -> Vec<TranscriptEntry> {
        lock(self.analysis.transcript()).entries().to_vec()
    }

    pub fn streaming_active(&self) -> bool {
        self.streaming.as_ref().is_some_and(StreamingSession::is_active)
    }

    pub fn camera_status(&self) -> Option<CaptureStatus> {
        match &self.source {
            Some(ActiveSource::Live { camera, .. }) => Some(camera.status()),
            _ => None,
        }
    }

    /// Validate and decode a user-picked file, replace the current source
    /// with it, and request the initial whole-image analysis.
    ///
    /// On a validation failure a notice is shown and the mode is unchanged.
    pub async fn load_static_image(
        &mut self,
        bytes: Vec<u8>,
        mime: &str,
    ) -> Result<PendingAnalysis, SessionError> {
        if !is_image_mime(mime) {
            warn!(mime, "Rejected non-image file");
            self.events.notice(notices::UNSUPPORTED_FILE);
            return Err(SessionError::NotAnImage(mime.to_string()));
        }

        let declared = mime.to_string();
        let decoded =
            tokio::task::spawn_blocking(move || StaticImage::decode(bytes, &declared)).await?;
        let image = match decoded {
            Ok(image) => image,
            Err(e) => {
                warn!("Rejected image file: {}", e);
                self.events.notice(notices::UNSUPPORTED_FILE);
                return Err(e.into());
            }
        };

        self.teardown().await;

        let id = self.allocate_source_id();
        let size = image.size();
        info!(source_id = %id, "Static image loaded: {}x{}", size.width, size.height);

        self.events.emit(UiEvent::SourceImage {
            source: id,
            image_base64: BASE64.encode(image.bytes().as_slice()),
            annotated: false,
        });

        let original = image.bytes().to_vec();
        self.set_source(ActiveSource::Still { id, image });

        Ok(self.analysis.analyze(original, prompts::WHOLE_IMAGE))
    }

    /// Open the rear camera and switch to live video. Streaming stays off
    /// until [`Session::toggle_streaming`].
    pub async fn start_camera(&mut self) -> Result<Mode, SessionError> {
        if matches!(self.source, Some(ActiveSource::Live { .. })) {
            debug!("Camera already running");
            return Ok(Mode::RealtimeVideo);
        }

        // Open first: on failure the current source stays untouched
        let device = self.services.camera.clone();
        let opened = tokio::task::spawn_blocking(move || device.open(Facing::Environment)).await?;
        let stream = match opened {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Camera unavailable: {:#}", e);
                self.events.notice(notices::CAMERA_FAILED);
                return Err(SessionError::Camera(e.to_string()));
            }
        };

        self.teardown().await;

        let camera = CameraHandle::start(stream, self.config.camera_interval());
        let id = self.allocate_source_id();
        info!(source_id = %id, resolution = ?camera.resolution(), "Camera started");

        self.status_forwarder = Some(forward_status(camera.status_feed(), self.events.clone()));
        self.set_source(ActiveSource::Live { id, camera });
        Ok(Mode::RealtimeVideo)
    }

    /// Release the camera and return to the welcome screen. A no-op unless
    /// a camera is running.
    pub async fn stop_camera(&mut self) -> Mode {
        if !matches!(self.source, Some(ActiveSource::Live { .. })) {
            debug!("stop_camera: no camera active");
            return self.mode();
        }

        self.teardown().await;
        self.events.emit(UiEvent::ModeChanged {
            mode: Mode::Welcome,
        });
        Mode::Welcome
    }

    /// Start or stop live annotation. Returns whether streaming is now on.
    pub async fn toggle_streaming(&mut self) -> Result<bool, SessionError> {
        let frames = match &self.source {
            Some(ActiveSource::Live { camera, .. }) => camera.feed(),
            _ => {
                self.events.notice(notices::STREAMING_NEEDS_CAMERA);
                return Err(SessionError::NoCamera);
            }
        };

        if let Some(streaming) = self.streaming.take() {
            let was_active = streaming.is_active();
            let stats = streaming.stop().await;
            if was_active {
                info!(sent = stats.sent, received = stats.received, "Streaming toggled off");
                return Ok(false);
            }
            debug!("Previous streaming session had already ended");
        }

        let channel = match self.services.annotation.connect().await {
            Ok(channel) => channel,
            Err(e) => {
                warn!("Could not open annotation channel: {}", e);
                self.events.notice(notices::STREAMING_FAILED);
                return Err(e.into());
            }
        };

        let settings = StreamSettings {
            interval: self.config.frame_interval,
            reply_timeout: self.config.frame_timeout,
            quality: self.config.stream_quality,
        };

        self.events
            .emit(UiEvent::StreamingChanged { active: true });
        self.streaming = Some(StreamingSession::start(
            channel,
            frames,
            self.surface.subscribe(),
            self.events.clone(),
            settings,
        ));
        Ok(true)
    }

    /// The scan button: detector round-trip for a still image, live
    /// annotation for the camera.
    pub async fn toggle_scan(&mut self) -> Result<(), SessionError> {
        let still = match &self.source {
            None => {
                self.events.notice(notices::SCAN_NEEDS_SOURCE);
                return Err(SessionError::NoSource);
            }
            Some(ActiveSource::Still { id, image }) => Some((*id, image.clone())),
            Some(ActiveSource::Live { .. }) => None,
        };

        let Some((id, image)) = still else {
            let active = self.toggle_streaming().await?;
            self.events.notice(if active {
                notices::STREAMING_ON
            } else {
                notices::STREAMING_OFF
            });
            return Ok(());
        };

        let reverting = {
            let mut view = lock_view(&self.detection_view);
            let showing = view.annotated == Some(id);
            if showing {
                view.annotated = None;
            }
            showing
        };
        if reverting {
            self.events.emit(UiEvent::SourceImage {
                source: id,
                image_base64: BASE64.encode(image.bytes().as_slice()),
                annotated: false,
            });
            return Ok(());
        }

        self.events.transient_notice(notices::DETECTING);
        spawn_detection(
            self.services.detection.clone(),
            self.detection_view.clone(),
            self.events.clone(),
            id,
            image,
        );
        Ok(())
    }

    /// Enable the region selector, or disable it if it is on. Returns
    /// whether the selector is now enabled.
    ///
    /// `surface` is the on-screen box of the displayed source; when absent
    /// the last size from [`Session::set_surface_size`] is used.
    pub fn toggle_region_selector(
        &mut self,
        surface: Option<SurfaceSize>,
    ) -> Result<bool, SessionError> {
        if self.disable_selector() {
            self.events.notice(notices::SELECTOR_OFF);
            return Ok(false);
        }

        if !self.mode().has_source() {
            self.events.notice(notices::NO_SOURCE);
            return Err(SessionError::NoSource);
        }

        if let Some(size) = surface {
            self.set_surface_size(size);
        }
        let current = *self.surface.borrow();
        let Some(surface) = current.filter(SurfaceSize::is_usable) else {
            self.events.notice(notices::NO_SURFACE);
            return Err(SessionError::NoSurface);
        };

        self.selector = Some(SelectorHandle::enable(
            &mut self.listeners,
            surface,
            self.config.min_selection,
        ));
        self.flags.selector_enabled = true;
        self.events.emit(UiEvent::SelectorChanged {
            enabled: true,
            surface: Some(surface),
        });
        self.events.notice(notices::SELECTOR_ON);
        Ok(true)
    }

    /// Feed one pointer/touch event to the selector. A completed selection
    /// is cropped at native resolution and sent for analysis.
    pub async fn handle_gesture(
        &mut self,
        event: GestureEvent,
    ) -> Result<GestureOutcome, SessionError> {
        let Some(selector) = self.selector.as_mut() else {
            return Ok(GestureOutcome::Ignored);
        };
        let outcome = selector.handle(&self.listeners, event);
        let surface = selector.surface();

        match outcome {
            GestureOutcome::Ignored => {}
            GestureOutcome::Started => self.events.emit(UiEvent::SelectionPreview { rect: None }),
            GestureOutcome::Preview(rect) => self
                .events
                .emit(UiEvent::SelectionPreview { rect: Some(rect) }),
            GestureOutcome::TooSmall(rect) => {
                debug!(?rect, "Selection too small, discarded");
                self.events.emit(UiEvent::SelectionPreview { rect: None });
                self.events.notice(notices::SELECTION_TOO_SMALL);
            }
            GestureOutcome::Selected(rect) => {
                if let Err(e) = self.analyze_region(rect, surface).await {
                    warn!(?rect, "Region analysis not sent: {}", e);
                    return Err(e);
                }
            }
        }
        Ok(outcome)
    }

    /// Send one of the fixed-instruction prompts with the whole current source
    pub async fn quick_prompt(&mut self, kind: QuickPrompt) -> Result<PendingAnalysis, SessionError> {
        let (frame, _) = self.current_frame()?;
        let quality = self.config.snapshot_quality;
        let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality)).await??;
        Ok(self.analysis.analyze(jpeg, kind.instruction()))
    }

    pub fn toggle_chat_panel(&mut self) -> bool {
        self.flags.chat_visible = !self.flags.chat_visible;
        self.events.emit(UiEvent::ChatPanel {
            visible: self.flags.chat_visible,
        });
        self.flags.chat_visible
    }

    /// Record the on-screen box of the displayed source
    pub fn set_surface_size(&mut self, size: SurfaceSize) -> bool {
        if !size.is_usable() {
            debug!(?size, "Ignoring unusable surface size");
            return false;
        }
        self.surface.send_replace(Some(size));
        true
    }

    /// Latest camera frame as JPEG for the live preview
    pub async fn preview_frame(&self) -> Result<Option<Vec<u8>>, SessionError> {
        let Some(ActiveSource::Live { camera, .. }) = &self.source else {
            return Ok(None);
        };
        let Some(frame) = camera.latest_frame() else {
            return Ok(None);
        };
        let quality = self.config.stream_quality;
        let jpeg = tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality)).await??;
        Ok(Some(jpeg))
    }

    /// Release everything; used when the window closes
    pub async fn shutdown(&mut self) {
        self.teardown().await;
        info!("Session shut down");
    }

    async fn analyze_region(
        &mut self,
        rect: DisplayRect,
        surface: SurfaceSize,
    ) -> Result<PendingAnalysis, SessionError> {
        let (frame, native) = self.current_frame()?;
        let region = to_native(&rect, surface, native)?;
        debug!(?rect, ?region, "Selection mapped to native pixels");

        let quality = self.config.crop_quality;
        let jpeg = tokio::task::spawn_blocking(move || {
            let crop = crop_region(&frame, &region)?;
            encode_jpeg(&crop, quality)
        })
        .await??;

        Ok(self.analysis.analyze(jpeg, prompts::REGION))
    }

    /// The active source's pixels at native resolution
    fn current_frame(&self) -> Result<(Arc<RgbaImage>, FrameSize), SessionError> {
        match &self.source {
            Some(ActiveSource::Still { image, .. }) => Ok((image.decoded().clone(), image.size())),
            Some(ActiveSource::Live { camera, .. }) => match camera.latest_frame() {
                Some(frame) => {
                    let size = FrameSize::of(&frame);
                    Ok((frame, size))
                }
                None => {
                    self.events.notice(notices::VIDEO_NOT_READY);
                    Err(SessionError::FrameNotReady)
                }
            },
            None => {
                self.events.notice(notices::NO_SOURCE);
                Err(SessionError::NoSource)
            }
        }
    }

    fn allocate_source_id(&mut self) -> SourceId {
        self.next_source += 1;
        SourceId(self.next_source)
    }

    fn set_source(&mut self, source: ActiveSource) {
        {
            let mut view = lock_view(&self.detection_view);
            view.current = Some(source.id());
            view.annotated = None;
        }
        self.source = Some(source);
        self.events.emit(UiEvent::ModeChanged { mode: self.mode() });
    }

    fn disable_selector(&mut self) -> bool {
        let Some(selector) = self.selector.take() else {
            return false;
        };
        selector.disable(&mut self.listeners);
        self.flags.selector_enabled = false;
        self.events.emit(UiEvent::SelectorChanged {
            enabled: false,
            surface: None,
        });
        self.events.emit(UiEvent::SelectionPreview { rect: None });
        true
    }

    /// Stop streaming, detach the selector and release the camera
    async fn teardown(&mut self) {
        if let Some(streaming) = self.streaming.take() {
            let stats = streaming.stop().await;
            debug!(sent = stats.sent, "Streaming stopped with its source");
        }
        self.disable_selector();

        if let Some(forwarder) = self.status_forwarder.take() {
            forwarder.abort();
        }

        if let Some(source) = self.source.take() {
            let id = source.id();
            if let ActiveSource::Live { camera, .. } = source {
                camera.release().await;
                self.events
                    .emit(UiEvent::CameraStatus(CaptureStatus::default()));
            }
            debug!(source_id = %id, "Source released");
        }

        let mut view = lock_view(&self.detection_view);
        view.current = None;
        view.annotated = None;
    }
}

/// Forward camera status changes to the UI until the pump ends
fn forward_status(mut status: watch::Receiver<CaptureStatus>, events: EventSink) -> JoinHandle<()> {
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            events.emit(UiEvent::CameraStatus(current));
        }
    })
}

/// Run the detector in the background. The result is shown only if the
/// image that requested it is still the one on screen.
fn spawn_detection(
    detection: Arc<dyn DetectionService>,
    view: Arc<Mutex<DetectionView>>,
    events: EventSink,
    id: SourceId,
    image: StaticImage,
) {
    tokio::spawn(async move {
        let result = detection.detect(image.bytes(), image.mime()).await;
        events.emit(UiEvent::NoticeCleared);

        {
            let mut view = lock_view(&view);
            if view.current != Some(id) {
                debug!(source_id = %id, "Dropping detection result for a replaced image");
                return;
            }
            if let Ok(Some(_)) = &result {
                view.annotated = Some(id);
            }
        }

        match result {
            Ok(Some(annotated)) => {
                info!(source_id = %id, bytes = annotated.len(), "Detection annotated the image");
                events.emit(UiEvent::SourceImage {
                    source: id,
                    image_base64: BASE64.encode(&annotated),
                    annotated: true,
                });
                events.notice(notices::DETECTION_DONE);
            }
            Ok(None) => {
                info!(source_id = %id, "Detection produced no annotation");
                events.notice(notices::DETECTION_DONE);
            }
            Err(e) => {
                warn!(source_id = %id, "Detection failed: {}", e);
                events.notice(notices::DETECTION_FAILED);
            }
        }
    });
}
