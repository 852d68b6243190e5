use std::sync::Arc;
use std::time::Duration;

use image::RgbaImage;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use microv_capture::{encode_jpeg, encoded_dimensions};
use microv_remote::{AnnotatedFrame, FrameChannel, Inbound};
use microv_state::prompts::notices;
use microv_vision::{letterbox, SurfaceSize};

use crate::events::{EventSink, UiEvent};

#[derive(Debug, Clone, Copy)]
pub struct StreamSettings {
    pub interval: Duration,
    /// How long a sent frame may stay unanswered before the session is
    /// given up as stalled
    pub reply_timeout: Duration,
    pub quality: u8,
}

/// Counters reported when a session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub sent: u64,
    pub received: u64,
    pub malformed: u64,
    /// Ticks that found a frame in flight or no frame to send
    pub skipped: u64,
    pub timed_out: u64,
}

/// One live annotation session: an open channel plus the capture cadence.
///
/// At most one frame is in flight. A tick that finds a frame pending is
/// skipped, so a slow annotator costs dropped ticks, never a backlog. An
/// annotator that leaves a frame unanswered past the reply timeout ends
/// the session.
pub struct StreamingSession {
    cancel: CancellationToken,
    task: Option<JoinHandle<StreamStats>>,
}

impl StreamingSession {
    /// Start the cadence over an already opened channel
    pub fn start(
        channel: Box<dyn FrameChannel>,
        frames: watch::Receiver<Option<Arc<RgbaImage>>>,
        surface: watch::Receiver<Option<SurfaceSize>>,
        events: EventSink,
        settings: StreamSettings,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(stream_loop(
            channel,
            frames,
            surface,
            events,
            settings,
            cancel.clone(),
        ));
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// False once the channel has closed or failed
    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel the cadence, close the channel and wait for the loop to exit.
    /// Inbound messages after this point are never rendered.
    pub async fn stop(mut self) -> StreamStats {
        self.cancel.cancel();
        let Some(task) = self.task.take() else {
            return StreamStats::default();
        };
        match task.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Streaming task ended abnormally: {}", e);
                StreamStats::default()
            }
        }
    }
}

impl Drop for StreamingSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn stream_loop(
    mut channel: Box<dyn FrameChannel>,
    frames: watch::Receiver<Option<Arc<RgbaImage>>>,
    surface: watch::Receiver<Option<SurfaceSize>>,
    events: EventSink,
    settings: StreamSettings,
    cancel: CancellationToken,
) -> StreamStats {
    info!(interval = ?settings.interval, "Streaming session started");

    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut pending: Option<Instant> = None;
    let mut stats = StreamStats::default();

    let reason = loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break "stopped",

            inbound = channel.next_frame() => match inbound {
                Some(Ok(Inbound::Frame(frame))) => {
                    pending = None;
                    stats.received += 1;
                    render_overlay(&events, &surface, frame);
                }
                Some(Ok(Inbound::Malformed(reason))) => {
                    // Still a reply: unblock the next tick
                    pending = None;
                    stats.malformed += 1;
                    debug!("Unreadable annotated frame: {}", reason);
                }
                Some(Err(e)) => {
                    warn!("Annotation channel error: {}", e);
                    break "channel error";
                }
                None => break "closed by annotator",
            },

            _ = ticker.tick() => {
                if let Some(sent_at) = pending {
                    if sent_at.elapsed() < settings.reply_timeout {
                        stats.skipped += 1;
                        continue;
                    }
                    // A late reply could still arrive, so no second frame goes out
                    warn!(timeout = ?settings.reply_timeout, "Annotated frame never arrived");
                    stats.timed_out += 1;
                    events.notice(notices::STREAMING_STALLED);
                    break "annotator stopped answering";
                }

                let latest = frames.borrow().clone();
                let Some(frame) = latest else {
                    stats.skipped += 1;
                    continue;
                };

                let quality = settings.quality;
                let encoded =
                    tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality)).await;
                let jpeg = match encoded {
                    Ok(Ok(jpeg)) => jpeg,
                    Ok(Err(e)) => {
                        warn!("Failed to encode frame: {}", e);
                        continue;
                    }
                    Err(e) => {
                        warn!("Frame encoder panicked: {}", e);
                        continue;
                    }
                };

                pending = Some(Instant::now());
                if let Err(e) = channel.send_frame(&jpeg).await {
                    warn!("Failed to send frame: {}", e);
                    break "send failed";
                }
                stats.sent += 1;
            }
        }
    };

    channel.close().await;
    events.emit(UiEvent::OverlayCleared);
    events.emit(UiEvent::StreamingChanged { active: false });

    info!(
        sent = stats.sent,
        received = stats.received,
        skipped = stats.skipped,
        timed_out = stats.timed_out,
        "Streaming session ended: {}",
        reason
    );
    stats
}

/// Show the annotated frame letterboxed inside the displayed surface
fn render_overlay(
    events: &EventSink,
    surface: &watch::Receiver<Option<SurfaceSize>>,
    frame: AnnotatedFrame,
) {
    let displayed = *surface.borrow();
    let placement = match (encoded_dimensions(&frame.bytes), displayed) {
        (Ok(size), Some(surface)) => letterbox(size, surface),
        (Err(e), _) => {
            debug!("Annotated frame has unreadable dimensions: {}", e);
            None
        }
        (Ok(_), None) => None,
    };

    events.emit(UiEvent::Overlay {
        image_base64: frame.base64,
        placement,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use microv_remote::messages::parse_frame;
    use microv_remote::RemoteError;
    use microv_vision::DisplayRect;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Annotator stand-in that answers every frame after a fixed delay.
    /// Tracks how many frames are unanswered at once.
    struct SlowAnnotator {
        delay: Option<Duration>,
        reply: Vec<u8>,
        outstanding: Arc<AtomicUsize>,
        max_outstanding: Arc<AtomicUsize>,
        sends: Arc<Mutex<Vec<Instant>>>,
        reply_tx: mpsc::UnboundedSender<Inbound>,
        reply_rx: mpsc::UnboundedReceiver<Inbound>,
    }

    struct Probe {
        max_outstanding: Arc<AtomicUsize>,
        sends: Arc<Mutex<Vec<Instant>>>,
    }

    fn annotator(delay: Option<Duration>, reply: Vec<u8>) -> (SlowAnnotator, Probe) {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let max_outstanding = Arc::new(AtomicUsize::new(0));
        let sends = Arc::new(Mutex::new(Vec::new()));
        let channel = SlowAnnotator {
            delay,
            reply,
            outstanding: Arc::new(AtomicUsize::new(0)),
            max_outstanding: max_outstanding.clone(),
            sends: sends.clone(),
            reply_tx,
            reply_rx,
        };
        (
            channel,
            Probe {
                max_outstanding,
                sends,
            },
        )
    }

    #[async_trait]
    impl FrameChannel for SlowAnnotator {
        async fn send_frame(&mut self, jpeg: &[u8]) -> Result<(), RemoteError> {
            assert!(!jpeg.is_empty());
            let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_outstanding.fetch_max(now, Ordering::SeqCst);
            self.sends.lock().unwrap().push(Instant::now());

            if let Some(delay) = self.delay {
                let tx = self.reply_tx.clone();
                let text = microv_remote::messages::encode_frame(&self.reply).unwrap();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(parse_frame(&text));
                });
            }
            Ok(())
        }

        async fn next_frame(&mut self) -> Option<Result<Inbound, RemoteError>> {
            let inbound = self.reply_rx.recv().await?;
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            Some(Ok(inbound))
        }

        async fn close(&mut self) {}
    }

    /// Remote side hangs up immediately
    struct ClosedChannel;

    #[async_trait]
    impl FrameChannel for ClosedChannel {
        async fn send_frame(&mut self, _jpeg: &[u8]) -> Result<(), RemoteError> {
            Ok(())
        }

        async fn next_frame(&mut self) -> Option<Result<Inbound, RemoteError>> {
            None
        }

        async fn close(&mut self) {}
    }

    fn settings(interval_ms: u64, timeout_ms: u64) -> StreamSettings {
        StreamSettings {
            interval: Duration::from_millis(interval_ms),
            reply_timeout: Duration::from_millis(timeout_ms),
            quality: 80,
        }
    }

    fn feeds(
        frame: Option<RgbaImage>,
        surface: Option<SurfaceSize>,
    ) -> (
        watch::Sender<Option<Arc<RgbaImage>>>,
        watch::Receiver<Option<Arc<RgbaImage>>>,
        watch::Sender<Option<SurfaceSize>>,
        watch::Receiver<Option<SurfaceSize>>,
    ) {
        let (frame_tx, frame_rx) = watch::channel(frame.map(Arc::new));
        let (surface_tx, surface_rx) = watch::channel(surface);
        (frame_tx, frame_rx, surface_tx, surface_rx)
    }

    fn jpeg(width: u32, height: u32) -> Vec<u8> {
        encode_jpeg(&RgbaImage::new(width, height), 80).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_annotator_gets_one_frame_per_reply() {
        let (channel, probe) = annotator(Some(Duration::from_millis(350)), jpeg(8, 8));
        let (_frame_tx, frames, _surface_tx, surface) = feeds(Some(RgbaImage::new(16, 16)), None);

        let session = StreamingSession::start(
            Box::new(channel),
            frames,
            surface,
            EventSink::new(),
            settings(100, 5000),
        );

        tokio::time::sleep(Duration::from_millis(1050)).await;
        let stats = session.stop().await;

        // Sends at 0, 400 and 800 ms; ticks in between are dropped
        assert_eq!(probe.max_outstanding.load(Ordering::SeqCst), 1);
        assert_eq!(stats.sent, 3);
        assert_eq!(stats.received, 2);
        assert!(stats.skipped >= 6);

        let sends = probe.sends.lock().unwrap();
        for pair in sends.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(350));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_frame_means_no_send() {
        let (channel, probe) = annotator(Some(Duration::from_millis(10)), jpeg(8, 8));
        let (frame_tx, frames, _surface_tx, surface) = feeds(None, None);

        let session = StreamingSession::start(
            Box::new(channel),
            frames,
            surface,
            EventSink::new(),
            settings(100, 5000),
        );

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(probe.sends.lock().unwrap().is_empty());

        // The camera reports its first frame
        frame_tx.send_replace(Some(Arc::new(RgbaImage::new(16, 16))));
        tokio::time::sleep(Duration::from_millis(200)).await;

        let stats = session.stop().await;
        assert!(stats.sent >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_frame_ends_session() {
        let (channel, probe) = annotator(None, Vec::new());
        let (_frame_tx, frames, _surface_tx, surface) = feeds(Some(RgbaImage::new(8, 8)), None);
        let events = EventSink::new();
        let mut rx = events.subscribe();

        let session = StreamingSession::start(
            Box::new(channel),
            frames,
            surface,
            events,
            settings(100, 300),
        );

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(!session.is_active());
        let stats = session.stop().await;

        assert_eq!(stats.timed_out, 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(probe.sends.lock().unwrap().len(), 1);

        let mut stalled = false;
        let mut ended = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                UiEvent::Notice { message, .. } if message == notices::STREAMING_STALLED => {
                    stalled = true
                }
                UiEvent::StreamingChanged { active: false } => ended = true,
                _ => {}
            }
        }
        assert!(stalled && ended);
    }

    #[tokio::test(start_paused = true)]
    async fn test_annotator_slower_than_timeout_never_gets_two_frames() {
        let (channel, probe) = annotator(Some(Duration::from_millis(6000)), jpeg(8, 8));
        let (_frame_tx, frames, _surface_tx, surface) = feeds(Some(RgbaImage::new(16, 16)), None);

        let session = StreamingSession::start(
            Box::new(channel),
            frames,
            surface,
            EventSink::new(),
            settings(100, 5000),
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        let stats = session.stop().await;

        assert_eq!(probe.max_outstanding.load(Ordering::SeqCst), 1);
        assert_eq!(stats.sent, 1);
        assert_eq!(stats.received, 0);
        assert_eq!(stats.timed_out, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_overlay_after_stop() {
        let (channel, _probe) = annotator(Some(Duration::from_millis(50)), jpeg(8, 8));
        let (_frame_tx, frames, _surface_tx, surface) = feeds(
            Some(RgbaImage::new(16, 16)),
            Some(SurfaceSize::new(100.0, 100.0)),
        );
        let events = EventSink::new();
        let mut rx = events.subscribe();

        let session = StreamingSession::start(
            Box::new(channel),
            frames,
            surface,
            events,
            settings(100, 5000),
        );

        // Frames go out at 0 and 100 ms; the second reply is due at 150 ms
        tokio::time::sleep(Duration::from_millis(120)).await;
        let stats = session.stop().await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(stats.sent, 2);

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(event);
        }
        let ended = seen
            .iter()
            .position(|e| matches!(e, UiEvent::StreamingChanged { active: false }))
            .unwrap();
        assert_eq!(
            seen[..ended]
                .iter()
                .filter(|e| matches!(e, UiEvent::Overlay { .. }))
                .count(),
            1
        );
        assert!(!seen[ended..]
            .iter()
            .any(|e| matches!(e, UiEvent::Overlay { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_is_letterboxed() {
        let (channel, _probe) = annotator(Some(Duration::from_millis(50)), jpeg(200, 100));
        let (_frame_tx, frames, _surface_tx, surface) = feeds(
            Some(RgbaImage::new(16, 16)),
            Some(SurfaceSize::new(500.0, 500.0)),
        );
        let events = EventSink::new();
        let mut rx = events.subscribe();

        let session = StreamingSession::start(
            Box::new(channel),
            frames,
            surface,
            events,
            settings(100, 5000),
        );

        let placement = loop {
            match rx.recv().await.unwrap() {
                UiEvent::Overlay { placement, .. } => break placement,
                _ => continue,
            }
        };
        assert_eq!(
            placement,
            Some(DisplayRect {
                x: 0.0,
                y: 125.0,
                width: 500.0,
                height: 250.0,
            })
        );

        session.stop().await;
        let mut cleared = false;
        while let Ok(event) = rx.try_recv() {
            if matches!(event, UiEvent::StreamingChanged { active: false }) {
                cleared = true;
            }
        }
        assert!(cleared);
    }

    #[tokio::test]
    async fn test_remote_close_ends_session() {
        let (_frame_tx, frames, _surface_tx, surface) = feeds(None, None);
        let events = EventSink::new();
        let mut rx = events.subscribe();

        let session = StreamingSession::start(
            Box::new(ClosedChannel),
            frames,
            surface,
            events,
            settings(100, 5000),
        );

        let ended = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let UiEvent::StreamingChanged { active: false } = rx.recv().await.unwrap() {
                    break;
                }
            }
        })
        .await;
        assert!(ended.is_ok());

        tokio::time::timeout(Duration::from_secs(2), async {
            while session.is_active() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let stats = session.stop().await;
        assert_eq!(stats.sent, 0);
    }
}
