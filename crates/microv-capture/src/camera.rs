use anyhow::Result;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::FrameSize;

/// Which way the requested camera should face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    /// Rear camera, pointed at the sample
    Environment,
    User,
}

/// A camera that can be opened. Opening may block on a permission prompt.
pub trait CameraDevice: Send + Sync {
    fn open(&self, facing: Facing) -> Result<Box<dyn CameraStream>>;
}

/// An open camera. Frames are pulled one at a time.
pub trait CameraStream: Send {
    /// Native frame size, once the device has reported it
    fn resolution(&self) -> Option<FrameSize>;

    fn grab(&mut self) -> Result<RgbaImage>;

    /// Give the device back. Called exactly once, by the pump, on shutdown.
    fn release(&mut self);
}

/// Status of the camera pump
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureStatus {
    pub is_capturing: bool,
    pub fps: f64,
    pub last_capture_time: Option<u64>,
    pub resolution: Option<(u32, u32)>,
}

type FrameFeed = watch::Receiver<Option<Arc<RgbaImage>>>;

/// Exclusive owner of an open camera.
///
/// A background pump pulls frames at the preview rate and publishes the
/// latest one; readers never touch the device directly.
pub struct CameraHandle {
    stop: Arc<AtomicBool>,
    frame_rx: FrameFeed,
    status_rx: watch::Receiver<CaptureStatus>,
    task: Option<JoinHandle<()>>,
}

impl CameraHandle {
    /// Start pumping frames from an already opened stream.
    /// Must be called inside a tokio runtime.
    pub fn start(stream: Box<dyn CameraStream>, interval: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let initial = stream.resolution();
        let (frame_tx, frame_rx) = watch::channel::<Option<Arc<RgbaImage>>>(None);
        let (status_tx, status_rx) = watch::channel(CaptureStatus {
            resolution: initial.map(|s| (s.width, s.height)),
            ..CaptureStatus::default()
        });

        let task = tokio::spawn(pump(stream, frame_tx, status_tx, interval, stop.clone()));

        Self {
            stop,
            frame_rx,
            status_rx,
            task: Some(task),
        }
    }

    /// Subscribe to the latest-frame feed
    pub fn feed(&self) -> FrameFeed {
        self.frame_rx.clone()
    }

    pub fn latest_frame(&self) -> Option<Arc<RgbaImage>> {
        self.frame_rx.borrow().clone()
    }

    /// Native resolution from camera metadata, `None` until known
    pub fn resolution(&self) -> Option<FrameSize> {
        self.status_rx
            .borrow()
            .resolution
            .map(|(w, h)| FrameSize::new(w, h))
    }

    pub fn status(&self) -> CaptureStatus {
        self.status_rx.borrow().clone()
    }

    pub fn status_feed(&self) -> watch::Receiver<CaptureStatus> {
        self.status_rx.clone()
    }

    /// Stop the pump and wait until the device has been released
    pub async fn release(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Camera pump ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for CameraHandle {
    fn drop(&mut self) {
        // The pump notices on its next iteration and releases the device
        self.stop.store(true, Ordering::Relaxed);
    }
}

/// Pull frames until stopped, then release the device
async fn pump(
    mut stream: Box<dyn CameraStream>,
    frame_tx: watch::Sender<Option<Arc<RgbaImage>>>,
    status_tx: watch::Sender<CaptureStatus>,
    interval: Duration,
    stop: Arc<AtomicBool>,
) {
    info!("Camera pump started, interval: {:?}", interval);

    let mut frame_count = 0u64;
    let mut fps_timer = Instant::now();

    loop {
        if stop.load(Ordering::Relaxed) {
            debug!("Camera pump stopping (stop signal received)");
            break;
        }

        let tick_start = Instant::now();

        // Grab on a blocking thread; the stream travels there and back
        let grabbed = tokio::task::spawn_blocking(move || {
            let result = stream.grab();
            (stream, result)
        })
        .await;

        match grabbed {
            Ok((s, Ok(frame))) => {
                stream = s;
                let resolution = stream
                    .resolution()
                    .unwrap_or_else(|| FrameSize::of(&frame));
                frame_count += 1;

                let elapsed = fps_timer.elapsed().as_secs_f64();
                let fps = if elapsed > 0.0 {
                    frame_count as f64 / elapsed
                } else {
                    0.0
                };
                if elapsed > 5.0 {
                    frame_count = 0;
                    fps_timer = Instant::now();
                }

                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_millis() as u64;

                let _ = status_tx.send(CaptureStatus {
                    is_capturing: true,
                    fps,
                    last_capture_time: Some(now),
                    resolution: Some((resolution.width, resolution.height)),
                });
                let _ = frame_tx.send(Some(Arc::new(frame)));
            }
            Ok((s, Err(e))) => {
                stream = s;
                warn!("Camera grab failed: {}", e);
            }
            Err(e) => {
                // The stream went down with the panicked task
                warn!("Camera grab task panicked: {}", e);
                let _ = status_tx.send(CaptureStatus::default());
                return;
            }
        }

        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            tokio::time::sleep(interval - elapsed).await;
        } else {
            tokio::task::yield_now().await;
        }
    }

    stream.release();
    let _ = frame_tx.send(None);
    let _ = status_tx.send(CaptureStatus::default());
    info!("Camera pump stopped, device released");
}
