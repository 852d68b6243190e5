//! Platform camera backend built on `nokhwa`.
//!
//! The `nokhwa` handle is not `Send` on every platform, so it lives on a
//! dedicated thread; [`NativeStream`] talks to that thread over channels.

use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, RgbImage, RgbaImage};
use nokhwa::pixel_format::RgbFormat;
use nokhwa::utils::{CameraIndex, RequestedFormat, RequestedFormatType};
use nokhwa::Camera;
use std::sync::mpsc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

use crate::camera::{CameraDevice, CameraStream, Facing};
use crate::FrameSize;

/// Opens the camera at a fixed device index
pub struct NativeCamera {
    index: u32,
}

impl NativeCamera {
    pub fn new(index: u32) -> Self {
        Self { index }
    }
}

enum Request {
    Grab(mpsc::Sender<Result<RgbaImage>>),
    Stop,
}

impl CameraDevice for NativeCamera {
    fn open(&self, facing: Facing) -> Result<Box<dyn CameraStream>> {
        // Desktop backends do not report facing; the configured index decides
        debug!("Opening camera {} (requested {:?})", self.index, facing);

        let index = self.index;
        let (ready_tx, ready_rx) = mpsc::channel::<Result<FrameSize>>();
        let (request_tx, request_rx) = mpsc::channel::<Request>();

        let worker = std::thread::Builder::new()
            .name(format!("camera-{index}"))
            .spawn(move || camera_thread(index, ready_tx, request_rx))
            .context("Failed to spawn camera thread")?;

        let resolution = ready_rx
            .recv()
            .map_err(|_| anyhow!("Camera thread exited during startup"))??;
        info!(
            "Camera {} streaming at {}x{}",
            index, resolution.width, resolution.height
        );

        Ok(Box::new(NativeStream {
            requests: request_tx,
            resolution,
            worker: Some(worker),
        }))
    }
}

fn camera_thread(index: u32, ready: mpsc::Sender<Result<FrameSize>>, requests: mpsc::Receiver<Request>) {
    let mut camera = match open_camera(index) {
        Ok(camera) => camera,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    let res = camera.resolution();
    let _ = ready.send(Ok(FrameSize::new(res.width(), res.height())));

    while let Ok(Request::Grab(reply)) = requests.recv() {
        let _ = reply.send(grab_frame(&mut camera));
    }

    if let Err(e) = camera.stop_stream() {
        warn!("Failed to stop camera stream: {}", e);
    }
    debug!("Camera {} thread stopped", index);
}

fn open_camera(index: u32) -> Result<Camera> {
    let requested =
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution);
    let mut camera = Camera::new(CameraIndex::Index(index), requested)
        .with_context(|| format!("Failed to open camera {index}"))?;
    camera
        .open_stream()
        .context("Failed to start camera stream")?;
    Ok(camera)
}

fn grab_frame(camera: &mut Camera) -> Result<RgbaImage> {
    let buffer = camera.frame().context("Failed to read camera frame")?;
    let rgb = buffer
        .decode_image::<RgbFormat>()
        .context("Failed to decode camera frame")?;
    // Rebuilt from raw bytes: nokhwa may link a different `image` release
    let (width, height) = (rgb.width(), rgb.height());
    let rgb = RgbImage::from_raw(width, height, rgb.into_raw())
        .context("Camera frame buffer has unexpected size")?;
    Ok(DynamicImage::ImageRgb8(rgb).to_rgba8())
}

struct NativeStream {
    requests: mpsc::Sender<Request>,
    resolution: FrameSize,
    worker: Option<JoinHandle<()>>,
}

impl CameraStream for NativeStream {
    fn resolution(&self) -> Option<FrameSize> {
        Some(self.resolution)
    }

    fn grab(&mut self) -> Result<RgbaImage> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.requests
            .send(Request::Grab(reply_tx))
            .map_err(|_| anyhow!("Camera thread is gone"))?;
        reply_rx
            .recv()
            .map_err(|_| anyhow!("Camera thread dropped the frame request"))?
    }

    fn release(&mut self) {
        let _ = self.requests.send(Request::Stop);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Camera thread panicked");
            }
        }
    }
}
