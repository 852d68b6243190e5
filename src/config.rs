use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// Client configuration loaded from environment variables.
///
/// Every field has a default pointing at a backend on `localhost:8000`.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the detection and reasoning services.
    pub api_url: String,
    /// Live annotation channel.
    pub ws_url: String,
    /// Capture cadence of the streaming loop (default: 100 ms, 10 Hz).
    pub frame_interval: Duration,
    /// A sent frame unanswered for this long ends the streaming session.
    pub frame_timeout: Duration,
    pub stream_quality: u8,
    pub snapshot_quality: u8,
    pub crop_quality: u8,
    /// Minimum selection side in display units; both sides must exceed it.
    pub min_selection: f64,
    pub camera_index: u32,
    pub camera_fps: u32,
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000".into(),
            ws_url: "ws://localhost:8000/ws".into(),
            frame_interval: Duration::from_millis(100),
            frame_timeout: Duration::from_millis(5000),
            stream_quality: 80,
            snapshot_quality: 90,
            crop_quality: 92,
            min_selection: 10.0,
            camera_index: 0,
            camera_fps: 30,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                  |
    /// |-------------------------------|--------------------------|
    /// | `MICROV_API_URL`              | `http://localhost:8000`  |
    /// | `MICROV_WS_URL`               | `ws://localhost:8000/ws` |
    /// | `MICROV_FRAME_INTERVAL_MS`    | `100`                    |
    /// | `MICROV_FRAME_TIMEOUT_MS`     | `5000`                   |
    /// | `MICROV_STREAM_QUALITY`       | `80`                     |
    /// | `MICROV_SNAPSHOT_QUALITY`     | `90`                     |
    /// | `MICROV_CROP_QUALITY`         | `92`                     |
    /// | `MICROV_MIN_SELECTION`        | `10`                     |
    /// | `MICROV_CAMERA_INDEX`         | `0`                      |
    /// | `MICROV_CAMERA_FPS`           | `30`                     |
    /// | `MICROV_REQUEST_TIMEOUT_SECS` | `60`                     |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] over an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let api_url = lookup("MICROV_API_URL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.api_url);
        let ws_url = lookup("MICROV_WS_URL")
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(defaults.ws_url);

        let frame_interval_ms: u64 = parse_or(&lookup, "MICROV_FRAME_INTERVAL_MS", 100);
        let frame_timeout_ms: u64 = parse_or(&lookup, "MICROV_FRAME_TIMEOUT_MS", 5000);
        let request_timeout_secs: u64 = parse_or(&lookup, "MICROV_REQUEST_TIMEOUT_SECS", 60);
        let camera_fps: u32 = parse_or(&lookup, "MICROV_CAMERA_FPS", 30);

        Self {
            api_url,
            ws_url,
            frame_interval: Duration::from_millis(nonzero(frame_interval_ms, 100)),
            frame_timeout: Duration::from_millis(nonzero(frame_timeout_ms, 5000)),
            stream_quality: quality(&lookup, "MICROV_STREAM_QUALITY", defaults.stream_quality),
            snapshot_quality: quality(&lookup, "MICROV_SNAPSHOT_QUALITY", defaults.snapshot_quality),
            crop_quality: quality(&lookup, "MICROV_CROP_QUALITY", defaults.crop_quality),
            min_selection: parse_or(&lookup, "MICROV_MIN_SELECTION", defaults.min_selection)
                .max(0.0),
            camera_index: parse_or(&lookup, "MICROV_CAMERA_INDEX", defaults.camera_index),
            camera_fps: nonzero(camera_fps, 30),
            request_timeout: Duration::from_secs(nonzero(request_timeout_secs, 60)),
        }
    }

    /// Interval between camera grabs for the configured preview rate
    pub fn camera_interval(&self) -> Duration {
        Duration::from_millis(1000 / u64::from(self.camera_fps.max(1)))
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{key}={raw:?} is not valid, using default {default:?}");
            default
        }),
    }
}

fn nonzero<T: PartialEq + From<u8>>(value: T, default: T) -> T {
    if value == T::from(0) {
        warn!("Zero is not allowed here, using the default");
        default
    } else {
        value
    }
}

/// JPEG quality in 1..=100
fn quality(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u8) -> u8 {
    let q: u8 = parse_or(lookup, key, default);
    if (1..=100).contains(&q) {
        q
    } else {
        warn!("{key}={q} is outside 1..=100, using default {default}");
        default
    }
}
