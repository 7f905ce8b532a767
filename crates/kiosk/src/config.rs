use crate::camera::CameraConstraints;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub use common::Environment;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct KioskConfig {
    pub environment: Environment,
    /// Recognition endpoint consuming `{"image": "<data URL>"}`.
    pub recognize_url: String,
    pub capture_interval_ms: u64,
    /// Cool-down after a successful identification, preventing duplicate
    /// attendance marks while the subject lingers in frame.
    pub pause_secs: u64,
    pub request_timeout_ms: u64,
    /// Submit attempts per captured frame (transport errors only).
    pub submit_attempts: u32,
    pub retry_base_delay_ms: u64,
    /// JPEG quality on a 0-1 scale.
    pub jpeg_quality: f32,
    pub device_index: u32,
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub frame_rate: u32,
}

impl KioskConfig {
    pub fn from_env() -> Self {
        Self {
            environment: Environment::from_env(),
            recognize_url: env::var("RECOGNIZE_URL")
                .unwrap_or_else(|_| "http://localhost:5000/api/recognize_face".to_string()),
            capture_interval_ms: env_or("CAPTURE_INTERVAL_MS", 5_000),
            pause_secs: env_or("RECOGNITION_PAUSE_SECS", 10),
            request_timeout_ms: env_or("REQUEST_TIMEOUT_MS", 8_000),
            submit_attempts: env_or("SUBMIT_ATTEMPTS", 2),
            retry_base_delay_ms: env_or("RETRY_BASE_DELAY_MS", 500),
            jpeg_quality: env_or("JPEG_QUALITY", 0.8),
            device_index: env_or("CAMERA_DEVICE", 0),
            ideal_width: env_or("CAMERA_WIDTH", 640),
            ideal_height: env_or("CAMERA_HEIGHT", 480),
            frame_rate: env_or("CAMERA_FPS", 30),
        }
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn pause_duration(&self) -> Duration {
        Duration::from_secs(self.pause_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn camera_constraints(&self) -> CameraConstraints {
        CameraConstraints {
            device_index: self.device_index,
            ideal_width: self.ideal_width,
            ideal_height: self.ideal_height,
            frame_rate: self.frame_rate,
        }
    }
}
