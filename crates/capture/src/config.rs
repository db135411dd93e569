use crate::session::DEFAULT_FIRST_FRAME_TIMEOUT;
use common::{env_clamped, env_parse};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CameraConfig {
    pub camera_index: u32,
    pub first_frame_timeout: Duration,
    /// How often an unavailable camera is re-acquired.
    pub retry_interval: Duration,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            camera_index: 0,
            first_frame_timeout: DEFAULT_FIRST_FRAME_TIMEOUT,
            retry_interval: Duration::from_secs(10),
        }
    }
}

impl CameraConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            camera_index: env_parse("KIOSK_CAMERA_INDEX", defaults.camera_index),
            first_frame_timeout: Duration::from_millis(env_clamped(
                "KIOSK_CAMERA_FIRST_FRAME_TIMEOUT_MS",
                defaults.first_frame_timeout.as_millis() as u64,
                500,
                30_000,
            )),
            retry_interval: Duration::from_millis(env_clamped(
                "KIOSK_CAMERA_RETRY_MS",
                defaults.retry_interval.as_millis() as u64,
                1_000,
                300_000,
            )),
        }
    }

    /// The platform camera driver for `camera_index`.
    #[cfg(feature = "v4l2")]
    pub fn driver(&self) -> std::sync::Arc<dyn crate::driver::CameraDriver> {
        std::sync::Arc::new(crate::device::V4lDriver::new(self.camera_index))
    }
}
