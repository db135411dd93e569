use bridge::ChannelConfig;
use capture::{CameraConfig, CodecPreference};
use common::{Environment, env_clamped, env_flag, env_optional, env_parse, env_string};
use fusion::{DEFAULT_MAX_IDENTITY_AGE_MS, DEFAULT_MIN_IOU, FusionConfig};
use geometry::Size;
use schema::IdentityConfig;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulerConfig {
    /// Emotion loop period.
    pub fun_interval: Duration,
    /// Identity frames are re-requested at least this often.
    pub att_base_interval: Duration,
    /// Minimum gap between identity pushes triggered by an unnamed face.
    pub att_retry_interval: Duration,
    /// How long a stream waits for its result before accepting the next frame.
    pub response_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fun_interval: Duration::from_millis(300),
            att_base_interval: Duration::from_millis(3000),
            att_retry_interval: Duration::from_millis(400),
            response_timeout: Duration::from_millis(4000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EncoderConfig {
    pub fun_capture_width: u32,
    pub att_capture_width: u32,
    pub quality: f32,
    pub codec: CodecPreference,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            fun_capture_width: 320,
            att_capture_width: 640,
            quality: 0.7,
            codec: CodecPreference::Auto,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayConfig {
    pub size: Size,
    pub addr: SocketAddr,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            size: Size::new(1280, 720),
            addr: SocketAddr::from(([0, 0, 0, 0], 8090)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct KioskConfig {
    pub environment: Environment,
    pub otel_endpoint: Option<String>,
    pub camera: CameraConfig,
    pub channel: ChannelConfig,
    pub scheduler: SchedulerConfig,
    pub encoder: EncoderConfig,
    pub identity: IdentityConfig,
    pub fusion: FusionConfig,
    pub display: DisplayConfig,
}

fn env_millis(key: &str, default: Duration, min: u64, max: u64) -> Duration {
    Duration::from_millis(env_clamped(key, default.as_millis() as u64, min, max))
}

impl KioskConfig {
    /// Load from `KIOSK_*` variables. Unparsable values fall back to defaults,
    /// out-of-range values are clamped.
    pub fn from_env() -> Self {
        let scheduler = SchedulerConfig::default();
        let encoder = EncoderConfig::default();
        let display = DisplayConfig::default();

        let codec = env_string("KIOSK_FRAME_CODEC", "auto")
            .parse()
            .unwrap_or_else(|e: String| {
                tracing::warn!(error = %e, "Invalid KIOSK_FRAME_CODEC, using auto");
                CodecPreference::Auto
            });

        Self {
            environment: Environment::from_env(),
            otel_endpoint: env_optional("KIOSK_OTEL_ENDPOINT"),
            camera: CameraConfig::from_env(),
            channel: ChannelConfig::from_env(),
            scheduler: SchedulerConfig {
                fun_interval: env_millis("KIOSK_FUN_INTERVAL_MS", scheduler.fun_interval, 100, 2000),
                att_base_interval: env_millis(
                    "KIOSK_ATT_BASE_INTERVAL_MS",
                    scheduler.att_base_interval,
                    400,
                    5000,
                ),
                att_retry_interval: Duration::from_millis(env_parse(
                    "KIOSK_ATT_RETRY_MS",
                    scheduler.att_retry_interval.as_millis() as u64,
                )),
                response_timeout: env_millis(
                    "KIOSK_RESPONSE_TIMEOUT_MS",
                    scheduler.response_timeout,
                    500,
                    30_000,
                ),
            },
            encoder: EncoderConfig {
                fun_capture_width: env_clamped(
                    "KIOSK_FUN_CAPTURE_WIDTH",
                    encoder.fun_capture_width,
                    160,
                    1920,
                ),
                att_capture_width: env_clamped(
                    "KIOSK_ATT_CAPTURE_WIDTH",
                    encoder.att_capture_width,
                    160,
                    1920,
                ),
                quality: env_clamped("KIOSK_FRAME_QUALITY", encoder.quality, 0.0, 1.0),
                codec,
            },
            identity: IdentityConfig {
                th: env_clamped("KIOSK_ATT_THRESHOLD", 0.5, 0.0, 1.0),
                mark: env_flag("KIOSK_ATT_MARK", true),
            },
            fusion: FusionConfig {
                min_iou: env_clamped("KIOSK_MIN_IOU", DEFAULT_MIN_IOU, 0.0, 1.0),
                max_identity_age_ms: env_parse(
                    "KIOSK_MAX_IDENTITY_AGE_MS",
                    DEFAULT_MAX_IDENTITY_AGE_MS,
                ),
            },
            display: DisplayConfig {
                size: Size::new(
                    env_parse("KIOSK_DISPLAY_WIDTH", display.size.width).max(1),
                    env_parse("KIOSK_DISPLAY_HEIGHT", display.size.height).max(1),
                ),
                addr: env_parse("KIOSK_DISPLAY_ADDR", display.addr),
            },
        }
    }
}
