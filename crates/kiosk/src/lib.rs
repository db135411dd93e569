pub mod config;
pub mod display;
pub mod engine;
pub mod metrics;
pub mod overlay;
pub mod scheduler;

pub use config::{DisplayConfig, EncoderConfig, KioskConfig, SchedulerConfig};
pub use display::{ClientCommand, ConnectivityStatus, DisplayEvent, DisplayHub, DisplayMessage, OverlayPacket};
pub use engine::{CameraFrameProducer, CaptureSizes, Engine, SERVICE_NAME};
pub use metrics::KioskMetrics;
pub use scheduler::{
    FlightPermit, FrameProducer, FrameTransport, IdentityPushPolicy, SingleFlight, TickOutcome,
    TransmissionScheduler,
};
