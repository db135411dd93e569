pub mod config;
pub mod decoder;
#[cfg(feature = "v4l2")]
pub mod device;
pub mod driver;
pub mod encoder;
pub mod errors;
pub mod frame;
pub mod session;

pub use config::CameraConfig;
pub use decoder::{Decoded, FrameDecoder, MjpegDecoder, YuyvDecoder};
#[cfg(feature = "v4l2")]
pub use device::{PixelFormat, V4lDriver};
pub use driver::{CameraDriver, CaptureSession};
pub use encoder::{CaptureEncoder, Codec, CodecPreference, capture_size_for, compress};
pub use errors::{CameraError, DecodeError, EncodeError};
pub use frame::{EncodedFrame, VideoFrame};
pub use session::{CameraStatus, Layout, Orientation, SessionLease, SessionManager};
