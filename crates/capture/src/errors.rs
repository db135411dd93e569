use std::io;
use thiserror::Error;

/// Why the camera could not be acquired or kept streaming.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("No camera device found: {0}")]
    NotFound(String),

    #[error("Camera already in use: {0}")]
    Busy(String),

    #[error("Camera produced no frames within {0}ms")]
    NoSignal(u64),

    #[error("Camera error: {0}")]
    Other(String),
}

impl CameraError {
    /// Short machine-readable kind, used in status reports.
    pub fn kind(&self) -> &'static str {
        match self {
            CameraError::PermissionDenied(_) => "permission_denied",
            CameraError::NotFound(_) => "not_found",
            CameraError::Busy(_) => "busy",
            CameraError::NoSignal(_) => "no_signal",
            CameraError::Other(_) => "other",
        }
    }

    /// Worth retrying right away (another process may release the device).
    pub fn is_transient(&self) -> bool {
        matches!(self, CameraError::Busy(_))
    }
}

impl From<io::Error> for CameraError {
    fn from(err: io::Error) -> Self {
        let message = err.to_string();

        match err.raw_os_error() {
            Some(libc::EBUSY) => return CameraError::Busy(message),
            Some(libc::ENODEV) | Some(libc::ENXIO) | Some(libc::ENOENT) => {
                return CameraError::NotFound(message);
            }
            Some(libc::EACCES) | Some(libc::EPERM) => {
                return CameraError::PermissionDenied(message);
            }
            _ => {}
        }

        match err.kind() {
            io::ErrorKind::PermissionDenied => CameraError::PermissionDenied(message),
            io::ErrorKind::NotFound => CameraError::NotFound(message),
            io::ErrorKind::ResourceBusy => CameraError::Busy(message),
            _ => CameraError::Other(message),
        }
    }
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Capture surface not ready")]
    SurfaceNotReady,

    #[error("Frame buffer size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Resize failed: {0}")]
    Resize(String),

    #[error("JPEG compression failed: {0}")]
    Jpeg(#[from] turbojpeg::Error),

    #[error("WebP compression failed: {0}")]
    Webp(String),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Raw frame too short: {actual} bytes for {width}x{height}")]
    Truncated {
        width: u32,
        height: u32,
        actual: usize,
    },

    #[error("MJPEG decode failed: {0}")]
    Mjpeg(#[from] turbojpeg::Error),
}

impl From<DecodeError> for CameraError {
    fn from(err: DecodeError) -> Self {
        CameraError::Other(err.to_string())
    }
}
