use crate::decoder::{FrameDecoder, MjpegDecoder, YuyvDecoder};
use crate::driver::{CameraDriver, CaptureSession};
use crate::errors::CameraError;
use common::{Backoff, retry_with_backoff};
use std::time::Duration;
use v4l::{
    Device, FourCC,
    buffer::Type,
    control::{Control, Value},
    io::{mmap::Stream, traits::CaptureStream},
    video::Capture,
};

const BUFFER_COUNT: u32 = 4;

const FOURCC_YUYV: FourCC = FourCC { repr: *b"YUYV" };
const FOURCC_MJPG: FourCC = FourCC { repr: *b"MJPG" };

// V4L2 control IDs (from videodev2.h)
const V4L2_CID_EXPOSURE_AUTO: u32 = 0x009a0901;
const V4L2_EXPOSURE_APERTURE_PRIORITY: i64 = 3;

/// Busy devices are retried briefly; another process may be releasing it.
const OPEN_BACKOFF: Backoff = Backoff::new(5, Duration::from_millis(200), Duration::from_secs(2));

/// Consecutive dequeue failures before the stream is considered lost.
const MAX_CONSECUTIVE_ERRORS: u32 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuyv,
    Mjpeg,
}

impl PixelFormat {
    fn fourcc(&self) -> FourCC {
        match self {
            PixelFormat::Yuyv => FOURCC_YUYV,
            PixelFormat::Mjpeg => FOURCC_MJPG,
        }
    }

    fn decoder(&self) -> Result<Box<dyn FrameDecoder>, CameraError> {
        Ok(match self {
            PixelFormat::Yuyv => Box::new(YuyvDecoder::new()),
            PixelFormat::Mjpeg => Box::new(MjpegDecoder::new()?),
        })
    }
}

fn find_usable_camera() -> Option<usize> {
    v4l::context::enum_devices()
        .into_iter()
        .find(|dev| {
            Device::with_path(dev.path())
                .and_then(|d| d.query_caps())
                .map(|caps| {
                    caps.capabilities
                        .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                })
                .unwrap_or(false)
        })
        .map(|dev| dev.index())
}

fn open_device(index: usize) -> Result<Device, CameraError> {
    let err = match Device::new(index).and_then(|dev| dev.query_caps().map(|_| dev)) {
        Ok(dev) => return Ok(dev),
        Err(e) => CameraError::from(e),
    };

    // Permission and busy faults would repeat on every other node as well.
    if !matches!(err, CameraError::NotFound(_)) {
        return Err(err);
    }

    tracing::debug!(index, "Camera index missing, scanning alternatives");

    let fallback = find_usable_camera().ok_or(err)?;
    Ok(Device::new(fallback)?)
}

/// Prefer YUYV (cheaper decode), fall back to MJPEG.
fn select_format(device: &Device) -> Result<PixelFormat, CameraError> {
    let formats = device.enum_formats()?;

    for fmt in &formats {
        tracing::debug!(fourcc = %fmt.fourcc, description = %fmt.description, "Camera format available");
    }

    if formats.iter().any(|f| f.fourcc == FOURCC_YUYV) {
        return Ok(PixelFormat::Yuyv);
    }
    if formats.iter().any(|f| f.fourcc == FOURCC_MJPG) {
        return Ok(PixelFormat::Mjpeg);
    }

    Err(CameraError::Other(format!(
        "Camera supports neither YUYV nor MJPEG - available: {:?}",
        formats.iter().map(|f| f.fourcc).collect::<Vec<_>>()
    )))
}

/// Faces under kiosk lighting: auto exposure that still bounds shutter time.
fn configure_exposure(device: &Device) {
    let controls = match device.query_controls() {
        Ok(c) => c,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to query camera controls");
            return;
        }
    };

    if !controls.iter().any(|c| c.id == V4L2_CID_EXPOSURE_AUTO) {
        return;
    }

    if let Err(e) = device.set_control(Control {
        id: V4L2_CID_EXPOSURE_AUTO,
        value: Value::Integer(V4L2_EXPOSURE_APERTURE_PRIORITY),
    }) {
        tracing::debug!(error = %e, "Aperture priority mode not supported");
    }
}

/// Video4Linux camera at `/dev/video{index}`.
pub struct V4lDriver {
    index: usize,
    name: String,
}

impl V4lDriver {
    pub fn new(index: u32) -> Self {
        Self {
            index: index as usize,
            name: format!("/dev/video{}", index),
        }
    }
}

impl CameraDriver for V4lDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn capture(&self, session: &mut CaptureSession) -> Result<(), CameraError> {
        let device = retry_with_backoff(
            || open_device(self.index),
            CameraError::is_transient,
            OPEN_BACKOFF,
            "Camera open",
        )?;

        let caps = device.query_caps()?;
        tracing::info!(card = %caps.card, driver = %caps.driver, "Camera opened");

        let pixel_format = select_format(&device)?;
        let mut format = device.format()?;
        format.fourcc = pixel_format.fourcc();
        let format = device.set_format(&format)?;

        tracing::info!(
            width = format.width,
            height = format.height,
            fourcc = %format.fourcc,
            "Capture format negotiated"
        );

        configure_exposure(&device);

        let mut decoder = pixel_format.decoder()?;
        let mut stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)?;

        let mut consecutive_errors = 0u32;
        let mut dropped = 0u64;

        while !session.should_stop() {
            let (buf, _meta) = match stream.next() {
                Ok(next) => next,
                Err(e) => {
                    consecutive_errors += 1;
                    dropped += 1;
                    tracing::debug!(error = %e, "Frame dequeue failed");
                    if consecutive_errors >= MAX_CONSECUTIVE_ERRORS {
                        return Err(e.into());
                    }
                    continue;
                }
            };
            consecutive_errors = 0;

            match decoder.decode(buf, format.width, format.height) {
                Ok(decoded) => {
                    session.publish(decoded.rgb.to_vec(), decoded.width, decoded.height);
                }
                Err(e) => {
                    dropped += 1;
                    tracing::debug!(error = %e, "Frame decode failed");
                }
            }

            let published = session.frames_published();
            if published > 0 && published.is_multiple_of(300) {
                tracing::debug!(published, dropped, "Camera status");
            }
        }

        tracing::info!(
            published = session.frames_published(),
            dropped,
            "Camera stream released"
        );
        Ok(())
    }
}
