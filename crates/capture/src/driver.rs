use crate::errors::CameraError;
use crate::frame::VideoFrame;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use tokio::sync::watch;

/// A source of camera frames.
///
/// `capture` runs on a dedicated thread: it opens the device, publishes frames
/// into the session until [`CaptureSession::should_stop`] is set, then releases
/// the device before returning.
pub trait CameraDriver: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn capture(&self, session: &mut CaptureSession) -> Result<(), CameraError>;
}

/// Handle given to a [`CameraDriver`] for one acquisition.
pub struct CaptureSession {
    stop: Arc<AtomicBool>,
    frames: watch::Sender<Option<Arc<VideoFrame>>>,
    sequence: u64,
}

impl CaptureSession {
    pub(crate) fn new(stop: Arc<AtomicBool>, frames: watch::Sender<Option<Arc<VideoFrame>>>) -> Self {
        Self {
            stop,
            frames,
            sequence: 0,
        }
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Replace the latest frame. Consumers only ever see the newest one.
    ///
    /// Dropped once a stop was requested; the check runs under the channel's
    /// write lock so it cannot race the manager clearing the slot.
    pub fn publish(&mut self, rgb: Vec<u8>, width: u32, height: u32) {
        let frame = Arc::new(VideoFrame::new(rgb, width, height, self.sequence));
        let stop = &self.stop;
        let published = self.frames.send_if_modified(|slot| {
            if stop.load(Ordering::Acquire) {
                return false;
            }
            *slot = Some(frame);
            true
        });
        if published {
            self.sequence += 1;
        }
    }

    pub fn frames_published(&self) -> u64 {
        self.sequence
    }
}
