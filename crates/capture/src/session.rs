use crate::driver::{CameraDriver, CaptureSession};
use crate::errors::CameraError;
use crate::frame::VideoFrame;
use geometry::Size;
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicBool, Ordering},
};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::watch;

pub const DEFAULT_FIRST_FRAME_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on waiting for a capture thread to close the device.
pub const RELEASE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraStatus {
    Idle,
    Starting,
    Live { native: Size },
    /// Permission denied, no device, device busy or no signal. The engine keeps
    /// running without video.
    Unavailable(CameraError),
    Stopped,
}

impl CameraStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, CameraStatus::Live { .. })
    }

    pub fn native_size(&self) -> Option<Size> {
        match self {
            CameraStatus::Live { native } => Some(*native),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Landscape,
    Portrait,
}

impl Orientation {
    pub fn of(size: Size) -> Self {
        if size.height > size.width {
            Orientation::Portrait
        } else {
            Orientation::Landscape
        }
    }
}

/// Display surface state. `revision` increases on every change so consumers
/// know when to recompute transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub display: Size,
    pub orientation: Orientation,
    pub visible: bool,
    pub revision: u64,
}

impl Layout {
    pub fn new(display: Size) -> Self {
        Self {
            display,
            orientation: Orientation::of(display),
            visible: true,
            revision: 0,
        }
    }
}

struct Acquisition {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

#[derive(Default)]
struct State {
    active: Option<Acquisition>,
    /// Stopped capture thread that may still be releasing the device.
    retiring: Option<JoinHandle<()>>,
    leases: usize,
}

struct Inner {
    driver: Arc<dyn CameraDriver>,
    first_frame_timeout: Duration,
    status: watch::Sender<CameraStatus>,
    frames: watch::Sender<Option<Arc<VideoFrame>>>,
    layout: watch::Sender<Layout>,
    state: Mutex<State>,
}

/// Owns the single camera stream shared by every consumer, plus the display
/// layout hooks.
///
/// Cheap to clone; all clones drive the same camera.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(driver: Arc<dyn CameraDriver>, display: Size, first_frame_timeout: Duration) -> Self {
        let (status, _) = watch::channel(CameraStatus::Idle);
        let (frames, _) = watch::channel(None);
        let (layout, _) = watch::channel(Layout::new(display));

        Self {
            inner: Arc::new(Inner {
                driver,
                first_frame_timeout,
                status,
                frames,
                layout,
                state: Mutex::new(State::default()),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // State is only a handful of handles; a panic elsewhere cannot leave it torn.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Acquire the camera and wait for its first decoded frame.
    ///
    /// Returns `Live` once a frame arrived, otherwise `Unavailable`. Never fails:
    /// faults are reported through the status.
    pub async fn start(&self) -> CameraStatus {
        let mut status_rx = self.inner.status.subscribe();

        let retiring = match self.take_retiring() {
            Some(retiring) => retiring,
            None => return self.wait_settled(&mut status_rx).await,
        };

        if let Some(handle) = retiring
            && !handle.is_finished()
        {
            tracing::debug!("Waiting for previous capture thread to release the camera");
            let _ = tokio::task::spawn_blocking(move || handle.join()).await;
        }

        let stop = match self.begin_acquisition() {
            Ok(Some(stop)) => stop,
            Ok(None) => return self.wait_settled(&mut status_rx).await,
            Err(fault) => return self.report_unavailable(fault),
        };

        tracing::info!(driver = self.inner.driver.name(), "Acquiring camera");

        let mut frames_rx = self.inner.frames.subscribe();
        let first_frame = tokio::time::timeout(self.inner.first_frame_timeout, async {
            tokio::select! {
                frame = frames_rx.wait_for(|f| f.is_some()) => {
                    frame.ok().and_then(|f| (*f).as_ref().map(|f| f.size()))
                }
                _ = status_rx.wait_for(|s| matches!(s, CameraStatus::Unavailable(_))) => None,
            }
        })
        .await;

        match first_frame {
            Ok(Some(native)) => {
                let accepted = self.inner.status.send_if_modified(|status| {
                    if matches!(status, CameraStatus::Starting) {
                        *status = CameraStatus::Live { native };
                        true
                    } else {
                        false
                    }
                });
                if accepted {
                    tracing::info!(width = native.width, height = native.height, "Camera live");
                }
                self.status()
            }
            Ok(None) => self.status(),
            Err(_) => {
                stop.store(true, Ordering::Release);
                self.retire_active();
                let timeout_ms = self.inner.first_frame_timeout.as_millis() as u64;
                self.report_unavailable(CameraError::NoSignal(timeout_ms))
            }
        }
    }

    /// `None` when a capture thread is already running; otherwise the stopped
    /// thread (if any) that must finish before the device is reopened.
    fn take_retiring(&self) -> Option<Option<JoinHandle<()>>> {
        let mut state = self.state();
        if let Some(active) = &state.active {
            if !active.thread.is_finished() {
                return None;
            }
            state.active = None;
        }
        Some(state.retiring.take())
    }

    fn begin_acquisition(&self) -> Result<Option<Arc<AtomicBool>>, CameraError> {
        let mut state = self.state();
        if state.active.is_some() {
            return Ok(None);
        }

        self.inner.frames.send_replace(None);
        self.inner.status.send_replace(CameraStatus::Starting);

        let stop = Arc::new(AtomicBool::new(false));
        let thread = self
            .spawn_capture(stop.clone())
            .map_err(|e| CameraError::Other(format!("failed to spawn capture thread: {e}")))?;

        state.active = Some(Acquisition {
            stop: stop.clone(),
            thread,
        });
        Ok(Some(stop))
    }

    async fn wait_settled(&self, status_rx: &mut watch::Receiver<CameraStatus>) -> CameraStatus {
        let settled = tokio::time::timeout(
            self.inner.first_frame_timeout,
            status_rx.wait_for(|s| !matches!(s, CameraStatus::Starting)),
        )
        .await;
        match settled {
            Ok(Ok(status)) => status.clone(),
            _ => self.status(),
        }
    }

    fn spawn_capture(&self, stop: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
        let driver = self.inner.driver.clone();
        let frames = self.inner.frames.clone();
        let status = self.inner.status.clone();

        std::thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || {
                let mut session = CaptureSession::new(stop.clone(), frames.clone());
                let result = driver.capture(&mut session);

                // A requested stop already reported its own status.
                if stop.load(Ordering::Acquire) {
                    return;
                }

                let fault = match result {
                    Ok(()) => CameraError::Other("camera stream ended".to_string()),
                    Err(e) => e,
                };
                tracing::warn!(kind = fault.kind(), error = %fault, "Camera unavailable");
                frames.send_replace(None);
                status.send_replace(CameraStatus::Unavailable(fault));
            })
    }

    fn report_unavailable(&self, fault: CameraError) -> CameraStatus {
        tracing::warn!(kind = fault.kind(), error = %fault, "Camera unavailable");
        let status = CameraStatus::Unavailable(fault);
        self.inner.status.send_replace(status.clone());
        status
    }

    fn retire_active(&self) {
        let mut state = self.state();
        if let Some(active) = state.active.take() {
            active.stop.store(true, Ordering::Release);
            state.retiring = Some(active.thread);
        }
    }

    /// Release the camera. Idempotent.
    pub fn stop(&self) {
        let was_active = self.state().active.is_some();
        self.retire_active();
        self.inner.frames.send_replace(None);

        if was_active {
            tracing::info!("Camera released");
        }

        self.inner.status.send_if_modified(|status| {
            if matches!(status, CameraStatus::Idle | CameraStatus::Stopped) {
                false
            } else {
                *status = CameraStatus::Stopped;
                true
            }
        });
    }

    /// Stop and wait until the capture thread has closed the device, bounded
    /// by [`RELEASE_TIMEOUT`]. Returns whether the device is known released.
    pub async fn stop_and_release(&self) -> bool {
        self.stop();

        let Some(handle) = self.state().retiring.take() else {
            return true;
        };
        if handle.is_finished() {
            return handle.join().is_ok();
        }

        let join = tokio::task::spawn_blocking(move || handle.join());
        match tokio::time::timeout(RELEASE_TIMEOUT, join).await {
            Ok(Ok(Ok(()))) => {
                tracing::debug!("Capture thread exited");
                true
            }
            Ok(_) => {
                tracing::warn!("Capture thread panicked while releasing the camera");
                false
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = RELEASE_TIMEOUT.as_millis() as u64,
                    "Camera not released in time"
                );
                false
            }
        }
    }

    /// Register a consumer of the camera stream. The camera is released when
    /// the last lease is dropped.
    pub fn attach(&self) -> SessionLease {
        let mut state = self.state();
        state.leases += 1;
        tracing::debug!(leases = state.leases, "Camera consumer attached");
        SessionLease {
            manager: self.clone(),
        }
    }

    pub fn attached(&self) -> usize {
        self.state().leases
    }

    pub fn status(&self) -> CameraStatus {
        self.inner.status.borrow().clone()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<CameraStatus> {
        self.inner.status.subscribe()
    }

    pub fn latest_frame(&self) -> Option<Arc<VideoFrame>> {
        self.inner.frames.borrow().clone()
    }

    pub fn subscribe_frames(&self) -> watch::Receiver<Option<Arc<VideoFrame>>> {
        self.inner.frames.subscribe()
    }

    pub fn layout(&self) -> Layout {
        *self.inner.layout.borrow()
    }

    pub fn subscribe_layout(&self) -> watch::Receiver<Layout> {
        self.inner.layout.subscribe()
    }

    fn update_layout(&self, change: impl FnOnce(&mut Layout)) {
        self.inner.layout.send_if_modified(|layout| {
            let before = *layout;
            change(layout);
            if *layout == before {
                return false;
            }
            layout.revision = before.revision + 1;
            tracing::debug!(
                width = layout.display.width,
                height = layout.display.height,
                orientation = ?layout.orientation,
                visible = layout.visible,
                revision = layout.revision,
                "Layout changed"
            );
            true
        });
    }

    /// The display surface changed size. The camera keeps running.
    pub fn on_resize(&self, display: Size) {
        self.update_layout(|layout| {
            layout.display = display;
            layout.orientation = Orientation::of(display);
        });
    }

    /// Device rotated; the display surface swaps axes when they disagree with
    /// the new orientation.
    pub fn on_orientation_change(&self, orientation: Orientation) {
        self.update_layout(|layout| {
            if Orientation::of(layout.display) != orientation
                && layout.display.width != layout.display.height
            {
                layout.display = Size::new(layout.display.height, layout.display.width);
            }
            layout.orientation = orientation;
        });
    }

    pub fn on_visibility_change(&self, visible: bool) {
        self.update_layout(|layout| layout.visible = visible);
    }
}

/// Keeps the shared camera attached for one consumer.
pub struct SessionLease {
    manager: SessionManager,
}

impl SessionLease {
    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        let remaining = {
            let mut state = self.manager.state();
            state.leases = state.leases.saturating_sub(1);
            state.leases
        };
        tracing::debug!(leases = remaining, "Camera consumer detached");
        if remaining == 0 {
            self.manager.stop();
        }
    }
}
