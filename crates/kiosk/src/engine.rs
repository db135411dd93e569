//! Composition root: camera session, event channel, transmission scheduler,
//! overlay renderer and display hub wired into one event loop.

use crate::config::{EncoderConfig, KioskConfig};
use crate::display::{DisplayHub, OverlayPacket};
use crate::metrics::KioskMetrics;
use crate::overlay::{OverlayRenderer, RasterCanvas};
use crate::scheduler::{FrameProducer, FrameTransport, TransmissionScheduler};
use bridge::{BridgeError, ChannelEvent, EventChannel};
use capture::{CameraDriver, CameraStatus, CaptureEncoder, Codec, SessionManager};
use fusion::{FusionEngine, ResultBatch, ResultStore};
use geometry::Size;
use schema::{EmotionResult, IdentityBatch, IdentityConfig, StreamKind};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub const SERVICE_NAME: &str = "kiosk";

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Capture surface size of the last frame sent per stream. Results come back
/// in that coordinate space.
#[derive(Clone, Default)]
pub struct CaptureSizes {
    inner: Arc<Mutex<HashMap<StreamKind, Size>>>,
}

impl CaptureSizes {
    pub fn get(&self, stream: StreamKind) -> Option<Size> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&stream)
            .copied()
    }

    pub fn set(&self, stream: StreamKind, size: Size) {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(stream, size);
    }
}

/// Encodes the latest camera frame with the stream's own encoder.
pub struct CameraFrameProducer {
    session: SessionManager,
    emotion: Arc<Mutex<CaptureEncoder>>,
    identity: Arc<Mutex<CaptureEncoder>>,
    sizes: CaptureSizes,
}

impl CameraFrameProducer {
    pub fn new(session: SessionManager, config: &EncoderConfig, sizes: CaptureSizes) -> Self {
        let codec = Codec::resolve(config.codec);
        tracing::info!(codec = codec.mime_type(), "Frame codec selected");

        Self {
            session,
            emotion: Arc::new(Mutex::new(CaptureEncoder::new(
                config.fun_capture_width,
                config.quality,
                codec,
            ))),
            identity: Arc::new(Mutex::new(CaptureEncoder::new(
                config.att_capture_width,
                config.quality,
                codec,
            ))),
            sizes,
        }
    }

    fn encoder(&self, stream: StreamKind) -> Arc<Mutex<CaptureEncoder>> {
        match stream {
            StreamKind::Emotion => self.emotion.clone(),
            StreamKind::Identity => self.identity.clone(),
        }
    }
}

impl FrameProducer for CameraFrameProducer {
    async fn produce(&self, stream: StreamKind) -> Option<Vec<u8>> {
        let frame = self.session.latest_frame()?;
        let encoder = self.encoder(stream);

        let encoded = tokio::task::spawn_blocking(move || {
            encoder
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .encode_current_frame(&frame)
        })
        .await
        .ok()
        .flatten()?;

        self.sizes.set(stream, encoded.size);
        Some(encoded.bytes)
    }
}

impl FrameTransport for EventChannel {
    type Error = BridgeError;

    async fn send_frame(&self, stream: StreamKind, bytes: Vec<u8>) -> Result<(), BridgeError> {
        EventChannel::send_frame(self, stream, bytes).await
    }

    async fn send_identity_config(&self, config: IdentityConfig) -> Result<(), BridgeError> {
        EventChannel::send_identity_config(self, &config).await
    }
}

/// Result handling half of the loop: store, fuse, paint, publish.
struct Pipeline<P, T> {
    session: SessionManager,
    scheduler: Arc<TransmissionScheduler<P, T>>,
    renderer: OverlayRenderer,
    canvas: RasterCanvas,
    store: ResultStore,
    sizes: CaptureSizes,
    hub: DisplayHub,
}

impl<P: FrameProducer, T: FrameTransport> Pipeline<P, T> {
    fn new(
        session: SessionManager,
        scheduler: Arc<TransmissionScheduler<P, T>>,
        renderer: OverlayRenderer,
        sizes: CaptureSizes,
        hub: DisplayHub,
    ) -> Self {
        Self {
            canvas: RasterCanvas::new(session.layout().display),
            session,
            scheduler,
            renderer,
            store: ResultStore::new(),
            sizes,
            hub,
        }
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => {
                self.scheduler.on_connected();
                self.hub.update_status(|s| s.channel_connected = true);
            }
            ChannelEvent::Disconnected => {
                self.scheduler.on_disconnected();
                self.hub.update_status(|s| s.channel_connected = false);
            }
            ChannelEvent::EmotionBatch(items) => self.on_emotion_batch(items),
            ChannelEvent::IdentityBatch(batch) => self.on_identity_batch(batch),
        }
    }

    fn on_emotion_batch(&mut self, items: Vec<EmotionResult>) {
        let _span = common::span!("emotion_batch");
        self.scheduler.on_result(StreamKind::Emotion);

        let frame_size = self.sizes.get(StreamKind::Emotion).unwrap_or_default();
        self.store
            .record_emotion(ResultBatch::new(now_ms(), frame_size, items));

        if let Some(any_unmatched) = self.repaint() {
            self.scheduler.on_render_pass(any_unmatched);
        }
    }

    fn on_identity_batch(&mut self, batch: IdentityBatch) {
        self.scheduler.on_result(StreamKind::Identity);

        let IdentityBatch { results, marked } = batch;
        tracing::debug!(faces = results.len(), "Identity batch received");

        let frame_size = self.sizes.get(StreamKind::Identity).unwrap_or_default();
        self.store
            .record_identity(ResultBatch::new(now_ms(), frame_size, results));

        if !marked.is_empty() {
            for mark in &marked {
                tracing::info!(label = %mark.label, score = mark.score, "Attendance marked");
            }
            self.hub.publish_marks(marked);
        }
    }

    /// Native media size for the transform: the live stream's, else the last
    /// frame's, else the capture surface itself.
    fn native_size(&self, frame_size: Size) -> Size {
        self.session
            .status()
            .native_size()
            .or_else(|| self.session.latest_frame().map(|f| f.size()))
            .unwrap_or(frame_size)
    }

    /// Render the stored emotion batch and publish it. Returns whether any face
    /// stayed unmatched, or `None` when nothing was painted.
    fn repaint(&mut self) -> Option<bool> {
        let _span = common::span_debug!("repaint_overlay");

        let batch = self.store.emotion()?;
        let native = self.native_size(batch.frame_size);
        let display = self.session.layout().display;

        let pass = self
            .renderer
            .render(&self.store, batch, native, display, now_ms())?;

        self.canvas.paint(&pass.scene);
        match self.canvas.encode_png() {
            Ok(png) => self.hub.publish_overlay(OverlayPacket {
                scene: pass.scene,
                png,
            }),
            Err(e) => tracing::warn!(error = %e, "Overlay encode failed"),
        }

        Some(pass.any_unmatched)
    }
}

pub struct Engine {
    config: KioskConfig,
    session: SessionManager,
    channel: EventChannel,
    events: mpsc::Receiver<ChannelEvent>,
    hub: DisplayHub,
    metrics: KioskMetrics,
}

impl Engine {
    /// Must be called inside a Tokio runtime; the event channel starts
    /// connecting immediately.
    pub fn new(config: KioskConfig, driver: Arc<dyn CameraDriver>, hub: DisplayHub) -> Self {
        let session = SessionManager::new(
            driver,
            config.display.size,
            config.camera.first_frame_timeout,
        );
        let (channel, events) = EventChannel::connect(&config.channel);

        Self {
            config,
            session,
            channel,
            events,
            hub,
            metrics: KioskMetrics::new(SERVICE_NAME),
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    fn start_camera(&self) {
        let session = self.session.clone();
        tokio::spawn(async move {
            let status = session.start().await;
            if let CameraStatus::Unavailable(e) = status {
                tracing::warn!(kind = e.kind(), error = %e, "Camera unavailable, continuing without video");
            }
        });
    }

    /// Run until `shutdown` resolves or the event channel closes.
    pub async fn run(mut self, shutdown: impl Future<Output = ()>) -> anyhow::Result<()> {
        let lease = self.session.attach();
        let sizes = CaptureSizes::default();

        let producer = CameraFrameProducer::new(self.session.clone(), &self.config.encoder, sizes.clone());
        let scheduler = TransmissionScheduler::new(
            producer,
            self.channel.clone(),
            self.config.scheduler,
            self.config.identity,
            self.metrics.clone(),
        );

        let mut pipeline = Pipeline::new(
            self.session.clone(),
            scheduler.clone(),
            OverlayRenderer::new(FusionEngine::new(self.config.fusion), self.metrics.clone()),
            sizes,
            self.hub.clone(),
        );

        let mut status_rx = self.session.subscribe_status();
        let mut layout_rx = self.session.subscribe_layout();
        let mut emotion_loop: Option<JoinHandle<()>> = None;

        let mut camera_retry = tokio::time::interval(self.config.camera.retry_interval);
        camera_retry.set_missed_tick_behavior(MissedTickBehavior::Skip);
        camera_retry.tick().await;

        tracing::info!(
            device_id = %self.config.channel.device_id,
            display_width = self.config.display.size.width,
            display_height = self.config.display.size.height,
            "Kiosk engine started"
        );
        self.start_camera();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                event = self.events.recv() => match event {
                    Some(event) => pipeline.on_channel_event(event),
                    None => {
                        tracing::warn!("Event channel closed");
                        break;
                    }
                },
                Ok(()) = status_rx.changed() => {
                    let status = status_rx.borrow_and_update().clone();
                    self.hub.update_status(|s| s.apply_camera(&status));

                    if status.is_live() && emotion_loop.is_none() {
                        emotion_loop = Some(tokio::spawn(scheduler.clone().run_emotion_loop()));
                    }
                }
                Ok(()) = layout_rx.changed() => {
                    let layout = *layout_rx.borrow_and_update();
                    scheduler.set_visible(layout.visible);
                    if layout.visible {
                        // Transforms depend on the display size; redraw with the new one.
                        pipeline.repaint();
                    }
                }
                _ = camera_retry.tick() => {
                    if matches!(self.session.status(), CameraStatus::Unavailable(_)) {
                        tracing::info!("Retrying camera acquisition");
                        self.start_camera();
                    }
                }
            }
        }

        pipeline.renderer.shutdown();
        scheduler.shutdown();
        if let Some(handle) = emotion_loop {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Emotion loop task failed");
            }
        }
        drop(lease);
        self.session.stop_and_release().await;
        self.channel.disconnect().await;

        tracing::info!("Kiosk engine stopped");
        Ok(())
    }
}
