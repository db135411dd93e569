use super::palette::EmotionStyle;
use super::scene::{
    ChipPlacement, FaceOverlay, OverlayScene, UNKNOWN_LABEL, clamp_to_display, emotion_text,
    place_chip,
};
use crate::metrics::KioskMetrics;
use fusion::{FusionEngine, FusionRecord, ResultBatch, ResultStore};
use geometry::{Size, TransformParameters, compute_letterbox_transform};
use schema::EmotionResult;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Output of one render pass.
#[derive(Debug, Clone)]
pub struct RenderPass {
    pub scene: OverlayScene,
    /// Fusion left at least one face without a name.
    pub any_unmatched: bool,
}

/// Turns an emotion batch into a display-space scene. Runs once per emotion
/// batch; identity batches only update the store it reads from.
pub struct OverlayRenderer {
    engine: FusionEngine,
    metrics: KioskMetrics,
    live: Arc<AtomicBool>,
    sequence: u64,
}

impl OverlayRenderer {
    pub fn new(engine: FusionEngine, metrics: KioskMetrics) -> Self {
        Self {
            engine,
            metrics,
            live: Arc::new(AtomicBool::new(true)),
            sequence: 0,
        }
    }

    /// After shutdown every render is refused, so late results never paint.
    pub fn shutdown(&self) {
        self.live.store(false, Ordering::Release);
    }

    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    pub fn render(
        &mut self,
        store: &ResultStore,
        emotion: &ResultBatch<EmotionResult>,
        native: Size,
        display: Size,
        now_ms: u64,
    ) -> Option<RenderPass> {
        if !self.is_live() {
            tracing::debug!("Renderer shut down, discarding batch");
            return None;
        }

        let records = self.engine.fuse_batch(store, emotion, now_ms);
        let transform = compute_letterbox_transform(emotion.frame_size, native, display);
        let any_unmatched = records.iter().any(FusionRecord::is_unmatched);

        let faces: Vec<FaceOverlay> = records
            .iter()
            .filter_map(|record| layout_face(record, &transform, display))
            .collect();

        self.sequence += 1;
        self.metrics.render_pass();

        tracing::debug!(
            sequence = self.sequence,
            faces = faces.len(),
            unmatched = records.iter().filter(|r| r.is_unmatched()).count(),
            "Overlay rendered"
        );

        Some(RenderPass {
            scene: OverlayScene {
                sequence: self.sequence,
                received_at_ms: emotion.received_at_ms,
                display,
                transform,
                faces,
            },
            any_unmatched,
        })
    }
}

fn layout_face(
    record: &FusionRecord,
    transform: &TransformParameters,
    display: Size,
) -> Option<FaceOverlay> {
    let bounds = clamp_to_display(&transform.apply_box(&record.emotion.bounds), display)?;
    let style = EmotionStyle::resolve(&record.emotion.top_emotion_label);

    let name = record.resolved_label().unwrap_or(UNKNOWN_LABEL).to_string();
    let identity_chip = place_chip(&bounds, name, ChipPlacement::Above, display);
    let emotion_chip = place_chip(
        &bounds,
        emotion_text(&style, record.emotion.score),
        ChipPlacement::Below,
        display,
    );

    Some(FaceOverlay {
        bounds,
        color: style.color,
        emotion: style.emotion,
        matched: !record.is_unmatched(),
        identity_chip,
        emotion_chip,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use geometry::DetectionBox;
    use schema::IdentityResult;

    fn metrics() -> KioskMetrics {
        KioskMetrics::new("kiosk-test")
    }

    fn emotion(x: f32, y: f32, w: f32, h: f32, label: &str) -> EmotionResult {
        EmotionResult {
            bounds: DetectionBox::new(x, y, w, h),
            top_emotion_label: label.to_string(),
            score: 0.9,
            label: None,
        }
    }

    fn identity(x: f32, y: f32, w: f32, h: f32, label: &str) -> IdentityResult {
        IdentityResult {
            bounds: DetectionBox::new(x, y, w, h),
            label: Some(label.to_string()),
            score: 0.8,
        }
    }

    const CAPTURE: Size = Size::new(320, 180);
    const NATIVE: Size = Size::new(1280, 720);
    const DISPLAY: Size = Size::new(1280, 720);

    #[test]
    fn matched_face_gets_name_and_palette_color() {
        let mut store = ResultStore::new();
        store.record_identity(ResultBatch::new(
            1000,
            CAPTURE,
            vec![identity(100.0, 50.0, 80.0, 80.0, "alice")],
        ));
        let batch = ResultBatch::new(1200, CAPTURE, vec![emotion(102.0, 52.0, 80.0, 80.0, "feliz")]);

        let mut renderer = OverlayRenderer::new(FusionEngine::default(), metrics());
        let pass = renderer.render(&store, &batch, NATIVE, DISPLAY, 1200).unwrap();

        assert!(!pass.any_unmatched);
        let face = &pass.scene.faces[0];
        assert_eq!(face.identity_chip.text, "alice");
        assert_eq!(face.emotion_chip.text, "Happy 90%");
        assert_eq!(face.color.hex(), "#facc15");
        // 4x upscale from the 320 wide capture surface
        assert_eq!(face.bounds, DetectionBox::new(408.0, 208.0, 320.0, 320.0));
    }

    #[test]
    fn unmatched_face_falls_back_to_unknown() {
        let store = ResultStore::new();
        let batch = ResultBatch::new(0, CAPTURE, vec![emotion(10.0, 10.0, 40.0, 40.0, "calm")]);

        let mut renderer = OverlayRenderer::new(FusionEngine::default(), metrics());
        let pass = renderer.render(&store, &batch, NATIVE, DISPLAY, 0).unwrap();

        assert!(pass.any_unmatched);
        assert_eq!(pass.scene.unmatched(), 1);
        assert_eq!(pass.scene.faces[0].identity_chip.text, UNKNOWN_LABEL);
    }

    #[test]
    fn embedded_label_is_used_when_fusion_fails() {
        let store = ResultStore::new();
        let mut item = emotion(10.0, 10.0, 40.0, 40.0, "sad");
        item.label = Some("bob".into());
        let batch = ResultBatch::new(0, CAPTURE, vec![item]);

        let mut renderer = OverlayRenderer::new(FusionEngine::default(), metrics());
        let pass = renderer.render(&store, &batch, NATIVE, DISPLAY, 0).unwrap();

        assert!(pass.any_unmatched);
        assert_eq!(pass.scene.faces[0].identity_chip.text, "bob");
    }

    #[test]
    fn offscreen_faces_are_not_drawn_but_still_count() {
        let store = ResultStore::new();
        let batch = ResultBatch::new(0, CAPTURE, vec![emotion(400.0, 10.0, 40.0, 40.0, "happy")]);

        let mut renderer = OverlayRenderer::new(FusionEngine::default(), metrics());
        let pass = renderer.render(&store, &batch, NATIVE, DISPLAY, 0).unwrap();

        assert!(pass.scene.faces.is_empty());
        assert!(pass.any_unmatched);
    }

    #[test]
    fn shutdown_stops_painting() {
        let store = ResultStore::new();
        let batch = ResultBatch::new(0, CAPTURE, vec![emotion(10.0, 10.0, 40.0, 40.0, "happy")]);

        let mut renderer = OverlayRenderer::new(FusionEngine::default(), metrics());
        renderer.shutdown();
        assert!(renderer.render(&store, &batch, NATIVE, DISPLAY, 0).is_none());
    }

    #[test]
    fn sequence_increases_per_pass() {
        let store = ResultStore::new();
        let batch = ResultBatch::new(0, CAPTURE, Vec::new());

        let mut renderer = OverlayRenderer::new(FusionEngine::default(), metrics());
        let first = renderer.render(&store, &batch, NATIVE, DISPLAY, 0).unwrap();
        let second = renderer.render(&store, &batch, NATIVE, DISPLAY, 0).unwrap();
        assert_eq!(second.scene.sequence, first.scene.sequence + 1);
        assert!(!second.any_unmatched);
    }
}
