use crate::store::{DEFAULT_MAX_IDENTITY_AGE_MS, ResultBatch, ResultStore};
use geometry::{DetectionBox, Size, iou};
use schema::{EmotionResult, IdentityResult};

pub const DEFAULT_MIN_IOU: f32 = 0.25;

/// Best identity match for one emotion box.
///
/// Ties keep the first candidate that reached the maximum, so the outcome
/// follows the order the identity backend reported faces in.
pub fn best_match<'a>(
    emotion_box: &DetectionBox,
    candidates: &'a [IdentityResult],
) -> Option<(&'a IdentityResult, f32)> {
    let mut best: Option<(&IdentityResult, f32)> = None;

    for candidate in candidates {
        let overlap = iou(emotion_box, &candidate.bounds);
        match best {
            Some((_, max)) if overlap <= max => {}
            _ => best = Some((candidate, overlap)),
        }
    }

    best
}

/// Label of the best-overlapping identity if it clears `min_iou` and carries a
/// non-empty label.
pub fn fuse<'a>(
    emotion_box: &DetectionBox,
    candidates: &'a [IdentityResult],
    min_iou: f32,
) -> Option<&'a str> {
    best_match(emotion_box, candidates)
        .filter(|(_, overlap)| *overlap >= min_iou)
        .and_then(|(candidate, _)| candidate.usable_label())
}

/// Per-render association of one emotion detection with an identity label.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionRecord {
    pub emotion: EmotionResult,
    pub matched_label: Option<String>,
    pub matched_iou: f32,
}

impl FusionRecord {
    /// Fusion could not attach an identity to this face.
    pub fn is_unmatched(&self) -> bool {
        self.matched_label.is_none()
    }

    /// Name to show: fused label, then the label the emotion backend attached.
    pub fn resolved_label(&self) -> Option<&str> {
        self.matched_label
            .as_deref()
            .or_else(|| self.emotion.label.as_deref())
            .filter(|l| !l.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusionConfig {
    pub min_iou: f32,
    pub max_identity_age_ms: u64,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            min_iou: DEFAULT_MIN_IOU,
            max_identity_age_ms: DEFAULT_MAX_IDENTITY_AGE_MS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FusionEngine {
    config: FusionConfig,
}

impl FusionEngine {
    pub fn new(config: FusionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    /// Match every box of an emotion batch against the freshest identity batch.
    ///
    /// Identity boxes are rescaled into the emotion batch's capture space first,
    /// since the two streams may be captured at different widths.
    pub fn fuse_batch(
        &self,
        store: &ResultStore,
        emotion: &ResultBatch<EmotionResult>,
        now_ms: u64,
    ) -> Vec<FusionRecord> {
        let candidates = store
            .fresh_identity_batch(now_ms, self.config.max_identity_age_ms)
            .map(|identity| rescale_identities(identity, emotion.frame_size))
            .unwrap_or_default();

        tracing::trace!(
            emotions = emotion.items.len(),
            candidates = candidates.len(),
            "Fusing emotion batch"
        );

        emotion
            .items
            .iter()
            .map(|item| {
                let matched = best_match(&item.bounds, &candidates)
                    .filter(|(_, overlap)| *overlap >= self.config.min_iou);

                let (matched_label, matched_iou) = match matched {
                    Some((candidate, overlap)) => {
                        (candidate.usable_label().map(str::to_string), overlap)
                    }
                    None => (None, 0.0),
                };

                FusionRecord {
                    emotion: item.clone(),
                    matched_label,
                    matched_iou,
                }
            })
            .collect()
    }
}

fn rescale_identities(identity: &ResultBatch<IdentityResult>, target: Size) -> Vec<IdentityResult> {
    let source = identity.frame_size;
    if source == target || source.is_empty() || target.is_empty() {
        return identity.items.clone();
    }

    let sx = target.width as f32 / source.width as f32;
    let sy = target.height as f32 / source.height as f32;

    identity
        .items
        .iter()
        .map(|item| IdentityResult {
            bounds: item.bounds.scaled(sx, sy),
            ..item.clone()
        })
        .collect()
}
