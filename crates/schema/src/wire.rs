//! Normalization of backend result payloads.
//!
//! Backends are loose about field names (`box` vs `bbox`, `label` vs `name`)
//! and box encodings. Everything is folded into the strict result types here so
//! the rest of the engine never branches on payload shape.

use crate::errors::SchemaError;
use crate::results::{AttendanceMark, EmotionResult, IdentityBatch, IdentityResult};
use geometry::DetectionBox;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

const UNKNOWN_LABELS: [&str; 3] = ["unknown", "none", "null"];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireBox {
    /// `[x, y, width, height]`
    Array([f32; 4]),
    Corners {
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
    },
    Rect {
        x: f32,
        y: f32,
        #[serde(alias = "w")]
        width: f32,
        #[serde(alias = "h")]
        height: f32,
    },
}

impl From<WireBox> for DetectionBox {
    fn from(b: WireBox) -> Self {
        match b {
            WireBox::Array([x, y, w, h]) => DetectionBox::new(x, y, w, h),
            WireBox::Corners { x1, y1, x2, y2 } => DetectionBox::from_corners(x1, y1, x2, y2),
            WireBox::Rect {
                x,
                y,
                width,
                height,
            } => DetectionBox::new(x, y, width, height),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireIdentity {
    #[serde(rename = "box", alias = "bbox")]
    bounds: WireBox,
    #[serde(default, alias = "name")]
    label: Option<String>,
    #[serde(default, alias = "confidence", alias = "similarity")]
    score: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct WireEmotion {
    #[serde(rename = "box", alias = "bbox")]
    bounds: WireBox,
    #[serde(
        default,
        alias = "top_emotion",
        alias = "topEmotionLabel",
        alias = "dominant_emotion",
        alias = "expression"
    )]
    emotion: Option<String>,
    /// Full distribution; used when no top label is given.
    #[serde(default)]
    emotions: Option<HashMap<String, f32>>,
    #[serde(default, alias = "confidence")]
    score: Option<f32>,
    #[serde(default, alias = "name")]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireMarkInfo {
    Full(AttendanceMark),
    Bare(String),
}

#[derive(Debug, Deserialize)]
struct WireFunResult {
    #[serde(default)]
    results: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct WireAttResult {
    #[serde(default)]
    results: Vec<Value>,
    #[serde(default)]
    marked: Vec<String>,
    #[serde(default)]
    marked_info: Vec<WireMarkInfo>,
}

fn normalize_label(label: Option<String>) -> Option<String> {
    let label = label?;
    let trimmed = label.trim();
    if trimmed.is_empty()
        || UNKNOWN_LABELS
            .iter()
            .any(|u| trimmed.eq_ignore_ascii_case(u))
    {
        return None;
    }
    Some(trimmed.to_string())
}

impl WireEmotion {
    /// A face without any emotion label keeps its box with an empty label.
    fn into_result(self) -> EmotionResult {
        let from_distribution = || {
            self.emotions.as_ref().and_then(|dist| {
                dist.iter()
                    .filter(|(_, p)| p.is_finite())
                    .max_by(|a, b| a.1.total_cmp(b.1))
                    .map(|(name, p)| (name.clone(), *p))
            })
        };

        let (top, score) = match self.emotion.as_deref().map(str::trim) {
            Some(e) if !e.is_empty() => (e.to_string(), self.score.unwrap_or(0.0)),
            _ => match from_distribution() {
                Some((name, p)) => (name, self.score.unwrap_or(p)),
                None => (String::new(), self.score.unwrap_or(0.0)),
            },
        };

        EmotionResult {
            bounds: self.bounds.into(),
            top_emotion_label: top,
            score,
            label: normalize_label(self.label),
        }
    }
}

/// Decode a `fun_result` payload. Items that cannot be normalized are dropped.
pub fn decode_emotion_batch(payload: &[u8]) -> Result<Vec<EmotionResult>, SchemaError> {
    let wire: WireFunResult = serde_json::from_slice(payload)?;
    let total = wire.results.len();

    let results: Vec<EmotionResult> = wire
        .results
        .into_iter()
        .filter_map(|item| serde_json::from_value::<WireEmotion>(item).ok())
        .map(WireEmotion::into_result)
        .collect();

    if results.len() != total {
        tracing::debug!(
            total,
            kept = results.len(),
            "Dropped malformed emotion results"
        );
    }

    Ok(results)
}

/// Decode an `att_result` payload. Items that cannot be normalized are dropped.
pub fn decode_identity_batch(payload: &[u8]) -> Result<IdentityBatch, SchemaError> {
    let wire: WireAttResult = serde_json::from_slice(payload)?;
    let total = wire.results.len();

    let results: Vec<IdentityResult> = wire
        .results
        .into_iter()
        .filter_map(|item| serde_json::from_value::<WireIdentity>(item).ok())
        .map(|w| IdentityResult {
            bounds: w.bounds.into(),
            label: normalize_label(w.label),
            score: w.score.unwrap_or(0.0),
        })
        .collect();

    if results.len() != total {
        tracing::debug!(
            total,
            kept = results.len(),
            "Dropped malformed identity results"
        );
    }

    let mut marked: Vec<AttendanceMark> = wire
        .marked_info
        .into_iter()
        .map(|info| match info {
            WireMarkInfo::Full(mark) => mark,
            WireMarkInfo::Bare(label) => AttendanceMark {
                label,
                score: None,
                message: None,
            },
        })
        .collect();

    // `marked` lists labels; anything not already described by `marked_info`
    // still counts as a mark.
    for label in wire.marked {
        if !marked.iter().any(|m| m.label == label) {
            marked.push(AttendanceMark {
                label,
                score: None,
                message: None,
            });
        }
    }

    Ok(IdentityBatch { results, marked })
}
