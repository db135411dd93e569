use geometry::DetectionBox;
use serde::{Deserialize, Serialize};

/// Which backend stream a frame or result belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    /// Face identity / attendance marking.
    Identity,
    /// Facial emotion ("fun meter").
    Emotion,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Identity => "identity",
            StreamKind::Emotion => "emotion",
        }
    }
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recognized or unrecognized face from the identity stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityResult {
    #[serde(rename = "box")]
    pub bounds: DetectionBox,
    pub label: Option<String>,
    pub score: f32,
}

impl IdentityResult {
    /// Label usable for fusion: present and not blank.
    pub fn usable_label(&self) -> Option<&str> {
        self.label.as_deref().filter(|l| !l.trim().is_empty())
    }
}

/// One detected face from the emotion stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmotionResult {
    #[serde(rename = "box")]
    pub bounds: DetectionBox,
    pub top_emotion_label: String,
    pub score: f32,
    /// Identity label the emotion backend attached itself, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// `att_cfg` payload: identity match threshold and whether matches are
/// persisted as attendance events by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub th: f32,
    pub mark: bool,
}

/// Attendance-marking side effect reported alongside an identity batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceMark {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Normalized `att_result` event.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct IdentityBatch {
    pub results: Vec<IdentityResult>,
    pub marked: Vec<AttendanceMark>,
}
