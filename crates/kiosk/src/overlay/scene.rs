use super::palette::{Emotion, EmotionStyle, Rgba};
use geometry::{DetectionBox, Size, TransformParameters};
use serde::Serialize;

pub const CHIP_HEIGHT: f32 = 22.0;
pub const CHIP_PADDING: f32 = 6.0;
/// Average glyph advance of the chip font.
pub const CHAR_WIDTH: f32 = 9.0;
pub const UNKNOWN_LABEL: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChipPlacement {
    Above,
    Below,
}

/// A filled label box attached to a face rectangle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chip {
    pub text: String,
    pub bounds: DetectionBox,
    /// Moved to the other side of the box edge to stay on screen.
    pub flipped: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceOverlay {
    /// Display-space rectangle, clamped to the display.
    pub bounds: DetectionBox,
    pub color: Rgba,
    pub emotion: Option<Emotion>,
    pub matched: bool,
    pub identity_chip: Chip,
    pub emotion_chip: Chip,
}

/// Everything drawn for one emotion batch, in display coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlayScene {
    pub sequence: u64,
    pub received_at_ms: u64,
    pub display: Size,
    pub transform: TransformParameters,
    pub faces: Vec<FaceOverlay>,
}

impl OverlayScene {
    pub fn unmatched(&self) -> usize {
        self.faces.iter().filter(|f| !f.matched).count()
    }
}

/// Intersect `b` with the display; `None` when nothing is left to draw.
pub fn clamp_to_display(b: &DetectionBox, display: Size) -> Option<DetectionBox> {
    let (dw, dh) = (display.width as f32, display.height as f32);
    let x0 = b.x.max(0.0);
    let y0 = b.y.max(0.0);
    let x1 = b.right().min(dw);
    let y1 = b.bottom().min(dh);

    if !(x1 > x0 && y1 > y0) {
        return None;
    }
    Some(DetectionBox::new(x0, y0, x1 - x0, y1 - y0))
}

pub fn chip_width(text: &str) -> f32 {
    text.chars().count() as f32 * CHAR_WIDTH + 2.0 * CHIP_PADDING
}

/// Position a chip on the top or bottom edge of `anchor`, clamped horizontally
/// to the display and flipped across the edge when it would leave the screen.
pub fn place_chip(anchor: &DetectionBox, text: String, placement: ChipPlacement, display: Size) -> Chip {
    let (dw, dh) = (display.width as f32, display.height as f32);
    let width = chip_width(&text);

    let x = anchor.x.min(dw - width).max(0.0);

    let (y, flipped) = match placement {
        ChipPlacement::Above => {
            let y = anchor.y - CHIP_HEIGHT;
            if y < 0.0 { (anchor.y, true) } else { (y, false) }
        }
        ChipPlacement::Below => {
            let y = anchor.bottom();
            if y + CHIP_HEIGHT > dh {
                (anchor.bottom() - CHIP_HEIGHT, true)
            } else {
                (y, false)
            }
        }
    };
    let y = y.min(dh - CHIP_HEIGHT).max(0.0);

    Chip {
        text,
        bounds: DetectionBox::new(x, y, width, CHIP_HEIGHT),
        flipped,
    }
}

/// Emotion chip text: canonical name plus confidence when known.
pub fn emotion_text(style: &EmotionStyle, score: f32) -> String {
    if score > 0.0 && score <= 1.0 {
        format!("{} {:.0}%", style.text, score * 100.0)
    } else {
        style.text.clone()
    }
}
