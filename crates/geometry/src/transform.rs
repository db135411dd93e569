use crate::DetectionBox;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Maps capture-surface coordinates onto display-surface coordinates:
/// `display = capture * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TransformParameters {
    pub scale_x: f32,
    pub scale_y: f32,
    pub offset_x: f32,
    pub offset_y: f32,
}

impl Default for TransformParameters {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl TransformParameters {
    pub const IDENTITY: Self = Self {
        scale_x: 1.0,
        scale_y: 1.0,
        offset_x: 0.0,
        offset_y: 0.0,
    };

    #[inline]
    pub fn apply_point(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale_x + self.offset_x,
            y * self.scale_y + self.offset_y,
        )
    }

    pub fn apply_box(&self, b: &DetectionBox) -> DetectionBox {
        let (x, y) = self.apply_point(b.x, b.y);
        DetectionBox::new(x, y, b.width * self.scale_x, b.height * self.scale_y)
    }
}

/// Derive the capture → display mapping for media shown with "cover" fit.
///
/// Capture space is first scaled uniformly into native media space, then the
/// media is scaled so it fills `display` on both axes, centered, with the
/// overflowing axis cropped (negative offset on that axis).
///
/// Missing dimensions degrade to a direct capture → display stretch with zero
/// offset rather than failing.
pub fn compute_letterbox_transform(
    capture: Size,
    native: Size,
    display: Size,
) -> TransformParameters {
    if capture.is_empty() || native.is_empty() || display.is_empty() {
        return direct_stretch(capture, display);
    }

    let capture_to_native = native.width as f32 / capture.width as f32;

    let display_w = display.width as f32;
    let display_h = display.height as f32;
    let native_w = native.width as f32;
    let native_h = native.height as f32;

    let cover = (display_w / native_w).max(display_h / native_h);
    let rendered_w = native_w * cover;
    let rendered_h = native_h * cover;

    let scale = capture_to_native * cover;

    TransformParameters {
        scale_x: scale,
        scale_y: scale,
        offset_x: (display_w - rendered_w) / 2.0,
        offset_y: (display_h - rendered_h) / 2.0,
    }
}

fn direct_stretch(capture: Size, display: Size) -> TransformParameters {
    let axis = |display: u32, capture: u32| {
        if display == 0 || capture == 0 {
            1.0
        } else {
            display as f32 / capture as f32
        }
    };

    TransformParameters {
        scale_x: axis(display.width, capture.width),
        scale_y: axis(display.height, capture.height),
        offset_x: 0.0,
        offset_y: 0.0,
    }
}
