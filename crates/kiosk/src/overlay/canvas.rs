use super::palette::Rgba;
use super::scene::{CHIP_HEIGHT, CHIP_PADDING, Chip, OverlayScene};
use ab_glyph::{FontRef, PxScale};
use geometry::{DetectionBox, Size};
use image::{ImageFormat, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::io::Cursor;

pub const STROKE_WIDTH: u32 = 3;
const CHIP_ALPHA: u8 = 0xCC;
const TEXT_SCALE: f32 = 15.0;

static CHIP_FONT: &[u8] = include_bytes!("../../assets/DejaVuSans-Bold.ttf");

/// Transparent overlay raster matching the display surface: box strokes and
/// label chips with their text.
pub struct RasterCanvas {
    image: RgbaImage,
    font: Option<FontRef<'static>>,
}

impl RasterCanvas {
    pub fn new(size: Size) -> Self {
        let font = match FontRef::try_from_slice(CHIP_FONT) {
            Ok(font) => Some(font),
            Err(e) => {
                tracing::warn!(error = %e, "Chip font unusable, labels drawn without text");
                None
            }
        };

        Self {
            image: RgbaImage::new(size.width.max(1), size.height.max(1)),
            font,
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.image.width(), self.image.height())
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    /// Clear and repaint. Reallocates when the display size changed.
    pub fn paint(&mut self, scene: &OverlayScene) {
        if scene.display != self.size() && !scene.display.is_empty() {
            self.image = RgbaImage::new(scene.display.width, scene.display.height);
        } else {
            self.image.pixels_mut().for_each(|p| *p = image::Rgba([0, 0, 0, 0]));
        }

        for face in &scene.faces {
            let color = pixel(face.color, u8::MAX);
            for inset in 0..STROKE_WIDTH {
                if let Some(rect) = to_rect(&face.bounds, inset) {
                    draw_hollow_rect_mut(&mut self.image, rect, color);
                }
            }
            self.fill_chip(&face.identity_chip, face.color);
            self.fill_chip(&face.emotion_chip, face.color);
        }
    }

    fn fill_chip(&mut self, chip: &Chip, color: Rgba) {
        let Some(rect) = to_rect(&chip.bounds, 0) else {
            return;
        };
        draw_filled_rect_mut(&mut self.image, rect, pixel(color, CHIP_ALPHA));

        if let Some(font) = &self.font {
            let x = (chip.bounds.x + CHIP_PADDING).round() as i32;
            let y = (chip.bounds.y + (CHIP_HEIGHT - TEXT_SCALE) / 2.0).floor() as i32;
            draw_text_mut(
                &mut self.image,
                text_color(color),
                x,
                y,
                PxScale::from(TEXT_SCALE),
                font,
                &chip.text,
            );
        }
    }

    pub fn encode_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let mut png_bytes = Cursor::new(Vec::new());
        self.image.write_to(&mut png_bytes, ImageFormat::Png)?;
        Ok(png_bytes.into_inner())
    }
}

fn pixel(color: Rgba, alpha: u8) -> image::Rgba<u8> {
    image::Rgba([color.0, color.1, color.2, alpha])
}

/// Dark text on light chips, white otherwise.
fn text_color(chip: Rgba) -> image::Rgba<u8> {
    let luma = 0.299 * chip.0 as f32 + 0.587 * chip.1 as f32 + 0.114 * chip.2 as f32;
    if luma > 160.0 {
        image::Rgba([0x11, 0x18, 0x27, 0xFF])
    } else {
        image::Rgba([0xFF, 0xFF, 0xFF, 0xFF])
    }
}

/// Pixel rect shrunk by `inset` on every side; `None` once it collapses.
fn to_rect(b: &DetectionBox, inset: u32) -> Option<Rect> {
    let inset = inset as f32;
    let x0 = (b.x + inset).round();
    let y0 = (b.y + inset).round();
    let x1 = (b.right() - inset).round();
    let y1 = (b.bottom() - inset).round();

    if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
        return None;
    }
    Some(Rect::at(x0 as i32, y0 as i32).of_size((x1 - x0) as u32, (y1 - y0) as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::palette::Emotion;
    use crate::overlay::scene::{ChipPlacement, FaceOverlay, place_chip};
    use geometry::TransformParameters;

    fn scene(display: Size, bounds: DetectionBox) -> OverlayScene {
        let emotion = Emotion::Sad;
        OverlayScene {
            sequence: 1,
            received_at_ms: 0,
            display,
            transform: TransformParameters::IDENTITY,
            faces: vec![FaceOverlay {
                bounds,
                color: emotion.color(),
                emotion: Some(emotion),
                matched: true,
                identity_chip: place_chip(&bounds, "alice".into(), ChipPlacement::Above, display),
                emotion_chip: place_chip(&bounds, "Sad".into(), ChipPlacement::Below, display),
            }],
        }
    }

    #[test]
    fn box_stroke_and_chips_are_painted() {
        let display = Size::new(200, 200);
        let mut canvas = RasterCanvas::new(display);
        canvas.paint(&scene(display, DetectionBox::new(50.0, 50.0, 60.0, 60.0)));

        let stroke = canvas.image().get_pixel(50, 80);
        assert_eq!(stroke.0, [0x3B, 0x82, 0xF6, 0xFF]);
        let inner_stroke = canvas.image().get_pixel(52, 80);
        assert_eq!(inner_stroke.0[3], 0xFF);

        // inside the box stays transparent
        assert_eq!(canvas.image().get_pixel(80, 80).0[3], 0);
        // identity chip above the box, left padding still plain background
        assert_eq!(canvas.image().get_pixel(51, 30).0[3], CHIP_ALPHA);

        // "alice" glyphs: white text over the blue chip at x 50..107, y 28..50
        let glyph_pixels = (50..107)
            .flat_map(|x| (28..50).map(move |y| (x, y)))
            .filter(|&(x, y)| canvas.image().get_pixel(x, y).0[0] > 0xC0)
            .count();
        assert!(glyph_pixels > 20, "only {glyph_pixels} glyph pixels");
    }

    #[test]
    fn chip_text_contrasts_with_background() {
        assert_eq!(text_color(Emotion::Sad.color()).0, [0xFF; 4]);
        assert_eq!(text_color(Emotion::Happy.color()).0[0], 0x11);
    }

    #[test]
    fn repaint_clears_previous_frame() {
        let display = Size::new(200, 200);
        let mut canvas = RasterCanvas::new(display);
        canvas.paint(&scene(display, DetectionBox::new(50.0, 50.0, 60.0, 60.0)));

        let mut empty = scene(display, DetectionBox::new(0.0, 0.0, 1.0, 1.0));
        empty.faces.clear();
        canvas.paint(&empty);

        assert!(canvas.image().pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn canvas_follows_display_size() {
        let mut canvas = RasterCanvas::new(Size::new(100, 100));
        canvas.paint(&scene(Size::new(320, 240), DetectionBox::new(10.0, 10.0, 30.0, 30.0)));
        assert_eq!(canvas.size(), Size::new(320, 240));
    }

    #[test]
    fn tiny_boxes_do_not_panic() {
        let display = Size::new(100, 100);
        let mut canvas = RasterCanvas::new(display);
        canvas.paint(&scene(display, DetectionBox::new(10.0, 10.0, 0.4, 0.4)));
        assert_eq!(to_rect(&DetectionBox::new(10.0, 10.0, 4.0, 4.0), 2), None);
    }

    #[test]
    fn png_output_has_signature() {
        let canvas = RasterCanvas::new(Size::new(16, 16));
        let png = canvas.encode_png().unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }
}
