use serde::{Deserialize, Serialize};

/// Axis-aligned box in the pixel space of the capture surface that produced it.
///
/// Coordinates may be negative or past the surface edge; only the extent is
/// normalized (negative width/height collapse to zero).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DetectionBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DetectionBox {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width: width.max(0.0),
            height: height.max(0.0),
        }
    }

    /// Build from corner coordinates. Swapped corners are reordered.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        let (left, right) = if x1 <= x2 { (x1, x2) } else { (x2, x1) };
        let (top, bottom) = if y1 <= y2 { (y1, y2) } else { (y2, y1) };
        Self::new(left, top, right - left, bottom - top)
    }

    #[inline]
    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    #[inline]
    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    pub fn center(&self) -> (f32, f32) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Scale both axes independently, e.g. to move a box between two capture surfaces.
    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self::new(self.x * sx, self.y * sy, self.width * sx, self.height * sy)
    }
}

/// Intersection-over-union of two boxes, in `[0, 1]`.
///
/// Degenerate pairs (zero union area) never match and yield `0.0`.
pub fn iou(a: &DetectionBox, b: &DetectionBox) -> f32 {
    let inter_w = (a.right().min(b.right()) - a.x.max(b.x)).max(0.0);
    let inter_h = (a.bottom().min(b.bottom()) - a.y.max(b.y)).max(0.0);
    let intersection = inter_w * inter_h;

    let union = a.area() + b.area() - intersection;
    if union <= 0.0 || !union.is_finite() {
        return 0.0;
    }

    (intersection / union).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(x: f32, y: f32, w: f32, h: f32) -> DetectionBox {
        DetectionBox::new(x, y, w, h)
    }

    #[test]
    fn iou_is_symmetric() {
        let pairs = [
            (bx(0.0, 0.0, 10.0, 10.0), bx(5.0, 5.0, 10.0, 10.0)),
            (bx(-20.0, 3.0, 40.0, 7.0), bx(0.0, 0.0, 4.0, 50.0)),
            (bx(100.0, 50.0, 80.0, 80.0), bx(105.0, 55.0, 78.0, 78.0)),
        ];
        for (a, b) in pairs {
            assert_eq!(iou(&a, &b), iou(&b, &a));
        }
    }

    #[test]
    fn iou_of_box_with_itself_is_one() {
        let a = bx(12.5, -3.0, 33.0, 41.0);
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = bx(0.0, 0.0, 10.0, 10.0);
        let b = bx(20.0, 20.0, 10.0, 10.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn touching_edges_do_not_overlap() {
        let a = bx(0.0, 0.0, 10.0, 10.0);
        let b = bx(10.0, 0.0, 10.0, 10.0);
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn degenerate_boxes_never_match() {
        let a = bx(5.0, 5.0, 0.0, 0.0);
        assert_eq!(iou(&a, &a), 0.0);
        assert_eq!(iou(&a, &bx(0.0, 0.0, 10.0, 10.0)), 0.0);
    }

    #[test]
    fn contained_quarter_box_is_exactly_a_quarter() {
        let outer = bx(0.0, 0.0, 10.0, 10.0);
        let inner = bx(0.0, 0.0, 5.0, 5.0);
        assert_eq!(iou(&outer, &inner), 0.25);
    }

    #[test]
    fn negative_extent_collapses_to_zero() {
        let b = DetectionBox::new(3.0, 4.0, -5.0, -1.0);
        assert_eq!(b.width, 0.0);
        assert_eq!(b.height, 0.0);
    }

    #[test]
    fn from_corners_reorders_swapped_points() {
        let b = DetectionBox::from_corners(30.0, 40.0, 10.0, 20.0);
        assert_eq!(b, bx(10.0, 20.0, 20.0, 20.0));
    }
}
