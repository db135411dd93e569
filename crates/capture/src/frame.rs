use geometry::Size;
use std::time::Instant;

/// Latest decoded camera frame, tightly packed RGB8.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub sequence: u64,
    pub captured_at: Instant,
}

impl VideoFrame {
    pub fn new(rgb: Vec<u8>, width: u32, height: u32, sequence: u64) -> Self {
        Self {
            rgb,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        }
    }

    /// Solid-color frame, handy for drivers that have no signal yet and for tests.
    pub fn filled(width: u32, height: u32, color: [u8; 3], sequence: u64) -> Self {
        let rgb = color
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(rgb, width, height, sequence)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Dimensions known and buffer consistent with them.
    pub fn is_ready(&self) -> bool {
        !self.size().is_empty() && self.rgb.len() == (self.width * self.height * 3) as usize
    }
}

/// Encoded still sent over the event channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    pub size: Size,
    pub codec: crate::encoder::Codec,
}
