//! Overlay rendering: fusion output mapped into display space, laid out as
//! boxes plus label chips, and rasterized for the display client.

mod canvas;
mod palette;
mod renderer;
mod scene;

pub use canvas::RasterCanvas;
pub use palette::{DEFAULT_COLOR, Emotion, EmotionStyle, Rgba};
pub use renderer::{OverlayRenderer, RenderPass};
pub use scene::{Chip, ChipPlacement, FaceOverlay, OverlayScene, UNKNOWN_LABEL};
