pub mod boxes;
pub mod transform;

pub use boxes::{DetectionBox, iou};
pub use transform::{Size, TransformParameters, compute_letterbox_transform};
