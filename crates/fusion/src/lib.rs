pub mod engine;
pub mod store;

pub use engine::{DEFAULT_MIN_IOU, FusionConfig, FusionEngine, FusionRecord, best_match, fuse};
pub use store::{DEFAULT_MAX_IDENTITY_AGE_MS, ResultBatch, ResultStore};
