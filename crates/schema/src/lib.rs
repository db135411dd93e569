pub mod errors;
pub mod results;
pub mod wire;

pub use errors::SchemaError;
pub use results::{
    AttendanceMark, EmotionResult, IdentityBatch, IdentityConfig, IdentityResult, StreamKind,
};
pub use wire::{decode_emotion_batch, decode_identity_batch};
