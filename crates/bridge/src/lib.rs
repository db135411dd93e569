pub mod channel;
pub mod errors;
pub mod topics;

pub use channel::{ChannelConfig, ChannelEvent, EventChannel, demux};
pub use errors::BridgeError;
pub use topics::{Inbound, Outbound, Topics};
