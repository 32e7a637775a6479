//! Video streams.

pub mod receive;
pub mod send;

pub use receive::{RtxConfig, VideoDecoderConfig, VideoReceiveConfig, VideoReceiveStream};
pub use send::{VideoEncoderConfig, VideoSendConfig, VideoSendStream};
