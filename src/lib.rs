//! # Call core for a real-time conferencing endpoint
//!
//! `call-core` is the central dispatch and lifecycle core of an A/V
//! conferencing engine. It owns the set of concurrently active send and
//! receive streams, routes inbound RTP/RTCP packets to the right stream by
//! SSRC, coordinates one congestion controller across all streams, and
//! maintains audio/video lip-sync pairings within named sync groups.
//!
//! ## Core components
//!
//! - **[`Call`]**: stream registries, packet dispatch, network broadcast,
//!   bitrate governance, stats aggregation
//! - **Receive ingress** ([`receive`]): per-stream pipeline from header
//!   parse through FEC/RTX unwrapping to the payload handoff
//! - **Streams** ([`audio`], [`video`]): caller-owned handles created and
//!   destroyed through the call
//! - **[`congestion`]**: the shared bandwidth coordination surface
//!
//! Codec internals, jitter buffers, the full RTP/RTCP stack and the wire
//! transport are collaborators behind seams, not part of this crate.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use call_core::{Call, CallConfig, MediaType, PacketTime};
//! use call_core::video::VideoReceiveConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let call = Call::new(CallConfig::default());
//!     let stream = call.create_video_receive_stream(VideoReceiveConfig {
//!         remote_ssrc: 0x1234,
//!         ..Default::default()
//!     });
//!     stream.start();
//!
//!     // Network thread:
//!     // call.deliver_packet(MediaType::Video, &packet, PacketTime::not_set());
//!
//!     call.destroy_video_receive_stream(stream);
//! }
//! ```

// Core modules
pub mod audio;
pub mod call;
pub mod clock;
pub mod config;
pub mod congestion;
pub mod error;
pub mod event_log;
pub mod packet;
pub mod process;
pub mod receive;
pub mod stats;
pub mod types;
pub mod video;

// Re-export core types
pub use call::Call;
pub use config::{BitrateConfig, CallConfig, DEFAULT_START_BITRATE_BPS};
pub use error::{Error, Result};
pub use stats::Stats;
pub use types::{
    DeliveryStatus, MediaType, NetworkState, PacketTime, PayloadType, RtpSequenceNumber,
    RtpSsrc, RtpState, RtpStateMap, RtpTimestamp, SentPacket,
};

/// Prelude module with commonly used types
pub mod prelude {
    pub use crate::audio::{
        AudioReceiveConfig, AudioReceiveStream, AudioSendConfig, AudioSendStream, VoiceEngine,
    };
    pub use crate::call::Call;
    pub use crate::clock::{Clock, SimulatedClock, SystemClock};
    pub use crate::config::{BitrateConfig, CallConfig};
    pub use crate::congestion::{CongestionController, RemoteBitrateEstimator};
    pub use crate::error::{Error, Result};
    pub use crate::event_log::{EventLog, NullEventLog};
    pub use crate::receive::{
        MediaPayloadHeader, MediaSink, PayloadSpecifics, RttProvider, VideoCodecType,
    };
    pub use crate::stats::Stats;
    pub use crate::types::{
        DeliveryStatus, MediaType, NetworkState, PacketTime, RtpSsrc, RtpState,
    };
    pub use crate::video::{
        RtxConfig, VideoDecoderConfig, VideoEncoderConfig, VideoReceiveConfig,
        VideoReceiveStream, VideoSendConfig, VideoSendStream,
    };
}
