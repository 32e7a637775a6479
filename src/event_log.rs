//! Event-log seam.
//!
//! The call emits one event per successfully delivered packet and one per
//! video stream configuration. The concrete log (file-backed, in-memory
//! ring, ...) belongs to the embedding engine; the call only needs the
//! recording surface.

use crate::types::MediaType;
use crate::video::{VideoReceiveConfig, VideoSendConfig};

/// Recording surface for diagnostic events
pub trait EventLog: Send + Sync {
    /// Record the header of a delivered RTP packet
    fn log_rtp_header(&self, incoming: bool, media_type: MediaType, packet: &[u8]);

    /// Record a delivered RTCP packet
    fn log_rtcp_packet(&self, incoming: bool, media_type: MediaType, packet: &[u8]);

    /// Record the configuration of a newly created video send stream
    fn log_video_send_stream_config(&self, config: &VideoSendConfig);

    /// Record the configuration of a newly created video receive stream
    fn log_video_receive_stream_config(&self, config: &VideoReceiveConfig);
}

/// Event log that discards everything
#[derive(Debug, Default)]
pub struct NullEventLog;

impl EventLog for NullEventLog {
    fn log_rtp_header(&self, _incoming: bool, _media_type: MediaType, _packet: &[u8]) {}

    fn log_rtcp_packet(&self, _incoming: bool, _media_type: MediaType, _packet: &[u8]) {}

    fn log_video_send_stream_config(&self, _config: &VideoSendConfig) {}

    fn log_video_receive_stream_config(&self, _config: &VideoReceiveConfig) {}
}
