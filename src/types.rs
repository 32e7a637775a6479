//! Core types shared across the call multiplexer.

use std::collections::HashMap;

/// RTP synchronization source identifier (32 bits)
pub type RtpSsrc = u32;

/// RTP sequence number (16 bits)
pub type RtpSequenceNumber = u16;

/// RTP timestamp (32 bits)
pub type RtpTimestamp = u32;

/// RTP payload type (7 bits, carried in a byte)
pub type PayloadType = u8;

/// Media type hint attached to inbound packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// No hint, try audio then video
    Any,
    /// Audio only
    Audio,
    /// Video only
    Video,
}

/// Network reachability state broadcast to all streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkState {
    /// Transport is usable
    Up,
    /// Transport is unusable, suspend sending
    Down,
}

/// Outcome of delivering one inbound packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// At least one stream accepted the packet
    Ok,
    /// Malformed packet or no stream could process it
    PacketError,
    /// Well-formed RTP whose SSRC matches no receive stream
    UnknownSsrc,
}

/// Capture time attached to an inbound packet by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketTime {
    /// Capture timestamp in microseconds, if the transport recorded one
    pub timestamp_us: Option<i64>,
}

impl PacketTime {
    /// A packet time with a known capture timestamp
    pub fn with_timestamp_us(timestamp_us: i64) -> Self {
        Self { timestamp_us: Some(timestamp_us) }
    }

    /// A packet time without a capture timestamp
    pub fn not_set() -> Self {
        Self { timestamp_us: None }
    }
}

/// Notification that the transport put a packet on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SentPacket {
    /// Transport-wide packet id, if feedback is negotiated
    pub packet_id: Option<u16>,

    /// Send time in milliseconds
    pub send_time_ms: i64,
}

/// Per-SSRC RTP sender state, preserved across stream destruction so a
/// later stream reusing the SSRC resumes sequencing instead of restarting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtpState {
    /// Next sequence number to send
    pub sequence_number: RtpSequenceNumber,

    /// Timestamp offset of the stream
    pub start_timestamp: RtpTimestamp,

    /// Last RTP timestamp sent
    pub timestamp: RtpTimestamp,

    /// Capture time of the last sent frame
    pub capture_time_ms: i64,

    /// Wall-clock time the timestamp was last advanced
    pub last_timestamp_time_ms: i64,

    /// Whether any media packet went out on this SSRC
    pub media_has_been_sent: bool,
}

/// Map of per-SSRC RTP sender states
pub type RtpStateMap = HashMap<RtpSsrc, RtpState>;
