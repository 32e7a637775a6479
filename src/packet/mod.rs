//! Packet classification and header parsing.
//!
//! The dispatch core only needs enough of the wire format to route packets:
//! RTP/RTCP discrimination, the SSRC field, and the RTP header fields the
//! receive pipeline consumes. Everything deeper belongs to the protocol
//! stack proper.

pub mod header;
pub mod rtcp;

pub use header::{RtpHeader, RtpHeaderExtensions, RtpHeaderParser, RtpExtensionType};
pub use rtcp::{NtpTimestamp, ReportBlock, RtcpPacketType, RtcpReport, RtcpReportIter};

/// Minimum length of an RTP packet (a bare 12-byte header)
pub const RTP_MIN_HEADER_LEN: usize = 12;

/// Clock frequency applied to all video payload types
pub const VIDEO_PAYLOAD_TYPE_FREQUENCY: u32 = 90_000;
