//! Minimal RTCP reading for the dispatch core.
//!
//! The core does not generate RTCP; it only reads enough of inbound compound
//! packets to match them to streams, derive round-trip times from receiver
//! reports, and feed sender-report NTP timestamps to the remote-NTP
//! estimator.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::types::{RtpSsrc, RtpTimestamp};

/// RTCP packet types as defined in RFC 3550 / RFC 4585
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RtcpPacketType {
    /// Sender Report (SR)
    SenderReport = 200,

    /// Receiver Report (RR)
    ReceiverReport = 201,

    /// Source Description (SDES)
    SourceDescription = 202,

    /// Goodbye (BYE)
    Goodbye = 203,

    /// Application-Defined (APP)
    ApplicationDefined = 204,

    /// Transport-layer feedback (RTPFB)
    TransportFeedback = 205,

    /// Payload-specific feedback (PSFB)
    PayloadFeedback = 206,
}

impl RtcpPacketType {
    /// Map a packet-type byte to a known RTCP type
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            200 => Some(Self::SenderReport),
            201 => Some(Self::ReceiverReport),
            202 => Some(Self::SourceDescription),
            203 => Some(Self::Goodbye),
            204 => Some(Self::ApplicationDefined),
            205 => Some(Self::TransportFeedback),
            206 => Some(Self::PayloadFeedback),
            _ => None,
        }
    }
}

/// NTP timestamp representation (64 bits)
/// As defined in RFC 3550
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NtpTimestamp {
    /// Seconds since January 1, 1900
    pub seconds: u32,

    /// Fraction of a second
    pub fraction: u32,
}

impl NtpTimestamp {
    /// Create a new NTP timestamp from the current system time
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0));

        // NTP epoch starts 70 years before UNIX epoch (2208988800 seconds)
        let ntp_seconds = now.as_secs() + 2208988800;
        let nanos = now.subsec_nanos();
        let ntp_fraction = (nanos as u64 * 0x100000000u64 / 1_000_000_000) as u32;

        Self {
            seconds: ntp_seconds as u32,
            fraction: ntp_fraction,
        }
    }

    /// Build a timestamp from the raw seconds/fraction fields of an SR
    pub fn from_parts(seconds: u32, fraction: u32) -> Self {
        Self { seconds, fraction }
    }

    /// Convert to a 64-bit representation
    pub fn to_u64(&self) -> u64 {
        (self.seconds as u64) << 32 | (self.fraction as u64)
    }

    /// Convert to the compact 32-bit representation used in RTCP report
    /// blocks (middle 16 bits of seconds, top 16 bits of fraction), per
    /// RFC 3550 Section 6.4.1.
    pub fn to_compact_u32(&self) -> u32 {
        ((self.seconds & 0x0000FFFF) << 16) | ((self.fraction & 0xFFFF0000) >> 16)
    }

    /// Milliseconds since the UNIX epoch represented by this timestamp
    pub fn to_unix_ms(&self) -> i64 {
        const NTP_TO_UNIX_OFFSET: u64 = 2208988800;
        let seconds = (self.seconds as u64).saturating_sub(NTP_TO_UNIX_OFFSET);
        let frac_ms = ((self.fraction as u64) * 1000) >> 32;
        (seconds * 1000 + frac_ms) as i64
    }
}

/// Report block in RTCP SR/RR packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportBlock {
    /// SSRC of the source this report is about
    pub ssrc: RtpSsrc,

    /// Fraction of packets lost since the last report
    pub fraction_lost: u8,

    /// Cumulative number of packets lost
    pub cumulative_lost: u32,

    /// Extended highest sequence number received
    pub highest_seq: u32,

    /// Interarrival jitter
    pub jitter: u32,

    /// Compact NTP timestamp of the last SR received from this source
    pub last_sr: u32,

    /// Delay since that SR, in 1/65536 seconds
    pub delay_since_last_sr: u32,
}

impl ReportBlock {
    /// Round-trip time derived from this report block, or `None` when no SR
    /// has been mirrored back yet. `now` is the receive time of the report.
    pub fn round_trip_ms(&self, now: NtpTimestamp) -> Option<i64> {
        if self.last_sr == 0 {
            return None;
        }
        let elapsed = now
            .to_compact_u32()
            .wrapping_sub(self.last_sr)
            .wrapping_sub(self.delay_since_last_sr);
        // Compact NTP units are 1/65536 seconds.
        Some((elapsed as u64 * 1000 >> 16) as i64)
    }

    fn parse(chunk: &[u8]) -> Self {
        Self {
            ssrc: be_u32(&chunk[0..4]),
            fraction_lost: chunk[4],
            cumulative_lost: be_u32(&chunk[4..8]) & 0x00ff_ffff,
            highest_seq: be_u32(&chunk[8..12]),
            jitter: be_u32(&chunk[12..16]),
            last_sr: be_u32(&chunk[16..20]),
            delay_since_last_sr: be_u32(&chunk[20..24]),
        }
    }
}

/// One constituent of a compound RTCP packet, decoded as far as the
/// dispatch core cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RtcpReport {
    /// Sender report with its NTP/RTP timestamp pair
    SenderReport {
        /// SSRC of the sender
        sender_ssrc: RtpSsrc,
        /// NTP timestamp of the report
        ntp: NtpTimestamp,
        /// RTP timestamp corresponding to the NTP timestamp
        rtp_timestamp: RtpTimestamp,
        /// Report blocks appended to the SR
        report_blocks: Vec<ReportBlock>,
    },
    /// Receiver report
    ReceiverReport {
        /// SSRC of the reporting receiver
        sender_ssrc: RtpSsrc,
        /// Report blocks carried by the RR
        report_blocks: Vec<ReportBlock>,
    },
    /// Any other valid RTCP constituent
    Other {
        /// Packet type byte
        packet_type: u8,
    },
}

/// Iterator over the constituents of a compound RTCP packet.
///
/// Stops at the first malformed chunk; a compound packet whose first chunk
/// is malformed yields nothing.
pub struct RtcpReportIter<'a> {
    rest: &'a [u8],
}

impl<'a> RtcpReportIter<'a> {
    /// Iterate over the RTCP constituents of `packet`
    pub fn new(packet: &'a [u8]) -> Self {
        Self { rest: packet }
    }
}

impl<'a> Iterator for RtcpReportIter<'a> {
    type Item = RtcpReport;

    fn next(&mut self) -> Option<RtcpReport> {
        if self.rest.len() < 4 || self.rest[0] >> 6 != 2 {
            return None;
        }
        let count = (self.rest[0] & 0x1f) as usize;
        let packet_type = self.rest[1];
        let length_bytes = (be_u16(&self.rest[2..4]) as usize + 1) * 4;
        if self.rest.len() < length_bytes {
            return None;
        }
        let body = &self.rest[4..length_bytes];
        self.rest = &self.rest[length_bytes..];

        let report = match RtcpPacketType::from_u8(packet_type) {
            Some(RtcpPacketType::SenderReport) if body.len() >= 24 + count * 24 => {
                RtcpReport::SenderReport {
                    sender_ssrc: be_u32(&body[0..4]),
                    ntp: NtpTimestamp::from_parts(be_u32(&body[4..8]), be_u32(&body[8..12])),
                    rtp_timestamp: be_u32(&body[12..16]),
                    report_blocks: parse_blocks(&body[24..], count),
                }
            }
            Some(RtcpPacketType::ReceiverReport) if body.len() >= 4 + count * 24 => {
                RtcpReport::ReceiverReport {
                    sender_ssrc: be_u32(&body[0..4]),
                    report_blocks: parse_blocks(&body[4..], count),
                }
            }
            _ => RtcpReport::Other { packet_type },
        };
        Some(report)
    }
}

fn parse_blocks(body: &[u8], count: usize) -> Vec<ReportBlock> {
    body.chunks_exact(24).take(count).map(ReportBlock::parse).collect()
}

fn be_u16(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[0], bytes[1]])
}

fn be_u32(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
