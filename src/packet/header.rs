//! RTP header parsing and RTP/RTCP discrimination.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::types::{PayloadType, RtpSequenceNumber, RtpSsrc, RtpTimestamp};

use super::RTP_MIN_HEADER_LEN;

/// One-byte header-extension profile id (RFC 8285)
const ONE_BYTE_EXTENSION_PROFILE: u16 = 0xBEDE;

/// Header extensions the receive side can be configured to parse
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RtpExtensionType {
    /// Transmission time offset (RFC 5450)
    TransmissionTimeOffset,
    /// Absolute send time, 6.18 fixed point seconds
    AbsoluteSendTime,
    /// Coordination of video orientation
    VideoRotation,
    /// Transport-wide sequence number
    TransportSequenceNumber,
}

/// Extension values found in a parsed header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RtpHeaderExtensions {
    /// Transmission time offset in clock ticks, if present
    pub transmission_time_offset: Option<i32>,

    /// Absolute send time, if present
    pub absolute_send_time: Option<u32>,

    /// CVO rotation byte, if present
    pub video_rotation: Option<u8>,

    /// Transport-wide sequence number, if present
    pub transport_sequence_number: Option<u16>,
}

/// Parsed RTP header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    /// Marker bit
    pub marker: bool,

    /// Payload type (7 bits)
    pub payload_type: PayloadType,

    /// Sequence number
    pub sequence_number: RtpSequenceNumber,

    /// Media timestamp
    pub timestamp: RtpTimestamp,

    /// Synchronization source
    pub ssrc: RtpSsrc,

    /// Number of CSRC entries
    pub csrc_count: u8,

    /// Total header length in bytes, including CSRCs and extension
    pub header_length: usize,

    /// Padding length taken from the last packet byte when the P bit is set
    pub padding_length: usize,

    /// Clock frequency of the payload type, filled in by the receiver
    pub payload_type_frequency: u32,

    /// Parsed header-extension values
    pub extensions: RtpHeaderExtensions,
}

/// Parser for RTP headers with a registry of enabled header extensions.
///
/// Extensions are parsed only when an id has been registered for them;
/// unregistered elements are skipped.
#[derive(Debug, Default)]
pub struct RtpHeaderParser {
    extension_ids: HashMap<u8, RtpExtensionType>,
}

impl RtpHeaderParser {
    /// Create a parser with no extensions registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the buffer holds an RTCP packet.
    ///
    /// Discrimination follows RFC 5761: the byte at offset 1 falls in
    /// [192, 223] for RTCP packet types, a range no RTP marker/payload-type
    /// combination in use can produce.
    pub fn is_rtcp(packet: &[u8]) -> bool {
        packet.len() >= 4 && (192..=223).contains(&packet[1])
    }

    /// Read the SSRC at byte offset 8 of an RTP packet.
    pub fn read_ssrc(packet: &[u8]) -> Option<RtpSsrc> {
        if packet.len() < RTP_MIN_HEADER_LEN {
            return None;
        }
        Some(u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]))
    }

    /// Register an extension id. Returns false if the id is already taken
    /// by a different extension.
    pub fn register_extension(&mut self, extension: RtpExtensionType, id: u8) -> bool {
        if !(1..=14).contains(&id) {
            return false;
        }
        match self.extension_ids.get(&id) {
            Some(existing) if *existing != extension => false,
            _ => {
                self.extension_ids.retain(|_, ext| *ext != extension);
                self.extension_ids.insert(id, extension);
                true
            }
        }
    }

    /// Remove an extension registration
    pub fn deregister_extension(&mut self, extension: RtpExtensionType) {
        self.extension_ids.retain(|_, ext| *ext != extension);
    }

    /// Parse an RTP header from the start of `packet`.
    pub fn parse(&self, packet: &[u8]) -> Result<RtpHeader> {
        if packet.len() < RTP_MIN_HEADER_LEN {
            return Err(Error::packet_parse("packet shorter than RTP header"));
        }
        let version = packet[0] >> 6;
        if version != 2 {
            return Err(Error::packet_parse(format!("unsupported RTP version {}", version)));
        }
        let has_padding = packet[0] & 0x20 != 0;
        let has_extension = packet[0] & 0x10 != 0;
        let csrc_count = packet[0] & 0x0f;

        let mut header_length = RTP_MIN_HEADER_LEN + 4 * csrc_count as usize;
        if packet.len() < header_length {
            return Err(Error::packet_parse("packet truncated inside CSRC list"));
        }

        let mut extensions = RtpHeaderExtensions::default();
        if has_extension {
            if packet.len() < header_length + 4 {
                return Err(Error::packet_parse("packet truncated inside extension header"));
            }
            let profile =
                u16::from_be_bytes([packet[header_length], packet[header_length + 1]]);
            let words =
                u16::from_be_bytes([packet[header_length + 2], packet[header_length + 3]]) as usize;
            let extension_start = header_length + 4;
            let extension_end = extension_start + 4 * words;
            if packet.len() < extension_end {
                return Err(Error::packet_parse("packet truncated inside extension body"));
            }
            if profile == ONE_BYTE_EXTENSION_PROFILE {
                self.parse_one_byte_extensions(
                    &packet[extension_start..extension_end],
                    &mut extensions,
                );
            }
            header_length = extension_end;
        }

        let padding_length = if has_padding { packet[packet.len() - 1] as usize } else { 0 };
        if header_length + padding_length > packet.len() {
            return Err(Error::packet_parse("header and padding exceed packet length"));
        }

        Ok(RtpHeader {
            marker: packet[1] & 0x80 != 0,
            payload_type: packet[1] & 0x7f,
            sequence_number: u16::from_be_bytes([packet[2], packet[3]]),
            timestamp: u32::from_be_bytes([packet[4], packet[5], packet[6], packet[7]]),
            ssrc: u32::from_be_bytes([packet[8], packet[9], packet[10], packet[11]]),
            csrc_count,
            header_length,
            padding_length,
            payload_type_frequency: 0,
            extensions,
        })
    }

    fn parse_one_byte_extensions(&self, mut body: &[u8], out: &mut RtpHeaderExtensions) {
        while !body.is_empty() {
            let byte = body[0];
            if byte == 0 {
                // Alignment padding.
                body = &body[1..];
                continue;
            }
            let id = byte >> 4;
            let len = (byte & 0x0f) as usize + 1;
            if id == 15 || body.len() < 1 + len {
                return;
            }
            let data = &body[1..1 + len];
            if let Some(extension) = self.extension_ids.get(&id) {
                match extension {
                    RtpExtensionType::TransmissionTimeOffset if len == 3 => {
                        let raw =
                            (data[0] as i32) << 16 | (data[1] as i32) << 8 | data[2] as i32;
                        // Sign-extend the 24-bit value.
                        out.transmission_time_offset = Some(raw << 8 >> 8);
                    }
                    RtpExtensionType::AbsoluteSendTime if len == 3 => {
                        out.absolute_send_time = Some(
                            (data[0] as u32) << 16 | (data[1] as u32) << 8 | data[2] as u32,
                        );
                    }
                    RtpExtensionType::VideoRotation if len == 1 => {
                        out.video_rotation = Some(data[0]);
                    }
                    RtpExtensionType::TransportSequenceNumber if len == 2 => {
                        out.transport_sequence_number =
                            Some(u16::from_be_bytes([data[0], data[1]]));
                    }
                    _ => {}
                }
            }
            body = &body[1 + len..];
        }
    }
}
