//! Receive-side RTP payload registry.
//!
//! Tracks which payload types the receiver understands, the RTX and
//! RED/ULPFEC encapsulation configuration, and restores original packets
//! out of RTX retransmissions.

use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::packet::{RtpHeader, RTP_MIN_HEADER_LEN};
use crate::types::{PayloadType, RtpSsrc};

/// Video codec family of a registered payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodecType {
    /// Unknown or passthrough codec
    Generic,
    /// VP8
    Vp8,
    /// VP9
    Vp9,
    /// H.264
    H264,
}

impl VideoCodecType {
    fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "VP8" => Self::Vp8,
            "VP9" => Self::Vp9,
            "H264" => Self::H264,
            _ => Self::Generic,
        }
    }
}

/// Codec-specific metadata attached to a registered payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSpecifics {
    /// Audio payload parameters
    Audio {
        /// Clock frequency in Hz
        frequency: u32,
        /// Channel count
        channels: u8,
    },
    /// Video payload parameters
    Video {
        /// Codec family
        codec: VideoCodecType,
        /// Advertised maximum bitrate, 0 when unconstrained
        max_bitrate: u32,
    },
}

#[derive(Debug, Clone)]
struct PayloadEntry {
    name: String,
    specifics: PayloadSpecifics,
}

/// Registry of receive payload types and encapsulation mappings.
///
/// Not internally synchronized; the owning stream serializes access.
#[derive(Debug, Default)]
pub struct RtpPayloadRegistry {
    payloads: HashMap<PayloadType, PayloadEntry>,
    /// RTX payload type -> payload type it retransmits
    rtx_payload_types: HashMap<PayloadType, PayloadType>,
    rtx_ssrc: Option<RtpSsrc>,
    red_payload_type: Option<PayloadType>,
    ulpfec_payload_type: Option<PayloadType>,
    last_received_payload_type: Option<PayloadType>,
    last_received_media_payload_type: Option<PayloadType>,
    use_rtx_payload_mapping_on_restore: bool,
}

impl RtpPayloadRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the payload type already registered for a codec with the given
    /// parameters, so a re-registration can evict it first.
    pub fn receive_payload_type(
        &self,
        name: &str,
        frequency: u32,
        channels: u8,
    ) -> Option<PayloadType> {
        self.payloads.iter().find_map(|(pt, entry)| {
            let parameters_match = match entry.specifics {
                PayloadSpecifics::Audio { frequency: f, channels: c } => {
                    f == frequency && c == channels
                }
                PayloadSpecifics::Video { .. } => true,
            };
            (entry.name.eq_ignore_ascii_case(name) && parameters_match).then_some(*pt)
        })
    }

    /// Register a payload type. The names `red` and `ulpfec` configure the
    /// encapsulation payload types as a side effect.
    pub fn register_receive_payload(
        &mut self,
        payload_type: PayloadType,
        name: &str,
        specifics: PayloadSpecifics,
    ) -> Result<()> {
        if payload_type > 127 {
            return Err(Error::invalid_config(format!(
                "payload type {} out of range",
                payload_type
            )));
        }
        if let Some(existing) = self.payloads.get(&payload_type) {
            if !existing.name.eq_ignore_ascii_case(name) {
                return Err(Error::invalid_config(format!(
                    "payload type {} already registered as {}",
                    payload_type, existing.name
                )));
            }
        }
        if name.eq_ignore_ascii_case("red") {
            self.red_payload_type = Some(payload_type);
        } else if name.eq_ignore_ascii_case("ulpfec") {
            self.ulpfec_payload_type = Some(payload_type);
        }
        self.payloads
            .insert(payload_type, PayloadEntry { name: name.to_string(), specifics });
        Ok(())
    }

    /// Remove a payload type registration
    pub fn deregister_receive_payload(&mut self, payload_type: PayloadType) {
        self.payloads.remove(&payload_type);
        if self.red_payload_type == Some(payload_type) {
            self.red_payload_type = None;
        }
        if self.ulpfec_payload_type == Some(payload_type) {
            self.ulpfec_payload_type = None;
        }
    }

    /// Map an RTX payload type to the payload type it retransmits
    pub fn set_rtx_payload_type(
        &mut self,
        payload_type: PayloadType,
        associated_payload_type: PayloadType,
    ) {
        self.rtx_payload_types.insert(payload_type, associated_payload_type);
    }

    /// Configure the SSRC retransmissions arrive on
    pub fn set_rtx_ssrc(&mut self, ssrc: RtpSsrc) {
        self.rtx_ssrc = Some(ssrc);
    }

    /// The configured RTX SSRC, if any
    pub fn rtx_ssrc(&self) -> Option<RtpSsrc> {
        self.rtx_ssrc
    }

    /// Whether RTX is configured at all
    pub fn rtx_enabled(&self) -> bool {
        self.rtx_ssrc.is_some() || !self.rtx_payload_types.is_empty()
    }

    /// Record the payload type of an inbound packet
    pub fn set_incoming_payload_type(&mut self, header: &RtpHeader) {
        self.last_received_payload_type = Some(header.payload_type);
        let encapsulation = self.red_payload_type == Some(header.payload_type)
            || self.ulpfec_payload_type == Some(header.payload_type)
            || self.rtx_payload_types.contains_key(&header.payload_type);
        if !encapsulation {
            self.last_received_media_payload_type = Some(header.payload_type);
        }
    }

    /// Codec metadata for a payload type
    pub fn payload_specifics(&self, payload_type: PayloadType) -> Option<PayloadSpecifics> {
        self.payloads.get(&payload_type).map(|entry| entry.specifics)
    }

    /// True when the header carries RED or RTX encapsulation
    pub fn is_encapsulated(&self, header: &RtpHeader) -> bool {
        self.is_red(header) || self.is_rtx(header)
    }

    /// True when the header's payload type is the configured RED type
    pub fn is_red(&self, header: &RtpHeader) -> bool {
        self.red_payload_type == Some(header.payload_type)
    }

    /// True when the packet arrived on the configured RTX SSRC
    pub fn is_rtx(&self, header: &RtpHeader) -> bool {
        self.rtx_ssrc == Some(header.ssrc)
    }

    /// The configured ULPFEC payload type, `None` when FEC is disabled
    pub fn ulpfec_payload_type(&self) -> Option<PayloadType> {
        self.ulpfec_payload_type
    }

    /// Payload type of the most recent non-encapsulated packet
    pub fn last_received_media_payload_type(&self) -> Option<PayloadType> {
        self.last_received_media_payload_type
    }

    /// Payload type of the most recent packet of any kind
    pub fn last_received_payload_type(&self) -> Option<PayloadType> {
        self.last_received_payload_type
    }

    /// Prefer the RTX payload-type mapping over the last received media
    /// payload type when restoring retransmitted packets
    pub fn set_use_rtx_payload_mapping_on_restore(&mut self, enabled: bool) {
        self.use_rtx_payload_mapping_on_restore = enabled;
    }

    /// Rebuild the original packet out of an RTX retransmission.
    ///
    /// Writes the restored packet into `dst` and returns its length. The
    /// RTX format prepends the original sequence number as two payload
    /// bytes; the original SSRC and payload type are recovered from
    /// configuration.
    pub fn restore_original_packet(
        &self,
        dst: &mut [u8],
        src: &[u8],
        primary_ssrc: RtpSsrc,
        header: &RtpHeader,
    ) -> Option<usize> {
        if src.len() < header.header_length + 2 || src.len() < RTP_MIN_HEADER_LEN {
            return None;
        }
        let restored_length = src.len() - 2;
        if dst.len() < restored_length {
            return None;
        }

        let original_sequence_number =
            u16::from_be_bytes([src[header.header_length], src[header.header_length + 1]]);

        dst[..header.header_length].copy_from_slice(&src[..header.header_length]);
        dst[header.header_length..restored_length]
            .copy_from_slice(&src[header.header_length + 2..]);

        dst[2..4].copy_from_slice(&original_sequence_number.to_be_bytes());
        dst[8..12].copy_from_slice(&primary_ssrc.to_be_bytes());

        let mapped = self
            .use_rtx_payload_mapping_on_restore
            .then(|| self.rtx_payload_types.get(&header.payload_type).copied())
            .flatten();
        let restored_payload_type = mapped.or(self.last_received_media_payload_type)?;
        dst[1] = (dst[1] & 0x80) | (restored_payload_type & 0x7f);

        Some(restored_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(ssrc: RtpSsrc, payload_type: PayloadType) -> RtpHeader {
        RtpHeader {
            marker: false,
            payload_type,
            sequence_number: 10,
            timestamp: 0,
            ssrc,
            csrc_count: 0,
            header_length: 12,
            padding_length: 0,
            payload_type_frequency: 90_000,
            extensions: Default::default(),
        }
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = RtpPayloadRegistry::new();
        registry
            .register_receive_payload(
                96,
                "VP8",
                PayloadSpecifics::Video { codec: VideoCodecType::Vp8, max_bitrate: 0 },
            )
            .unwrap();
        assert_eq!(registry.receive_payload_type("vp8", 90_000, 0), Some(96));
        assert!(matches!(
            registry.payload_specifics(96),
            Some(PayloadSpecifics::Video { codec: VideoCodecType::Vp8, .. })
        ));
        assert_eq!(registry.payload_specifics(97), None);

        // Conflicting name on the same payload type is refused.
        assert!(registry
            .register_receive_payload(
                96,
                "H264",
                PayloadSpecifics::Video { codec: VideoCodecType::H264, max_bitrate: 0 },
            )
            .is_err());
    }

    #[test]
    fn test_red_and_ulpfec_registration() {
        let mut registry = RtpPayloadRegistry::new();
        registry
            .register_receive_payload(
                116,
                "red",
                PayloadSpecifics::Video { codec: VideoCodecType::Generic, max_bitrate: 0 },
            )
            .unwrap();
        registry
            .register_receive_payload(
                117,
                "ulpfec",
                PayloadSpecifics::Video { codec: VideoCodecType::Generic, max_bitrate: 0 },
            )
            .unwrap();
        assert!(registry.is_red(&header(1, 116)));
        assert_eq!(registry.ulpfec_payload_type(), Some(117));

        registry.deregister_receive_payload(117);
        assert_eq!(registry.ulpfec_payload_type(), None);
    }

    #[test]
    fn test_incoming_payload_type_tracking() {
        let mut registry = RtpPayloadRegistry::new();
        registry
            .register_receive_payload(
                116,
                "red",
                PayloadSpecifics::Video { codec: VideoCodecType::Generic, max_bitrate: 0 },
            )
            .unwrap();

        registry.set_incoming_payload_type(&header(1, 96));
        registry.set_incoming_payload_type(&header(1, 116));
        assert_eq!(registry.last_received_payload_type(), Some(116));
        assert_eq!(registry.last_received_media_payload_type(), Some(96));
    }

    #[test]
    fn test_rtx_restore() {
        let mut registry = RtpPayloadRegistry::new();
        registry.set_rtx_ssrc(0xB);
        registry.set_rtx_payload_type(97, 96);
        registry.set_use_rtx_payload_mapping_on_restore(true);

        // RTX packet: 12-byte header on SSRC 0xB, payload = OSN 0x0102 + data.
        let mut rtx = vec![0u8; 12];
        rtx[0] = 0x80;
        rtx[1] = 0x80 | 97; // marker + RTX payload type
        rtx[2..4].copy_from_slice(&500u16.to_be_bytes());
        rtx[8..12].copy_from_slice(&0xBu32.to_be_bytes());
        rtx.extend_from_slice(&[0x01, 0x02, 0xAA, 0xBB]);

        let rtx_header = header(0xB, 97);
        assert!(registry.is_rtx(&rtx_header));

        let mut restored = [0u8; 64];
        let len = registry
            .restore_original_packet(&mut restored, &rtx, 0xA, &rtx_header)
            .unwrap();
        assert_eq!(len, rtx.len() - 2);
        let restored = &restored[..len];
        assert_eq!(u16::from_be_bytes([restored[2], restored[3]]), 0x0102);
        assert_eq!(
            u32::from_be_bytes([restored[8], restored[9], restored[10], restored[11]]),
            0xA
        );
        assert_eq!(restored[1] & 0x7f, 96);
        assert_ne!(restored[1] & 0x80, 0, "marker bit preserved");
        assert_eq!(&restored[12..], &[0xAA, 0xBB]);
    }

    #[test]
    fn test_rtx_restore_without_mapping_uses_last_media_type() {
        let mut registry = RtpPayloadRegistry::new();
        registry.set_rtx_ssrc(0xB);
        registry.set_incoming_payload_type(&header(0xA, 100));

        let mut rtx = vec![0u8; 14];
        rtx[0] = 0x80;
        rtx[1] = 97;
        rtx[8..12].copy_from_slice(&0xBu32.to_be_bytes());

        let mut restored = [0u8; 64];
        let len = registry
            .restore_original_packet(&mut restored, &rtx, 0xA, &header(0xB, 97))
            .unwrap();
        assert_eq!(restored[..len][1] & 0x7f, 100);
    }

    #[test]
    fn test_rtx_restore_rejects_short_payload() {
        let registry = RtpPayloadRegistry::new();
        let rtx = vec![0u8; 13]; // one payload byte, no room for the OSN
        let mut restored = [0u8; 64];
        assert!(registry
            .restore_original_packet(&mut restored, &rtx, 0xA, &header(0xB, 97))
            .is_none());
    }
}
