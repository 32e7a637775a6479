//! Video receive stream handle.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::audio::VoiceEngine;
use crate::clock::Clock;
use crate::congestion::RemoteBitrateEstimator;
use crate::packet::{RtcpReport, RtcpReportIter};
use crate::receive::{
    MediaSink, NullMediaSink, PayloadSpecifics, RtpStreamIngress, RttProvider, VideoCodecType,
};
use crate::types::{NetworkState, PacketTime, PayloadType, RtpSsrc};

/// When NACK is on, packets may legitimately arrive this far out of order
const MAX_NACK_REORDERING_THRESHOLD: u16 = 450;

/// Retransmission configuration for one media payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtxConfig {
    /// SSRC retransmissions arrive on
    pub ssrc: RtpSsrc,

    /// Payload type used on the RTX stream
    pub payload_type: PayloadType,
}

/// One decoder the stream can feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDecoderConfig {
    /// Payload type the decoder handles
    pub payload_type: PayloadType,

    /// Codec name, e.g. "VP8"
    pub payload_name: String,
}

/// Configuration of a video receive stream
#[derive(Clone)]
pub struct VideoReceiveConfig {
    /// SSRC the remote sender uses
    pub remote_ssrc: RtpSsrc,

    /// Per-media-payload-type retransmission setup. Keyed by the media
    /// payload type being protected.
    pub rtx: BTreeMap<PayloadType, RtxConfig>,

    /// RED encapsulation payload type, if negotiated
    pub red_payload_type: Option<PayloadType>,

    /// ULPFEC payload type, if negotiated
    pub ulpfec_payload_type: Option<PayloadType>,

    /// Whether NACK retransmission requests are negotiated
    pub nack_enabled: bool,

    /// Lip-sync group this stream belongs to; empty for none
    pub sync_group: String,

    /// Decoders to register
    pub decoders: Vec<VideoDecoderConfig>,

    /// Consumer of depacketized payloads; defaults to a discarding sink
    pub media_sink: Option<Arc<dyn MediaSink>>,

    /// Round-trip-time source for this stream's RTCP exchange. Without
    /// one the remote-NTP refinement never fires and payload timestamps
    /// stay on raw RTP-clock extrapolation.
    pub rtt_provider: Option<Arc<dyn RttProvider>>,
}

impl Default for VideoReceiveConfig {
    fn default() -> Self {
        Self {
            remote_ssrc: 0,
            rtx: BTreeMap::new(),
            red_payload_type: None,
            ulpfec_payload_type: None,
            nack_enabled: false,
            sync_group: String::new(),
            decoders: Vec::new(),
            media_sink: None,
            rtt_provider: None,
        }
    }
}

impl std::fmt::Debug for VideoReceiveConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoReceiveConfig")
            .field("remote_ssrc", &self.remote_ssrc)
            .field("rtx", &self.rtx)
            .field("red_payload_type", &self.red_payload_type)
            .field("ulpfec_payload_type", &self.ulpfec_payload_type)
            .field("nack_enabled", &self.nack_enabled)
            .field("sync_group", &self.sync_group)
            .field("decoders", &self.decoders)
            .finish()
    }
}

/// Inbound video stream wrapping the receive ingress pipeline.
pub struct VideoReceiveStream {
    config: VideoReceiveConfig,
    ingress: RtpStreamIngress,
    receiving: AtomicBool,
    /// Voice-engine channel this stream is lip-synced to, -1 when unbound
    sync_channel: Mutex<i32>,
    network_states: Mutex<Vec<NetworkState>>,
}

impl VideoReceiveStream {
    pub(crate) fn new(
        config: VideoReceiveConfig,
        remote_bitrate_estimator: Arc<dyn RemoteBitrateEstimator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        debug!(
            remote_ssrc = config.remote_ssrc,
            sync_group = %config.sync_group,
            "Creating video receive stream"
        );
        let media_sink: Arc<dyn MediaSink> = config
            .media_sink
            .clone()
            .unwrap_or_else(|| Arc::new(NullMediaSink));
        let ingress = RtpStreamIngress::new(
            clock,
            config.remote_ssrc,
            remote_bitrate_estimator,
            media_sink,
        );

        for decoder in &config.decoders {
            let specifics = PayloadSpecifics::Video {
                codec: codec_from_name(&decoder.payload_name),
                max_bitrate: 0,
            };
            if let Err(error) =
                ingress.set_receive_codec(decoder.payload_type, &decoder.payload_name, specifics)
            {
                debug!(%error, payload_type = decoder.payload_type, "Skipping decoder registration");
            }
        }
        let generic = PayloadSpecifics::Video { codec: VideoCodecType::Generic, max_bitrate: 0 };
        if let Some(red) = config.red_payload_type {
            let _ = ingress.set_receive_codec(red, "red", generic);
        }
        if let Some(ulpfec) = config.ulpfec_payload_type {
            let _ = ingress.set_receive_codec(ulpfec, "ulpfec", generic);
        }
        if let Some((media_payload_type, rtx)) = config.rtx.iter().next() {
            ingress.set_rtx_ssrc(rtx.ssrc);
            ingress.set_rtx_payload_type(rtx.payload_type, *media_payload_type);
            ingress.set_use_rtx_payload_mapping_on_restore(true);
        }
        ingress.set_nack_status(config.nack_enabled, MAX_NACK_REORDERING_THRESHOLD);

        Self {
            config,
            ingress,
            receiving: AtomicBool::new(false),
            sync_channel: Mutex::new(-1),
            network_states: Mutex::new(Vec::new()),
        }
    }

    /// Stream configuration
    pub fn config(&self) -> &VideoReceiveConfig {
        &self.config
    }

    /// The ingress pipeline, for statistics and payload management
    pub fn ingress(&self) -> &RtpStreamIngress {
        &self.ingress
    }

    /// Begin accepting packets
    pub fn start(&self) {
        self.receiving.store(true, Ordering::SeqCst);
        self.ingress.start_receive();
    }

    /// Stop accepting packets
    pub fn stop(&self) {
        self.receiving.store(false, Ordering::SeqCst);
        self.ingress.stop_receive();
    }

    /// Deliver one RTP packet through the ingress pipeline
    pub fn deliver_rtp(&self, packet: &[u8], packet_time: PacketTime) -> bool {
        self.ingress.received_rtp_packet(packet, packet_time)
    }

    /// Offer an RTCP packet. Returns true when the packet concerns this
    /// stream's primary or RTX SSRC; sender reports additionally refine
    /// the remote-NTP mapping.
    pub fn deliver_rtcp(&self, packet: &[u8]) -> bool {
        if !self.receiving.load(Ordering::SeqCst) {
            return false;
        }
        let mut delivered = false;
        let mut sender_info = None;
        for report in RtcpReportIter::new(packet) {
            match report {
                RtcpReport::SenderReport { sender_ssrc, ntp, rtp_timestamp, .. } => {
                    if self.concerns(sender_ssrc) {
                        delivered = true;
                        sender_info = Some((ntp, rtp_timestamp));
                    }
                }
                RtcpReport::ReceiverReport { sender_ssrc, .. } => {
                    if self.concerns(sender_ssrc) {
                        delivered = true;
                    }
                }
                RtcpReport::Other { .. } => {}
            }
        }
        if delivered {
            // The round trip is this stream's own measurement; a zero RTT
            // means the exchange has not settled yet and the NTP anchor is
            // left alone.
            let rtt_ms = self
                .config
                .rtt_provider
                .as_ref()
                .map(|provider| provider.rtt_ms(self.config.remote_ssrc))
                .unwrap_or(0);
            self.ingress.update_rtcp_timing(rtt_ms, sender_info);
        }
        delivered
    }

    /// Bind this stream's renderer to a voice-engine channel for lip sync,
    /// or unbind with channel -1.
    pub fn set_sync_channel(&self, _voice_engine: &Arc<dyn VoiceEngine>, channel_id: i32) {
        debug!(
            remote_ssrc = self.config.remote_ssrc,
            channel_id, "Configuring lip-sync channel"
        );
        if let Ok(mut channel) = self.sync_channel.lock() {
            *channel = channel_id;
        }
    }

    /// The voice-engine channel this stream is synced to, -1 when none
    pub fn sync_channel(&self) -> i32 {
        self.sync_channel.lock().map(|channel| *channel).unwrap_or(-1)
    }

    /// Observe a network state transition
    pub fn signal_network_state(&self, state: NetworkState) {
        if let Ok(mut states) = self.network_states.lock() {
            states.push(state);
        }
    }

    /// Every network state the stream has observed, oldest first
    pub fn observed_network_states(&self) -> Vec<NetworkState> {
        self.network_states.lock().map(|states| states.clone()).unwrap_or_default()
    }

    fn concerns(&self, ssrc: RtpSsrc) -> bool {
        ssrc == self.config.remote_ssrc || self.ingress.rtx_ssrc() == Some(ssrc)
    }
}

fn codec_from_name(name: &str) -> VideoCodecType {
    match name.to_ascii_uppercase().as_str() {
        "VP8" => VideoCodecType::Vp8,
        "VP9" => VideoCodecType::Vp9,
        "H264" => VideoCodecType::H264,
        _ => VideoCodecType::Generic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::packet::RtpHeader;
    use crate::receive::MediaPayloadHeader;
    use bytes::Bytes;

    struct NullEstimator;

    impl RemoteBitrateEstimator for NullEstimator {
        fn incoming_packet(&self, _: i64, _: usize, _: &RtpHeader, _: bool) {}

        fn latest_estimate(&self) -> Option<(Vec<RtpSsrc>, u32)> {
            None
        }
    }

    fn build_stream(config: VideoReceiveConfig) -> VideoReceiveStream {
        VideoReceiveStream::new(
            config,
            Arc::new(NullEstimator),
            Arc::new(SimulatedClock::new(0)),
        )
    }

    fn sender_report(sender_ssrc: RtpSsrc) -> Vec<u8> {
        sender_report_with_timing(sender_ssrc, 0, 0, 0)
    }

    fn sender_report_with_timing(
        sender_ssrc: RtpSsrc,
        ntp_secs: u32,
        ntp_frac: u32,
        rtp_timestamp: u32,
    ) -> Vec<u8> {
        let mut packet = vec![0x80, 200, 0, 6];
        packet.extend_from_slice(&sender_ssrc.to_be_bytes());
        packet.extend_from_slice(&ntp_secs.to_be_bytes());
        packet.extend_from_slice(&ntp_frac.to_be_bytes());
        packet.extend_from_slice(&rtp_timestamp.to_be_bytes());
        packet.extend_from_slice(&[0u8; 8]);
        packet
    }

    #[test]
    fn test_rtx_config_plumbed_to_ingress() {
        let mut rtx = BTreeMap::new();
        rtx.insert(96, RtxConfig { ssrc: 0xB, payload_type: 97 });
        let stream = build_stream(VideoReceiveConfig {
            remote_ssrc: 0xA,
            rtx,
            ..Default::default()
        });
        assert_eq!(stream.ingress().rtx_ssrc(), Some(0xB));
    }

    #[test]
    fn test_rtcp_matching_by_ssrc() {
        let stream = build_stream(VideoReceiveConfig {
            remote_ssrc: 0xA,
            ..Default::default()
        });
        stream.start();
        assert!(stream.deliver_rtcp(&sender_report(0xA)));
        assert!(!stream.deliver_rtcp(&sender_report(0xBB)));
    }

    #[test]
    fn test_rtcp_gated_when_stopped() {
        let stream = build_stream(VideoReceiveConfig {
            remote_ssrc: 0xA,
            ..Default::default()
        });
        assert!(!stream.deliver_rtcp(&sender_report(0xA)));
    }

    #[test]
    fn test_sync_channel_binding() {
        let stream = build_stream(VideoReceiveConfig {
            remote_ssrc: 0xA,
            sync_group: "g".to_string(),
            ..Default::default()
        });
        assert_eq!(stream.sync_channel(), -1);
    }

    #[derive(Default)]
    struct NtpRecordingSink {
        ntp_times: Mutex<Vec<Option<i64>>>,
    }

    impl MediaSink for NtpRecordingSink {
        fn on_payload(&self, _payload: Bytes, header: &MediaPayloadHeader) -> crate::Result<()> {
            self.ntp_times.lock().unwrap().push(header.ntp_time_ms);
            Ok(())
        }
    }

    struct FixedRtt(i64);

    impl RttProvider for FixedRtt {
        fn rtt_ms(&self, _remote_ssrc: RtpSsrc) -> i64 {
            self.0
        }
    }

    fn media_packet(ssrc: RtpSsrc, timestamp: u32) -> Vec<u8> {
        let mut packet = vec![0u8; 12];
        packet[0] = 0x80;
        packet[1] = 96;
        packet[4..8].copy_from_slice(&timestamp.to_be_bytes());
        packet[8..12].copy_from_slice(&ssrc.to_be_bytes());
        packet
    }

    fn ntp_test_config(sink: Arc<NtpRecordingSink>, rtt: Option<i64>) -> VideoReceiveConfig {
        VideoReceiveConfig {
            remote_ssrc: 0xA,
            decoders: vec![VideoDecoderConfig {
                payload_type: 96,
                payload_name: "VP8".to_string(),
            }],
            media_sink: Some(sink),
            rtt_provider: rtt.map(|ms| Arc::new(FixedRtt(ms)) as Arc<dyn RttProvider>),
            ..Default::default()
        }
    }

    #[test]
    fn test_rtt_provider_drives_ntp_refinement() {
        let sink = Arc::new(NtpRecordingSink::default());
        let stream = build_stream(ntp_test_config(sink.clone(), Some(100)));
        stream.start();

        // SR from the remote at the NTP/UNIX epoch offset, so the anchor
        // lands at unix 0 plus half the round trip.
        let sr = sender_report_with_timing(0xA, 2_208_988_800, 0, 90_000);
        assert!(stream.deliver_rtcp(&sr));

        assert!(stream.deliver_rtp(&media_packet(0xA, 90_000), PacketTime::not_set()));
        assert_eq!(sink.ntp_times.lock().unwrap().as_slice(), &[Some(50)]);
    }

    #[test]
    fn test_ntp_refinement_waits_for_rtt() {
        let sink = Arc::new(NtpRecordingSink::default());
        // No provider: the stream has no round-trip measurement of its own.
        let stream = build_stream(ntp_test_config(sink.clone(), None));
        stream.start();

        let sr = sender_report_with_timing(0xA, 2_208_988_800, 0, 90_000);
        assert!(stream.deliver_rtcp(&sr));

        assert!(stream.deliver_rtp(&media_packet(0xA, 90_000), PacketTime::not_set()));
        assert_eq!(sink.ntp_times.lock().unwrap().as_slice(), &[None]);
    }
}
