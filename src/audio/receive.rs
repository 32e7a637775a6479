//! Audio receive stream handle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::clock::Clock;
use crate::congestion::RemoteBitrateEstimator;
use crate::packet::RtpHeaderParser;
use crate::types::{NetworkState, PacketTime, RtpSsrc};

use super::VoiceEngine;

/// Configuration of an audio receive stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioReceiveConfig {
    /// SSRC the remote sender uses
    pub remote_ssrc: RtpSsrc,

    /// Lip-sync group this stream belongs to; empty for none
    pub sync_group: String,

    /// Voice-engine channel the media is decoded on
    pub voe_channel_id: i32,
}

/// Inbound audio stream.
///
/// Depacketization and decoding happen in the voice engine; the call-side
/// handle feeds the shared bandwidth estimator and forwards the packet to
/// the engine channel.
pub struct AudioReceiveStream {
    config: AudioReceiveConfig,
    remote_bitrate_estimator: Arc<dyn RemoteBitrateEstimator>,
    voice_engine: Option<Arc<dyn VoiceEngine>>,
    clock: Arc<dyn Clock>,
    header_parser: RtpHeaderParser,
    receiving: AtomicBool,
    network_states: Mutex<Vec<NetworkState>>,
}

impl AudioReceiveStream {
    pub(crate) fn new(
        config: AudioReceiveConfig,
        remote_bitrate_estimator: Arc<dyn RemoteBitrateEstimator>,
        voice_engine: Option<Arc<dyn VoiceEngine>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        debug!(
            remote_ssrc = config.remote_ssrc,
            sync_group = %config.sync_group,
            "Creating audio receive stream"
        );
        Self {
            config,
            remote_bitrate_estimator,
            voice_engine,
            clock,
            header_parser: RtpHeaderParser::new(),
            receiving: AtomicBool::new(false),
            network_states: Mutex::new(Vec::new()),
        }
    }

    /// Stream configuration
    pub fn config(&self) -> &AudioReceiveConfig {
        &self.config
    }

    /// Begin accepting packets
    pub fn start(&self) {
        self.receiving.store(true, Ordering::SeqCst);
    }

    /// Stop accepting packets
    pub fn stop(&self) {
        self.receiving.store(false, Ordering::SeqCst);
    }

    /// Deliver one RTP packet. Returns whether the stream accepted it.
    pub fn deliver_rtp(&self, packet: &[u8], packet_time: PacketTime) -> bool {
        if !self.receiving.load(Ordering::SeqCst) {
            return false;
        }
        let Ok(header) = self.header_parser.parse(packet) else {
            return false;
        };
        let payload_length = packet.len() - header.header_length;
        let arrival_time_ms = match packet_time.timestamp_us {
            Some(timestamp_us) => (timestamp_us + 500) / 1000,
            None => self.clock.now_ms(),
        };
        self.remote_bitrate_estimator
            .incoming_packet(arrival_time_ms, payload_length, &header, true);

        match &self.voice_engine {
            Some(engine) => {
                engine.received_rtp_packet(self.config.voe_channel_id, packet, packet_time)
            }
            None => true,
        }
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SimulatedClock;
    use crate::packet::RtpHeader;

    struct NullEstimator;

    impl RemoteBitrateEstimator for NullEstimator {
        fn incoming_packet(&self, _: i64, _: usize, _: &RtpHeader, _: bool) {}

        fn latest_estimate(&self) -> Option<(Vec<RtpSsrc>, u32)> {
            None
        }
    }

    struct RecordingEngine {
        channels: Mutex<Vec<i32>>,
    }

    impl VoiceEngine for RecordingEngine {
        fn received_rtp_packet(&self, channel_id: i32, _: &[u8], _: PacketTime) -> bool {
            self.channels.lock().unwrap().push(channel_id);
            true
        }
    }

    fn rtp_packet(ssrc: RtpSsrc) -> Vec<u8> {
        let mut packet = vec![0u8; 12];
        packet[0] = 0x80;
        packet[1] = 111;
        packet[8..12].copy_from_slice(&ssrc.to_be_bytes());
        packet
    }

    fn build_stream(engine: Option<Arc<dyn VoiceEngine>>) -> AudioReceiveStream {
        AudioReceiveStream::new(
            AudioReceiveConfig {
                remote_ssrc: 0x10,
                sync_group: String::new(),
                voe_channel_id: 3,
            },
            Arc::new(NullEstimator),
            engine,
            Arc::new(SimulatedClock::new(0)),
        )
    }

    #[test]
    fn test_packet_forwarded_to_engine_channel() {
        let engine = Arc::new(RecordingEngine { channels: Mutex::new(Vec::new()) });
        let stream = build_stream(Some(engine.clone()));
        stream.start();

        assert!(stream.deliver_rtp(&rtp_packet(0x10), PacketTime::not_set()));
        assert_eq!(engine.channels.lock().unwrap().as_slice(), &[3]);
    }

    #[test]
    fn test_gate_and_malformed_packets() {
        let stream = build_stream(None);
        assert!(!stream.deliver_rtp(&rtp_packet(0x10), PacketTime::not_set()));

        stream.start();
        assert!(!stream.deliver_rtp(&[0u8; 4], PacketTime::not_set()));
        assert!(stream.deliver_rtp(&rtp_packet(0x10), PacketTime::not_set()));
    }
}
